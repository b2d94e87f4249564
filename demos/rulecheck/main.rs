//! Rule inspection tool.
//!
//! Loads redirection rules from a TOML file, stands up an in-memory
//! filesystem to play the role of the platform, and shows what the
//! redirection engine decides: how paths classify, which instructions file
//! operations produce, and what a directory enumeration would present to an
//! application.
//!
//! The simulated filesystem is described by a plain text file with one
//! absolute path per line; lines ending in a backslash create directories,
//! all others create files.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pathwinder::fileinfo::{FileInformationClass, FileInformationLayout};
use pathwinder::memfs::InMemoryFilesystem;
use pathwinder::{
    AccessMode, FileOperation, FilesystemDirectorBuilder, FilesystemExecutor,
    FilesystemOperations, NtStatus, QueryFlags, RulesConfig,
};

#[derive(Parser)]
#[command(name = "rulecheck", about = "Inspect filesystem redirection rules")]
struct Args {
    /// TOML file containing [[rule]] definitions.
    #[arg(long)]
    rules: PathBuf,

    /// Text file describing the simulated filesystem, one absolute path per
    /// line. Paths ending in a backslash become directories.
    #[arg(long)]
    filesystem: Option<PathBuf>,

    /// Enumerate this directory through the redirection engine.
    #[arg(long)]
    enumerate: Option<String>,

    /// Paths to classify and decide.
    paths: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("rulecheck: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let fs = Arc::new(InMemoryFilesystem::new());
    if let Some(filesystem_file) = &args.filesystem {
        let listing = std::fs::read_to_string(filesystem_file)
            .map_err(|error| format!("cannot read {}: {error}", filesystem_file.display()))?;
        for line in listing.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match line.strip_suffix('\\') {
                Some(directory) => fs.add_directory(directory),
                None => fs.add_file(line),
            }
        }
    }

    let config = RulesConfig::load(&args.rules).map_err(|error| error.to_string())?;
    let mut builder = FilesystemDirectorBuilder::new();
    config.apply(&mut builder).map_err(|error| error.to_string())?;

    let director = builder
        .build(Arc::<InMemoryFilesystem>::clone(&fs))
        .map_err(|violations| {
            violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
        })?;
    println!("{} rule(s) loaded", director.rule_count());

    let executor = FilesystemExecutor::new(Arc::new(director), Arc::<InMemoryFilesystem>::clone(&fs));

    for path in &args.paths {
        let classification = executor.director().classify_path(path);
        let instruction = executor.director().instruction_for_file_operation(
            path,
            FileOperation::Open,
            AccessMode::Read,
        );
        println!("{path}");
        println!("  kind: {:?}", classification.kind);
        if let Some(rule) = &classification.rule {
            println!("  rule: {}", rule.name());
        }
        println!("  open: {instruction:?}");
    }

    if let Some(directory) = &args.enumerate {
        println!("{directory} enumerates as:");
        for name in enumerate(&executor, &fs, directory)? {
            println!("  {name}");
        }
    }

    Ok(())
}

fn enumerate(
    executor: &FilesystemExecutor,
    fs: &Arc<InMemoryFilesystem>,
    directory: &str,
) -> Result<Vec<String>, String> {
    let handle = executor
        .new_file_handle(directory, None, FileOperation::Enumerate, AccessMode::Read, |path| {
            fs.open(path)
        })
        .map_err(|status| format!("cannot open {directory}: {status:?}"))?;

    let information_class = FileInformationClass::FileNames;
    let layout = FileInformationLayout::for_class(information_class);
    let interposed = match executor.prepare_directory_enumeration(
        handle,
        information_class as u32,
        None,
    ) {
        Some(status) if !status.succeeded() => {
            return Err(format!("cannot prepare enumeration: {status:?}"));
        }
        Some(_) => true,
        None => false,
    };

    let mut names = Vec::new();
    let mut buffer = vec![0u8; 4096];
    loop {
        let status = if interposed {
            executor
                .advance_directory_enumeration(handle, &mut buffer, QueryFlags::default(), None)
                .status
        } else {
            fs.partial_enumerate_directory_contents(
                handle,
                information_class,
                &mut buffer,
                QueryFlags::default(),
                None,
            )
        };
        match status {
            NtStatus::Success => {
                let mut position = 0usize;
                loop {
                    let record = &buffer[position..];
                    names.push(layout.read_file_name(record));
                    match layout.read_next_entry_offset(record) {
                        0 => break,
                        next => position += next as usize,
                    }
                }
            }
            NtStatus::NoMoreFiles | NtStatus::NoSuchFile => break,
            other => return Err(format!("enumeration failed: {other:?}")),
        }
    }

    executor.close_handle(handle);
    Ok(names)
}
