use std::sync::Arc;

use pathwinder::fileinfo::{FileInformationClass, FileInformationLayout};
use pathwinder::memfs::InMemoryFilesystem;
use pathwinder::{
    AccessMode, FileOperation, FilesystemDirectorBuilder, FilesystemExecutor,
    FilesystemOperations, Handle, NtStatus, QueryFlags, RulesConfig,
};

/// A redirection engine wired to an in-memory filesystem, driven the way an
/// interception layer would drive it.
pub struct Fixture {
    pub fs: Arc<InMemoryFilesystem>,
    pub executor: FilesystemExecutor,
}

impl Fixture {
    /// Builds a fixture from TOML rule definitions over an already-populated
    /// filesystem. Panics on any rule rejection; tests describe valid sets.
    pub fn new(fs: Arc<InMemoryFilesystem>, rules: &str) -> Fixture {
        let config = RulesConfig::parse(rules).expect("rules parse");
        let mut builder = FilesystemDirectorBuilder::new();
        config.apply(&mut builder).expect("rules accepted");
        let director = builder
            .build(Arc::<InMemoryFilesystem>::clone(&fs))
            .unwrap_or_else(|violations| panic!("invalid rule set: {violations:?}"));
        let executor =
            FilesystemExecutor::new(Arc::new(director), Arc::<InMemoryFilesystem>::clone(&fs));
        Fixture { fs, executor }
    }

    pub fn open(&self, path: &str) -> Result<Handle, NtStatus> {
        self.open_relative(path, None)
    }

    pub fn open_relative(&self, path: &str, root: Option<Handle>) -> Result<Handle, NtStatus> {
        self.executor.new_file_handle(path, root, FileOperation::Open, AccessMode::Read, |real| {
            self.fs.open(real)
        })
    }

    pub fn create_file(&self, path: &str) -> Result<Handle, NtStatus> {
        self.executor.new_file_handle(
            path,
            None,
            FileOperation::Create,
            AccessMode::ReadWrite,
            |real| self.fs.create_and_open(real),
        )
    }

    /// Real filesystem path behind a handle, as the facade sees it.
    pub fn real_path_of(&self, handle: Handle) -> String {
        self.fs.query_absolute_path_by_handle(handle).expect("handle known to the filesystem")
    }

    pub fn close(&self, handle: Handle) {
        assert_eq!(self.executor.close_handle(handle), NtStatus::Success);
    }

    /// Opens a directory and enumerates it to exhaustion, returning the names
    /// the application would observe, in order.
    pub fn enumerate(&self, path: &str) -> Vec<String> {
        self.enumerate_with_pattern(path, None)
    }

    pub fn enumerate_with_pattern(&self, path: &str, pattern: Option<&str>) -> Vec<String> {
        let handle = self
            .executor
            .new_file_handle(path, None, FileOperation::Enumerate, AccessMode::Read, |real| {
                self.fs.open(real)
            })
            .expect("directory opens");
        let names = self.enumerate_handle(handle, pattern);
        self.close(handle);
        names
    }

    /// Runs the prepare/advance protocol against an open handle.
    pub fn enumerate_handle(&self, handle: Handle, pattern: Option<&str>) -> Vec<String> {
        let class = FileInformationClass::FileNames;
        let interposed = match self.executor.prepare_directory_enumeration(
            handle,
            class as u32,
            pattern,
        ) {
            Some(status) => {
                assert!(status.succeeded(), "prepare failed: {status:?}");
                true
            }
            None => false,
        };

        let mut names = Vec::new();
        let mut buffer = vec![0u8; 2048];
        loop {
            let status = if interposed {
                self.executor
                    .advance_directory_enumeration(handle, &mut buffer, QueryFlags::default(), None)
                    .status
            } else {
                self.fs.partial_enumerate_directory_contents(
                    handle,
                    class,
                    &mut buffer,
                    QueryFlags::default(),
                    pattern,
                )
            };
            match status {
                NtStatus::Success => read_record_chain(&buffer, &mut names),
                NtStatus::NoMoreFiles | NtStatus::NoSuchFile => break,
                other => panic!("enumeration failed: {other:?}"),
            }
        }
        names
    }
}

/// Decodes a chain of FileNames records from a buffer.
pub fn read_record_chain(buffer: &[u8], names: &mut Vec<String>) {
    let layout = FileInformationLayout::for_class(FileInformationClass::FileNames);
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
