//! Single file operations through the redirection engine: redirection,
//! overlay fallback, root-handle composition, and handle lifecycle.

use std::sync::Arc;

use pathwinder::memfs::InMemoryFilesystem;
use pathwinder::{FilesystemOperations, NtStatus};

use crate::common::Fixture;

#[test]
fn root_handle_relative_opens_resolve_per_rule() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_directory("C:\\Test");
    fs.add_files_in_directory("C:\\Test\\OriginDir", ["OriginFile.bin"]);
    fs.add_files_in_directory("C:\\Test\\TargetDir", ["TargetFile.txt"]);
    fs.add_files_in_directory("C:\\Test\\TargetDir2", ["TargetFile2.log"]);

    let fixture = Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "Test"
        origin_directory = 'C:\Test\OriginDir'
        target_directory = 'C:\Test\TargetDir'
        file_patterns = ["*.txt"]

        [[rule]]
        name = "Test2"
        origin_directory = 'C:\Test\OriginDir'
        target_directory = 'C:\Test\TargetDir2'
        file_patterns = ["*.log"]
    "#,
    );

    let root = fixture.open("C:\\Test\\OriginDir").expect("origin directory opens");

    let origin_side = fixture.open_relative("OriginFile.bin", Some(root)).expect("open");
    assert_eq!(fixture.real_path_of(origin_side), "C:\\Test\\OriginDir\\OriginFile.bin");

    let target_side = fixture.open_relative("TargetFile.txt", Some(root)).expect("open");
    assert_eq!(fixture.real_path_of(target_side), "C:\\Test\\TargetDir\\TargetFile.txt");

    let target_side_2 = fixture.open_relative("TargetFile2.log", Some(root)).expect("open");
    assert_eq!(fixture.real_path_of(target_side_2), "C:\\Test\\TargetDir2\\TargetFile2.log");

    for handle in [origin_side, target_side, target_side_2, root] {
        fixture.close(handle);
    }
}

#[test]
fn composition_uses_the_logical_path_of_unknown_roots() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory("C:\\Plain\\Dir", ["File.txt"]);
    fs.add_directory("C:\\Target");

    let fixture = Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "Unrelated"
        origin_directory = 'C:\Elsewhere\Origin'
        target_directory = 'C:\Target'
    "#,
    );

    // A handle opened behind the engine's back is resolved via the facade.
    let foreign_root = fixture.fs.open("C:\\Plain\\Dir").expect("direct open");
    let file = fixture.open_relative("File.txt", Some(foreign_root)).expect("open");
    assert_eq!(fixture.real_path_of(file), "C:\\Plain\\Dir\\File.txt");

    fixture.close(file);
    assert_eq!(fixture.executor.close_handle(foreign_root), NtStatus::Success);
}

#[test]
fn overlay_fallback_is_transparent_when_the_target_is_missing() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory("C:\\AppDir\\Data", ["Config.ini"]);

    let fixture = Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "Data"
        origin_directory = 'C:\AppDir\Data'
        target_directory = 'C:\Target'
        redirect_mode = "Overlay"
    "#,
    );

    // With no target side at all, an overlay read opens exactly what a
    // direct open of the origin would have opened.
    let through_engine = fixture.open("C:\\AppDir\\Data\\Config.ini").expect("open");
    assert_eq!(fixture.real_path_of(through_engine), "C:\\AppDir\\Data\\Config.ini");
    fixture.close(through_engine);

    // Once the target side provides the file, it wins.
    fixture.fs.add_files_in_directory("C:\\Target", ["Config.ini"]);
    let redirected = fixture.open("C:\\AppDir\\Data\\Config.ini").expect("open");
    assert_eq!(fixture.real_path_of(redirected), "C:\\Target\\Config.ini");
    fixture.close(redirected);
}

#[test]
fn simple_mode_missing_target_files_stay_missing() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory("C:\\AppDir\\Data", ["Present.txt"]);
    fs.add_directory("C:\\Target");

    let fixture = Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "Data"
        origin_directory = 'C:\AppDir\Data'
        target_directory = 'C:\Target'
        file_patterns = ["*.txt"]
    "#,
    );

    // The origin-side file is claimed by the rule, so it must not be
    // reachable: redirected files exist on the target side or not at all.
    let result = fixture.open("C:\\AppDir\\Data\\Present.txt");
    assert_eq!(result, Err(NtStatus::ObjectNameNotFound));
}

#[test]
fn create_through_overlay_builds_missing_target_hierarchy() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_directory("C:\\AppDir\\Data");

    let fixture = Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "Data"
        origin_directory = 'C:\AppDir\Data'
        target_directory = 'C:\Storage\Deep\Target'
        redirect_mode = "Overlay"
    "#,
    );

    let handle = fixture.create_file("C:\\AppDir\\Data\\New.bin").expect("create");
    fixture.close(handle);

    assert!(fixture.fs.is_directory("C:\\Storage\\Deep\\Target"));
    assert!(fixture.fs.exists("C:\\Storage\\Deep\\Target\\New.bin"));
    assert!(!fixture.fs.exists("C:\\AppDir\\Data\\New.bin"));
}

#[test]
fn closed_handles_are_forgotten_and_reusable_values_rebind() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory("C:\\Dir", ["a.txt"]);
    fs.add_directory("C:\\Target");

    let fixture = Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "Unrelated"
        origin_directory = 'C:\Elsewhere\Origin'
        target_directory = 'C:\Target'
    "#,
    );

    let handle = fixture.open("C:\\Dir\\a.txt").expect("open");
    assert!(fixture.executor.handles().get(handle).is_some());

    fixture.close(handle);
    assert!(fixture.executor.handles().get(handle).is_none());
    assert_eq!(fixture.fs.open_handle_count(), 0);

    // Closing a handle the engine never saw forwards to the facade.
    let foreign = fixture.fs.open("C:\\Dir").expect("direct open");
    assert_eq!(fixture.executor.close_handle(foreign), NtStatus::Success);
}

#[test]
fn handles_do_not_leak_state_across_threads() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory("C:\\AppDir\\Data", ["shared.txt"]);
    fs.add_files_in_directory("C:\\Target", ["shared.txt"]);

    let fixture = Arc::new(Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "Data"
        origin_directory = 'C:\AppDir\Data'
        target_directory = 'C:\Target'
        redirect_mode = "Overlay"
    "#,
    ));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let fixture = Arc::clone(&fixture);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let handle = fixture.open("C:\\AppDir\\Data\\shared.txt").expect("open");
                    assert_eq!(
                        fixture.real_path_of(handle),
                        "C:\\Target\\shared.txt"
                    );
                    fixture.close(handle);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    assert!(fixture.executor.handles().is_empty());
    assert_eq!(fixture.fs.open_handle_count(), 0);
}
