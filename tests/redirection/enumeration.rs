//! Directory enumeration through the redirection engine: replacement,
//! overlays, rule precedence, deduplication, and the streaming protocol.

use std::sync::Arc;

use pathwinder::fileinfo::{FileInformationClass, FileInformationLayout};
use pathwinder::memfs::InMemoryFilesystem;
use pathwinder::{FilesystemOperations, NtStatus, QueryFlags};

use crate::common::{read_record_chain, Fixture};

#[test]
fn entire_directory_replacement() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_directory("C:\\AppDir");
    fs.add_files_in_directory("C:\\TargetDir", ["TextFile.txt", "Output.log"]);
    fs.add_directory("C:\\TargetDir\\TargetSub");

    let fixture = Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "DataDir"
        origin_directory = 'C:\AppDir\DataDir'
        target_directory = 'C:\TargetDir'
    "#,
    );

    assert_eq!(
        fixture.enumerate("C:\\AppDir\\DataDir"),
        ["Output.log", "TargetSub", "TextFile.txt"]
    );
}

#[test]
fn partial_replacement_with_file_pattern() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory("C:\\AppDir\\DataDir", ["1stOrigin.txt", "2ndOrigin.bin"]);
    fs.add_files_in_directory("C:\\TargetDir", ["3rdTarget.txt", "4thTarget.log"]);

    let fixture = Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "DataDir"
        origin_directory = 'C:\AppDir\DataDir'
        target_directory = 'C:\TargetDir'
        file_patterns = ["*.txt"]
    "#,
    );

    // Origin files claimed by the rule are hidden and replaced by the
    // matching target contents; everything else stays visible.
    assert_eq!(
        fixture.enumerate("C:\\AppDir\\DataDir"),
        ["2ndOrigin.bin", "3rdTarget.txt"]
    );

    // Creating a non-matching file lands on the origin side.
    let data_handle = fixture.create_file("C:\\AppDir\\DataDir\\Data.dat").expect("create");
    fixture.close(data_handle);
    assert!(fixture.fs.exists("C:\\AppDir\\DataDir\\Data.dat"));
    assert!(!fixture.fs.exists("C:\\TargetDir\\Data.dat"));

    // Creating a matching file lands on the target side; the origin is
    // untouched.
    let output_handle = fixture.create_file("C:\\AppDir\\DataDir\\Output.txt").expect("create");
    fixture.close(output_handle);
    assert!(fixture.fs.exists("C:\\TargetDir\\Output.txt"));
    assert!(!fixture.fs.exists("C:\\AppDir\\DataDir\\Output.txt"));
}

#[test]
fn overlay_without_patterns_unions_both_sides() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory("C:\\AppDir\\DataDir", ["1stOrigin.txt", "2ndOrigin.bin"]);
    fs.add_directory("C:\\AppDir\\DataDir\\OriginSub");
    fs.add_files_in_directory("C:\\TargetDir", ["3rdTarget.txt", "4thTarget.log"]);
    fs.add_directory("C:\\TargetDir\\TargetSub");
    fs.add_files_in_directory("C:\\TargetDir\\MoreData.txt", ["OutputB.log", "ContentsB2.bin"]);

    let fixture = Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "DataDir"
        origin_directory = 'C:\AppDir\DataDir'
        target_directory = 'C:\TargetDir'
        redirect_mode = "Overlay"
    "#,
    );

    assert_eq!(
        fixture.enumerate("C:\\AppDir\\DataDir"),
        [
            "1stOrigin.txt",
            "2ndOrigin.bin",
            "3rdTarget.txt",
            "4thTarget.log",
            "MoreData.txt",
            "OriginSub",
            "TargetSub",
        ]
    );

    // A directory contributed by the target side enumerates through the
    // overlay as well.
    assert_eq!(
        fixture.enumerate("C:\\AppDir\\DataDir\\MoreData.txt"),
        ["ContentsB2.bin", "OutputB.log"]
    );
}

#[test]
fn multiple_rules_on_one_origin_with_catch_all() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory(
        "C:\\Target\\1",
        ["1_A.rtf", "1_B.rtf", "1_C.rtf", "1_D.txt", "1_E.odt"],
    );
    fs.add_files_in_directory(
        "C:\\Target\\2",
        ["2_A.odt", "2_B.odt", "2_C.odt", "2_D.rtf", "2_E.txt"],
    );
    fs.add_files_in_directory(
        "C:\\Target\\3",
        ["3_A.txt", "3_B.txt", "3_C.txt", "3_D.rtf", "3_E.odt"],
    );
    fs.add_files_in_directory("C:\\Target\\4", ["4_A.exe", "4_B.bin", "4_C.log"]);
    fs.add_files_in_directory(
        "C:\\Origin",
        [
            "OriginSide.docx",
            "OriginSide.rtf",
            "OriginSide.txt",
            "OriginSide.odt",
            "OriginSide.exe",
        ],
    );

    let fixture = Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "Test1"
        origin_directory = 'C:\Origin'
        target_directory = 'C:\Target\1'
        redirect_mode = "Overlay"
        file_patterns = ["*.rtf"]

        [[rule]]
        name = "Test2"
        origin_directory = 'C:\Origin'
        target_directory = 'C:\Target\2'
        redirect_mode = "Overlay"
        file_patterns = ["*.odt"]

        [[rule]]
        name = "Test3"
        origin_directory = 'C:\Origin'
        target_directory = 'C:\Target\3'
        redirect_mode = "Overlay"
        file_patterns = ["*.txt"]

        [[rule]]
        name = "Test4"
        origin_directory = 'C:\Origin'
        target_directory = 'C:\Target\4'
    "#,
    );

    // Typed files merge their typed rule's target with the origin; all other
    // files come only from the catch-all's target. A typed file sitting in
    // the wrong target directory is never shown.
    assert_eq!(
        fixture.enumerate("C:\\Origin"),
        [
            "1_A.rtf",
            "1_B.rtf",
            "1_C.rtf",
            "2_A.odt",
            "2_B.odt",
            "2_C.odt",
            "3_A.txt",
            "3_B.txt",
            "3_C.txt",
            "4_A.exe",
            "4_B.bin",
            "4_C.log",
            "OriginSide.odt",
            "OriginSide.rtf",
            "OriginSide.txt",
        ]
    );
}

#[test]
fn names_shared_between_sides_appear_once() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory("C:\\AppDir\\Data", ["Shared.txt", "OnlyOrigin.txt"]);
    fs.add_files_in_directory("C:\\Target", ["SHARED.TXT", "OnlyTarget.txt"]);

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

    let names = fixture.enumerate("C:\\AppDir\\Data");
    assert_eq!(names, ["OnlyOrigin.txt", "OnlyTarget.txt", "Shared.txt"]);
}

#[test]
fn enumeration_honors_the_application_file_pattern() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory("C:\\AppDir\\Data", ["keep.txt", "skip.bin"]);
    fs.add_files_in_directory("C:\\Target", ["target.txt", "other.log"]);

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

    assert_eq!(
        fixture.enumerate_with_pattern("C:\\AppDir\\Data", Some("*.txt")),
        ["keep.txt", "target.txt"]
    );
}

#[test]
fn restart_scan_clears_deduplication_and_rewinds() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory("C:\\AppDir\\Data", ["alpha", "bravo"]);
    fs.add_directory("C:\\Target");

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

    let handle = fixture.open("C:\\AppDir\\Data").expect("open");
    let class = FileInformationClass::FileNames;
    let layout = FileInformationLayout::for_class(class);
    assert_eq!(
        fixture.executor.prepare_directory_enumeration(handle, class as u32, None),
        Some(NtStatus::Success)
    );

    let mut buffer = vec![0u8; 512];
    let single = QueryFlags::RETURN_SINGLE_ENTRY;

    let first = fixture.executor.advance_directory_enumeration(handle, &mut buffer, single, None);
    assert_eq!(first.status, NtStatus::Success);
    assert_eq!(layout.read_file_name(&buffer), "alpha");

    let second = fixture.executor.advance_directory_enumeration(handle, &mut buffer, single, None);
    assert_eq!(second.status, NtStatus::Success);
    assert_eq!(layout.read_file_name(&buffer), "bravo");

    let exhausted =
        fixture.executor.advance_directory_enumeration(handle, &mut buffer, single, None);
    assert_eq!(exhausted.status, NtStatus::NoMoreFiles);
    assert_eq!(exhausted.bytes_written, 0);

    // A rescan starts over: without clearing the emitted-name set, every
    // entry would be suppressed as a duplicate.
    let restarted = fixture.executor.advance_directory_enumeration(
        handle,
        &mut buffer,
        single.with(QueryFlags::RESTART_SCAN),
        None,
    );
    assert_eq!(restarted.status, NtStatus::Success);
    assert_eq!(layout.read_file_name(&buffer), "alpha");

    fixture.close(handle);
}

#[test]
fn first_enumeration_of_an_empty_view_reports_no_such_file() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_directory("C:\\AppDir\\Data");

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

    let handle = fixture.open("C:\\AppDir\\Data").expect("open falls back to origin");
    let class = FileInformationClass::FileNames;
    assert_eq!(
        fixture.executor.prepare_directory_enumeration(handle, class as u32, None),
        Some(NtStatus::Success)
    );

    let mut buffer = vec![0u8; 512];
    let first = fixture.executor.advance_directory_enumeration(
        handle,
        &mut buffer,
        QueryFlags::default(),
        None,
    );
    assert_eq!(first.status, NtStatus::NoSuchFile);

    let second = fixture.executor.advance_directory_enumeration(
        handle,
        &mut buffer,
        QueryFlags::default(),
        None,
    );
    assert_eq!(second.status, NtStatus::NoMoreFiles);

    fixture.close(handle);
}

#[test]
fn undersized_buffers_truncate_and_then_continue() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_files_in_directory("C:\\AppDir\\Data", ["ALongEnumeratedName.txt", "b.txt"]);
    fs.add_directory("C:\\Target");

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

    let handle = fixture.open("C:\\AppDir\\Data").expect("open");
    let class = FileInformationClass::FileNames;
    let layout = FileInformationLayout::for_class(class);
    assert_eq!(
        fixture.executor.prepare_directory_enumeration(handle, class as u32, None),
        Some(NtStatus::Success)
    );

    // Smaller than even the base record: nothing is written.
    let mut tiny = vec![0u8; 8];
    let rejected = fixture.executor.advance_directory_enumeration(
        handle,
        &mut tiny,
        QueryFlags::default(),
        None,
    );
    assert_eq!(rejected.status, NtStatus::BufferTooSmall);
    assert_eq!(rejected.bytes_written, 0);

    // Room for the base record but not the whole name: one truncated entry,
    // whose length field still reports the bytes the full name needs.
    let mut small = vec![0u8; 20];
    let truncated = fixture.executor.advance_directory_enumeration(
        handle,
        &mut small,
        QueryFlags::default(),
        None,
    );
    assert_eq!(truncated.status, NtStatus::BufferOverflow);
    assert_eq!(truncated.bytes_written, 20);
    assert_eq!(
        layout.read_file_name_length(&small) as usize,
        "ALongEnumeratedName.txt".len() * 2
    );

    // The stream then continues with the next entry.
    let mut names = Vec::new();
    let mut buffer = vec![0u8; 512];
    let next = fixture.executor.advance_directory_enumeration(
        handle,
        &mut buffer,
        QueryFlags::default(),
        None,
    );
    assert_eq!(next.status, NtStatus::Success);
    read_record_chain(&buffer, &mut names);
    assert_eq!(names, ["b.txt"]);

    fixture.close(handle);
}

#[test]
fn unsupported_information_classes_are_rejected() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_directory("C:\\AppDir\\Data");
    fs.add_directory("C:\\Target");

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

    let handle = fixture.open("C:\\AppDir\\Data").expect("open");
    assert_eq!(
        fixture.executor.prepare_directory_enumeration(handle, 999, None),
        Some(NtStatus::InvalidInfoClass)
    );
    fixture.close(handle);
}

#[test]
fn determinism_across_identical_runs() {
    let build = || {
        let fs = Arc::new(InMemoryFilesystem::new());
        fs.add_files_in_directory("C:\\AppDir\\Data", ["x.txt", "y.bin"]);
        fs.add_files_in_directory("C:\\Target", ["z.txt", "w.log"]);
        Fixture::new(
            fs,
            r#"
            [[rule]]
            name = "Data"
            origin_directory = 'C:\AppDir\Data'
            target_directory = 'C:\Target'
            redirect_mode = "Overlay"
        "#,
        )
    };

    let first = build().enumerate("C:\\AppDir\\Data");
    let second = build().enumerate("C:\\AppDir\\Data");
    assert_eq!(first, second);

    // Ordering also holds when the application uses different casing.
    let cased = build().enumerate("c:\\APPDIR\\data");
    assert_eq!(first, cased);
}
