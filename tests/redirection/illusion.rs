//! Illusionary directory hierarchies: origins that exist only by virtue of
//! the rule set, synthetic entries in enumerations, and deep creation on the
//! target side.

use std::sync::Arc;

use pathwinder::memfs::InMemoryFilesystem;
use pathwinder::{AccessMode, FileOperation, FilesystemOperations, NtStatus};

use crate::common::Fixture;

const CASCADE_RULES: &str = r#"
    [[rule]]
    name = "Intermediate1"
    origin_directory = 'C:\Origin\Level1'
    target_directory = 'C:\Temp\Intermediate1'

    [[rule]]
    name = "Intermediate2"
    origin_directory = 'C:\Origin\Level1\Level2'
    target_directory = 'C:\Temp\Intermediate2'

    [[rule]]
    name = "Intermediate3"
    origin_directory = 'C:\Origin\Level1\Level2\Level3'
    target_directory = 'C:\Temp\Intermediate3'

    [[rule]]
    name = "Intermediate4"
    origin_directory = 'C:\Origin\Level1\Level2\Level3\Level4'
    target_directory = 'C:\Temp\Intermediate4'

    [[rule]]
    name = "Intermediate5"
    origin_directory = 'C:\Origin\Level1\Level2\Level3\Level4\Level5'
    target_directory = 'C:\Temp\Intermediate5'

    [[rule]]
    name = "Test"
    origin_directory = 'C:\Origin\Level1\Level2\Level3\Level4\Level5\DesiredOrigin'
    target_directory = 'C:\DesiredTarget\Subdir'
"#;

#[test]
fn origin_directory_appears_only_once_its_target_exists() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_directory("C:\\Test");

    let fixture = Fixture::new(
        fs,
        r#"
        [[rule]]
        name = "Test"
        origin_directory = 'C:\Test\OriginDir'
        target_directory = 'C:\Test\TargetDir'
    "#,
    );

    // Neither side exists, so the parent directory shows nothing.
    assert!(fixture.enumerate("C:\\Test").is_empty());

    // Creating the target externally makes the origin appear alongside it.
    fixture.fs.add_directory("C:\\Test\\TargetDir");
    assert_eq!(fixture.enumerate("C:\\Test"), ["OriginDir", "TargetDir"]);
}

#[test]
fn deep_creation_lands_on_the_target_side_only() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_directory("C:\\Origin");

    let fixture = Fixture::new(fs, CASCADE_RULES);

    let handle = fixture
        .create_file("C:\\Origin\\Level1\\Level2\\Level3\\Level4\\Level5\\DesiredOrigin\\File.txt")
        .expect("deep create succeeds");
    fixture.close(handle);

    assert!(fixture.fs.is_directory("C:\\DesiredTarget"));
    assert!(fixture.fs.is_directory("C:\\DesiredTarget\\Subdir"));
    assert!(fixture.fs.exists("C:\\DesiredTarget\\Subdir\\File.txt"));

    // No directory was ever created on the origin side.
    assert!(!fixture.fs.exists("C:\\Origin\\Level1"));
}

#[test]
fn illusionary_chain_enumerates_through_synthetic_entries() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_directory("C:\\Origin");
    fs.add_directory("C:\\DesiredTarget\\Subdir");

    let fixture = Fixture::new(fs, CASCADE_RULES);

    // The first illusionary component materializes because the deepest
    // rule's target really exists; none of the intermediate targets do.
    assert_eq!(fixture.enumerate("C:\\Origin"), ["Level1"]);
}

#[test]
fn ancestors_synthesize_once_their_real_presence_disappears() {
    let fs = Arc::new(InMemoryFilesystem::new());
    fs.add_directory("C:\\Origin");
    fs.add_directory("C:\\DesiredTarget\\Subdir");

    let fixture = Fixture::new(fs, CASCADE_RULES);

    // Simulate external deletion of the anchor directory after validation.
    fixture.fs.remove("C:\\Origin");

    // A read-only open of the vanished ancestor still succeeds, backed by
    // nothing real.
    let handle = fixture
        .executor
        .new_file_handle("C:\\Origin", None, FileOperation::Open, AccessMode::Read, |path| {
            fixture.fs.open(path)
        })
        .expect("synthesized open");
    let view = fixture.executor.handles().get(handle).expect("registered");
    assert_eq!(view.associated_path, "C:\\Origin");
    assert!(view.real_opened_path.is_empty());

    // Its contents are exactly the synthetic entries.
    assert_eq!(fixture.enumerate_handle(handle, None), ["Level1"]);

    assert_eq!(fixture.executor.close_handle(handle), NtStatus::Success);
    assert!(fixture.executor.handles().is_empty());
}
