//! Platform facade consumed by the redirection core.
//!
//! The core never talks to the operating system directly. Everything it needs
//! from the platform is expressed by the [`FilesystemOperations`] trait, and
//! the core is otherwise platform-neutral. Implementations wrap the native
//! filesystem API; the crate also ships an in-memory implementation for tests
//! and demos (`memfs`).

use crate::fileinfo::FileInformationClass;
use crate::status::NtStatus;

/// Opaque handle to an open filesystem object. Values are assigned by the
/// facade implementation; the core only stores and compares them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u64);

/// Flags accepted by [`FilesystemOperations::partial_enumerate_directory_contents`],
/// mirroring the query flags of the host's directory enumeration system call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct QueryFlags(pub u32);

impl QueryFlags {
    /// Restart the scan from the first entry in the directory.
    pub const RESTART_SCAN: QueryFlags = QueryFlags(0x0000_0001);

    /// Return a single entry per call instead of packing the buffer.
    pub const RETURN_SINGLE_ENTRY: QueryFlags = QueryFlags(0x0000_0002);

    /// Whether all flag bits in `other` are set in `self`.
    pub fn contains(self, other: QueryFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of two flag sets.
    pub fn with(self, other: QueryFlags) -> QueryFlags {
        QueryFlags(self.0 | other.0)
    }
}

/// Blocking operations the core requires from the platform. Every method maps
/// to one native call; implementations must be safe to invoke concurrently
/// from multiple threads.
pub trait FilesystemOperations: Send + Sync {
    /// Closes an open handle.
    fn close_handle(&self, handle: Handle) -> NtStatus;

    /// Creates a directory and any missing parents.
    fn create_directory_hierarchy(&self, absolute_path: &str) -> NtStatus;

    /// Whether a filesystem entity exists at the given path.
    fn exists(&self, absolute_path: &str) -> bool;

    /// Whether the given path exists and names a directory.
    fn is_directory(&self, absolute_path: &str) -> bool;

    /// Opens a directory for subsequent enumeration calls.
    fn open_directory_for_enumeration(&self, absolute_path: &str) -> Result<Handle, NtStatus>;

    /// Fills `buffer` with one batch of file information records for the
    /// directory open on `handle`. The file pattern is only meaningful on the
    /// first call or together with [`QueryFlags::RESTART_SCAN`].
    fn partial_enumerate_directory_contents(
        &self,
        handle: Handle,
        information_class: FileInformationClass,
        buffer: &mut [u8],
        query_flags: QueryFlags,
        file_pattern: Option<&str>,
    ) -> NtStatus;

    /// Resolves the absolute path of an open handle.
    fn query_absolute_path_by_handle(&self, handle: Handle) -> Result<String, NtStatus>;

    /// Mode flags with which a handle was opened.
    fn query_file_handle_mode(&self, handle: Handle) -> Result<u32, NtStatus>;

    /// Writes a single file information record for one named entry of a
    /// directory, without opening the directory for enumeration.
    fn query_single_file_directory_information(
        &self,
        directory_absolute_path: &str,
        file_name: &str,
        information_class: FileInformationClass,
        buffer: &mut [u8],
    ) -> NtStatus;
}
