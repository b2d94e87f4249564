//! Status codes returned by the redirection core and the platform facade.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// Operational status of a filesystem request. Values map one-to-one onto the
/// host kernel's status codes; the catalogue is fixed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum NtStatus {
    // STATUS_SUCCESS
    Success = 0x0000_0000,
    // STATUS_MORE_ENTRIES
    MoreEntries = 0x0000_0105,
    // STATUS_BUFFER_OVERFLOW
    BufferOverflow = 0x8000_0005,
    // STATUS_NO_MORE_FILES
    NoMoreFiles = 0x8000_0006,
    // STATUS_INVALID_INFO_CLASS
    InvalidInfoClass = 0xC000_0003,
    // STATUS_INVALID_HANDLE
    InvalidHandle = 0xC000_0008,
    // STATUS_INVALID_PARAMETER
    InvalidParameter = 0xC000_000D,
    // STATUS_NO_SUCH_FILE
    NoSuchFile = 0xC000_000F,
    // STATUS_BUFFER_TOO_SMALL
    BufferTooSmall = 0xC000_0023,
    // STATUS_OBJECT_NAME_INVALID
    ObjectNameInvalid = 0xC000_0033,
    // STATUS_OBJECT_NAME_NOT_FOUND
    ObjectNameNotFound = 0xC000_0034,
    // STATUS_OBJECT_NAME_COLLISION
    ObjectNameCollision = 0xC000_0035,
    // STATUS_OBJECT_PATH_INVALID
    ObjectPathInvalid = 0xC000_0039,
    // STATUS_OBJECT_PATH_NOT_FOUND
    ObjectPathNotFound = 0xC000_003A,
    // STATUS_INTERNAL_ERROR
    InternalError = 0xC000_00E5,
}

impl NtStatus {
    /// Reinterprets a raw kernel status value. Unknown values collapse to
    /// [`NtStatus::InternalError`] rather than escaping the catalogue.
    pub fn from_raw(raw: u32) -> Self {
        Self::from_u32(raw).unwrap_or(NtStatus::InternalError)
    }

    /// Raw kernel status value.
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Whether the status denotes success or an informational condition, per
    /// the kernel convention that the two high severity bits are clear.
    pub fn succeeded(self) -> bool {
        (self.as_raw() as i32) >= 0
    }

    /// Whether the status is one of the not-found or invalid-name conditions
    /// that enumeration setup and name-insertion probing absorb silently.
    pub fn is_absent_or_invalid_name(self) -> bool {
        matches!(
            self,
            NtStatus::NoSuchFile
                | NtStatus::ObjectNameInvalid
                | NtStatus::ObjectNameNotFound
                | NtStatus::ObjectPathInvalid
                | NtStatus::ObjectPathNotFound
        )
    }
}
