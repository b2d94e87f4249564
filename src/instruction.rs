//! Instructions emitted by the path decision function.
//!
//! The decision function never touches the filesystem itself. It inspects a
//! path against the rule store and produces a value describing what the
//! interception layer must do: which real path to open, which error to
//! fabricate, or which directories and synthetic names make up an
//! enumeration. The executor applies these instructions against the facade.

use std::sync::Arc;

use crate::rules::{FilesystemRule, RedirectMode, RelatedFilesystemRuleContainer};

/// Kind of filesystem request being decided.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileOperation {
    /// Open an existing filesystem entity.
    Open,

    /// Create a new filesystem entity.
    Create,

    /// Query information about an entity without opening it for I/O.
    Query,

    /// Enumerate the contents of a directory.
    Enumerate,
}

/// Requested access for the operation. Only the read-only distinction affects
/// decisions, so that is all this type models.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    ReadWrite,
}

impl AccessMode {
    pub fn is_read_only(self) -> bool {
        self == AccessMode::Read
    }
}

/// Outcome to fabricate without consulting the real filesystem.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyntheticOutcome {
    /// Report a directory that exists and is openable for read.
    Directory,

    /// Report that the entity does not exist.
    NotFound,
}

/// What the interceptor must do with a single file operation.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOperationInstruction {
    /// Forward the request unchanged, using the path as the application
    /// supplied it (after any root-handle composition).
    PassThrough,

    /// Forward the request with the real path substituted. When
    /// `ensure_target_hierarchy` is set and the operation creates, missing
    /// parent directories of the real path are created first.
    Redirect {
        real_path: String,
        ensure_target_hierarchy: bool,
    },

    /// Try the target-side path first; if it does not exist, fall back to
    /// the origin-side path. Used by overlay rules for reads.
    TryRedirectThenFallback {
        target_path: String,
        origin_path: String,
    },

    /// Do not touch the real filesystem; fabricate the given outcome.
    Synthesize(SyntheticOutcome),
}

/// Decides which entries of one real directory appear in an enumeration.
#[derive(Debug, Clone)]
pub enum EnumerationFilter {
    /// Every entry is included.
    IncludeAll,

    /// Target-side filter: an entry is included only when the given rule is
    /// the container's first match for its name, so a catch-all's target
    /// never re-exports names claimed by a more specific rule.
    IncludeGovernedBy {
        container: Arc<RelatedFilesystemRuleContainer>,
        rule: Arc<FilesystemRule>,
    },

    /// Origin-side filter: an entry is excluded when its name is claimed by a
    /// simple-mode rule of the container, because the target side provides it
    /// instead. Names claimed by overlay rules remain visible.
    ExcludeSimpleClaimed {
        container: Arc<RelatedFilesystemRuleContainer>,
    },
}

impl EnumerationFilter {
    /// Whether an entry with the given name appears in the enumeration
    /// output. The input is a single name component.
    pub fn should_include(&self, file_name: &str) -> bool {
        match self {
            EnumerationFilter::IncludeAll => true,
            EnumerationFilter::IncludeGovernedBy { container, rule } => container
                .rule_matching_file_name(file_name)
                .is_some_and(|governing| Arc::ptr_eq(governing, rule)),
            EnumerationFilter::ExcludeSimpleClaimed { container } => container
                .rule_matching_file_name(file_name)
                .map_or(true, |governing| governing.redirect_mode() == RedirectMode::Overlay),
        }
    }
}

/// One real directory to enumerate as part of a larger enumeration.
#[derive(Debug, Clone)]
pub struct SingleDirectoryEnumeration {
    /// Absolute path of the real directory.
    pub path: String,

    /// Filter applied to each enumerated entry.
    pub filter: EnumerationFilter,
}

/// One synthetic directory entry to insert into an enumeration. The entry's
/// metadata is obtained by querying the information source, which is the
/// target directory of the rule that causes the insertion; only the name is
/// replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleDirectoryNameInsertion {
    /// Name the inserted entry presents.
    pub file_name_to_insert: String,

    /// Directory part of the metadata source path.
    pub information_source_directory: String,

    /// File part of the metadata source path.
    pub information_source_file_name: String,
}

/// Complete recipe for one directory enumeration: the real directories to
/// merge, in producer order, and the synthetic names to weave in.
#[derive(Debug, Clone, Default)]
pub struct DirectoryEnumerationInstruction {
    pub directories_to_enumerate: Vec<SingleDirectoryEnumeration>,
    pub names_to_insert: Vec<SingleDirectoryNameInsertion>,
}
