//! Finalized rule store and the path decision function.
//!
//! A [`FilesystemDirector`] owns a validated, immutable set of filesystem
//! rules, indexed for sub-linear lookup, and answers two questions for the
//! interception layer: how a single file operation on a path must be carried
//! out, and which real directories and synthetic names make up the
//! enumeration of a path. Directors are built once by the
//! [`builder::FilesystemDirectorBuilder`] and are safe to query concurrently
//! without locking.

pub mod builder;


use std::collections::HashMap;
use std::sync::Arc;

use crate::instruction::{
    AccessMode, DirectoryEnumerationInstruction, EnumerationFilter, FileOperation,
    FileOperationInstruction, SingleDirectoryEnumeration, SingleDirectoryNameInsertion,
    SyntheticOutcome,
};
use crate::operations::FilesystemOperations;
use crate::prefix_index::PrefixIndex;
use crate::rules::{FilesystemRule, RedirectMode, RelatedFilesystemRuleContainer};
use crate::strings;

/// How a path relates to the rule set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PathKind {
    /// No rule covers the path in any way.
    NotCovered,

    /// The path is exactly the origin directory of at least one rule.
    IsOrigin,

    /// The path is a strict ancestor of some rule's origin directory.
    IsAncestorOfOrigin,

    /// The path lies strictly below some rule's origin directory.
    IsDescendantOfOrigin,

    /// The path is exactly the target directory of at least one rule.
    IsTarget,

    /// The path lies strictly below some rule's target directory.
    IsDescendantOfTarget,
}

/// Result of classifying a path against the rule store.
#[derive(Debug, Clone)]
pub struct PathClassification {
    pub kind: PathKind,

    /// Rule most specifically associated with the path, when one applies.
    pub rule: Option<Arc<FilesystemRule>>,
}

/// Data registered in the index for one directory that some rule mentions.
#[derive(Debug, Default)]
pub(crate) struct DirectoryRegistration {
    /// Container of the rules using this directory as their origin.
    pub(crate) origin_container: Option<Arc<RelatedFilesystemRuleContainer>>,

    /// Rules using this directory as their target.
    pub(crate) target_rules: Vec<Arc<FilesystemRule>>,
}

/// Origin-side coverage of a path, resolved with container precedence.
enum OriginCoverage {
    /// No rule origin is the path or an ancestor of it.
    None,

    /// The path is exactly an origin directory. `sibling` carries the rule of
    /// a shallower origin's container that claims the path's final component,
    /// which takes precedence for single file operations.
    OriginItself {
        container: Arc<RelatedFilesystemRuleContainer>,
        sibling: Option<Arc<FilesystemRule>>,
    },

    /// The path lies strictly below an origin directory. `rule` is the first
    /// rule of that origin's container matching the component immediately
    /// below the origin, or `None` when the path escapes every pattern.
    Descendant { rule: Option<Arc<FilesystemRule>> },
}

/// Immutable, indexed collection of filesystem rules plus the decision logic
/// that turns application paths into operation instructions.
pub struct FilesystemDirector {
    rules_by_name: HashMap<String, Arc<FilesystemRule>>,
    index: PrefixIndex<DirectoryRegistration>,
    fs: Arc<dyn FilesystemOperations>,
}

impl FilesystemDirector {
    pub(crate) fn new(
        rules_by_name: HashMap<String, Arc<FilesystemRule>>,
        index: PrefixIndex<DirectoryRegistration>,
        fs: Arc<dyn FilesystemOperations>,
    ) -> FilesystemDirector {
        FilesystemDirector { rules_by_name, index, fs }
    }

    /// Number of rules held by this director.
    pub fn rule_count(&self) -> usize {
        self.rules_by_name.len()
    }

    /// Looks up a rule by its name, ignoring case.
    pub fn rule_by_name(&self, name: &str) -> Option<&Arc<FilesystemRule>> {
        self.rules_by_name.get(&strings::upcase(name))
    }

    /// Rules whose origin directory is exactly the given path.
    pub fn rules_for_origin(&self, path: &str) -> Option<&Arc<RelatedFilesystemRuleContainer>> {
        self.index.get(path)?.origin_container.as_ref()
    }

    /// Classifies a path against the rule store.
    pub fn classify_path(&self, path: &str) -> PathClassification {
        match self.origin_coverage(path) {
            OriginCoverage::OriginItself { container, .. } => PathClassification {
                kind: PathKind::IsOrigin,
                rule: Some(Arc::clone(container.any_rule())),
            },
            OriginCoverage::Descendant { rule, .. } => {
                PathClassification { kind: PathKind::IsDescendantOfOrigin, rule }
            }
            OriginCoverage::None => {
                if self.has_origin_below(path) {
                    return PathClassification { kind: PathKind::IsAncestorOfOrigin, rule: None };
                }
                let mut deepest_target: Option<(Arc<FilesystemRule>, bool)> = None;
                for prefix_match in self.index.matches_along_path(path) {
                    if let Some(rule) = prefix_match.value.target_rules.first() {
                        deepest_target = Some((Arc::clone(rule), prefix_match.is_exact));
                    }
                }
                match deepest_target {
                    Some((rule, true)) => {
                        PathClassification { kind: PathKind::IsTarget, rule: Some(rule) }
                    }
                    Some((rule, false)) => PathClassification {
                        kind: PathKind::IsDescendantOfTarget,
                        rule: Some(rule),
                    },
                    None => PathClassification { kind: PathKind::NotCovered, rule: None },
                }
            }
        }
    }

    /// Produces the instruction for a single file operation on an absolute
    /// path. Root-handle composition must already have happened; the path is
    /// the one the application believes it is operating on.
    pub fn instruction_for_file_operation(
        &self,
        path: &str,
        operation: FileOperation,
        access: AccessMode,
    ) -> FileOperationInstruction {
        let instruction = match self.origin_coverage(path) {
            OriginCoverage::OriginItself { container, sibling } => {
                let rule = sibling.unwrap_or_else(|| Arc::clone(container.any_rule()));
                match rule.redirect_origin_to_target(path) {
                    Some(real_path) => redirect_instruction(&rule, path, real_path, operation),
                    None => FileOperationInstruction::PassThrough,
                }
            }
            OriginCoverage::Descendant { rule: Some(rule), .. } => {
                match rule.redirect_origin_to_target(path) {
                    Some(real_path) => redirect_instruction(&rule, path, real_path, operation),
                    None => FileOperationInstruction::PassThrough,
                }
            }
            OriginCoverage::Descendant { rule: None, .. } => FileOperationInstruction::PassThrough,
            OriginCoverage::None => self.instruction_for_uncovered_path(path, operation, access),
        };

        tracing::trace!(path, ?operation, ?instruction, "file operation decided");
        instruction
    }

    /// Decides operations on paths no origin covers: illusionary ancestors of
    /// origin directories synthesize outcomes, everything else is forwarded
    /// untouched. Target directories are deliberately not hidden from direct
    /// access.
    fn instruction_for_uncovered_path(
        &self,
        path: &str,
        operation: FileOperation,
        access: AccessMode,
    ) -> FileOperationInstruction {
        if !self.has_origin_below(path) || self.fs.exists(path) {
            return FileOperationInstruction::PassThrough;
        }

        let reads_only = match operation {
            FileOperation::Open | FileOperation::Query => access.is_read_only(),
            FileOperation::Enumerate => true,
            FileOperation::Create => false,
        };
        if !reads_only {
            return FileOperationInstruction::PassThrough;
        }

        // The hierarchy is visible only while at least one dominated rule has
        // a real target backing it.
        let any_target_exists = self.origin_containers_below(path).iter().any(|container| {
            container.all_rules().iter().any(|rule| self.fs.exists(rule.target_directory()))
        });
        if any_target_exists {
            FileOperationInstruction::Synthesize(SyntheticOutcome::Directory)
        } else {
            FileOperationInstruction::Synthesize(SyntheticOutcome::NotFound)
        }
    }

    /// Produces the enumeration recipe for a directory handle, or `None` when
    /// the enumeration needs no interposition and should be forwarded to the
    /// system unchanged.
    pub fn instruction_for_directory_enumeration(
        &self,
        associated_path: &str,
        real_opened_path: &str,
    ) -> Option<DirectoryEnumerationInstruction> {
        let mut directories_to_enumerate = Vec::new();

        match self.origin_coverage(associated_path) {
            OriginCoverage::OriginItself { container, .. } => {
                directories_to_enumerate.push(SingleDirectoryEnumeration {
                    path: associated_path.to_owned(),
                    filter: EnumerationFilter::ExcludeSimpleClaimed {
                        container: Arc::clone(&container),
                    },
                });
                for rule in container.all_rules() {
                    directories_to_enumerate.push(SingleDirectoryEnumeration {
                        path: rule.target_directory().to_owned(),
                        filter: EnumerationFilter::IncludeGovernedBy {
                            container: Arc::clone(&container),
                            rule: Arc::clone(rule),
                        },
                    });
                }
            }
            OriginCoverage::Descendant { rule: Some(rule), .. }
                if rule.redirect_mode() == RedirectMode::Overlay =>
            {
                // A subdirectory visible through an overlay rule merges both
                // sides, origin first.
                if let Some(target_side) = rule.redirect_origin_to_target(associated_path) {
                    directories_to_enumerate.push(SingleDirectoryEnumeration {
                        path: associated_path.to_owned(),
                        filter: EnumerationFilter::IncludeAll,
                    });
                    directories_to_enumerate.push(SingleDirectoryEnumeration {
                        path: target_side,
                        filter: EnumerationFilter::IncludeAll,
                    });
                }
            }
            _ => {}
        }

        let names_to_insert = self.name_insertions_below(associated_path);

        if directories_to_enumerate.is_empty() {
            if names_to_insert.is_empty() {
                return None;
            }
            // Synthetic names merge on top of whatever the handle really
            // points at. Handles for illusionary directories have no real
            // path; their only contents are the insertions.
            let base_path =
                if real_opened_path.is_empty() { associated_path } else { real_opened_path };
            directories_to_enumerate.push(SingleDirectoryEnumeration {
                path: base_path.to_owned(),
                filter: EnumerationFilter::IncludeAll,
            });
        }

        Some(DirectoryEnumerationInstruction { directories_to_enumerate, names_to_insert })
    }

    /// Resolves origin-side coverage of a path, applying container precedence
    /// and the sibling-namespace rule: a path that is itself an origin is
    /// still claimed by a shallower origin's container when that container
    /// has a rule matching the component below it.
    fn origin_coverage(&self, path: &str) -> OriginCoverage {
        let mut origin_matches: Vec<(Arc<RelatedFilesystemRuleContainer>, bool)> = Vec::new();
        for prefix_match in self.index.matches_along_path(path) {
            if let Some(container) = &prefix_match.value.origin_container {
                origin_matches.push((Arc::clone(container), prefix_match.is_exact));
            }
        }

        let Some((deepest_container, deepest_is_exact)) = origin_matches.last().cloned() else {
            return OriginCoverage::None;
        };

        if deepest_is_exact {
            let sibling = origin_matches
                .iter()
                .rev()
                .nth(1)
                .and_then(|(shallower_container, _)| {
                    let shallower_origin = shallower_container.any_rule().origin_directory();
                    let component = strings::child_component(shallower_origin, path)?;
                    shallower_container.rule_matching_file_name(component).map(Arc::clone)
                });
            OriginCoverage::OriginItself { container: deepest_container, sibling }
        } else {
            let origin = deepest_container.any_rule().origin_directory();
            let rule = strings::child_component(origin, path)
                .and_then(|component| deepest_container.rule_matching_file_name(component))
                .map(Arc::clone);
            OriginCoverage::Descendant { rule }
        }
    }

    /// Whether any rule's origin directory lies strictly below the path.
    fn has_origin_below(&self, path: &str) -> bool {
        self.index
            .values_below(path)
            .iter()
            .any(|registration| registration.origin_container.is_some())
    }

    /// Origin-rule containers registered strictly below the path.
    fn origin_containers_below(&self, path: &str) -> Vec<Arc<RelatedFilesystemRuleContainer>> {
        self.index
            .values_below(path)
            .iter()
            .filter_map(|registration| registration.origin_container.clone())
            .collect()
    }

    /// Builds the ordered list of synthetic name insertions for enumerating
    /// the given directory. One candidate is produced per rule whose origin
    /// lies strictly below the directory behind a chain of components that do
    /// not really exist; the insertion probe later skips candidates whose
    /// metadata source is missing.
    fn name_insertions_below(&self, directory: &str) -> Vec<SingleDirectoryNameInsertion> {
        let mut insertions: Vec<SingleDirectoryNameInsertion> = Vec::new();

        for container in self.origin_containers_below(directory) {
            let origin = container.any_rule().origin_directory();
            let Some(component) = strings::child_component(directory, origin) else {
                continue;
            };

            // When any intermediate directory between here and the origin
            // really exists, the real enumeration already surfaces the
            // component and no insertion is needed.
            if self.intermediate_chain_exists(directory, origin) {
                continue;
            }

            for rule in container.all_rules() {
                let Some((source_directory, source_file_name)) =
                    strings::split_parent_and_leaf(rule.target_directory())
                else {
                    continue;
                };
                insertions.push(SingleDirectoryNameInsertion {
                    file_name_to_insert: component.to_owned(),
                    information_source_directory: source_directory.to_owned(),
                    information_source_file_name: source_file_name.to_owned(),
                });
            }
        }

        insertions.sort_by(|lhs, rhs| {
            strings::compare_ignore_case(&lhs.file_name_to_insert, &rhs.file_name_to_insert)
        });
        insertions.dedup_by(|lhs, rhs| {
            strings::eq_ignore_case(&lhs.file_name_to_insert, &rhs.file_name_to_insert)
                && lhs.information_source_directory == rhs.information_source_directory
                && lhs.information_source_file_name == rhs.information_source_file_name
        });
        insertions
    }

    /// Whether any directory strictly between `directory` and `origin`
    /// (ancestors of `origin` that descend from `directory`) really exists.
    fn intermediate_chain_exists(&self, directory: &str, origin: &str) -> bool {
        let mut ancestor = strings::split_parent_and_leaf(origin).map(|(parent, _)| parent);
        while let Some(current) = ancestor {
            if !strings::is_ancestor_of(directory, current) {
                break;
            }
            if self.fs.exists(current) {
                return true;
            }
            ancestor = strings::split_parent_and_leaf(current).map(|(parent, _)| parent);
        }
        false
    }
}

/// Builds the instruction for a path governed by a rule, given the redirected
/// real path.
fn redirect_instruction(
    rule: &Arc<FilesystemRule>,
    path: &str,
    real_path: String,
    operation: FileOperation,
) -> FileOperationInstruction {
    let ensure_target_hierarchy = operation == FileOperation::Create;
    match rule.redirect_mode() {
        RedirectMode::Simple => {
            FileOperationInstruction::Redirect { real_path, ensure_target_hierarchy }
        }
        RedirectMode::Overlay => match operation {
            FileOperation::Create => {
                FileOperationInstruction::Redirect { real_path, ensure_target_hierarchy }
            }
            FileOperation::Open | FileOperation::Query | FileOperation::Enumerate => {
                FileOperationInstruction::TryRedirectThenFallback {
                    target_path: real_path,
                    origin_path: path.to_owned(),
                }
            }
        },
    }
}
