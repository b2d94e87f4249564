//! Piece-wise construction and validation of filesystem directors.
//!
//! Rules are added one at a time, with constraints that can be checked in
//! isolation enforced immediately. Constraints that relate rules to the real
//! filesystem, or to rules added later, are enforced by the final build step,
//! which consumes the builder and produces an immutable
//! [`FilesystemDirector`].

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::{DirectoryRegistration, FilesystemDirector};
use crate::operations::FilesystemOperations;
use crate::prefix_index::PrefixIndex;
use crate::rules::{FilePattern, FilesystemRule, RedirectMode, RelatedFilesystemRuleContainer};
use crate::strings;

/// Reasons a rule or a complete rule set is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("rule \"{0}\" already exists")]
    DuplicateRuleName(String),

    #[error("rule \"{rule}\": origin directory \"{directory}\" is not a valid absolute directory")]
    InvalidOriginDirectory { rule: String, directory: String },

    #[error("rule \"{rule}\": target directory \"{directory}\" is not a valid absolute directory")]
    InvalidTargetDirectory { rule: String, directory: String },

    #[error("rule \"{rule}\": file pattern \"{pattern}\" is not valid")]
    InvalidFilePattern { rule: String, pattern: String },

    #[error("rule \"{rule}\": origin and target directories are the same")]
    OriginEqualsTarget { rule: String },

    #[error(
        "rule \"{rule}\": origin directory \"{directory}\" is already in use by another rule"
    )]
    OriginDirectoryInUse { rule: String, directory: String },

    #[error(
        "rule \"{rule}\": target directory \"{directory}\" is already the origin directory of another rule"
    )]
    TargetDirectoryIsOrigin { rule: String, directory: String },

    #[error(
        "rule \"{rule}\": the parent of origin directory \"{directory}\" is neither a real directory nor another rule's origin"
    )]
    OriginParentMissing { rule: String, directory: String },

    #[error("rule \"{rule}\": origin directory \"{directory}\" exists but is not a directory")]
    OriginIsNotADirectory { rule: String, directory: String },
}

/// Everything needed to add one rule to a builder.
#[derive(Debug, Clone)]
pub struct RuleDefinition {
    pub name: String,
    pub origin_directory: String,
    pub target_directory: String,
    pub file_patterns: Vec<String>,
    pub redirect_mode: RedirectMode,
}

/// Accumulates filesystem rules, enforcing per-rule constraints as they are
/// added, and builds an immutable director once the set is complete. The
/// builder is single-use: `build` consumes it.
#[derive(Default)]
pub struct FilesystemDirectorBuilder {
    /// All rules added so far, keyed by upper-cased rule name.
    rules_by_name: HashMap<String, Arc<FilesystemRule>>,

    /// Rule containers keyed by upper-cased origin directory.
    origin_containers: HashMap<String, RelatedFilesystemRuleContainer>,

    /// Rules keyed by upper-cased target directory.
    target_rules: HashMap<String, Vec<Arc<FilesystemRule>>>,
}

impl FilesystemDirectorBuilder {
    pub fn new() -> FilesystemDirectorBuilder {
        FilesystemDirectorBuilder::default()
    }

    /// Number of rules added so far.
    pub fn rule_count(&self) -> usize {
        self.rules_by_name.len()
    }

    /// Whether any rule uses the directory as its origin.
    pub fn has_origin_directory(&self, directory: &str) -> bool {
        self.origin_containers.contains_key(&strings::upcase(directory))
    }

    /// Whether any rule uses the directory as its target.
    pub fn has_target_directory(&self, directory: &str) -> bool {
        self.target_rules.contains_key(&strings::upcase(directory))
    }

    /// Attempts to create a rule and add it to the candidate director.
    ///
    /// Constraints enforced here: the rule name is unique; origin and target
    /// directories are valid absolute non-root paths and differ from each
    /// other; the origin is not already claimed, except by rules with
    /// different file patterns sharing the same origin; the target is not any
    /// rule's origin.
    pub fn add_rule(&mut self, definition: RuleDefinition) -> Result<Arc<FilesystemRule>, RuleError> {
        let RuleDefinition { name, origin_directory, target_directory, file_patterns, redirect_mode } =
            definition;

        let name_key = strings::upcase(&name);
        if self.rules_by_name.contains_key(&name_key) {
            return Err(RuleError::DuplicateRuleName(name));
        }

        let origin = normalize_directory(&origin_directory).ok_or_else(|| {
            RuleError::InvalidOriginDirectory { rule: name.clone(), directory: origin_directory }
        })?;
        let target = normalize_directory(&target_directory).ok_or_else(|| {
            RuleError::InvalidTargetDirectory {
                rule: name.clone(),
                directory: target_directory.clone(),
            }
        })?;
        if strings::eq_ignore_case(&origin, &target) {
            return Err(RuleError::OriginEqualsTarget { rule: name });
        }

        let mut patterns = Vec::with_capacity(file_patterns.len());
        for pattern_text in &file_patterns {
            let pattern = FilePattern::new(pattern_text).ok_or_else(|| {
                RuleError::InvalidFilePattern { rule: name.clone(), pattern: pattern_text.clone() }
            })?;
            patterns.push(pattern);
        }

        let origin_key = strings::upcase(&origin);
        let target_key = strings::upcase(&target);

        // An origin may be shared by several rules, but only when their file
        // patterns differ; otherwise the precedence ordering cannot resolve
        // the ambiguity. An origin that is another rule's target is always a
        // conflict, as is a target that is another rule's origin.
        if self.target_rules.contains_key(&origin_key) {
            return Err(RuleError::OriginDirectoryInUse { rule: name, directory: origin });
        }
        if let Some(existing) = self.origin_containers.get(&origin_key) {
            let duplicate_patterns = existing.all_rules().iter().any(|existing_rule| {
                patterns_equal(existing_rule.file_patterns(), &patterns)
            });
            if duplicate_patterns {
                return Err(RuleError::OriginDirectoryInUse { rule: name, directory: origin });
            }
        }
        if self.origin_containers.contains_key(&target_key) {
            return Err(RuleError::TargetDirectoryIsOrigin { rule: name, directory: target });
        }

        let rule = Arc::new(FilesystemRule::new(
            name,
            origin,
            target,
            patterns,
            redirect_mode,
        ));

        tracing::debug!(
            rule = rule.name(),
            origin = rule.origin_directory(),
            target = rule.target_directory(),
            mode = ?rule.redirect_mode(),
            "rule added"
        );

        self.rules_by_name.insert(name_key, Arc::clone(&rule));
        self.origin_containers
            .entry(origin_key)
            .or_default()
            .insert(Arc::clone(&rule));
        self.target_rules.entry(target_key).or_default().push(Arc::clone(&rule));
        Ok(rule)
    }

    /// Performs the whole-store checks and produces an immutable director.
    ///
    /// Constraints enforced here, per rule: the origin directory, if it
    /// exists on the real filesystem, exists as a directory; and the parent
    /// of the origin directory either exists as a real directory or is the
    /// origin directory of some rule (which makes it part of an illusionary
    /// hierarchy). All violations are reported together.
    pub fn build(
        self,
        fs: Arc<dyn FilesystemOperations>,
    ) -> Result<FilesystemDirector, Vec<RuleError>> {
        let mut violations = Vec::new();

        for rule in self.rules_by_name.values() {
            let origin = rule.origin_directory();
            if fs.exists(origin) && !fs.is_directory(origin) {
                violations.push(RuleError::OriginIsNotADirectory {
                    rule: rule.name().to_owned(),
                    directory: origin.to_owned(),
                });
            }

            match rule.origin_directory_parent() {
                Some(parent) => {
                    let parent_is_origin =
                        self.origin_containers.contains_key(&strings::upcase(parent));
                    if !parent_is_origin && !fs.is_directory(parent) {
                        violations.push(RuleError::OriginParentMissing {
                            rule: rule.name().to_owned(),
                            directory: origin.to_owned(),
                        });
                    }
                }
                None => violations.push(RuleError::InvalidOriginDirectory {
                    rule: rule.name().to_owned(),
                    directory: origin.to_owned(),
                }),
            }
        }

        if !violations.is_empty() {
            return Err(violations);
        }

        let mut index: PrefixIndex<DirectoryRegistration> = PrefixIndex::new();
        for container in self.origin_containers.into_values() {
            let origin = container.any_rule().origin_directory().to_owned();
            index
                .get_or_insert_with(&origin, DirectoryRegistration::default)
                .origin_container = Some(Arc::new(container));
        }
        for rules in self.target_rules.into_values() {
            for rule in rules {
                let target = rule.target_directory().to_owned();
                index
                    .get_or_insert_with(&target, DirectoryRegistration::default)
                    .target_rules
                    .push(rule);
            }
        }

        Ok(FilesystemDirector::new(self.rules_by_name, index, fs))
    }
}

/// Validates and normalizes a directory path for use as a rule origin or
/// target. Roots are rejected: a rule directory must have a parent.
fn normalize_directory(directory: &str) -> Option<String> {
    let normalized = strings::normalize_path(directory)?;
    strings::split_parent_and_leaf(&normalized)?;
    Some(normalized)
}

/// Compares two pattern lists for case-insensitive set equality.
fn patterns_equal(lhs: &[FilePattern], rhs: &[FilePattern]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    lhs.iter().all(|pattern| {
        rhs.iter().any(|other| strings::eq_ignore_case(pattern.text(), other.text()))
    })
}
