//! Filesystem redirection rules and rule containers.
//!
//! A rule makes an origin directory appear to contain the contents of a
//! target directory. Rules are immutable once constructed and are shared
//! between the director, the instructions it emits, and any live enumeration
//! queues.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Deserialize;

use crate::strings;

/// How a rule projects its target directory onto its origin directory.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
pub enum RedirectMode {
    /// A file operation is either redirected to the target side or left on
    /// the origin side; each name resolves against exactly one of the two.
    #[default]
    Simple,

    /// The target side is merged on top of the origin side, with the target
    /// given priority for file operations.
    Overlay,
}

/// Result of comparing a candidate directory against a rule's origin or
/// target directory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DirectoryRelation {
    /// Candidate equals the comparison directory.
    Equal,

    /// Paths diverge; neither contains the other.
    Unrelated,

    /// Candidate is the immediate parent of the comparison directory.
    CandidateIsParent,

    /// Candidate is the immediate child of the comparison directory.
    CandidateIsChild,

    /// Candidate is an ancestor, but not the immediate parent.
    CandidateIsAncestor,

    /// Candidate is a descendant, but not the immediate child.
    CandidateIsDescendant,
}

/// Computes the relation of `candidate` to `base`, ignoring case.
pub fn directory_relation(candidate: &str, base: &str) -> DirectoryRelation {
    if strings::eq_ignore_case(candidate, base) {
        return DirectoryRelation::Equal;
    }
    if strings::is_ancestor_of(candidate, base) {
        return match strings::split_parent_and_leaf(base) {
            Some((parent, _)) if strings::eq_ignore_case(parent, candidate) => {
                DirectoryRelation::CandidateIsParent
            }
            _ => DirectoryRelation::CandidateIsAncestor,
        };
    }
    if strings::is_ancestor_of(base, candidate) {
        return match strings::split_parent_and_leaf(candidate) {
            Some((parent, _)) if strings::eq_ignore_case(parent, base) => {
                DirectoryRelation::CandidateIsChild
            }
            _ => DirectoryRelation::CandidateIsDescendant,
        };
    }
    DirectoryRelation::Unrelated
}

/// A single compiled wildcard pattern, matched case-insensitively against one
/// name component, never against a path.
#[derive(Debug, Clone)]
pub struct FilePattern {
    text: String,
    compiled: glob::Pattern,
}

impl FilePattern {
    /// Compiles a pattern string. Fails on empty input or wildcard syntax the
    /// matcher cannot represent.
    pub fn new(text: &str) -> Option<FilePattern> {
        if text.is_empty() || text.contains(strings::SEPARATOR) {
            return None;
        }
        let compiled = glob::Pattern::new(text).ok()?;
        Some(FilePattern { text: text.to_owned(), compiled })
    }

    /// Original pattern text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether a single file name matches this pattern.
    pub fn matches(&self, file_name: &str) -> bool {
        self.compiled.matches_with(file_name, strings::wildcard_match_options())
    }
}

impl PartialEq for FilePattern {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for FilePattern {}

/// A single filesystem redirection rule. From the application's point of view
/// the origin directory is where covered files appear to exist; the target
/// directory is where they actually exist.
#[derive(Debug, Clone, PartialEq)]
pub struct FilesystemRule {
    name: String,
    origin_directory: String,
    target_directory: String,
    file_patterns: Vec<FilePattern>,
    redirect_mode: RedirectMode,
}

impl FilesystemRule {
    /// Constructs a rule from already-normalized directory paths. An empty
    /// pattern list means the rule covers every file name; this is preferred
    /// over a literal `*` pattern because match checks can be skipped
    /// entirely.
    pub fn new(
        name: String,
        origin_directory: String,
        target_directory: String,
        file_patterns: Vec<FilePattern>,
        redirect_mode: RedirectMode,
    ) -> FilesystemRule {
        FilesystemRule { name, origin_directory, target_directory, file_patterns, redirect_mode }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the origin directory.
    pub fn origin_directory(&self) -> &str {
        &self.origin_directory
    }

    /// Absolute path of the target directory.
    pub fn target_directory(&self) -> &str {
        &self.target_directory
    }

    /// Immediate parent of the origin directory, if the origin is not a root.
    pub fn origin_directory_parent(&self) -> Option<&str> {
        strings::split_parent_and_leaf(&self.origin_directory).map(|(parent, _)| parent)
    }

    pub fn file_patterns(&self) -> &[FilePattern] {
        &self.file_patterns
    }

    pub fn has_file_patterns(&self) -> bool {
        !self.file_patterns.is_empty()
    }

    pub fn redirect_mode(&self) -> RedirectMode {
        self.redirect_mode
    }

    /// Whether a file name matches any of this rule's patterns. A rule with
    /// no patterns matches everything. The input must be a single name
    /// component within a directory, not a path.
    pub fn file_name_matches_any_pattern(&self, file_name: &str) -> bool {
        if self.file_patterns.is_empty() {
            return true;
        }
        self.file_patterns.iter().any(|pattern| pattern.matches(file_name))
    }

    /// Relation of a candidate directory to this rule's origin directory.
    pub fn directory_relation_with_origin(&self, candidate: &str) -> DirectoryRelation {
        directory_relation(candidate, &self.origin_directory)
    }

    /// Relation of a candidate directory to this rule's target directory.
    pub fn directory_relation_with_target(&self, candidate: &str) -> DirectoryRelation {
        directory_relation(candidate, &self.target_directory)
    }

    /// Rewrites a path at or below the origin directory to its target-side
    /// equivalent. For paths below the origin, the component immediately
    /// below it must match one of the rule's patterns. Returns `None` when
    /// the path is outside the origin or the component does not match.
    pub fn redirect_origin_to_target(&self, path: &str) -> Option<String> {
        if strings::eq_ignore_case(path, &self.origin_directory) {
            return Some(self.target_directory.clone());
        }

        let component = strings::child_component(&self.origin_directory, path)?;
        if !self.file_name_matches_any_pattern(component) {
            return None;
        }

        let suffix = &path[self.origin_directory.len()..];
        let mut redirected =
            String::with_capacity(self.target_directory.len() + suffix.len());
        redirected.push_str(&self.target_directory);
        redirected.push_str(suffix);
        Some(redirected)
    }
}

/// Establishes the precedence ordering of rules that share a property. Rules
/// with more file patterns come first; ties break case-insensitively by name.
/// Rules with no patterns therefore sort last and act as catch-all defaults.
fn rule_precedence(lhs: &FilesystemRule, rhs: &FilesystemRule) -> Ordering {
    match rhs.file_patterns().len().cmp(&lhs.file_patterns().len()) {
        Ordering::Equal => strings::compare_ignore_case(lhs.name(), rhs.name()),
        unequal => unequal,
    }
}

/// Holds rules that share a common property, in practice a common origin
/// directory, ordered by precedence so that the first pattern match wins.
#[derive(Debug, Clone, Default)]
pub struct RelatedFilesystemRuleContainer {
    rules: Vec<Arc<FilesystemRule>>,
}

impl RelatedFilesystemRuleContainer {
    pub fn new() -> RelatedFilesystemRuleContainer {
        RelatedFilesystemRuleContainer { rules: Vec::new() }
    }

    /// Inserts a rule at its precedence position.
    pub fn insert(&mut self, rule: Arc<FilesystemRule>) {
        let position = self
            .rules
            .partition_point(|existing| rule_precedence(existing, &rule) != Ordering::Greater);
        self.rules.insert(position, rule);
    }

    /// All rules, highest precedence first.
    pub fn all_rules(&self) -> &[Arc<FilesystemRule>] {
        &self.rules
    }

    /// Any single rule; used to read whatever property the contained rules
    /// share.
    pub fn any_rule(&self) -> &Arc<FilesystemRule> {
        &self.rules[0]
    }

    pub fn count(&self) -> usize {
        self.rules.len()
    }

    /// First rule whose patterns match the given file name. The input must be
    /// a single name component, not a path.
    pub fn rule_matching_file_name(&self, file_name: &str) -> Option<&Arc<FilesystemRule>> {
        self.rules.iter().find(|rule| rule.file_name_matches_any_pattern(file_name))
    }

    pub fn has_rule_matching_file_name(&self, file_name: &str) -> bool {
        self.rule_matching_file_name(file_name).is_some()
    }
}
