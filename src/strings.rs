//! Case-insensitive string helpers and absolute path manipulation.
//!
//! Every path that enters the redirection core is an absolute, backslash
//! separated string. Comparisons are case-insensitive throughout, matching
//! the behavior of the filesystem the facade wraps. This module keeps all of
//! that discipline in one place so the rest of the crate can treat paths as
//! opaque `&str` values.

use std::cmp::Ordering;

/// Namespace prefixes that are carried through verbatim at the front of an
/// absolute path and never interpreted as path components.
const NAMESPACE_PREFIXES: [&str; 3] = ["\\??\\", "\\\\?\\", "\\\\.\\"];

/// Path component separator.
pub const SEPARATOR: char = '\\';

/// Compares two strings case-insensitively, character by character.
pub fn compare_ignore_case(lhs: &str, rhs: &str) -> Ordering {
    lhs.chars()
        .flat_map(char::to_uppercase)
        .cmp(rhs.chars().flat_map(char::to_uppercase))
}

/// Tests two strings for case-insensitive equality.
pub fn eq_ignore_case(lhs: &str, rhs: &str) -> bool {
    compare_ignore_case(lhs, rhs) == Ordering::Equal
}

/// Returns an upper-cased copy of the input string.
pub fn upcase(input: &str) -> String {
    input.chars().flat_map(char::to_uppercase).collect()
}

/// Checks whether `value` begins with `prefix`, ignoring case.
pub fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    let mut value_chars = value.chars().flat_map(char::to_uppercase);
    for prefix_char in prefix.chars().flat_map(char::to_uppercase) {
        match value_chars.next() {
            Some(value_char) if value_char == prefix_char => continue,
            _ => return false,
        }
    }
    true
}

/// Splits off a recognized namespace prefix, returning `(prefix, remainder)`.
/// The prefix is empty when the path does not begin with one.
pub fn split_namespace_prefix(path: &str) -> (&str, &str) {
    for prefix in NAMESPACE_PREFIXES {
        if path.starts_with(prefix) {
            return path.split_at(prefix.len());
        }
    }
    ("", path)
}

/// Normalizes an absolute path string: resolves `.` and `..` components,
/// collapses duplicate separators, and removes any trailing separator. A
/// recognized namespace prefix is preserved verbatim. Returns `None` when the
/// path is empty after normalization or a `..` component would walk above the
/// first component.
pub fn normalize_path(path: &str) -> Option<String> {
    let (prefix, remainder) = split_namespace_prefix(path);
    let leading_separator = remainder.starts_with(SEPARATOR);

    let mut components: Vec<&str> = Vec::new();
    for component in remainder.split(SEPARATOR) {
        match component {
            "" | "." => continue,
            ".." => {
                components.pop()?;
            }
            name => components.push(name),
        }
    }

    if components.is_empty() {
        return None;
    }

    let mut normalized = String::with_capacity(path.len());
    normalized.push_str(prefix);
    if leading_separator {
        normalized.push(SEPARATOR);
    }
    normalized.push_str(&components.join("\\"));
    Some(normalized)
}

/// Splits a normalized absolute path into its parent directory and final
/// component. Returns `None` when the path has no parent, which identifies a
/// filesystem root.
pub fn split_parent_and_leaf(path: &str) -> Option<(&str, &str)> {
    let (prefix, remainder) = split_namespace_prefix(path);
    let body = remainder.strip_prefix(SEPARATOR).unwrap_or(remainder);
    let separator_position = body.rfind(SEPARATOR)?;

    let body_start = path.len() - body.len();
    let parent = &path[..body_start + separator_position];
    let leaf = &body[separator_position + 1..];

    // A path like "\??\C:" has a prefix but no parent.
    if parent.len() <= prefix.len() {
        return None;
    }
    Some((parent, leaf))
}

/// Returns the final component of a normalized absolute path.
pub fn leaf(path: &str) -> &str {
    match split_parent_and_leaf(path) {
        Some((_, name)) => name,
        None => {
            let (_, remainder) = split_namespace_prefix(path);
            remainder.strip_prefix(SEPARATOR).unwrap_or(remainder)
        }
    }
}

/// Checks whether `ancestor` is a strict ancestor directory of `path`,
/// ignoring case. Equal paths are not ancestors of one another.
pub fn is_ancestor_of(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len() + 1
        && starts_with_ignore_case(path, ancestor)
        && path[ancestor.len()..].starts_with(SEPARATOR)
}

/// Retrieves the single component of `path` immediately below `ancestor`, or
/// `None` when `ancestor` is not a strict ancestor of `path`.
pub fn child_component<'path>(ancestor: &str, path: &'path str) -> Option<&'path str> {
    if !is_ancestor_of(ancestor, path) {
        return None;
    }
    let below = &path[ancestor.len() + 1..];
    Some(below.split(SEPARATOR).next().unwrap_or(below))
}

/// Match options used for every wildcard comparison in the crate. Matching is
/// case-insensitive and separators carry no special meaning because patterns
/// are only ever applied to single name components.
pub fn wildcard_match_options() -> glob::MatchOptions {
    glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    }
}

/// Determines whether a single file name matches a query pattern. An empty
/// pattern matches everything. Patterns that fail to compile match nothing.
pub fn file_name_matches_pattern(file_name: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    match glob::Pattern::new(pattern) {
        Ok(compiled) => compiled.matches_with(file_name, wildcard_match_options()),
        Err(_) => false,
    }
}
