//! Prefix index over absolute directory paths.
//!
//! A trie keyed by upper-cased path components. Each node may carry a data
//! value for the directory it represents. Lookups answer, in time linear in
//! the component count of the query, which indexed directories lie on the
//! path from the root to a query path and whether anything is indexed in the
//! subtree below it.

use std::collections::HashMap;

use crate::strings;

/// One directory registered along the walk toward a query path.
#[derive(Debug)]
pub struct PrefixMatch<'index, T> {
    /// Data stored for the indexed directory.
    pub value: &'index T,

    /// Whether the indexed directory is the query path itself rather than a
    /// strict ancestor of it.
    pub is_exact: bool,
}

#[derive(Debug)]
struct Node<T> {
    children: HashMap<String, Node<T>>,
    data: Option<T>,
}

impl<T> Node<T> {
    fn new() -> Node<T> {
        Node { children: HashMap::new(), data: None }
    }

    fn collect_subtree<'node>(&'node self, values: &mut Vec<&'node T>) {
        if let Some(data) = &self.data {
            values.push(data);
        }
        for child in self.children.values() {
            child.collect_subtree(values);
        }
    }

    fn subtree_has_data(&self) -> bool {
        self.data.is_some() || self.children.values().any(Node::subtree_has_data)
    }
}

/// Trie over path components with case-insensitive keys.
#[derive(Debug)]
pub struct PrefixIndex<T> {
    root: Node<T>,
}

impl<T> Default for PrefixIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PrefixIndex<T> {
    pub fn new() -> PrefixIndex<T> {
        PrefixIndex { root: Node::new() }
    }

    /// Splits a path into index keys. Namespace prefix characters participate
    /// in the keys so that paths under different prefixes never relate.
    fn keys(path: &str) -> impl Iterator<Item = String> + '_ {
        path.split(strings::SEPARATOR)
            .filter(|component| !component.is_empty())
            .map(strings::upcase)
    }

    fn node_at(&self, path: &str) -> Option<&Node<T>> {
        let mut node = &self.root;
        for key in Self::keys(path) {
            node = node.children.get(&key)?;
        }
        Some(node)
    }

    /// Returns the data stored for the directory, creating the node chain on
    /// demand and initializing missing data with `default`.
    pub fn get_or_insert_with(
        &mut self,
        path: &str,
        default: impl FnOnce() -> T,
    ) -> &mut T {
        let mut node = &mut self.root;
        for key in Self::keys(path) {
            node = node.children.entry(key).or_insert_with(Node::new);
        }
        node.data.get_or_insert_with(default)
    }

    /// Data stored for the exact directory, if any.
    pub fn get(&self, path: &str) -> Option<&T> {
        self.node_at(path)?.data.as_ref()
    }

    /// Whether the exact directory is indexed with data.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// All indexed directories that are the query path or an ancestor of it,
    /// ordered shallowest first. The deepest element is the longest matching
    /// prefix of the query.
    pub fn matches_along_path<'index>(&'index self, path: &str) -> Vec<PrefixMatch<'index, T>> {
        let keys: Vec<String> = Self::keys(path).collect();
        let mut matches = Vec::new();
        let mut node = &self.root;

        for (depth, key) in keys.iter().enumerate() {
            match node.children.get(key) {
                Some(child) => {
                    if let Some(data) = &child.data {
                        matches.push(PrefixMatch { value: data, is_exact: depth + 1 == keys.len() });
                    }
                    node = child;
                }
                None => break,
            }
        }
        matches
    }

    /// Whether any directory strictly below the query path is indexed with
    /// data. The query path itself does not count.
    pub fn has_data_below(&self, path: &str) -> bool {
        match self.node_at(path) {
            Some(node) => node.children.values().any(Node::subtree_has_data),
            None => false,
        }
    }

    /// All data stored strictly below the query path.
    pub fn values_below<'index>(&'index self, path: &str) -> Vec<&'index T> {
        let mut values = Vec::new();
        if let Some(node) = self.node_at(path) {
            for child in node.children.values() {
                child.collect_subtree(&mut values);
            }
        }
        values
    }
}
