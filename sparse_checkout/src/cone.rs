// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The cone dialect's two-hash-set index.
//!
//! `recursive_set` and `parent_set` are kept as separate sets so that
//! directory visibility (must we descend into this directory to reach an
//! included file?) can be decided independently of content inclusion (is
//! this path itself fully included?), turning matching from O(|patterns|)
//! into O(depth).

use std::collections::HashSet;

use itertools::Itertools;

/// Canonicalize a raw cone path: trim whitespace and trailing `/`, prepend
/// `/` if missing. Returns `None` if the result is empty (the repository
/// root, which is never explicitly stored).
fn canonicalize(path: &str) -> Option<String> {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('/') {
        Some(trimmed.to_string())
    } else {
        Some(format!("/{trimmed}"))
    }
}

/// Strict ancestors of `key`, nearest first, stopping before the implicit
/// root (`""`). `key` must already be canonical (leading `/`, no trailing
/// `/`).
fn ancestors(key: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(key), |cur| {
        let idx = cur.rfind('/')?;
        if idx == 0 { None } else { Some(&cur[..idx]) }
    })
    .skip(1)
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConeIndex {
    recursive_set: HashSet<String>,
    parent_set: HashSet<String>,
}

impl ConeIndex {
    pub fn new() -> ConeIndex {
        ConeIndex::default()
    }

    pub fn is_empty(&self) -> bool {
        self.recursive_set.is_empty()
    }

    /// Canonicalize `path`; if non-empty, add it to `recursive_set` and add
    /// every strict ancestor to `parent_set`. A no-op if `path` canonicalizes
    /// to the root.
    pub fn insert(&mut self, path: &str) {
        let Some(key) = canonicalize(path) else {
            return;
        };
        for ancestor in ancestors(&key) {
            self.parent_set.insert(ancestor.to_string());
        }
        self.recursive_set.insert(key);
    }

    pub fn clear(&mut self) {
        self.recursive_set.clear();
        self.parent_set.clear();
    }

    /// Exact hash lookup: is `path` itself a recursive key?
    pub fn contains_recursive(&self, path: &str) -> bool {
        self.recursive_set.contains(path)
    }

    /// Exact hash lookup: is `path` itself a parent key?
    pub fn contains_parent(&self, path: &str) -> bool {
        self.parent_set.contains(path)
    }

    /// True iff some *proper* prefix of `path` is a recursive key. O(depth):
    /// walks `path` by trailing-component truncation, one hash probe per
    /// step.
    pub fn contains_parent_of_any_recursive(&self, path: &str) -> bool {
        ancestors(path).any(|ancestor| self.recursive_set.contains(ancestor))
    }

    /// Iterator over `recursive_set` members whose *strict* ancestor is not
    /// itself in `recursive_set` (i.e. not already covered by a broader
    /// recursive entry), in sorted order. Used to emit the canonical pattern
    /// file.
    pub fn uncovered_recursive(&self) -> Vec<&str> {
        self.recursive_set
            .iter()
            .filter(|key| !ancestors(key).any(|a| self.recursive_set.contains(a)))
            .map(String::as_str)
            .sorted_unstable()
            .collect()
    }

    /// Iterator over `parent_set` members that are themselves not recursive
    /// keys and are not covered by an ancestor recursive key, in sorted
    /// order. Used to emit the canonical pattern file.
    pub fn uncovered_parents(&self) -> Vec<&str> {
        self.parent_set
            .iter()
            .filter(|key| {
                !self.recursive_set.contains(*key)
                    && !ancestors(key).any(|a| self.recursive_set.contains(a))
            })
            .map(String::as_str)
            .sorted_unstable()
            .collect()
    }

    /// True if any recursive or parent key was inserted with a `*`, `?` or
    /// `[` in it. `insert` treats such a path as a literal directory name
    /// rather than rejecting it, but the matcher needs to know so it can
    /// warn and fall back to general matching instead of silently matching
    /// the literal text as a glob.
    pub fn has_wildcard_keys(&self) -> bool {
        self.recursive_set
            .iter()
            .chain(self.parent_set.iter())
            .any(|key| key.contains(['*', '?', '[']))
    }
}
