// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The matcher decides Include/Exclude for a path given a `PatternList`.
//! The general dialect is built directly on `ignore::gitignore::Gitignore`,
//! since gitignore matching and sparse-checkout's general-dialect matching
//! share the same algorithm (declaration-order, last-match-wins,
//! negation-inverts, directory decisions inherited by descendants); only
//! the polarity of the default (unmatched) case differs, which this module
//! accounts for.

use std::cell::Cell;

use ignore::Match as IgnoreMatch;
use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{Error, Result};
use crate::pattern::PatternList;

/// True if `path` names an entry directly under the root (no further `/`
/// once any single leading `/` is stripped).
fn is_root_level(path: &str) -> bool {
    !path.trim_start_matches('/').contains('/')
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchResult {
    Include,
    Exclude,
}

impl MatchResult {
    pub fn is_included(self) -> bool {
        matches!(self, MatchResult::Include)
    }
}

pub struct Matcher<'a> {
    patterns: &'a PatternList,
    general: Gitignore,
    /// Set when a cone-mode `PatternList` carries a negative pattern, or a
    /// cone directory whose name itself contains a glob metacharacter;
    /// cone matching is unsupported in either case and every lookup
    /// degrades to general matching instead.
    cone_unsupported: bool,
    warned: Cell<bool>,
}

impl<'a> Matcher<'a> {
    pub fn new(patterns: &'a PatternList) -> Result<Matcher<'a>> {
        let mut builder = GitignoreBuilder::new("");
        for pattern in patterns.patterns() {
            builder
                .add_line(None, pattern.text())
                .map_err(|e| Error::invalid_pattern(format!("{e}")))?;
        }
        let general = builder
            .build()
            .map_err(|e| Error::invalid_pattern(format!("{e}")))?;

        let cone_unsupported = patterns.is_cone()
            && (patterns
                .patterns()
                .iter()
                .any(crate::pattern::Pattern::is_negative)
                || patterns.cone_index().has_wildcard_keys());

        Ok(Matcher {
            patterns,
            general,
            cone_unsupported,
            warned: Cell::new(false),
        })
    }

    pub fn match_path(&self, path: &str, is_dir: bool) -> MatchResult {
        if self.patterns.is_cone() {
            if self.cone_unsupported {
                self.warn_once();
                return self.match_general(path, is_dir);
            }
            return self.match_cone(path, is_dir);
        }
        self.match_general(path, is_dir)
    }

    fn warn_once(&self) {
        if self.warned.replace(true) {
            return;
        }
        let err = Error::unsupported_cone_pattern("cone-mode sparse-checkout file");
        // UnsupportedConePattern is always locally recoverable: the
        // matcher degrades to general matching rather than aborting.
        if err.kind().is_recoverable() {
            log::warn!("{err}; falling back to general matching");
        }
    }

    /// Cone semantics: include if some prefix of `path` (itself or a proper
    /// ancestor) is a recursive key, or if `path` is a directory recorded as
    /// a parent key. Every strict ancestor of a recursive key is also in
    /// `parent_set`, which is exactly why "is in parent_set" and "is itself
    /// a parent of any recursive key" are the same check: `contains_parent`
    /// covers both.
    ///
    /// A root-level file is always included regardless of the sets: the
    /// canonical cone pattern file always opens with `/*`/`!/*/`, which
    /// includes every file directly under the root and excludes every
    /// subdirectory by default. `recursive_set`/`parent_set` only carve out
    /// exceptions to that default for specific subtrees, so a depth-1 file
    /// is included the same way regardless of whether it is mentioned by
    /// either set.
    fn match_cone(&self, path: &str, is_dir: bool) -> MatchResult {
        if !is_dir && is_root_level(path) {
            return MatchResult::Include;
        }
        let cone = self.patterns.cone_index();
        if cone.contains_recursive(path) || cone.contains_parent_of_any_recursive(path) {
            MatchResult::Include
        } else if is_dir && cone.contains_parent(path) {
            MatchResult::Include
        } else {
            MatchResult::Exclude
        }
    }

    /// General semantics: evaluate declared patterns, inheriting
    /// a matched ancestor directory's decision the way `.gitignore` does,
    /// via `matched_path_or_any_parents`. The default (nothing matched) is
    /// `Exclude`, the opposite polarity of plain gitignore matching (where
    /// unmatched means "not ignored"), because sparse-checkout's general
    /// dialect is an allow-list: a non-negated pattern names what is
    /// *included*, not what is excluded.
    fn match_general(&self, path: &str, is_dir: bool) -> MatchResult {
        let relative = path.trim_start_matches('/');
        match self.general.matched_path_or_any_parents(relative, is_dir) {
            IgnoreMatch::Ignore(_) => MatchResult::Include,
            IgnoreMatch::Whitelist(_) => MatchResult::Exclude,
            IgnoreMatch::None => MatchResult::Exclude,
        }
    }
}
