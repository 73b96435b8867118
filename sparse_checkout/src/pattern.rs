// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The pattern model (component A): parsing, normalizing, and holding a
//! list of patterns in either the general or cone dialect.

use crate::cone::ConeIndex;
use crate::error::{Error, Result};

/// Flags recorded for a single general-dialect pattern, per the data model.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PatternFlags {
    pub negative: bool,
    pub mustbedir: bool,
    pub nowildcard_prefix_len: usize,
    pub anchored: bool,
}

/// One pattern record: `text`, the depth it is anchored at, and its flags.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pattern {
    text: String,
    base_len: usize,
    flags: PatternFlags,
}

impl Pattern {
    /// `add_pattern`: parse a raw general-dialect line into a `Pattern`.
    /// Strips a leading `!` into `negative`, a trailing `/` into
    /// `mustbedir`, records `nowildcard_prefix_len` as the longest prefix
    /// free of `*`, `?`, `[`, and records `anchored` if the (post-negation)
    /// text starts with `/`.
    pub fn parse(text: &str, base_len: usize) -> Result<Pattern> {
        if text.contains('\n') {
            return Err(Error::invalid_pattern(format!(
                "pattern contains an embedded newline: {text:?}"
            )));
        }

        let negative = text.starts_with('!');
        let rest = if negative { &text[1..] } else { text };

        let mustbedir = rest.len() > 1 && rest.ends_with('/');
        let body = if mustbedir { &rest[..rest.len() - 1] } else { rest };

        let anchored = body.starts_with('/');

        let nowildcard_prefix_len = body
            .find(['*', '?', '['])
            .unwrap_or(body.len());

        Ok(Pattern {
            text: text.to_string(),
            base_len,
            flags: PatternFlags {
                negative,
                mustbedir,
                nowildcard_prefix_len,
                anchored,
            },
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn base_len(&self) -> usize {
        self.base_len
    }

    pub fn flags(&self) -> PatternFlags {
        self.flags
    }

    pub fn is_negative(&self) -> bool {
        self.flags.negative
    }
}

/// Ordered sequence of `Pattern`s, plus (when `use_cone` is set) the cone
/// index built from cone-dialect insertions.
#[derive(Clone, Debug, Default)]
pub struct PatternList {
    patterns: Vec<Pattern>,
    use_cone: bool,
    cone: ConeIndex,
}

impl PatternList {
    pub fn new(use_cone: bool) -> PatternList {
        PatternList {
            patterns: Vec::new(),
            use_cone,
            cone: ConeIndex::new(),
        }
    }

    pub fn is_cone(&self) -> bool {
        self.use_cone
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn cone_index(&self) -> &ConeIndex {
        &self.cone
    }

    /// `add_pattern`: store a general-dialect pattern.
    pub fn add_pattern(&mut self, text: &str, base_len: usize) -> Result<()> {
        let pattern = Pattern::parse(text, base_len)?;
        self.patterns.push(pattern);
        Ok(())
    }

    /// `cone_insert`: canonicalize and record a cone-dialect directory path.
    /// Insertion of a path containing `*`, `?`, or `[` is not itself an
    /// error (it is treated as a literal directory name); the matcher warns
    /// and falls back to general matching at use time.
    pub fn cone_insert(&mut self, path: &str) -> Result<()> {
        if path.contains('\n') {
            return Err(Error::invalid_pattern(format!(
                "cone pattern contains an embedded newline: {path:?}"
            )));
        }
        self.cone.insert(path);
        Ok(())
    }

    /// Release all patterns and sets.
    pub fn clear(&mut self) {
        self.patterns.clear();
        self.cone.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.cone.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain() {
        let p = Pattern::parse("*folder*", 0).unwrap();
        assert!(!p.is_negative());
        assert!(!p.flags().mustbedir);
        assert!(!p.flags().anchored);
        assert_eq!(p.flags().nowildcard_prefix_len, 0);
    }

    #[test]
    fn parse_negative_anchored_mustbedir() {
        let p = Pattern::parse("!/deep/*/", 0).unwrap();
        assert!(p.is_negative());
        assert!(p.flags().mustbedir);
        assert!(p.flags().anchored);
        assert_eq!(p.flags().nowildcard_prefix_len, "/deep/".len());
    }

    #[test]
    fn parse_rejects_embedded_newline() {
        let err = Pattern::parse("foo\nbar", 0).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::InvalidPattern);
    }

    #[test]
    fn cone_insert_rejects_embedded_newline() {
        let mut patterns = PatternList::new(true);
        let err = patterns.cone_insert("foo\nbar").unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::InvalidPattern);
    }

    #[test]
    fn cone_insert_populates_cone_index() {
        let mut patterns = PatternList::new(true);
        patterns.cone_insert("deep/deeper1").unwrap();
        assert!(patterns.cone_index().contains_recursive("/deep/deeper1"));
        assert!(patterns.cone_index().contains_parent("/deep"));
    }

    #[test]
    fn clear_releases_everything() {
        let mut patterns = PatternList::new(true);
        patterns.add_pattern("*.txt", 0).unwrap();
        patterns.cone_insert("deep").unwrap();
        patterns.clear();
        assert!(patterns.is_empty());
    }
}
