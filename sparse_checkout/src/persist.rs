// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Persistence and mode control: reading and writing the pattern file in
//! its canonical on-disk form, tracking which of the three modes
//! (disabled, general, cone) is active via the config store, and driving
//! `set`/`init`/`disable` as atomic, lock-guarded transactions.
//!
//! `set` calls `reconcile::prepare` to acquire the index lock and compute
//! the included-path set, only then acquires the pattern-file lock and
//! writes the candidate file into it, and runs `PreparedReconcile::finish`
//! exactly once while both locks are held. The pattern-file lock — the one
//! acquired second — is committed or rolled back before the index lock is,
//! preserving the required acquire-index-then-pattern-file,
//! release-in-reverse ordering across the two locks. A failed
//! reconciliation rolls both locks back and the on-disk pattern file is
//! left exactly as it was.

use std::fs;
use std::path::{Path, PathBuf};

use crate::collab::{ConfigStore, Index, MergeStats, ObjectStore, TreeMerger};
use crate::cone::ConeIndex;
use crate::error::Result;
use crate::lock::Lock;
use crate::pattern::PatternList;
use crate::reconcile;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// `core.sparseCheckout` unset or false: the full working tree is checked out.
    Disabled,
    /// `core.sparseCheckout=true`, `core.sparseCheckoutCone` unset or false.
    General,
    /// `core.sparseCheckout=true`, `core.sparseCheckoutCone=true`.
    Cone,
}

const CONE_BOILERPLATE: [&str; 2] = ["/*", "!/*/"];

pub struct PatternFile {
    root: PathBuf,
    path: PathBuf,
}

impl PatternFile {
    pub fn new(root: impl Into<PathBuf>, path: impl Into<PathBuf>) -> PatternFile {
        PatternFile {
            root: root.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current mode, derived from the two config booleans.
    pub fn mode(&self, config: &impl ConfigStore) -> Result<Mode> {
        let enabled = config.get_bool("core", "sparseCheckout")?.unwrap_or(false);
        if !enabled {
            return Ok(Mode::Disabled);
        }
        let cone = config
            .get_bool("core", "sparseCheckoutCone")?
            .unwrap_or(false);
        Ok(if cone { Mode::Cone } else { Mode::General })
    }

    /// The patterns presently in effect, in display form, or `None` if no
    /// pattern file exists yet. Cone mode lists directories (without the
    /// gitignore boilerplate or parent-only bookkeeping lines); general mode
    /// lists the raw pattern text, in declared order.
    pub fn list(&self, config: &impl ConfigStore) -> Result<Option<Vec<String>>> {
        let Some(patterns) = self.read(config)? else {
            return Ok(None);
        };
        Ok(Some(if patterns.is_cone() {
            patterns
                .cone_index()
                .uncovered_recursive()
                .into_iter()
                .map(|key| key.trim_start_matches('/').to_string())
                .collect()
        } else {
            patterns
                .patterns()
                .iter()
                .map(|p| p.text().to_string())
                .collect()
        }))
    }

    /// Read the pattern file off disk into a `PatternList`, in the dialect
    /// the config currently selects. Returns `None` if no pattern file
    /// exists yet, distinct from a pattern file that exists but is empty.
    pub fn read(&self, config: &impl ConfigStore) -> Result<Option<PatternList>> {
        let cone = matches!(self.mode(config)?, Mode::Cone);
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(if cone {
            parse_cone(&text)
        } else {
            parse_general(&text)
        }))
    }

    /// Enable sparse-checkout in the requested dialect. If a pattern file
    /// already exists on disk it is left as-is and just reconciled against
    /// (so `init` run twice with the same `--cone` value is idempotent);
    /// otherwise the seed content `/*` / `!/*/` (general) or the empty cone
    /// set is written.
    #[allow(clippy::too_many_arguments)]
    pub fn init<C, O, I, M>(
        &mut self,
        cone: bool,
        config: &mut C,
        object_store: &O,
        index: &mut I,
        tree_merger: &mut M,
    ) -> Result<MergeStats>
    where
        C: ConfigStore,
        O: ObjectStore,
        I: Index,
        M: TreeMerger,
    {
        let patterns = match fs::read_to_string(&self.path) {
            Ok(text) => {
                if cone {
                    parse_cone(&text)
                } else {
                    parse_general(&text)
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if cone {
                    PatternList::new(true)
                } else {
                    let mut patterns = PatternList::new(false);
                    patterns.add_pattern("/*", 0)?;
                    patterns.add_pattern("!/*/", 1)?;
                    patterns
                }
            }
            Err(e) => return Err(e.into()),
        };
        self.set(patterns, config, object_store, index, tree_merger)
    }

    /// Replace the active pattern set, reconcile the working tree, and only
    /// commit (file + config) once reconciliation has succeeded.
    ///
    /// `reconcile::prepare` is called first so the index lock, if any, is
    /// acquired before the pattern-file lock taken here; the pattern-file
    /// lock — the one acquired second — is committed or rolled back first,
    /// then the index lock, so the two are released in the reverse of their
    /// acquisition order. A `None` from `prepare` means the repository has
    /// no HEAD yet; the pattern file is still written and the mode flipped,
    /// since there is nothing to reconcile.
    pub fn set<C, O, I, M>(
        &mut self,
        patterns: PatternList,
        config: &mut C,
        object_store: &O,
        index: &mut I,
        tree_merger: &mut M,
    ) -> Result<MergeStats>
    where
        C: ConfigStore,
        O: ObjectStore,
        I: Index,
        M: TreeMerger,
    {
        let prepared = reconcile::prepare(&self.root, object_store, index, &patterns)?;

        let mut lock = Lock::acquire(&self.path)?;
        lock.write(render(&patterns).as_bytes())?;

        let Some(prepared) = prepared else {
            lock.commit()?;
            set_mode(config, true, patterns.is_cone())?;
            return Ok(MergeStats::default());
        };

        let (result, index_lock) = prepared.finish(&self.root, index, tree_merger);
        match result {
            Ok(stats) => {
                lock.commit()?;
                index_lock.commit()?;
                set_mode(config, true, patterns.is_cone())?;
                Ok(stats)
            }
            Err(e) => {
                lock.rollback()?;
                index_lock.rollback()?;
                Err(e)
            }
        }
    }

    /// Turn sparse-checkout off and restore a full working tree, with the
    /// same index-lock-first, pattern-file-lock-second acquisition (and
    /// reverse-order release) as `set`.
    pub fn disable<C, O, I, M>(
        &mut self,
        config: &mut C,
        object_store: &O,
        index: &mut I,
        tree_merger: &mut M,
    ) -> Result<MergeStats>
    where
        C: ConfigStore,
        O: ObjectStore,
        I: Index,
        M: TreeMerger,
    {
        let mut everything = PatternList::new(false);
        everything.add_pattern("*", 0)?;

        let prepared = reconcile::prepare(&self.root, object_store, index, &everything)?;

        let mut lock = Lock::acquire(&self.path)?;
        lock.write(&[])?;

        let remove_pattern_file = |path: &Path| -> Result<()> {
            fs::remove_file(path).or_else(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(e.into())
                }
            })
        };

        let Some(prepared) = prepared else {
            lock.commit()?;
            remove_pattern_file(&self.path)?;
            set_mode(config, false, false)?;
            return Ok(MergeStats::default());
        };

        let (result, index_lock) = prepared.finish(&self.root, index, tree_merger);
        match result {
            Ok(stats) => {
                lock.commit()?;
                index_lock.commit()?;
                remove_pattern_file(&self.path)?;
                set_mode(config, false, false)?;
                Ok(stats)
            }
            Err(e) => {
                lock.rollback()?;
                index_lock.rollback()?;
                Err(e)
            }
        }
    }
}

/// Write the two mode flags and enable the `worktreeConfig` extension if it
/// is not already on, since the mode flags live in the per-worktree config
/// scope that extension unlocks.
fn set_mode(config: &mut impl ConfigStore, enabled: bool, cone: bool) -> Result<()> {
    if !config.get_bool("extensions", "worktreeConfig")?.unwrap_or(false) {
        config.set_bool("extensions", "worktreeConfig", true)?;
    }
    config.set_bool("core", "sparseCheckout", enabled)?;
    config.set_bool("core", "sparseCheckoutCone", cone)?;
    Ok(())
}

/// Render a `PatternList` into its canonical on-disk text.
fn render(patterns: &PatternList) -> String {
    if patterns.is_cone() {
        render_cone(patterns.cone_index())
    } else {
        let mut out = String::new();
        for pattern in patterns.patterns() {
            out.push_str(pattern.text());
            out.push('\n');
        }
        out
    }
}

fn render_cone(cone: &ConeIndex) -> String {
    let mut out = String::new();
    for line in CONE_BOILERPLATE {
        out.push_str(line);
        out.push('\n');
    }
    for parent in cone.uncovered_parents() {
        out.push_str(parent);
        out.push_str("/\n!");
        out.push_str(parent);
        out.push_str("/*/\n");
    }
    for recursive in cone.uncovered_recursive() {
        out.push_str(recursive);
        out.push_str("/\n");
    }
    out
}

fn parse_general(text: &str) -> PatternList {
    let mut patterns = PatternList::new(false);
    for (i, line) in text.lines().enumerate() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        // A malformed line (e.g. an embedded NUL) cannot occur from
        // `str::lines`, so this can't actually fail.
        let _ = patterns.add_pattern(trimmed, i);
    }
    patterns
}

fn parse_cone(text: &str) -> PatternList {
    let mut patterns = PatternList::new(true);
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.is_empty() || CONE_BOILERPLATE.contains(&line) {
            i += 1;
            continue;
        }
        if let Some(path) = line.strip_suffix('/') {
            // A parent-only bookkeeping pair is `<path>/` immediately
            // followed by `!<path>/*/`; both are skipped on read —
            // `ConeIndex::insert` rederives `parent_set` from whichever
            // recursive entry, if any, sits beneath this path. A `<path>/`
            // line with no such follower is a genuine recursive entry.
            let negative = format!("!{path}/*/");
            if i + 1 < lines.len() && lines[i + 1] == negative {
                i += 2;
            } else {
                let _ = patterns.cone_insert(path);
                i += 1;
            }
            continue;
        }
        // A line that is neither boilerplate nor a recognized cone entry
        // (e.g. a stray negative or wildcard pattern written by another
        // tool) is kept as a general-dialect pattern; the matcher detects
        // it and falls back to general matching for the whole file.
        let _ = patterns.add_pattern(line, i);
        i += 1;
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::IndexEntry;
    use crate::config::FileConfigStore;
    use std::collections::HashMap;

    struct FakeObjectStore {
        head: Option<u32>,
        trees: HashMap<u32, Vec<(String, u32, bool)>>,
    }

    impl ObjectStore for FakeObjectStore {
        type ObjectId = u32;

        fn read_tree(&self, id: u32) -> Result<Vec<(String, u32, bool)>> {
            Ok(self.trees.get(&id).cloned().unwrap_or_default())
        }

        fn head_tree(&self) -> Result<Option<u32>> {
            Ok(self.head)
        }
    }

    struct FakeIndex;

    impl Index for FakeIndex {
        fn entries(&self) -> Result<Vec<IndexEntry>> {
            Ok(Vec::new())
        }
        fn discard_resolve_undo(&mut self) -> Result<()> {
            Ok(())
        }
        fn invalidate_cache_tree(&mut self) -> Result<()> {
            Ok(())
        }
        fn set_skip_worktree(&mut self, _included_paths: &[String]) -> Result<()> {
            Ok(())
        }
    }

    struct FakeTreeMerger;

    impl TreeMerger for FakeTreeMerger {
        fn merge(&mut self, _root: &Path, included_paths: &[String]) -> Result<MergeStats> {
            Ok(MergeStats {
                added: included_paths.len(),
                removed: 0,
                updated: 0,
            })
        }
    }

    fn two_file_tree() -> FakeObjectStore {
        let mut trees = HashMap::new();
        trees.insert(
            0_u32,
            vec![
                ("a".to_string(), 1_u32, false),
                ("deep".to_string(), 2_u32, true),
            ],
        );
        trees.insert(2_u32, vec![("b".to_string(), 3_u32, false)]);
        FakeObjectStore {
            head: Some(0),
            trees,
        }
    }

    #[test]
    fn cone_round_trips_through_render_and_parse() {
        let mut patterns = PatternList::new(true);
        patterns.cone_insert("deep").unwrap();
        patterns.cone_insert("deep/deeper1/deepest").unwrap();

        let text = render(&patterns);
        let parsed = parse_cone(&text);
        assert_eq!(
            parsed.cone_index().uncovered_recursive(),
            patterns.cone_index().uncovered_recursive()
        );
    }

    #[test]
    fn init_then_set_then_disable_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FileConfigStore::load(dir.path().join("config")).unwrap();
        let mut pattern_file = PatternFile::new(dir.path(), dir.path().join("sparse-checkout"));
        let store = two_file_tree();
        let mut index = FakeIndex;
        let mut merger = FakeTreeMerger;

        assert_eq!(pattern_file.mode(&config).unwrap(), Mode::Disabled);

        pattern_file
            .init(true, &mut config, &store, &mut index, &mut merger)
            .unwrap();
        assert_eq!(pattern_file.mode(&config).unwrap(), Mode::Cone);

        let mut patterns = PatternList::new(true);
        patterns.cone_insert("deep").unwrap();
        pattern_file
            .set(patterns, &mut config, &store, &mut index, &mut merger)
            .unwrap();
        assert_eq!(
            pattern_file.list(&config).unwrap(),
            Some(vec!["deep".to_string()])
        );

        pattern_file
            .disable(&mut config, &store, &mut index, &mut merger)
            .unwrap();
        assert_eq!(pattern_file.mode(&config).unwrap(), Mode::Disabled);
        assert!(!pattern_file.path().exists());
    }

    #[test]
    fn list_is_none_when_no_pattern_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfigStore::load(dir.path().join("config")).unwrap();
        let pattern_file = PatternFile::new(dir.path(), dir.path().join("sparse-checkout"));
        assert_eq!(pattern_file.list(&config).unwrap(), None);
    }

    #[test]
    fn set_on_a_repository_with_no_head_yet_still_writes_the_pattern_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FileConfigStore::load(dir.path().join("config")).unwrap();
        let mut pattern_file = PatternFile::new(dir.path(), dir.path().join("sparse-checkout"));
        let store = FakeObjectStore {
            head: None,
            trees: HashMap::new(),
        };
        let mut index = FakeIndex;
        let mut merger = FakeTreeMerger;

        let mut patterns = PatternList::new(true);
        patterns.cone_insert("deep").unwrap();
        let stats = pattern_file
            .set(patterns, &mut config, &store, &mut index, &mut merger)
            .unwrap();

        assert_eq!(stats, MergeStats::default());
        assert_eq!(pattern_file.mode(&config).unwrap(), Mode::Cone);
        assert_eq!(
            pattern_file.list(&config).unwrap(),
            Some(vec!["deep".to_string()])
        );
    }
}
