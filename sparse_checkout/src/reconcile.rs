// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The worktree reconciler: a one-way merge of HEAD's tree into the
//! working tree, constrained to the paths the active `PatternList`
//! selects, with rollback on any failure partway through.
//!
//! Reconciliation runs exactly once per call, under a single held index
//! lock, taking the new `PatternList` as an explicit parameter rather than
//! flipping a process-wide sparse bit.
//!
//! `prepare`/`PreparedReconcile::finish` split the operation in two so a
//! caller that also needs to hold the pattern-file lock can acquire the
//! index lock first and release it last, preserving the required
//! acquisition order across both locks. `update_working_directory` is the
//! single-call convenience wrapper for callers that only ever touch the
//! index lock.

use std::path::Path;

use crate::collab::{Index, MergeStats, ObjectStore, TreeMerger};
use crate::error::{Error, Result};
use crate::lock::Lock;
use crate::matcher::Matcher;
use crate::pattern::PatternList;

/// Walk `root_id`'s tree, matching every path against `patterns`, and
/// return the sorted list of included file paths. Directories that do not
/// themselves match are pruned from the walk entirely — under both
/// dialects, inclusion of a directory is exactly the condition under which
/// descendants can be included, so nothing reachable below an excluded
/// directory is ever included either.
pub fn included_paths<O: ObjectStore>(
    store: &O,
    root_id: O::ObjectId,
    patterns: &PatternList,
) -> Result<Vec<String>> {
    let matcher = Matcher::new(patterns)?;
    let mut included = Vec::new();
    let mut stack = vec![(String::new(), root_id)];

    while let Some((prefix, id)) = stack.pop() {
        for (name, child_id, is_tree) in store.read_tree(id)? {
            let path = format!("{prefix}/{name}");
            if is_tree {
                if matcher.match_path(&path, true).is_included() {
                    stack.push((path, child_id));
                }
            } else if matcher.match_path(&path, false).is_included() {
                included.push(path);
            }
        }
    }

    included.sort();
    Ok(included)
}

/// An index lock acquired and the included-path set computed, ready for
/// `finish` to run the merge and commit or roll back. Held between a
/// caller's `prepare` and `finish` calls so a pattern-file lock can be
/// acquired in between, nested inside this one.
pub struct PreparedReconcile {
    index_lock: Lock,
    included: Vec<String>,
}

impl PreparedReconcile {
    /// Flip `skip_worktree` bits and run the one-way merge, returning the
    /// outcome alongside the still-uncommitted index lock. A caller that
    /// holds no other lock can simply commit the lock on success and roll
    /// it back on failure; a caller that also holds a pattern-file lock
    /// should commit or roll back that lock *first*, then do the same to
    /// the index lock returned here, so the two locks are released in the
    /// reverse of their acquisition order.
    pub fn finish<I, M>(self, root: &Path, index: &mut I, tree_merger: &mut M) -> (Result<MergeStats>, Lock)
    where
        I: Index,
        M: TreeMerger,
    {
        let result = reconcile(index, tree_merger, root, &self.included).and_then(|stats| {
            index.invalidate_cache_tree()?;
            Ok(stats)
        });
        (result, self.index_lock)
    }
}

/// Refuse (`UnmergedIndex`) if the index has unresolved merge entries;
/// otherwise resolve HEAD's tree and compute the included-path set,
/// refusing (`EmptyCheckout`) if it is empty. Returns `Ok(None)` if there
/// is no HEAD yet (a repository before its first commit) — there is
/// nothing to reconcile against. On any other success, discards
/// resolve-undo data, invalidates the cache-tree, and acquires the index
/// lock before returning it held in the `PreparedReconcile`.
pub fn prepare<O, I>(
    root: &Path,
    object_store: &O,
    index: &mut I,
    patterns: &PatternList,
) -> Result<Option<PreparedReconcile>>
where
    O: ObjectStore,
    I: Index,
{
    if index.has_unmerged_entries()? {
        return Err(Error::unmerged_index());
    }

    let Some(head) = object_store.head_tree()? else {
        return Ok(None);
    };

    let included = included_paths(object_store, head, patterns)?;
    if included.is_empty() {
        return Err(Error::empty_checkout());
    }

    index.discard_resolve_undo()?;
    index.invalidate_cache_tree()?;

    // A pure mutual-exclusion guard over the transaction `finish` runs;
    // the abstract `Index` this engine is handed owns its own on-disk
    // representation and commits that separately. Acquired here, before
    // any pattern-file lock a caller takes out around `prepare`/`finish`,
    // and released (by `finish`) only after that pattern-file lock is.
    let index_lock = Lock::acquire(root.join(".git").join("index"))?;

    Ok(Some(PreparedReconcile {
        index_lock,
        included,
    }))
}

/// Reconcile the working tree under `root` against HEAD so that it
/// contains exactly what `patterns` selects, in a single call. A `None`
/// HEAD (fresh repository) is a no-op success.
pub fn update_working_directory<O, I, M>(
    root: &Path,
    object_store: &O,
    index: &mut I,
    tree_merger: &mut M,
    patterns: &PatternList,
) -> Result<MergeStats>
where
    O: ObjectStore,
    I: Index,
    M: TreeMerger,
{
    match prepare(root, object_store, index, patterns)? {
        Some(prepared) => {
            let (result, index_lock) = prepared.finish(root, index, tree_merger);
            match result {
                Ok(stats) => {
                    index_lock.commit()?;
                    Ok(stats)
                }
                Err(e) => {
                    index_lock.rollback()?;
                    Err(e)
                }
            }
        }
        None => Ok(MergeStats::default()),
    }
}

fn reconcile<I: Index, M: TreeMerger>(
    index: &mut I,
    tree_merger: &mut M,
    root: &Path,
    included: &[String],
) -> Result<MergeStats> {
    index.set_skip_worktree(included)?;
    tree_merger.merge(root, included)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::IndexEntry;
    use std::cell::RefCell;
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

    struct FakeIndex {
        unmerged: bool,
        skip_worktree: RefCell<Vec<String>>,
    }

    impl Index for FakeIndex {
        fn entries(&self) -> Result<Vec<IndexEntry>> {
            Ok(vec![IndexEntry {
                path: "a".to_string(),
                skip_worktree: false,
                unmerged: self.unmerged,
            }])
        }

        fn discard_resolve_undo(&mut self) -> Result<()> {
            Ok(())
        }

        fn invalidate_cache_tree(&mut self) -> Result<()> {
            Ok(())
        }

        fn set_skip_worktree(&mut self, included_paths: &[String]) -> Result<()> {
            *self.skip_worktree.borrow_mut() = included_paths.to_vec();
            Ok(())
        }
    }

    struct FakeTreeMerger {
        fail: bool,
    }

    impl TreeMerger for FakeTreeMerger {
        fn merge(&mut self, _root: &Path, included_paths: &[String]) -> Result<MergeStats> {
            if self.fail {
                return Err(Error::would_lose_changes("a"));
            }
            Ok(MergeStats {
                added: included_paths.len(),
                removed: 0,
                updated: 0,
            })
        }
    }

    fn one_file_tree() -> FakeObjectStore {
        let mut trees = HashMap::new();
        trees.insert(0_u32, vec![("a".to_string(), 1_u32, false)]);
        FakeObjectStore {
            head: Some(0),
            trees,
        }
    }

    /// A tree with no root-level files, only a nested one, so that cone
    /// mode's "root-level files are always included" rule can't accidentally
    /// satisfy a checkout that should otherwise be empty.
    fn nested_file_tree() -> FakeObjectStore {
        let mut trees = HashMap::new();
        trees.insert(0_u32, vec![("sub".to_string(), 1_u32, true)]);
        trees.insert(1_u32, vec![("a".to_string(), 2_u32, false)]);
        FakeObjectStore {
            head: Some(0),
            trees,
        }
    }

    #[test]
    fn refuses_unmerged_index() {
        let store = one_file_tree();
        let mut index = FakeIndex {
            unmerged: true,
            skip_worktree: RefCell::new(Vec::new()),
        };
        let mut merger = FakeTreeMerger { fail: false };
        let mut patterns = PatternList::new(false);
        patterns.add_pattern("/*", 0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err =
            update_working_directory(dir.path(), &store, &mut index, &mut merger, &patterns)
                .unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::UnmergedIndex);
    }

    #[test]
    fn refuses_empty_checkout() {
        let store = nested_file_tree();
        let mut index = FakeIndex {
            unmerged: false,
            skip_worktree: RefCell::new(Vec::new()),
        };
        let mut merger = FakeTreeMerger { fail: false };
        let mut patterns = PatternList::new(true);
        patterns.cone_insert("nonexistent").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err =
            update_working_directory(dir.path(), &store, &mut index, &mut merger, &patterns)
                .unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::EmptyCheckout);
    }

    #[test]
    fn successful_reconcile_commits_and_sets_skip_worktree() {
        let store = one_file_tree();
        let mut index = FakeIndex {
            unmerged: false,
            skip_worktree: RefCell::new(Vec::new()),
        };
        let mut merger = FakeTreeMerger { fail: false };
        let mut patterns = PatternList::new(false);
        patterns.add_pattern("/*", 0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let stats =
            update_working_directory(dir.path(), &store, &mut index, &mut merger, &patterns)
                .unwrap();
        assert_eq!(stats.added, 1);
        assert_eq!(*index.skip_worktree.borrow(), vec!["/a".to_string()]);
        assert!(!dir.path().join(".git").join("index.lock").exists());
    }

    #[test]
    fn would_lose_changes_rolls_back_the_index_lock() {
        let store = one_file_tree();
        let mut index = FakeIndex {
            unmerged: false,
            skip_worktree: RefCell::new(Vec::new()),
        };
        let mut merger = FakeTreeMerger { fail: true };
        let mut patterns = PatternList::new(false);
        patterns.add_pattern("/*", 0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err =
            update_working_directory(dir.path(), &store, &mut index, &mut merger, &patterns)
                .unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::WouldLoseChanges);
        assert!(!dir.path().join(".git").join("index.lock").exists());
        assert!(!dir.path().join(".git").join("index").exists());
    }

    #[test]
    fn no_head_is_a_no_op_success() {
        let store = FakeObjectStore {
            head: None,
            trees: HashMap::new(),
        };
        let mut index = FakeIndex {
            unmerged: false,
            skip_worktree: RefCell::new(Vec::new()),
        };
        let mut merger = FakeTreeMerger { fail: false };
        let mut patterns = PatternList::new(false);
        patterns.add_pattern("/*", 0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let stats =
            update_working_directory(dir.path(), &store, &mut index, &mut merger, &patterns)
                .unwrap();
        assert_eq!(stats, MergeStats::default());
        assert!(index.skip_worktree.borrow().is_empty());
        assert!(!dir.path().join(".git").join("index.lock").exists());
    }
}
