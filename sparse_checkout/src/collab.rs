// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Collaborator interfaces: the object store, the index, the one-way tree
//! merger and the config store live outside this engine — it only needs to
//! call them. They are modeled as traits here rather than hard-wired to a
//! single implementation, so callers can supply whatever concrete store
//! their host process already has open.

use std::path::Path;

use crate::error::Result;

/// Content-addressed read access to blobs and trees, keyed by an opaque,
/// `Copy` object id. The engine never writes objects; it only reads tree
/// entries while walking HEAD.
pub trait ObjectStore {
    type ObjectId: Copy + Eq + std::hash::Hash + std::fmt::Debug;

    /// Entries of the tree named by `id`: `(name, child_id, is_tree)`.
    fn read_tree(&self, id: Self::ObjectId) -> Result<Vec<(String, Self::ObjectId, bool)>>;

    /// The tree object id HEAD currently points at, or `None` on a
    /// brand-new repository that has not made its first commit yet.
    fn head_tree(&self) -> Result<Option<Self::ObjectId>>;
}

/// A single index entry the reconciler inspects or rewrites.
#[derive(Clone, Debug)]
pub struct IndexEntry {
    pub path: String,
    pub skip_worktree: bool,
    /// True when the entry is one side of an unresolved three-way merge.
    pub unmerged: bool,
}

/// The staged index: enough surface for the reconciler to detect unmerged
/// state, discard resolve-undo data, invalidate the cache-tree, and flip
/// `skip_worktree` bits per entry.
pub trait Index {
    fn entries(&self) -> Result<Vec<IndexEntry>>;

    fn has_unmerged_entries(&self) -> Result<bool> {
        Ok(self.entries()?.iter().any(|e| e.unmerged))
    }

    /// Discard the resolve-undo (`REUC`) extension, if present.
    fn discard_resolve_undo(&mut self) -> Result<()>;

    /// Drop the cached tree extension so the next status scan recomputes it.
    fn invalidate_cache_tree(&mut self) -> Result<()>;

    /// Set `skip_worktree` on every entry matching `paths`, and clear it on
    /// every other entry, in one pass.
    fn set_skip_worktree(&mut self, included_paths: &[String]) -> Result<()>;
}

/// Outcome of a one-way merge of HEAD's tree into the working tree.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MergeStats {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
}

/// The one-way tree-to-worktree merge/unpack routine. A real
/// implementation walks HEAD's tree against the working tree,
/// materializing newly-included paths and removing newly-excluded ones
/// that carry no local modifications, refusing (`WouldLoseChanges`) when a
/// path to be removed or overwritten is dirty.
pub trait TreeMerger {
    /// Reconcile the working tree under `root` so that it contains exactly
    /// `included_paths` (already resolved against HEAD's tree by the
    /// caller — see `reconcile::included_paths`). Returns
    /// `Err(WouldLoseChanges)` without touching the working tree if any
    /// path that would be removed or overwritten carries local
    /// modifications.
    fn merge(&mut self, root: &Path, included_paths: &[String]) -> Result<MergeStats>;
}

/// Durable key/value configuration (`core.sparseCheckout`,
/// `core.sparseCheckoutCone`, `extensions.worktreeConfig`, ...).
pub trait ConfigStore {
    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>>;

    fn set_bool(&mut self, section: &str, key: &str, value: bool) -> Result<()>;
}
