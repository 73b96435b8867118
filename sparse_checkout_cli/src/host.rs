// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A minimal, filesystem-backed implementation of `sparse_checkout`'s
//! collaborator traits, so the CLI has something real to drive. `--source`
//! stands in for the committed tree a host VCS would resolve from HEAD;
//! `--root` is the working tree the engine reconciles against it. There is
//! no index format or merge/conflict model here — only copying tracked
//! files in and pruning tracked files out — since the real object store,
//! index and tree-merger are the host VCS's job, not this engine's.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use sparse_checkout::{Index, IndexEntry, MergeStats, ObjectStore, Result};

pub struct FsObjectStore {
    source: PathBuf,
}

impl FsObjectStore {
    pub fn new(source: impl Into<PathBuf>) -> FsObjectStore {
        FsObjectStore {
            source: source.into(),
        }
    }
}

impl ObjectStore for FsObjectStore {
    type ObjectId = PathBuf;

    fn read_tree(&self, id: PathBuf) -> Result<Vec<(String, PathBuf, bool)>> {
        let dir = self.source.join(&id);
        let mut entries = Vec::new();
        if !dir.is_dir() {
            return Ok(entries);
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_id = id.join(&name);
            let is_tree = entry.file_type()?.is_dir();
            entries.push((name, child_id, is_tree));
        }
        Ok(entries)
    }

    /// `None` when `--source` does not exist yet, standing in for a
    /// repository before its first commit.
    fn head_tree(&self) -> Result<Option<PathBuf>> {
        Ok(self.source.is_dir().then(PathBuf::new))
    }
}

/// All tracked (source-mirrored) file paths, leading-`/`-prefixed, as
/// `reconcile::included_paths` produces them.
fn tracked_files(source: &Path) -> Vec<String> {
    let mut files = Vec::new();
    for entry in WalkBuilder::new(source).hidden(false).build() {
        let Ok(entry) = entry else { continue };
        if entry.file_type().is_some_and(|t| t.is_file()) {
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            files.push(format!("/{}", relative.to_string_lossy()));
        }
    }
    files
}

/// No index format to speak of: always merged, nothing to invalidate.
#[derive(Default)]
pub struct FsIndex;

impl Index for FsIndex {
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

pub struct FsTreeMerger {
    source: PathBuf,
}

impl FsTreeMerger {
    pub fn new(source: impl Into<PathBuf>) -> FsTreeMerger {
        FsTreeMerger { source: source.into() }
    }
}

impl sparse_checkout::TreeMerger for FsTreeMerger {
    fn merge(&mut self, root: &Path, included_paths: &[String]) -> Result<MergeStats> {
        let included: HashSet<&str> = included_paths.iter().map(String::as_str).collect();
        let mut stats = MergeStats::default();

        for path in included_paths {
            let relative = path.trim_start_matches('/');
            let from = self.source.join(relative);
            let to = root.join(relative);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            let existed = to.exists();
            fs::copy(&from, &to)?;
            if existed {
                stats.updated += 1;
            } else {
                stats.added += 1;
            }
        }

        for tracked in tracked_files(&self.source) {
            if included.contains(tracked.as_str()) {
                continue;
            }
            let relative = tracked.trim_start_matches('/');
            let to = root.join(relative);
            if to.is_file() {
                fs::remove_file(&to)?;
                stats.removed += 1;
            }
        }

        Ok(stats)
    }
}
