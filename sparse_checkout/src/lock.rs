// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The lock primitive: an exclusive-create sidecar file (`<path>.lock`)
//! that is either committed over the real path via an atomic rename, or
//! rolled back via unlink. Two locks are ever held at once by this engine —
//! the index lock and the pattern-file lock — and the index lock must
//! always be acquired first and released last, so `Lock` exposes
//! `commit`/`rollback` as explicit, ordered operations rather than relying
//! solely on `Drop` for unwind-safety across that ordering.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// An acquired, uncommitted lock over `target`. Dropping a `Lock` that was
/// never committed rolls it back automatically, so a `?`-propagated error
/// anywhere between acquisition and commit leaves no stray lock file behind.
pub struct Lock {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
}

impl Lock {
    /// Acquire the lock over `target` by exclusively creating
    /// `<target>.lock`. Fails with `Kind::LockHeld` if that sidecar already
    /// exists (another writer is mid-transaction).
    pub fn acquire(target: impl Into<PathBuf>) -> Result<Lock> {
        let target = target.into();
        let lock_path = lock_path_for(&target);

        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(&lock_path);

        let file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::lock_held(lock_path.display()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Lock {
            target,
            lock_path,
            file: Some(file),
        })
    }

    /// Write `contents` into the held lock file, replacing whatever is
    /// already there. Does not commit.
    pub fn write(&mut self, contents: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .expect("write() called on a lock that was already consumed");
        file.set_len(0)?;
        std::io::Seek::seek(file, std::io::SeekFrom::Start(0))?;
        file.write_all(contents)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Commit: rename the lock file over `target`, atomically replacing
    /// whatever was there. Consumes the lock so it cannot be rolled back
    /// after commit.
    pub fn commit(mut self) -> Result<()> {
        let file = self.file.take().expect("commit() called twice");
        drop(file);
        fs::rename(&self.lock_path, &self.target)?;
        Ok(())
    }

    /// Roll back: remove the lock file, leaving `target` untouched.
    /// Consumes the lock; equivalent to letting it drop, but lets callers
    /// observe and propagate the removal error instead of discarding it.
    pub fn rollback(mut self) -> Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            drop(file);
            match fs::remove_file(&self.lock_path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        } else {
            Ok(())
        }
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = self.remove();
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_owned())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}
