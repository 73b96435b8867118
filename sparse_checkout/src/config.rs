// Copyright 2020 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A minimal `ConfigStore` over a git-config-like text file: `[section]`
//! headers followed by `key = value` lines. This is the engine's own
//! reference implementation of the collaborator trait in `collab.rs`,
//! trimmed to the handful of boolean keys this engine actually reads and
//! writes (`core.sparseCheckout`, `core.sparseCheckoutCone`,
//! `extensions.worktreeConfig`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::collab::ConfigStore;
use crate::error::{Error, Result};

#[derive(Clone, Debug, Default)]
pub struct FileConfigStore {
    path: PathBuf,
    // (section, key) -> raw value text, insertion order not preserved;
    // `save` re-emits sections sorted for a stable on-disk layout.
    values: BTreeMap<(String, String), String>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> FileConfigStore {
        FileConfigStore {
            path: path.into(),
            values: BTreeMap::new(),
        }
    }

    /// Load an existing config file, or start empty if it does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<FileConfigStore> {
        let path = path.into();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(FileConfigStore {
            values: parse(&text),
            path,
        })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, render(&self.values))
            .map_err(|e| Error::config_write_failed(e.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self
            .values
            .get(&(section.to_lowercase(), key.to_lowercase()))
        {
            None => Ok(None),
            Some(raw) => parse_bool(raw)
                .map(Some)
                .ok_or_else(|| Error::config_write_failed(format!("not a boolean: {raw:?}"))),
        }
    }

    fn set_bool(&mut self, section: &str, key: &str, value: bool) -> Result<()> {
        self.values.insert(
            (section.to_lowercase(), key.to_lowercase()),
            value.to_string(),
        );
        self.save()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse(text: &str) -> BTreeMap<(String, String), String> {
    let mut values = BTreeMap::new();
    let mut section = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            section = name.trim().to_lowercase();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(
                (section.clone(), key.trim().to_lowercase()),
                value.trim().to_string(),
            );
        }
    }
    values
}

fn render(values: &BTreeMap<(String, String), String>) -> String {
    let mut out = String::new();
    let mut current_section: Option<&str> = None;
    for ((section, key), value) in values {
        if current_section != Some(section.as_str()) {
            out.push_str(&format!("[{section}]\n"));
            current_section = Some(section.as_str());
        }
        out.push_str(&format!("\t{key} = {value}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_booleans() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        let mut store = FileConfigStore::load(&path).unwrap();
        assert_eq!(store.get_bool("core", "sparseCheckout").unwrap(), None);

        store.set_bool("core", "sparseCheckout", true).unwrap();
        store.set_bool("core", "sparseCheckoutCone", false).unwrap();

        let reloaded = FileConfigStore::load(&path).unwrap();
        assert_eq!(
            reloaded.get_bool("core", "sparsecheckout").unwrap(),
            Some(true)
        );
        assert_eq!(
            reloaded.get_bool("core", "sparsecheckoutcone").unwrap(),
            Some(false)
        );
    }

    #[test]
    fn missing_file_starts_empty() {
        let store = FileConfigStore::load("/nonexistent/path/to/config").unwrap();
        assert_eq!(store.get_bool("core", "sparseCheckout").unwrap(), None);
    }
}
