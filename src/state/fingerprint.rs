// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Content fingerprints for stage stamps
//!
//! Uses BLAKE3 for fast, secure content hashing.

use blake3::Hasher;
use std::path::{Path, PathBuf};

use crate::errors::GateError;

/// Incremental fingerprint over files and strings
pub struct Fingerprint {
    hasher: Hasher,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Hash arbitrary bytes
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(data);
        self
    }

    /// Hash a file's name and contents; a missing file hashes as a marker
    pub fn file(&mut self, path: &Path) -> Result<&mut Self, GateError> {
        self.hasher.update(path.to_string_lossy().as_bytes());

        if !path.exists() {
            self.hasher.update(b"\0missing");
            return Ok(self);
        }

        let content = std::fs::read(path).map_err(|e| GateError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        self.hasher.update(&content);
        Ok(self)
    }

    /// Finalize and get the hex digest
    pub fn finalize(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash of a single file, or `None` when it does not exist
pub fn hash_file(path: &Path) -> Result<Option<String>, GateError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read(path).map_err(|e| GateError::FileReadError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let mut hasher = Hasher::new();
    hasher.update(&content);
    Ok(Some(hasher.finalize().to_hex().to_string()))
}

/// Resolve glob patterns to files, keeping pattern order and sorting within a pattern
pub fn resolve_patterns(patterns: &[&str], base_dir: &Path) -> Result<Vec<PathBuf>, GateError> {
    let mut files = Vec::new();

    for pattern in patterns {
        let full_pattern = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            base_dir.join(pattern).to_string_lossy().to_string()
        };

        let mut matches: Vec<PathBuf> = glob::glob(&full_pattern)?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        matches.sort();

        for path in matches {
            if !files.contains(&path) {
                files.push(path);
            }
        }
    }

    Ok(files)
}
