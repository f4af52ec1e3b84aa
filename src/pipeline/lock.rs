// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Exclusive ownership of an environment for the length of a run

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::{GateError, GateResult};

/// Held lock file; removed when dropped
#[derive(Debug)]
pub struct EnvironmentLock {
    path: PathBuf,
}

impl EnvironmentLock {
    /// Take the lock, failing at once if another run holds it
    pub fn acquire(path: &Path) -> GateResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "pid {}", std::process::id())?;
                debug!(path = %path.display(), "environment lock acquired");
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(path)
                    .map(|s| s.trim().to_string())
                    .ok()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "an unknown process".to_string());

                Err(GateError::EnvironmentLocked {
                    path: path.to_path_buf(),
                    holder,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for EnvironmentLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release environment lock");
        }
    }
}
