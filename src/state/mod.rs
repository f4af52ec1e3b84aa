// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Persistent stage state
//!
//! Stages that produce lasting state (`setup`, `install`, `test`) record a
//! stamp under `<environment>/.qgate/` when they succeed. A stage run on its
//! own checks its dependencies against these stamps, so running `test` before
//! `install`, or `coverage` after a failed test run, fails instead of working
//! from stale or absent state.

mod fingerprint;

pub use fingerprint::{hash_file, resolve_patterns, Fingerprint};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::config::GateConfig;
use crate::errors::{GateError, GateResult};

/// Record of a completed stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stamp {
    pub stage: String,
    pub completed_at: SystemTime,
    /// Digest of the inputs the stage consumed or the artifact it produced
    pub fingerprint: String,
}

/// Filesystem-backed stamp store
pub struct StateStore {
    config: GateConfig,
    working_dir: PathBuf,
}

impl StateStore {
    pub fn new(config: &GateConfig, working_dir: &Path) -> Self {
        Self {
            config: config.clone(),
            working_dir: working_dir.to_path_buf(),
        }
    }

    fn stamp_path(&self, stage: &str) -> PathBuf {
        self.config.state_dir().join(format!("{}.json", stage))
    }

    /// Read a stage's stamp; an unreadable stamp counts as absent
    pub fn read(&self, stage: &str) -> Option<Stamp> {
        let content = std::fs::read_to_string(self.stamp_path(stage)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Record a successful stage
    pub fn write(&self, stage: &str, fingerprint: String) -> GateResult<()> {
        let path = self.stamp_path(stage);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GateError::FileWriteError {
                path: parent.to_path_buf(),
                error: e.to_string(),
            })?;
        }

        let stamp = Stamp {
            stage: stage.to_string(),
            completed_at: SystemTime::now(),
            fingerprint,
        };
        let json = serde_json::to_string_pretty(&stamp)?;

        std::fs::write(&path, json).map_err(|e| GateError::FileWriteError {
            path: path.clone(),
            error: e.to_string(),
        })?;

        debug!(stage, "stamp written");
        Ok(())
    }

    /// Forget a stage's stamp
    pub fn clear(&self, stage: &str) -> GateResult<()> {
        let path = self.stamp_path(stage);
        if path.exists() {
            std::fs::remove_file(&path)?;
            debug!(stage, "stamp cleared");
        }
        Ok(())
    }

    /// Environment directory holds a working interpreter
    pub fn interpreter_present(&self) -> bool {
        self.config.env_python().exists()
    }

    /// Digest of everything `install` consumes
    pub fn install_fingerprint(&self) -> GateResult<String> {
        let patterns: Vec<&str> = self.config.requirements.iter().map(String::as_str).collect();
        let files = resolve_patterns(&patterns, &self.working_dir)?;

        let mut fingerprint = Fingerprint::new();
        for pattern in &patterns {
            fingerprint.update(pattern.as_bytes());
        }
        for file in &files {
            fingerprint.file(file)?;
        }
        if let Some(ref model) = self.config.nlp_model {
            fingerprint.update(b"\0model:").update(model.as_bytes());
        }

        Ok(fingerprint.finalize())
    }

    /// Digest of the coverage data left by the last test run
    pub fn test_fingerprint(&self) -> GateResult<Option<String>> {
        hash_file(&self.config.coverage.data_file)
    }

    /// `setup` has completed and the environment is intact
    pub fn environment_ready(&self) -> bool {
        self.interpreter_present() && self.read("setup").is_some()
    }

    /// `install` has completed for the current requirement files
    pub fn install_current(&self) -> GateResult<bool> {
        match self.read("install") {
            Some(stamp) => Ok(self.environment_ready() && stamp.fingerprint == self.install_fingerprint()?),
            None => Ok(false),
        }
    }

    /// Check that `dependency` is satisfied by persisted state, on behalf of `stage`
    pub fn verify(&self, stage: &str, dependency: &str) -> GateResult<()> {
        let fail = |reason: &str| Err(GateError::dependency_not_satisfied(stage, dependency, reason));

        match dependency {
            "setup" => {
                if !self.interpreter_present() {
                    return fail(&format!(
                        "no environment interpreter at {}",
                        self.config.env_python().display()
                    ));
                }
                if self.read("setup").is_none() {
                    return fail("the environment was not created by 'setup'");
                }
                Ok(())
            }
            "install" => {
                self.verify(stage, "setup")?;
                match self.read("install") {
                    None => fail("dependencies have not been installed"),
                    Some(stamp) if stamp.fingerprint != self.install_fingerprint()? => {
                        fail("requirement files changed since the last install")
                    }
                    Some(_) => Ok(()),
                }
            }
            "test" => {
                let Some(stamp) = self.read("test") else {
                    return fail("no successful test run is recorded");
                };
                match self.test_fingerprint()? {
                    None => fail("the coverage data file is missing"),
                    Some(current) if current != stamp.fingerprint => {
                        fail("the coverage data does not come from the last successful test run")
                    }
                    Some(_) => Ok(()),
                }
            }
            _ => fail("it produces no persistent state and did not run in this invocation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &Path) -> StateStore {
        StateStore::new(&GateConfig::default().rooted_at(dir), dir)
    }

    fn fake_interpreter(dir: &Path) {
        let python = GateConfig::default().rooted_at(dir).env_python();
        std::fs::create_dir_all(python.parent().unwrap()).unwrap();
        std::fs::write(python, "").unwrap();
    }

    #[test]
    fn test_stamp_round_trip_and_clear() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());

        assert!(store.read("setup").is_none());
        store.write("setup", "abc".into()).unwrap();
        assert_eq!(store.read("setup").unwrap().fingerprint, "abc");

        store.clear("setup").unwrap();
        assert!(store.read("setup").is_none());
        store.clear("setup").unwrap();
    }

    #[test]
    fn test_install_requires_environment() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());

        let err = store.verify("test", "install").unwrap_err();
        match err {
            GateError::DependencyNotSatisfied { dependency, reason, .. } => {
                assert_eq!(dependency, "install");
                assert!(reason.contains("interpreter"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_install_stamp_goes_stale_when_requirements_change() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        fake_interpreter(temp.path());
        std::fs::write(temp.path().join("requirements.txt"), "requests\n").unwrap();

        store.write("setup", String::new()).unwrap();
        store.write("install", store.install_fingerprint().unwrap()).unwrap();
        assert!(store.verify("mypy", "install").is_ok());
        assert!(store.install_current().unwrap());

        std::fs::write(temp.path().join("requirements.txt"), "requests\nbs4\n").unwrap();
        assert!(store.verify("mypy", "install").is_err());
        assert!(!store.install_current().unwrap());
    }

    #[test]
    fn test_test_stamp_must_match_coverage_data() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        let data = temp.path().join(".coverage");

        assert!(store.verify("coverage", "test").is_err());

        std::fs::write(&data, "run-1").unwrap();
        store
            .write("test", store.test_fingerprint().unwrap().unwrap())
            .unwrap();
        assert!(store.verify("coverage", "test").is_ok());

        std::fs::write(&data, "partial data from a failed run").unwrap();
        assert!(store.verify("coverage", "test").is_err());

        std::fs::remove_file(&data).unwrap();
        assert!(store.verify("coverage", "test").is_err());
    }

    #[test]
    fn test_stateless_stages_never_satisfy() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        assert!(store.verify("check", "mypy").is_err());
        assert!(store.verify("check", "linter").is_err());
    }

    #[test]
    fn test_model_changes_install_fingerprint() {
        let temp = TempDir::new().unwrap();
        let plain = store(temp.path());
        let with_model = StateStore::new(
            &GateConfig {
                nlp_model: Some("en_core_web_sm".into()),
                ..GateConfig::default()
            }
            .rooted_at(temp.path()),
            temp.path(),
        );

        assert_ne!(
            plain.install_fingerprint().unwrap(),
            with_model.install_fingerprint().unwrap()
        );
    }
}
