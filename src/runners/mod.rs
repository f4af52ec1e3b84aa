// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Tool runners
//!
//! Every external tool the gate invokes goes through the [`Runner`] trait.
//! [`ProcessRunner`] spawns real processes. Unit tests drive the pipeline
//! with a scripted runner instead.

mod process;
#[cfg(test)]
mod scripted;

pub use process::ProcessRunner;
#[cfg(test)]
pub(crate) use scripted::{ScriptedResponse, ScriptedRunner};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::GateError;
use crate::pipeline::CommandSpec;

/// Result of running one command
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the command exited with status zero
    pub success: bool,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code (-1 when killed by a signal)
    pub exit_code: i32,

    /// Execution duration
    pub duration: Duration,
}

impl ExecutionResult {
    /// Create a successful result
    pub fn success(stdout: String, duration: Duration) -> Self {
        Self {
            success: true,
            stdout,
            stderr: String::new(),
            exit_code: 0,
            duration,
        }
    }

    /// Create a failed result
    pub fn failure(stderr: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr,
            exit_code,
            duration,
        }
    }

    /// stdout followed by stderr, for verbatim failure reports
    pub fn combined_output(&self) -> String {
        match (self.stdout.trim_end(), self.stderr.trim_end()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }
}

/// Trait for tool runners
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command to completion
    ///
    /// # Arguments
    /// * `command` - Program, arguments and command-specific environment
    /// * `working_dir` - The working directory for execution
    /// * `env` - Environment variables shared by the whole run
    async fn run(
        &self,
        command: &CommandSpec,
        working_dir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, GateError>;

    /// Check whether a program can be launched
    async fn check_available(&self, program: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let mut result = ExecutionResult::success("out\n".into(), Duration::ZERO);
        assert_eq!(result.combined_output(), "out");

        result.stderr = "err\n".into();
        assert_eq!(result.combined_output(), "out\nerr");

        let failed = ExecutionResult::failure("boom".into(), 2, Duration::ZERO);
        assert_eq!(failed.combined_output(), "boom");
    }
}
