// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Process runner
//!
//! Spawns tools as child processes and captures their output.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use super::{ExecutionResult, Runner};
use crate::errors::GateError;
use crate::pipeline::CommandSpec;

/// Runs commands as real child processes
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a new process runner
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        working_dir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, GateError> {
        let start = Instant::now();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        cmd.current_dir(working_dir);
        cmd.envs(env);
        cmd.envs(&command.env);
        // A timed-out run drops this future; the child must not outlive it
        cmd.kill_on_drop(true);

        debug!(command = %command, dir = %working_dir.display(), "spawning");

        let output = cmd
            .output()
            .await
            .map_err(|e| GateError::spawn_failed(&command.program, e))?;

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        debug!(command = %command, exit_code, elapsed_ms = duration.as_millis() as u64, "finished");

        Ok(ExecutionResult {
            success: output.status.success(),
            stdout,
            stderr,
            exit_code,
            duration,
        })
    }

    async fn check_available(&self, program: &str) -> bool {
        if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
            Path::new(program).exists()
        } else {
            which::which(program).is_ok()
        }
    }
}
