// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Scripted runner
//!
//! Answers commands from a list of rules instead of spawning processes.
//! Rules match on a substring of the rendered command line; the first match
//! wins and unmatched commands succeed silently.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::{ExecutionResult, Runner};
use crate::errors::GateError;
use crate::pipeline::CommandSpec;

/// What a scripted command does
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    exit_code: i32,
    stdout: String,
    stderr: String,
    writes: Vec<(PathBuf, String)>,
    delay: Option<Duration>,
}

impl ScriptedResponse {
    /// Exit with status zero
    pub fn ok() -> Self {
        Self::default()
    }

    /// Exit with the given status
    pub fn fail(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub fn stdout(mut self, text: impl Into<String>) -> Self {
        self.stdout = text.into();
        self
    }

    pub fn stderr(mut self, text: impl Into<String>) -> Self {
        self.stderr = text.into();
        self
    }

    /// Write a file (relative paths resolve against the working directory)
    pub fn writes(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.writes.push((path.into(), content.into()));
        self
    }

    /// Sleep before answering
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Runner double driven by substring rules
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, ScriptedResponse)>,
    unavailable: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `pattern` with `response`
    pub fn on(mut self, pattern: impl Into<String>, response: ScriptedResponse) -> Self {
        self.rules.push((pattern.into(), response));
        self
    }

    /// Report a program as missing from `check_available`
    pub fn without_program(mut self, program: impl Into<String>) -> Self {
        self.unavailable.insert(program.into());
        self
    }

    /// Rendered command lines, in the order they ran
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Whether any command containing `pattern` ran
    pub fn ran(&self, pattern: &str) -> bool {
        self.calls().iter().any(|c| c.contains(pattern))
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        working_dir: &Path,
        _env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, GateError> {
        let rendered = command.to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(rendered.clone());
        }

        let response = self
            .rules
            .iter()
            .find(|(pattern, _)| rendered.contains(pattern.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_default();

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }

        for (path, content) in &response.writes {
            let path = working_dir.join(path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, content).await?;
        }

        Ok(ExecutionResult {
            success: response.exit_code == 0,
            stdout: response.stdout,
            stderr: response.stderr,
            exit_code: response.exit_code,
            duration: response.delay.unwrap_or_default(),
        })
    }

    async fn check_available(&self, program: &str) -> bool {
        !self.unavailable.contains(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_matching_rule_wins() {
        let runner = ScriptedRunner::new()
            .on("mypy", ScriptedResponse::fail(1).stdout("error"))
            .on("-m", ScriptedResponse::ok());

        let result = tokio_test::block_on(runner.run(
            &CommandSpec::new("python", ["-m", "mypy", "qe2e"]),
            Path::new("."),
            &HashMap::new(),
        ))
        .unwrap();

        assert!(!result.success);
        assert_eq!(result.stdout, "error");
        assert!(runner.ran("mypy qe2e"));
    }

    #[test]
    fn test_unmatched_commands_succeed() {
        let runner = ScriptedRunner::new();
        let result = tokio_test::block_on(runner.run(
            &CommandSpec::new("anything", Vec::<String>::new()),
            Path::new("."),
            &HashMap::new(),
        ))
        .unwrap();

        assert!(result.success);
        assert_eq!(runner.calls(), vec!["anything"]);
    }
}
