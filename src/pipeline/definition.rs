// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Pipeline definition structures

use serde::Serialize;
use std::collections::BTreeMap;

/// Target run when no stage is named
pub const DEFAULT_TARGET: &str = "check";

/// The gate's stages
#[derive(Debug, Clone, Serialize)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// A single gate stage
#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    /// Stage name (unique within the pipeline)
    pub name: String,

    /// Human-readable description, shown by `qgate help`
    pub description: String,

    /// Stages that must have succeeded first
    pub depends_on: Vec<String>,

    /// Built-in behaviour wrapped around the commands
    pub kind: StageKind,

    /// External commands, run in order; the first failure fails the stage
    pub commands: Vec<CommandSpec>,
}

impl Stage {
    pub fn new(name: &str, description: &str, kind: StageKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            depends_on: vec![],
            kind,
            commands: vec![],
        }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn command(mut self, command: CommandSpec) -> Self {
        self.commands.push(command);
        self
    }
}

/// What a stage does besides running its commands
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// OS-level interpreter and toolchain packages
    SystemPackages,
    /// Creates (or reuses) the environment
    Environment,
    /// Installs dependencies into the environment
    Install,
    /// Static type checking
    TypeCheck,
    /// Canonical formatting, checked or applied
    Format(FormatMode),
    /// Test suite under coverage instrumentation
    Test,
    /// Coverage threshold enforcement
    Coverage,
    /// No action of its own; passes when its dependencies pass
    Aggregate,
}

impl StageKind {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate)
    }

    /// Stages whose completion is recorded in the environment
    pub fn persists_state(&self) -> bool {
        matches!(self, Self::Environment | Self::Install | Self::Test)
    }

    /// Stages that rewrite source files
    pub fn mutates_source(&self) -> bool {
        matches!(self, Self::Format(FormatMode::Apply))
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SystemPackages => write!(f, "system"),
            Self::Environment => write!(f, "environment"),
            Self::Install => write!(f, "install"),
            Self::TypeCheck => write!(f, "typecheck"),
            Self::Format(mode) => write!(f, "format:{}", mode),
            Self::Test => write!(f, "test"),
            Self::Coverage => write!(f, "coverage"),
            Self::Aggregate => write!(f, "aggregate"),
        }
    }
}

/// Formatter modes
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FormatMode {
    /// Report divergence without touching files
    Check,
    /// Rewrite files in place
    Apply,
}

impl std::fmt::Display for FormatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Check => write!(f, "check"),
            Self::Apply => write!(f, "apply"),
        }
    }
}

/// An external command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Variables set for this command only
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}
