// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Error types for the quality gate
//!
//! Every failure a gate run can produce maps onto one variant here, grouped
//! the same way the gate reports them: environment problems, static-check
//! violations, test failures and coverage shortfalls are kept apart so the
//! console (and CI log) tells the user which kind of problem stopped the run.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for qgate operations
pub type GateResult<T> = Result<T, GateError>;

/// Main error type for qgate
#[derive(Error, Debug, Diagnostic)]
pub enum GateError {
    // ─────────────────────────────────────────────────────────────────────────
    // Environment Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Interpreter '{interpreter}' not found on PATH")]
    #[diagnostic(
        code(qgate::interpreter_not_found),
        help("Install it (on Ubuntu: 'qgate setup_ubuntu') or point 'python' in .qgate.yaml at an existing interpreter")
    )]
    InterpreterNotFound { interpreter: String },

    #[error("Failed to create environment at {path}")]
    #[diagnostic(code(qgate::environment_create_failed))]
    EnvironmentCreateFailed {
        path: PathBuf,
        output: String,
        #[help]
        help: Option<String>,
    },

    #[error("Dependency installation failed in stage '{stage}'")]
    #[diagnostic(
        code(qgate::install_failed),
        help("Check the requirement files and your network connection, then re-run 'qgate install'")
    )]
    InstallFailed { stage: String, output: String },

    #[error("Environment {path} is in use by another run (lock held by {holder})")]
    #[diagnostic(
        code(qgate::environment_locked),
        help("Wait for the other run to finish, use a different --env-dir, or delete the .lock file if that run is gone")
    )]
    EnvironmentLocked { path: PathBuf, holder: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Static-check Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Type checking failed with {count} error(s)")]
    #[diagnostic(code(qgate::type_errors))]
    TypeCheckFailed {
        count: usize,
        diagnostics: Vec<String>,
        #[help]
        help: Option<String>,
    },

    #[error("Formatting check failed: {} file(s) would be reformatted", .files.len())]
    #[diagnostic(
        code(qgate::formatting_violations),
        help("Run 'qgate formatter' to rewrite the files in place")
    )]
    FormattingViolations { files: Vec<String>, output: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Test and Coverage Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Test suite failed{}", .failed.map(|n| format!(" ({n} failing)")).unwrap_or_default())]
    #[diagnostic(code(qgate::tests_failed))]
    TestsFailed {
        failed: Option<usize>,
        output: String,
    },

    #[error("Coverage {percent:.2}% is below the required {threshold}% (short by {shortfall:.2} points)")]
    #[diagnostic(
        code(qgate::coverage_below_threshold),
        help("Add tests for uncovered code, or lower coverage.threshold deliberately")
    )]
    CoverageBelowThreshold {
        percent: f64,
        threshold: f64,
        shortfall: f64,
    },

    #[error("Coverage report {path} is unusable: {reason}")]
    #[diagnostic(code(qgate::coverage_report_invalid))]
    CoverageReportInvalid { path: PathBuf, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Unknown stage '{stage}'")]
    #[diagnostic(
        code(qgate::unknown_stage),
        help("Run 'qgate help' to list available stages")
    )]
    UnknownStage { stage: String },

    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    #[diagnostic(code(qgate::unknown_dependency))]
    UnknownDependency { stage: String, dependency: String },

    #[error("Circular dependency detected: {}", .stages.join(" → "))]
    #[diagnostic(
        code(qgate::circular_dependency),
        help("Review stage dependencies to remove the cycle")
    )]
    CircularDependency { stages: Vec<String> },

    #[error("Stage '{stage}' requires '{dependency}': {reason}")]
    #[diagnostic(code(qgate::dependency_not_satisfied))]
    DependencyNotSatisfied {
        stage: String,
        dependency: String,
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Stage '{stage}' failed with exit code {exit_code}")]
    #[diagnostic(code(qgate::stage_failed))]
    StageFailed {
        stage: String,
        exit_code: i32,
        output: String,
    },

    #[error("Run exceeded its {}s time limit during stage '{stage}'", .limit.as_secs())]
    #[diagnostic(
        code(qgate::timeout),
        help("Raise timeout_secs / ci_timeout_secs or pass --timeout")
    )]
    Timeout { stage: String, limit: Duration },

    #[error("Run interrupted during stage '{stage}'")]
    #[diagnostic(code(qgate::interrupted))]
    Interrupted { stage: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Tool Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to launch '{program}': {error}")]
    #[diagnostic(code(qgate::spawn_failed))]
    SpawnFailed {
        program: String,
        error: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Invalid configuration: {reason}")]
    #[diagnostic(code(qgate::invalid_config))]
    InvalidConfig {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(qgate::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(qgate::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(qgate::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(qgate::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(qgate::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(qgate::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(qgate::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for GateError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for GateError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for GateError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for GateError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for GateError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

/// Broad error categories, used for reporting and exit summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Environment,
    StaticCheck,
    Test,
    Coverage,
    Pipeline,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Environment => write!(f, "environment"),
            Self::StaticCheck => write!(f, "static check"),
            Self::Test => write!(f, "test"),
            Self::Coverage => write!(f, "coverage"),
            Self::Pipeline => write!(f, "pipeline"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

impl GateError {
    /// Which part of the taxonomy this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InterpreterNotFound { .. }
            | Self::EnvironmentCreateFailed { .. }
            | Self::InstallFailed { .. }
            | Self::EnvironmentLocked { .. } => ErrorCategory::Environment,
            Self::TypeCheckFailed { .. } | Self::FormattingViolations { .. } => {
                ErrorCategory::StaticCheck
            }
            Self::TestsFailed { .. } => ErrorCategory::Test,
            Self::CoverageBelowThreshold { .. } | Self::CoverageReportInvalid { .. } => {
                ErrorCategory::Coverage
            }
            Self::UnknownStage { .. }
            | Self::UnknownDependency { .. }
            | Self::CircularDependency { .. }
            | Self::DependencyNotSatisfied { .. }
            | Self::StageFailed { .. }
            | Self::Timeout { .. }
            | Self::Interrupted { .. }
            | Self::SpawnFailed { .. } => ErrorCategory::Pipeline,
            Self::InvalidConfig { .. }
            | Self::FileReadError { .. }
            | Self::FileWriteError { .. }
            | Self::Io { .. }
            | Self::Yaml { .. }
            | Self::Json { .. }
            | Self::Toml { .. }
            | Self::GlobPattern { .. } => ErrorCategory::Configuration,
        }
    }

    /// Captured tool output attached to this error, if any
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            Self::EnvironmentCreateFailed { output, .. }
            | Self::InstallFailed { output, .. }
            | Self::FormattingViolations { output, .. }
            | Self::TestsFailed { output, .. }
            | Self::StageFailed { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }

    /// Create a dependency error with a hint to run the missing stage first
    pub fn dependency_not_satisfied(stage: &str, dependency: &str, reason: impl Into<String>) -> Self {
        Self::DependencyNotSatisfied {
            stage: stage.to_string(),
            dependency: dependency.to_string(),
            reason: reason.into(),
            help: Some(RecoverySuggestion::run_stage_first(dependency).action),
        }
    }

    /// Create a spawn error with a hint tailored to the program
    pub fn spawn_failed(program: &str, error: impl std::fmt::Display) -> Self {
        let help = if program.ends_with("python") || program.ends_with("python3") {
            Some("The environment interpreter is missing; run 'qgate setup'".to_string())
        } else {
            Some(format!("Install {} and ensure it's in your PATH", program))
        };

        Self::SpawnFailed {
            program: program.to_string(),
            error: error.to_string(),
            help,
        }
    }

    /// Create a type check error, attaching a hint when mypy could not find modules
    pub fn type_check_failed(count: usize, diagnostics: Vec<String>) -> Self {
        let help = if diagnostics
            .iter()
            .any(|d| d.contains("import-untyped") || d.contains("Cannot find implementation"))
        {
            Some("Some imports have no type information; add stubs to requirements-dev.txt or a mypy ignore".into())
        } else {
            None
        };

        Self::TypeCheckFailed {
            count,
            diagnostics,
            help,
        }
    }
}
