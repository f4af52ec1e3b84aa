// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Pipeline validation
//!
//! Validates the stage graph and configuration before execution.

use std::collections::HashSet;
use std::path::Path;

use crate::config::GateConfig;
use crate::errors::GateError;
use crate::pipeline::{DagBuilder, Pipeline, Stage};
use crate::report::coverage::MAX_PRECISION;
use crate::state::resolve_patterns;

/// Pipeline validator
pub struct GateValidator;

impl GateValidator {
    /// Validate the stage graph and the settings it is built from
    pub fn validate(pipeline: &Pipeline, config: &GateConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        if pipeline.stages.is_empty() {
            result.add_error("Pipeline has no stages defined");
        }

        let mut seen_names = HashSet::new();
        for stage in &pipeline.stages {
            if !seen_names.insert(&stage.name) {
                result.add_error(&format!("Duplicate stage name: '{}'", stage.name));
            }
        }

        match DagBuilder::build(pipeline) {
            Ok(_) => {}
            Err(GateError::CircularDependency { stages }) => {
                result.add_error(&format!("Circular dependency: {}", stages.join(" → ")));
            }
            Err(GateError::UnknownDependency { stage, dependency }) => {
                result.add_error(&format!(
                    "Stage '{}' depends on unknown stage '{}'",
                    stage, dependency
                ));
            }
            Err(e) => {
                result.add_error(&format!("DAG validation error: {}", e));
            }
        }

        for stage in &pipeline.stages {
            Self::validate_stage(stage, &mut result);
        }

        Self::validate_config(config, &mut result);

        result
    }

    fn validate_stage(stage: &Stage, result: &mut ValidationResult) {
        if stage.description.trim().is_empty() {
            result.add_error(&format!("Stage '{}': description is empty", stage.name));
        }

        if !stage.kind.is_aggregate() && stage.commands.is_empty() {
            result.add_error(&format!("Stage '{}': no commands to run", stage.name));
        }

        if stage.kind.is_aggregate() && stage.depends_on.is_empty() {
            result.add_warning(&format!(
                "Stage '{}': aggregate with no dependencies always passes",
                stage.name
            ));
        }
    }

    fn validate_config(config: &GateConfig, result: &mut ValidationResult) {
        let threshold = config.coverage.threshold;
        if !(0.0..=100.0).contains(&threshold) {
            result.add_error(&format!(
                "coverage.threshold must be between 0 and 100, got {}",
                threshold
            ));
        }

        if config.coverage.precision > MAX_PRECISION {
            result.add_error(&format!(
                "coverage.precision must be at most {}, got {}",
                MAX_PRECISION, config.coverage.precision
            ));
        } else if config.coverage.precision > 6 {
            result.add_warning(&format!(
                "coverage.precision of {} decimals is finer than coverage reports",
                config.coverage.precision
            ));
        }

        if config.timeout_secs == Some(0) {
            result.add_error("timeout_secs must be greater than zero");
        }
        if config.ci_timeout_secs == 0 {
            result.add_error("ci_timeout_secs must be greater than zero");
        }

        if config.requirements.is_empty() {
            result.add_warning("No requirement files configured; install will only create the environment");
        }

        if config.formatter.check_args.is_empty() {
            result.add_warning(
                "formatter.check_args is empty; the linter stage would rewrite files instead of checking them",
            );
        }
    }

    /// Checks that depend on the working tree (runtime validation)
    pub fn validate_environment(config: &GateConfig, working_dir: &Path) -> Vec<String> {
        let mut warnings = Vec::new();

        let package = working_dir.join(&config.package);
        if !package.is_dir() {
            warnings.push(format!("Package directory not found: {}", config.package.display()));
        }

        for pattern in &config.requirements {
            match resolve_patterns(&[pattern.as_str()], working_dir) {
                Ok(files) if files.is_empty() => {
                    warnings.push(format!("Requirement file pattern matches nothing: {}", pattern));
                }
                Ok(_) => {}
                Err(e) => warnings.push(e.to_string()),
            }
        }

        if which::which(&config.python).is_err() && !Path::new(&config.python).exists() {
            warnings.push(format!("Interpreter '{}' not found on PATH", config.python));
        }

        warnings
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
