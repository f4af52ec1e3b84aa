// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for getting a failed gate back on track.

use super::GateError;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Suggest running a prerequisite stage
    pub fn run_stage_first(stage: &str) -> Self {
        Self {
            action: format!("Run 'qgate {}' first", stage),
            steps: vec![format!(
                "Stage '{}' has not completed successfully for the current environment",
                stage
            )],
            commands: vec![format!("qgate {}", stage)],
        }
    }

    /// Suggest installing the interpreter
    pub fn install_interpreter(interpreter: &str) -> Self {
        Self {
            action: format!("Install {}", interpreter),
            steps: vec![
                "The environment is created from a system interpreter".into(),
                "Choose an installation method below".into(),
            ],
            commands: vec![
                "# On Ubuntu:".into(),
                "qgate setup_ubuntu".into(),
                "".into(),
                "# Or point qgate at an existing interpreter:".into(),
                "echo 'python: /usr/bin/python3.11' >> .qgate.yaml".into(),
            ],
        }
    }

    /// Suggest fixing a formatting divergence
    pub fn apply_formatting() -> Self {
        Self {
            action: "Apply canonical formatting".into(),
            steps: vec![
                "The formatter reported files that diverge from the canonical style".into(),
                "Rewrite them in place, review the diff and commit".into(),
            ],
            commands: vec!["qgate formatter".into(), "git diff".into()],
        }
    }

    /// Suggest recovering from a stale lock
    pub fn release_lock(lock_path: &str) -> Self {
        Self {
            action: "Release the environment lock".into(),
            steps: vec![
                "Another run holds the environment, or a previous run was killed".into(),
                "Only remove the lock if no other qgate process is running".into(),
            ],
            commands: vec![format!("rm {}", lock_path)],
        }
    }

    /// Pick a suggestion for an error, if there is a useful one
    pub fn for_error(error: &GateError) -> Option<Self> {
        match error {
            GateError::InterpreterNotFound { interpreter } => {
                Some(Self::install_interpreter(interpreter))
            }
            GateError::DependencyNotSatisfied { dependency, .. } => {
                Some(Self::run_stage_first(dependency))
            }
            GateError::FormattingViolations { .. } => Some(Self::apply_formatting()),
            GateError::EnvironmentLocked { path, .. } => {
                Some(Self::release_lock(&format!("{}.lock", path.display())))
            }
            GateError::InstallFailed { .. } => Some(Self {
                action: "Retry the installation".into(),
                steps: vec!["Fix the failing requirement, then re-run install".into()],
                commands: vec!["qgate install --force".into()],
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_for_formatting() {
        let err = GateError::FormattingViolations {
            files: vec!["qe2e/core.py".into()],
            output: String::new(),
        };
        let suggestion = RecoverySuggestion::for_error(&err).unwrap();
        assert!(suggestion.commands.contains(&"qgate formatter".to_string()));
    }

    #[test]
    fn test_no_suggestion_for_coverage() {
        let err = GateError::CoverageBelowThreshold {
            percent: 50.0,
            threshold: 80.0,
            shortfall: 30.0,
        };
        assert!(RecoverySuggestion::for_error(&err).is_none());
    }

    #[test]
    fn test_display_lists_commands() {
        let text = RecoverySuggestion::run_stage_first("setup").to_string();
        assert!(text.starts_with("→ Run 'qgate setup' first"));
        assert!(text.contains("  qgate setup"));
    }
}
