// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Gate configuration
//!
//! Defines the schema for `.qgate.yaml` / `qgate.toml`. Every field has a
//! default matching the qe2e project layout, so the file is optional.

mod loader;

pub use loader::{merge_values, ConfigOverrides, LoadOptions, LoadedConfig, PROJECT_FILES};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level gate configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateConfig {
    /// Package directory handed to the type checker, formatter and tests
    #[serde(default = "default_package")]
    pub package: PathBuf,

    /// Environment location
    #[serde(default = "default_environment")]
    pub environment: PathBuf,

    /// Interpreter used to create the environment
    #[serde(default = "default_python")]
    pub python: String,

    /// Requirement files (glob patterns), installed in order
    #[serde(default = "default_requirements")]
    pub requirements: Vec<String>,

    /// Natural-language model downloaded during install
    #[serde(default)]
    pub nlp_model: Option<String>,

    #[serde(default)]
    pub coverage: CoverageConfig,

    #[serde(default)]
    pub test: TestConfig,

    #[serde(default)]
    pub mypy: MypyConfig,

    #[serde(default)]
    pub formatter: FormatterConfig,

    #[serde(default)]
    pub system: SystemConfig,

    /// Wall-clock limit for a whole run (none by default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Wall-clock limit applied to the `ci` target
    #[serde(default = "default_ci_timeout")]
    pub ci_timeout_secs: u64,

    /// Extra environment variables for every tool invocation
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_package() -> PathBuf {
    PathBuf::from("qe2e")
}

fn default_environment() -> PathBuf {
    PathBuf::from(".venv")
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_requirements() -> Vec<String> {
    vec!["requirements.txt".into(), "requirements-dev.txt".into()]
}

fn default_ci_timeout() -> u64 {
    600
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            package: default_package(),
            environment: default_environment(),
            python: default_python(),
            requirements: default_requirements(),
            nlp_model: None,
            coverage: CoverageConfig::default(),
            test: TestConfig::default(),
            mypy: MypyConfig::default(),
            formatter: FormatterConfig::default(),
            system: SystemConfig::default(),
            timeout_secs: None,
            ci_timeout_secs: default_ci_timeout(),
            env: HashMap::new(),
        }
    }
}

impl GateConfig {
    /// Parse a configuration from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, crate::GateError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, crate::GateError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Interpreter inside the environment
    pub fn env_python(&self) -> PathBuf {
        if cfg!(windows) {
            self.environment.join("Scripts").join("python.exe")
        } else {
            self.environment.join("bin").join("python")
        }
    }

    /// Directory holding stage stamps
    pub fn state_dir(&self) -> PathBuf {
        self.environment.join(".qgate")
    }

    /// Lock file guarding the environment against concurrent runs
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .environment
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| ".venv".into());
        name.push(".lock");
        self.environment.with_file_name(name)
    }

    /// Omit pattern that keeps installed dependencies out of coverage
    pub fn coverage_omit(&self) -> String {
        format!("{}/*", self.environment.display())
    }

    /// Resolve every relative path against `base`
    pub fn rooted_at(mut self, base: &Path) -> Self {
        let root = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        };
        self.environment = root(&self.environment);
        self.coverage.data_file = root(&self.coverage.data_file);
        self.coverage.report_file = root(&self.coverage.report_file);
        self
    }

    /// Time limit for a target; `ci` always carries its own limit
    pub fn time_limit(&self, target: &str) -> Option<Duration> {
        if target == "ci" {
            Some(Duration::from_secs(self.ci_timeout_secs))
        } else {
            self.timeout_secs.map(Duration::from_secs)
        }
    }
}

/// Coverage measurement settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageConfig {
    /// Minimum acceptable percentage (inclusive)
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Decimal places the percentage is rounded to before comparison
    #[serde(default)]
    pub precision: u32,

    /// Measure branch coverage as well as statements
    #[serde(default = "default_true")]
    pub branch: bool,

    /// Instrumentation data written by the test stage
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// JSON report produced by the coverage stage
    #[serde(default = "default_report_file")]
    pub report_file: PathBuf,
}

fn default_threshold() -> f64 {
    80.0
}

fn default_true() -> bool {
    true
}

fn default_data_file() -> PathBuf {
    PathBuf::from(".coverage")
}

fn default_report_file() -> PathBuf {
    PathBuf::from("coverage.json")
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            precision: 0,
            branch: true,
            data_file: default_data_file(),
            report_file: default_report_file(),
        }
    }
}

/// Test runner settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestConfig {
    /// Collect doctests from the package modules
    #[serde(default = "default_true")]
    pub doctests: bool,

    /// Extra pytest arguments
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            doctests: true,
            args: vec![],
        }
    }
}

/// Type checker settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MypyConfig {
    /// Extra mypy arguments
    #[serde(default)]
    pub args: Vec<String>,
}

/// Formatter settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatterConfig {
    /// Python module invoked as `python -m <tool>`
    #[serde(default = "default_formatter")]
    pub tool: String,

    /// Arguments used in both modes
    #[serde(default)]
    pub args: Vec<String>,

    /// Arguments that switch the tool into non-mutating check mode
    #[serde(default = "default_check_args")]
    pub check_args: Vec<String>,
}

fn default_formatter() -> String {
    "black".to_string()
}

fn default_check_args() -> Vec<String> {
    vec!["--check".into(), "--diff".into()]
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            tool: default_formatter(),
            args: vec![],
            check_args: default_check_args(),
        }
    }
}

/// OS package settings for `setup_ubuntu`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemConfig {
    #[serde(default = "default_system_packages")]
    pub packages: Vec<String>,

    /// Prefix apt-get with sudo
    #[serde(default = "default_true")]
    pub sudo: bool,
}

fn default_system_packages() -> Vec<String> {
    vec![
        "python3".into(),
        "python3-venv".into(),
        "python3-pip".into(),
        "python3-dev".into(),
    ]
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            packages: default_system_packages(),
            sudo: true,
        }
    }
}
