// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for qgate.

pub mod clean;
pub mod graph;
pub mod help;
pub mod init;
pub mod run;
pub mod validate;
pub mod watch;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{ConfigOverrides, GateConfig, LoadOptions, LoadedConfig};
use crate::errors::GateResult;
use crate::pipeline::{ExecutionOptions, DEFAULT_TARGET};

/// Quality gate for the qe2e package
///
/// Creates an isolated environment, installs dependencies, and runs type
/// checking, formatting checks, tests and coverage in dependency order.
#[derive(Parser, Debug)]
#[clap(
    name = "qgate",
    version,
    about = "Quality gate pipeline: environment, type checks, formatting, tests and coverage",
    long_about = None,
    disable_help_subcommand = true,
    after_help = "Examples:\n\
        qgate                     Run the full gate (same as 'qgate check')\n\
        qgate test                Run the test suite and everything it needs\n\
        qgate coverage --no-deps  Re-check coverage from the last test run\n\
        qgate ci                  Run the CI sequence under its time limit\n\n\
        See 'qgate help' for every stage."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Project configuration file (default: .qgate.yaml, .qgate.yml or qgate.toml)
    #[clap(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ignore the per-user configuration file
    #[clap(long, global = true, env = "QGATE_NO_USER_CONFIG")]
    pub no_user_config: bool,

    /// Minimum coverage percentage
    #[clap(long, global = true, env = "QGATE_THRESHOLD", value_name = "PERCENT")]
    pub threshold: Option<f64>,

    /// Environment directory
    #[clap(long, global = true, env = "QGATE_ENV_DIR", value_name = "PATH")]
    pub env_dir: Option<PathBuf>,

    /// Package directory handed to the tools
    #[clap(long, global = true, env = "QGATE_PACKAGE", value_name = "PATH")]
    pub package: Option<PathBuf>,

    /// NLP model to download during install
    #[clap(long, global = true, env = "QGATE_NLP_MODEL", value_name = "NAME")]
    pub nlp_model: Option<String>,

    /// Wall-clock limit for the run, in seconds
    #[clap(long, global = true, env = "QGATE_TIMEOUT", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Run only the named stage; its dependencies must already be satisfied
    #[clap(long, global = true)]
    pub no_deps: bool,

    /// Show the plan and commands without running anything
    #[clap(long, global = true)]
    pub dry_run: bool,

    /// Re-run stages that are up to date (and let init overwrite)
    #[clap(long, global = true)]
    pub force: bool,

    /// Write a JSON run report
    #[clap(long, global = true, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Install the OS interpreter and toolchain packages (apt-get)
    #[clap(name = "setup_ubuntu", alias = "setup-ubuntu")]
    SetupUbuntu,

    /// Create the isolated environment
    Setup,

    /// Install runtime and development dependencies
    Install,

    /// Type check the package
    Mypy,

    /// Check formatting without modifying files
    Linter,

    /// Rewrite files into canonical formatting
    Formatter,

    /// Run tests and doctests under coverage
    Test,

    /// Enforce the coverage threshold
    Coverage,

    /// Run the aggregate gate (mypy, linter and coverage)
    Check,

    /// Run the CI sequence under the CI time limit
    Ci,

    /// List every command with its description
    Help,

    /// Show the stage graph
    Graph {
        /// Output format
        #[clap(short, long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// Validate configuration and the stage graph
    Validate,

    /// Write a default .qgate.yaml
    Init,

    /// Remove the environment, stamps and coverage artifacts
    Clean,

    /// Re-run a target whenever sources change
    Watch {
        /// Stage to run
        #[clap(default_value = DEFAULT_TARGET)]
        target: String,

        /// Debounce delay in milliseconds
        #[clap(long, default_value = "500")]
        debounce: u64,
    },
}

impl Commands {
    /// Stage run by this command, if it is a stage command
    pub fn stage_name(&self) -> Option<&'static str> {
        match self {
            Self::SetupUbuntu => Some("setup_ubuntu"),
            Self::Setup => Some("setup"),
            Self::Install => Some("install"),
            Self::Mypy => Some("mypy"),
            Self::Linter => Some("linter"),
            Self::Formatter => Some("formatter"),
            Self::Test => Some("test"),
            Self::Coverage => Some("coverage"),
            Self::Check => Some("check"),
            Self::Ci => Some("ci"),
            _ => None,
        }
    }
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// Everything a handler needs from the command line
#[derive(Debug, Clone)]
pub struct GateContext {
    pub working_dir: PathBuf,
    pub config: GateConfig,
    /// Configuration files that contributed to `config`
    pub sources: Vec<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub verbose: bool,
    pub no_deps: bool,
    pub dry_run: bool,
    pub force: bool,
    pub report: Option<PathBuf>,
}

impl GateContext {
    /// Resolve configuration for the current directory
    pub fn load(cli: &Cli) -> GateResult<Self> {
        let working_dir = std::env::current_dir()?;

        let mut options = LoadOptions::new(&working_dir);
        options.config_file = cli.config.clone();
        options.user_config = !cli.no_user_config;
        options.overrides = ConfigOverrides {
            threshold: cli.threshold,
            environment: cli.env_dir.clone(),
            package: cli.package.clone(),
            nlp_model: cli.nlp_model.clone(),
            timeout_secs: cli.timeout,
        };

        let LoadedConfig { config, sources } = LoadedConfig::load(&options)?;

        Ok(Self {
            working_dir,
            config,
            sources,
            config_file: cli.config.clone(),
            verbose: cli.verbose,
            no_deps: cli.no_deps,
            dry_run: cli.dry_run,
            force: cli.force,
            report: cli.report.clone(),
        })
    }

    /// Execution options for a target
    pub fn options(&self, target: &str) -> ExecutionOptions {
        ExecutionOptions {
            target: target.to_string(),
            no_deps: self.no_deps,
            dry_run: self.dry_run,
            force: self.force,
            verbose: self.verbose,
            time_limit: self.config.time_limit(target),
        }
    }
}
