// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! The standard qe2e stage catalog
//!
//! Builds the gate's stages from configuration. Tool invocations all go
//! through the environment interpreter (`python -m <tool>`) so nothing
//! depends on the environment's `bin/` being on `PATH`.

use std::path::Path;

use super::{CommandSpec, FormatMode, Pipeline, Stage, StageKind};
use crate::config::GateConfig;
use crate::state::resolve_patterns;

impl Pipeline {
    /// Build the standard pipeline for a configuration
    pub fn standard(config: &GateConfig, working_dir: &Path) -> Self {
        let python = config.env_python().to_string_lossy().to_string();
        let package = config.package.to_string_lossy().to_string();
        let tool = |module: &str| CommandSpec::new(python.clone(), ["-m", module]);

        let stages = vec![
            setup_ubuntu(config),
            Stage::new(
                "setup",
                "Create the isolated environment (reused when it already exists)",
                StageKind::Environment,
            )
            .command(
                CommandSpec::new(config.python.clone(), ["-m", "venv"])
                    .arg(config.environment.to_string_lossy()),
            ),
            install(config, working_dir, &python),
            Stage::new(
                "mypy",
                "Type check the package; fails on any type error",
                StageKind::TypeCheck,
            )
            .depends_on(&["install"])
            .command(tool("mypy").args(config.mypy.args.iter().cloned()).arg(&package)),
            Stage::new(
                "linter",
                "Check canonical formatting without modifying files",
                StageKind::Format(FormatMode::Check),
            )
            .depends_on(&["install"])
            .command(
                tool(&config.formatter.tool)
                    .args(config.formatter.args.iter().cloned())
                    .args(config.formatter.check_args.iter().cloned())
                    .arg(&package),
            ),
            Stage::new(
                "formatter",
                "Rewrite source files into canonical formatting in place",
                StageKind::Format(FormatMode::Apply),
            )
            .depends_on(&["install"])
            .command(
                tool(&config.formatter.tool)
                    .args(config.formatter.args.iter().cloned())
                    .arg(&package),
            ),
            test(config, &python, &package),
            coverage(config, &python),
            Stage::new(
                "check",
                "Aggregate gate: mypy, linter (check mode) and coverage must all pass",
                StageKind::Aggregate,
            )
            .depends_on(&["mypy", "linter", "coverage"]),
            Stage::new(
                "ci",
                "CI sequence: install, mypy, test and coverage under the CI time limit",
                StageKind::Aggregate,
            )
            .depends_on(&["install", "mypy", "test", "coverage"]),
        ];

        Self { stages }
    }
}

fn setup_ubuntu(config: &GateConfig) -> Stage {
    let apt = |args: Vec<String>| {
        if config.system.sudo {
            CommandSpec::new("sudo", ["apt-get"]).args(args)
        } else {
            CommandSpec::new("apt-get", args)
        }
    };

    let mut install = vec!["install".to_string(), "-y".to_string()];
    install.extend(config.system.packages.iter().cloned());

    Stage::new(
        "setup_ubuntu",
        "Install the OS interpreter and toolchain packages with apt-get",
        StageKind::SystemPackages,
    )
    .command(apt(vec!["update".into()]))
    .command(apt(install))
}

fn install(config: &GateConfig, working_dir: &Path, python: &str) -> Stage {
    let mut pip = CommandSpec::new(python, ["-m", "pip", "install"]);

    // Unmatched patterns are passed through so pip reports them
    for pattern in &config.requirements {
        let matches = resolve_patterns(&[pattern.as_str()], working_dir).unwrap_or_default();
        if matches.is_empty() {
            pip = pip.arg("-r").arg(pattern);
        }
        for path in matches {
            let shown = path.strip_prefix(working_dir).unwrap_or(&path);
            pip = pip.arg("-r").arg(shown.to_string_lossy());
        }
    }

    let mut stage = Stage::new(
        "install",
        "Install runtime and development dependencies (and the NLP model, if configured)",
        StageKind::Install,
    )
    .depends_on(&["setup"])
    .command(pip);

    if let Some(ref model) = config.nlp_model {
        stage = stage.command(CommandSpec::new(python, ["-m", "spacy", "download", model.as_str()]));
    }

    stage
}

fn test(config: &GateConfig, python: &str, package: &str) -> Stage {
    let mut cmd = CommandSpec::new(python, ["-m", "coverage", "run"]);
    if config.coverage.branch {
        cmd = cmd.arg("--branch");
    }
    cmd = cmd.args(["-m", "pytest"]);
    if config.test.doctests {
        cmd = cmd.arg("--doctest-modules");
    }
    cmd = cmd
        .args(config.test.args.iter().cloned())
        .arg(package)
        .with_env("COVERAGE_FILE", config.coverage.data_file.to_string_lossy());

    Stage::new(
        "test",
        "Run the test suite and doctests under statement/branch instrumentation",
        StageKind::Test,
    )
    .depends_on(&["install"])
    .command(cmd)
}

fn coverage(config: &GateConfig, python: &str) -> Stage {
    let data_file = config.coverage.data_file.to_string_lossy().to_string();
    let omit = format!("--omit={}", config.coverage_omit());
    // The threshold is ours to enforce; a project-level fail_under would exit early
    let fail_under = "--fail-under=0";

    Stage::new(
        "coverage",
        "Measure coverage from the last test run and enforce the minimum threshold",
        StageKind::Coverage,
    )
    .depends_on(&["test"])
    .command(
        CommandSpec::new(python, ["-m", "coverage", "report"])
            .arg(&omit)
            .arg(fail_under)
            .with_env("COVERAGE_FILE", &data_file),
    )
    .command(
        CommandSpec::new(python, ["-m", "coverage", "json", "-o"])
            .arg(config.coverage.report_file.to_string_lossy())
            .arg(&omit)
            .arg(fail_under)
            .with_env("COVERAGE_FILE", &data_file),
    )
}
