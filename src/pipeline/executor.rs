// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Pipeline executor
//!
//! Runs a target's stages in dependency order, one at a time, stopping at
//! the first failure.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::errors::{GateError, GateResult};
use crate::pipeline::{DagBuilder, EnvironmentLock, FormatMode, Pipeline, Stage, StageKind};
use crate::report::coverage::{self, CoverageMeasurement, CoverageTotals};
use crate::report::diagnostics;
use crate::runners::Runner;
use crate::state::StateStore;
use crate::utils::create_spinner;

/// Pipeline execution options
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Stage to run
    pub target: String,
    /// Run only the target, checking its dependencies against stamps
    pub no_deps: bool,
    /// Only show what would be done
    pub dry_run: bool,
    /// Re-run stages that are up to date
    pub force: bool,
    /// Print tool output for passing stages too
    pub verbose: bool,
    /// Wall-clock limit for the whole run
    pub time_limit: Option<Duration>,
}

impl ExecutionOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            no_deps: false,
            dry_run: false,
            force: false,
            verbose: false,
            time_limit: None,
        }
    }
}

/// How a stage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Passed,
    /// Skipped because its persisted state is current
    UpToDate,
    Failed,
    /// Never started (dry run, or an earlier stage failed)
    NotRun,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::UpToDate => write!(f, "up_to_date"),
            Self::Failed => write!(f, "failed"),
            Self::NotRun => write!(f, "not_run"),
        }
    }
}

/// Per-stage record of a run
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub name: String,
    pub status: StageStatus,
    pub duration: Duration,
    pub exit_code: Option<i32>,
    pub output: String,
}

impl StageOutcome {
    fn not_run(stage: &Stage) -> Self {
        Self {
            name: stage.name.clone(),
            status: StageStatus::NotRun,
            duration: Duration::ZERO,
            exit_code: None,
            output: String::new(),
        }
    }
}

/// Result of executing a target
#[derive(Debug)]
pub struct PipelineResult {
    pub target: String,
    /// Every planned stage, in execution order
    pub outcomes: Vec<StageOutcome>,
    /// Total execution time
    pub duration: Duration,
    /// Whether every planned stage succeeded
    pub success: bool,
    /// The error that stopped the run
    pub failure: Option<GateError>,
    /// Coverage, when the coverage stage passed
    pub coverage: Option<CoverageMeasurement>,
}

impl PipelineResult {
    pub fn outcome(&self, stage: &str) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.name == stage)
    }

    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.outcome(stage).map(|o| o.status)
    }
}

/// What a successful stage produced
struct StageReport {
    status: StageStatus,
    output: String,
    coverage: Option<CoverageMeasurement>,
}

impl StageReport {
    fn passed(output: String) -> Self {
        Self {
            status: StageStatus::Passed,
            output,
            coverage: None,
        }
    }

    fn up_to_date() -> Self {
        Self {
            status: StageStatus::UpToDate,
            output: String::new(),
            coverage: None,
        }
    }
}

/// Output of a stage's commands; `failed` holds the first nonzero exit
struct CommandsOutcome {
    output: String,
    failed: Option<i32>,
}

/// Gate executor
pub struct GateExecutor {
    config: GateConfig,
    working_dir: PathBuf,
    runner: Box<dyn Runner>,
    state: StateStore,
    /// Replaces the process signals as the interrupt source
    interrupt: Option<Arc<Notify>>,
}

impl GateExecutor {
    /// Create a new executor; `config` paths should already be rooted
    pub fn new(config: GateConfig, working_dir: &Path, runner: Box<dyn Runner>) -> Self {
        let state = StateStore::new(&config, working_dir);
        Self {
            config,
            working_dir: working_dir.to_path_buf(),
            runner,
            state,
            interrupt: None,
        }
    }

    #[cfg(test)]
    fn with_interrupt(mut self, interrupt: Arc<Notify>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Resolves when the run should be abandoned
    async fn interrupted(&self) {
        match &self.interrupt {
            Some(notify) => notify.notified().await,
            None => shutdown_signal().await,
        }
    }

    /// Execute a target
    ///
    /// Definition errors and lock contention are returned as `Err`; a stage
    /// failure is reported through [`PipelineResult::failure`].
    pub async fn execute(&self, pipeline: &Pipeline, options: &ExecutionOptions) -> GateResult<PipelineResult> {
        let start = Instant::now();

        let dag = DagBuilder::build(pipeline)?;
        let target = pipeline
            .get_stage(&options.target)
            .ok_or_else(|| GateError::UnknownStage {
                stage: options.target.clone(),
            })?;

        let plan: Vec<usize> = if options.no_deps && !target.kind.is_aggregate() {
            dag.execution_order(pipeline, &target.name)?
                .into_iter()
                .filter(|idx| pipeline.stages[*idx].name == target.name)
                .collect()
        } else {
            dag.execution_order(pipeline, &target.name)?
        };

        self.print_execution_plan(pipeline, &plan, options);

        if options.dry_run {
            return Ok(PipelineResult {
                target: target.name.clone(),
                outcomes: plan.iter().map(|idx| StageOutcome::not_run(&pipeline.stages[*idx])).collect(),
                duration: start.elapsed(),
                success: true,
                failure: None,
                coverage: None,
            });
        }

        let _lock = EnvironmentLock::acquire(&self.config.lock_path())?;
        let deadline = options.time_limit.map(|limit| tokio::time::Instant::now() + limit);

        // Dropping a stage future kills its child; the lock goes with this frame
        let interrupt = self.interrupted();
        tokio::pin!(interrupt);

        let mut completed: HashSet<&str> = HashSet::new();
        let mut outcomes = Vec::with_capacity(plan.len());
        let mut failure = None;
        let mut coverage = None;

        for &idx in &plan {
            let stage = &pipeline.stages[idx];

            if failure.is_some() {
                outcomes.push(StageOutcome::not_run(stage));
                continue;
            }

            info!(stage = %stage.name, kind = %stage.kind, "stage starting");
            let stage_start = Instant::now();
            let spinner = create_spinner(&format!("{}...", stage.name));

            let run = async {
                self.check_dependencies(pipeline, stage, &completed)?;
                self.run_stage(stage, options).await
            };

            let bounded = async {
                match (deadline, options.time_limit) {
                    (Some(deadline), Some(limit)) => match tokio::time::timeout_at(deadline, run).await {
                        Ok(result) => result,
                        Err(_) => Err(GateError::Timeout {
                            stage: stage.name.clone(),
                            limit,
                        }),
                    },
                    _ => run.await,
                }
            };

            let result = tokio::select! {
                result = bounded => result,
                _ = &mut interrupt => Err(GateError::Interrupted {
                    stage: stage.name.clone(),
                }),
            };

            spinner.finish_and_clear();
            let duration = stage_start.elapsed();

            match result {
                Ok(report) => {
                    match report.status {
                        StageStatus::UpToDate => {
                            println!("  {} {} {}", "✓".green(), stage.name.bold(), "(up to date)".dimmed())
                        }
                        _ => println!(
                            "  {} {} ({:.2}s)",
                            "✓".green(),
                            stage.name.bold(),
                            duration.as_secs_f64()
                        ),
                    }

                    let show_output = options.verbose || stage.kind == StageKind::Coverage;
                    if show_output && !report.output.is_empty() {
                        println!("{}", report.output);
                    }

                    info!(stage = %stage.name, status = %report.status, "stage finished");
                    if report.coverage.is_some() {
                        coverage = report.coverage;
                    }

                    completed.insert(stage.name.as_str());
                    outcomes.push(StageOutcome {
                        name: stage.name.clone(),
                        status: report.status,
                        duration,
                        exit_code: Some(0),
                        output: report.output,
                    });
                }
                Err(e) => {
                    println!("  {} {} failed", "✗".red(), stage.name.bold());

                    let output = match &e {
                        GateError::TypeCheckFailed { diagnostics, .. } => diagnostics.join("\n"),
                        _ => e.tool_output().unwrap_or_default().to_string(),
                    };
                    if !output.is_empty() {
                        eprintln!("{}", output);
                    }

                    warn!(stage = %stage.name, error = %e, "stage failed");
                    outcomes.push(StageOutcome {
                        name: stage.name.clone(),
                        status: StageStatus::Failed,
                        duration,
                        exit_code: match &e {
                            GateError::StageFailed { exit_code, .. } => Some(*exit_code),
                            _ => None,
                        },
                        output,
                    });
                    failure = Some(e);
                }
            }
        }

        let duration = start.elapsed();
        let success = failure.is_none();

        println!();
        if success {
            println!(
                "{}",
                format!("{} passed in {:.2}s", target.name, duration.as_secs_f64()).green()
            );
        } else {
            println!(
                "{}",
                format!("{} failed after {:.2}s", target.name, duration.as_secs_f64()).red()
            );
        }

        Ok(PipelineResult {
            target: target.name.clone(),
            outcomes,
            duration,
            success,
            failure,
            coverage,
        })
    }

    /// Dependencies not run in this invocation must be satisfied by stamps
    fn check_dependencies(&self, pipeline: &Pipeline, stage: &Stage, completed: &HashSet<&str>) -> GateResult<()> {
        for dep in &stage.depends_on {
            if completed.contains(dep.as_str()) {
                continue;
            }

            let persisted = pipeline.get_stage(dep).is_some_and(|s| s.kind.persists_state());
            if !persisted {
                return Err(GateError::dependency_not_satisfied(
                    &stage.name,
                    dep,
                    "it produces no persistent state and did not run in this invocation",
                ));
            }

            debug!(stage = %stage.name, dependency = %dep, "verifying dependency from stamps");
            self.state.verify(&stage.name, dep)?;
        }
        Ok(())
    }

    async fn run_stage(&self, stage: &Stage, options: &ExecutionOptions) -> GateResult<StageReport> {
        match stage.kind {
            StageKind::Aggregate => Ok(StageReport::passed(String::new())),
            StageKind::SystemPackages => {
                let run = self.run_commands(stage).await?;
                match run.failed {
                    None => Ok(StageReport::passed(run.output)),
                    Some(_) => Err(GateError::InstallFailed {
                        stage: stage.name.clone(),
                        output: run.output,
                    }),
                }
            }
            StageKind::Environment => self.run_environment(stage, options).await,
            StageKind::Install => self.run_install(stage, options).await,
            StageKind::TypeCheck => {
                let run = self.run_commands(stage).await?;
                match run.failed {
                    None => Ok(StageReport::passed(run.output)),
                    Some(code) => {
                        let errors = diagnostics::parse_mypy(&run.output);
                        if errors.count > 0 {
                            Err(GateError::type_check_failed(errors.count, errors.lines))
                        } else {
                            Err(stage_failed(stage, code, run.output))
                        }
                    }
                }
            }
            StageKind::Format(mode) => {
                let run = self.run_commands(stage).await?;
                match (run.failed, mode) {
                    (None, _) => Ok(StageReport::passed(run.output)),
                    (Some(code), FormatMode::Check) => {
                        let files = diagnostics::parse_black(&run.output);
                        if files.is_empty() {
                            Err(stage_failed(stage, code, run.output))
                        } else {
                            Err(GateError::FormattingViolations {
                                files,
                                output: run.output,
                            })
                        }
                    }
                    // Apply mode only fails when the tool itself could not run
                    (Some(code), FormatMode::Apply) => Err(stage_failed(stage, code, run.output)),
                }
            }
            StageKind::Test => self.run_tests(stage).await,
            StageKind::Coverage => self.run_coverage(stage).await,
        }
    }

    async fn run_environment(&self, stage: &Stage, options: &ExecutionOptions) -> GateResult<StageReport> {
        if !options.force && self.state.environment_ready() {
            debug!(path = %self.config.environment.display(), "reusing environment");
            return Ok(StageReport::up_to_date());
        }

        if !self.runner.check_available(&self.config.python).await {
            return Err(GateError::InterpreterNotFound {
                interpreter: self.config.python.clone(),
            });
        }

        let run = self.run_commands(stage).await?;
        if run.failed.is_some() {
            return Err(GateError::EnvironmentCreateFailed {
                path: self.config.environment.clone(),
                output: run.output,
                help: Some(format!(
                    "Check that '{}' can create virtual environments (the venv module may need installing; see 'qgate setup_ubuntu')",
                    self.config.python
                )),
            });
        }

        if !self.state.interpreter_present() {
            return Err(GateError::EnvironmentCreateFailed {
                path: self.config.environment.clone(),
                output: format!("no interpreter at {}", self.config.env_python().display()),
                help: None,
            });
        }

        self.state.write(&stage.name, self.config.python.clone())?;
        Ok(StageReport::passed(run.output))
    }

    async fn run_install(&self, stage: &Stage, options: &ExecutionOptions) -> GateResult<StageReport> {
        if !options.force && self.state.install_current()? {
            return Ok(StageReport::up_to_date());
        }

        self.state.clear(&stage.name)?;

        let run = self.run_commands(stage).await?;
        if run.failed.is_some() {
            return Err(GateError::InstallFailed {
                stage: stage.name.clone(),
                output: run.output,
            });
        }

        self.state.write(&stage.name, self.state.install_fingerprint()?)?;
        Ok(StageReport::passed(run.output))
    }

    async fn run_tests(&self, stage: &Stage) -> GateResult<StageReport> {
        self.state.clear(&stage.name)?;

        let run = self.run_commands(stage).await?;
        if run.failed.is_some() {
            return Err(GateError::TestsFailed {
                failed: diagnostics::parse_pytest_failures(&run.output),
                output: run.output,
            });
        }

        let data_file = &self.config.coverage.data_file;
        let Some(fingerprint) = self.state.test_fingerprint()? else {
            return Err(GateError::CoverageReportInvalid {
                path: data_file.clone(),
                reason: "the test run left no coverage data".into(),
            });
        };

        self.state.write(&stage.name, fingerprint)?;
        Ok(StageReport::passed(run.output))
    }

    async fn run_coverage(&self, stage: &Stage) -> GateResult<StageReport> {
        let report_file = &self.config.coverage.report_file;
        if report_file.exists() {
            std::fs::remove_file(report_file)?;
        }

        let run = self.run_commands(stage).await?;
        if let Some(code) = run.failed {
            return Err(stage_failed(stage, code, run.output));
        }

        let totals = CoverageTotals::from_file(report_file)?;
        let measurement = coverage::evaluate(
            totals,
            self.config.coverage.threshold,
            self.config.coverage.precision,
        )?;
        info!(
            percent = measurement.percent,
            threshold = measurement.threshold,
            "coverage measured"
        );

        Ok(StageReport {
            status: StageStatus::Passed,
            output: run.output,
            coverage: Some(measurement),
        })
    }

    /// Run a stage's commands in order, stopping at the first failure
    async fn run_commands(&self, stage: &Stage) -> GateResult<CommandsOutcome> {
        let mut outputs = Vec::new();

        for command in &stage.commands {
            debug!(stage = %stage.name, command = %command, "running");
            let result = self.runner.run(command, &self.working_dir, &self.config.env).await?;

            let output = result.combined_output();
            if !output.is_empty() {
                outputs.push(output);
            }

            if !result.success {
                return Ok(CommandsOutcome {
                    output: outputs.join("\n"),
                    failed: Some(result.exit_code),
                });
            }
        }

        Ok(CommandsOutcome {
            output: outputs.join("\n"),
            failed: None,
        })
    }

    fn print_execution_plan(&self, pipeline: &Pipeline, stages: &[usize], options: &ExecutionOptions) {
        println!();
        println!("{}: {}", "Target".bold(), options.target);
        println!("{}", "═".repeat(50));
        println!(
            "Execution plan ({} stage{}):",
            stages.len(),
            if stages.len() == 1 { "" } else { "s" }
        );
        println!();

        for (i, &idx) in stages.iter().enumerate() {
            let stage = &pipeline.stages[idx];

            print!("  {}. {} ({})", i + 1, stage.name.bold(), stage.kind);
            if !stage.depends_on.is_empty() {
                print!(" {}", format!("[depends: {}]", stage.depends_on.join(", ")).dimmed());
            }
            println!();

            if options.dry_run {
                for command in &stage.commands {
                    println!("       {} {}", "$".dimmed(), command);
                }
            }
        }

        println!();
    }
}

/// Wait for Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                Ok(()) = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
            return;
        }
    }

    if tokio::signal::ctrl_c().await.is_err() {
        warn!("cannot listen for Ctrl-C; runs can only be stopped by their time limit");
        std::future::pending::<()>().await;
    }
}

fn stage_failed(stage: &Stage, exit_code: i32, output: String) -> GateError {
    GateError::StageFailed {
        stage: stage.name.clone(),
        exit_code,
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runners::{ScriptedResponse, ScriptedRunner};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> GateConfig {
        GateConfig::default().rooted_at(dir)
    }

    fn coverage_json(percent: f64) -> String {
        format!(
            r#"{{"totals": {{"percent_covered": {}, "covered_lines": 0, "num_statements": 0}}}}"#,
            percent
        )
    }

    /// Append rules for a toolchain where every command succeeds
    fn healthy(runner: ScriptedRunner, config: &GateConfig, percent: f64) -> ScriptedRunner {
        runner
            .on("-m venv", ScriptedResponse::ok().writes(config.env_python(), ""))
            .on(
                "coverage run",
                ScriptedResponse::ok()
                    .stdout("==== 12 passed in 0.20s ====")
                    .writes(config.coverage.data_file.clone(), "data"),
            )
            .on(
                "coverage json",
                ScriptedResponse::ok().writes(config.coverage.report_file.clone(), coverage_json(percent)),
            )
            .on("coverage report", ScriptedResponse::ok().stdout("TOTAL  100  20  80%"))
    }

    /// Runner shared between the executor and the test's assertions
    struct Shared(Arc<ScriptedRunner>);

    #[async_trait::async_trait]
    impl Runner for Shared {
        async fn run(
            &self,
            command: &crate::pipeline::CommandSpec,
            working_dir: &Path,
            env: &std::collections::HashMap<String, String>,
        ) -> GateResult<crate::runners::ExecutionResult> {
            self.0.run(command, working_dir, env).await
        }

        async fn check_available(&self, program: &str) -> bool {
            self.0.check_available(program).await
        }
    }

    async fn run(
        dir: &Path,
        config: &GateConfig,
        runner: &Arc<ScriptedRunner>,
        options: ExecutionOptions,
    ) -> GateResult<PipelineResult> {
        let pipeline = Pipeline::standard(config, dir);
        let executor = GateExecutor::new(config.clone(), dir, Box::new(Shared(runner.clone())));
        executor.execute(&pipeline, &options).await
    }

    #[tokio::test]
    async fn test_check_passes_on_healthy_package() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = Arc::new(healthy(ScriptedRunner::new(), &config, 85.0));

        let result = run(temp.path(), &config, &runner, ExecutionOptions::new("check"))
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.failure);
        let order: Vec<_> = result.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            order,
            vec!["setup", "install", "mypy", "linter", "test", "coverage", "check"]
        );
        assert_eq!(result.coverage.unwrap().percent, 85.0);
        assert!(!runner.calls().iter().any(|c| c.contains("black") && !c.contains("--check")));
        assert!(!temp.path().join(".venv.lock").exists());
    }

    #[tokio::test]
    async fn test_check_fails_unless_every_gate_passes() {
        for mypy_ok in [true, false] {
            for lint_ok in [true, false] {
                for coverage_ok in [true, false] {
                    let temp = TempDir::new().unwrap();
                    let config = config_in(temp.path());

                    let mut runner = ScriptedRunner::new();
                    if !mypy_ok {
                        runner = runner.on(
                            "-m mypy",
                            ScriptedResponse::fail(1).stdout(
                                "qe2e/core.py:3: error: Missing return statement  [return]\nFound 1 error in 1 file (checked 2 source files)",
                            ),
                        );
                    }
                    if !lint_ok {
                        runner = runner.on(
                            "-m black",
                            ScriptedResponse::fail(1).stderr("would reformat qe2e/core.py\n1 file would be reformatted."),
                        );
                    }
                    let percent = if coverage_ok { 90.0 } else { 50.0 };
                    let runner = Arc::new(healthy(runner, &config, percent));

                    let result = run(temp.path(), &config, &runner, ExecutionOptions::new("check"))
                        .await
                        .unwrap();

                    assert_eq!(
                        result.success,
                        mypy_ok && lint_ok && coverage_ok,
                        "mypy={} lint={} coverage={}",
                        mypy_ok,
                        lint_ok,
                        coverage_ok
                    );
                    assert_eq!(result.status("check") == Some(StageStatus::Passed), result.success);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_type_errors_are_reported_in_full() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = ScriptedRunner::new().on(
            "-m mypy",
            ScriptedResponse::fail(1).stdout(
                "qe2e/a.py:1: error: one  [misc]\nqe2e/b.py:2: error: two  [misc]\nFound 2 errors in 2 files (checked 2 source files)",
            ),
        );
        let runner = Arc::new(healthy(runner, &config, 90.0));

        let result = run(temp.path(), &config, &runner, ExecutionOptions::new("mypy"))
            .await
            .unwrap();

        match result.failure {
            Some(GateError::TypeCheckFailed { count, diagnostics, .. }) => {
                assert_eq!(count, 2);
                assert_eq!(diagnostics.len(), 2);
            }
            other => panic!("expected type errors, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_coverage_at_threshold_passes_and_one_below_fails() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = Arc::new(healthy(ScriptedRunner::new(), &config, 80.0));
        let result = run(temp.path(), &config, &runner, ExecutionOptions::new("coverage"))
            .await
            .unwrap();
        assert!(result.success);

        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = Arc::new(healthy(ScriptedRunner::new(), &config, 79.0));
        let result = run(temp.path(), &config, &runner, ExecutionOptions::new("coverage"))
            .await
            .unwrap();

        match result.failure {
            Some(GateError::CoverageBelowThreshold { shortfall, .. }) => assert_eq!(shortfall, 1.0),
            other => panic!("expected coverage shortfall, got {:?}", other),
        }
        assert!(result.coverage.is_none());
    }

    #[tokio::test]
    async fn test_failed_tests_block_coverage() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = ScriptedRunner::new().on(
            "coverage run",
            ScriptedResponse::fail(1).stdout("==== 2 failed, 10 passed in 0.31s ===="),
        );
        let runner = Arc::new(healthy(runner, &config, 95.0));

        let result = run(temp.path(), &config, &runner, ExecutionOptions::new("check"))
            .await
            .unwrap();

        assert!(matches!(
            result.failure,
            Some(GateError::TestsFailed { failed: Some(2), .. })
        ));
        assert!(!runner.ran("coverage report"));
        assert!(!runner.ran("coverage json"));
        assert!(result.coverage.is_none());
        assert_eq!(result.status("coverage"), Some(StageStatus::NotRun));
    }

    #[tokio::test]
    async fn test_no_deps_before_install_fails() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = Arc::new(healthy(ScriptedRunner::new(), &config, 90.0));

        let mut options = ExecutionOptions::new("test");
        options.no_deps = true;
        let result = run(temp.path(), &config, &runner, options).await.unwrap();

        match result.failure {
            Some(GateError::DependencyNotSatisfied { stage, dependency, .. }) => {
                assert_eq!(stage, "test");
                assert_eq!(dependency, "install");
            }
            other => panic!("expected unsatisfied dependency, got {:?}", other),
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_deps_uses_stamps_from_earlier_runs() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = Arc::new(healthy(ScriptedRunner::new(), &config, 90.0));

        let result = run(temp.path(), &config, &runner, ExecutionOptions::new("test"))
            .await
            .unwrap();
        assert!(result.success);

        let mut options = ExecutionOptions::new("coverage");
        options.no_deps = true;
        let result = run(temp.path(), &config, &runner, options.clone()).await.unwrap();
        assert!(result.success, "{:?}", result.failure);
        assert_eq!(result.outcomes.len(), 1);

        // Coverage data that no longer matches the last successful run
        std::fs::write(&config.coverage.data_file, "stale").unwrap();
        let result = run(temp.path(), &config, &runner, options).await.unwrap();
        assert!(matches!(
            result.failure,
            Some(GateError::DependencyNotSatisfied { .. })
        ));
    }

    #[tokio::test]
    async fn test_no_deps_on_stateless_dependency_fails() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = Arc::new(healthy(ScriptedRunner::new(), &config, 90.0));

        let mut pipeline = Pipeline::standard(&config, temp.path());
        pipeline.stages.push(
            Stage::new("stubs", "Check generated stubs", StageKind::TypeCheck)
                .depends_on(&["mypy"])
                .command(crate::pipeline::CommandSpec::new("stubtest", ["qe2e"])),
        );
        let executor = GateExecutor::new(config.clone(), temp.path(), Box::new(Shared(runner.clone())));

        let mut options = ExecutionOptions::new("stubs");
        options.no_deps = true;
        let result = executor.execute(&pipeline, &options).await.unwrap();

        match result.failure {
            Some(GateError::DependencyNotSatisfied { dependency, reason, .. }) => {
                assert_eq!(dependency, "mypy");
                assert!(reason.contains("no persistent state"));
            }
            other => panic!("expected unsatisfied dependency, got {:?}", other),
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_linter_check_is_repeatable() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = Arc::new(healthy(ScriptedRunner::new(), &config, 90.0));

        for _ in 0..2 {
            let result = run(temp.path(), &config, &runner, ExecutionOptions::new("linter"))
                .await
                .unwrap();
            assert!(result.success);
        }

        let black_calls: Vec<_> = runner.calls().into_iter().filter(|c| c.contains("-m black")).collect();
        assert_eq!(black_calls.len(), 2);
        assert!(black_calls.iter().all(|c| c.contains("--check")));
    }

    #[tokio::test]
    async fn test_formatter_ignores_formatting_divergence_output() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = ScriptedRunner::new().on(
            "-m black",
            ScriptedResponse::ok().stderr("reformatted qe2e/core.py\n1 file reformatted."),
        );
        let runner = Arc::new(healthy(runner, &config, 90.0));

        let result = run(temp.path(), &config, &runner, ExecutionOptions::new("formatter"))
            .await
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_environment_and_install_are_reused() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        std::fs::write(temp.path().join("requirements.txt"), "requests\n").unwrap();
        let runner = Arc::new(healthy(ScriptedRunner::new(), &config, 90.0));

        let first = run(temp.path(), &config, &runner, ExecutionOptions::new("install"))
            .await
            .unwrap();
        assert_eq!(first.status("setup"), Some(StageStatus::Passed));
        assert_eq!(first.status("install"), Some(StageStatus::Passed));

        let second = run(temp.path(), &config, &runner, ExecutionOptions::new("install"))
            .await
            .unwrap();
        assert_eq!(second.status("setup"), Some(StageStatus::UpToDate));
        assert_eq!(second.status("install"), Some(StageStatus::UpToDate));
        assert_eq!(runner.calls().iter().filter(|c| c.contains("-m venv")).count(), 1);

        std::fs::write(temp.path().join("requirements.txt"), "requests\nbs4\n").unwrap();
        let third = run(temp.path(), &config, &runner, ExecutionOptions::new("install"))
            .await
            .unwrap();
        assert_eq!(third.status("install"), Some(StageStatus::Passed));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_environment_error() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = Arc::new(ScriptedRunner::new().without_program("python3"));

        let result = run(temp.path(), &config, &runner, ExecutionOptions::new("setup"))
            .await
            .unwrap();

        assert!(matches!(
            result.failure,
            Some(GateError::InterpreterNotFound { .. })
        ));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_install_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = ScriptedRunner::new().on(
            "pip install",
            ScriptedResponse::fail(1).stderr("ERROR: No matching distribution found for nosuchpkg"),
        );
        let runner = Arc::new(healthy(runner, &config, 90.0));

        let result = run(temp.path(), &config, &runner, ExecutionOptions::new("check"))
            .await
            .unwrap();

        match result.failure {
            Some(GateError::InstallFailed { output, .. }) => assert!(output.contains("nosuchpkg")),
            other => panic!("expected install failure, got {:?}", other),
        }
        assert!(!runner.ran("-m mypy"));
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = ScriptedRunner::new().on("-m mypy", ScriptedResponse::ok().delay(Duration::from_secs(5)));
        let runner = Arc::new(healthy(runner, &config, 90.0));

        let mut options = ExecutionOptions::new("mypy");
        options.time_limit = Some(Duration::from_millis(200));
        let result = run(temp.path(), &config, &runner, options).await.unwrap();

        match result.failure {
            Some(GateError::Timeout { stage, .. }) => assert_eq!(stage, "mypy"),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(!temp.path().join(".venv.lock").exists());
    }

    #[tokio::test]
    async fn test_interrupt_stops_the_stage_and_releases_the_lock() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = ScriptedRunner::new().on("-m mypy", ScriptedResponse::ok().delay(Duration::from_secs(30)));
        let runner = Arc::new(healthy(runner, &config, 90.0));

        let interrupt = Arc::new(Notify::new());
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.notify_one();
        });

        let pipeline = Pipeline::standard(&config, temp.path());
        let executor = GateExecutor::new(config.clone(), temp.path(), Box::new(Shared(runner.clone())))
            .with_interrupt(interrupt);
        let result = executor
            .execute(&pipeline, &ExecutionOptions::new("check"))
            .await
            .unwrap();

        assert!(!result.success);
        match &result.failure {
            Some(GateError::Interrupted { stage }) => assert_eq!(stage, "mypy"),
            other => panic!("expected interruption, got {:?}", other),
        }
        assert_eq!(result.status("install"), Some(StageStatus::Passed));
        assert_eq!(result.status("coverage"), Some(StageStatus::NotRun));
        assert!(!runner.ran("coverage run"));
        assert!(!config.lock_path().exists());
        assert!(EnvironmentLock::acquire(&config.lock_path()).is_ok());
    }

    #[tokio::test]
    async fn test_failed_rerun_invalidates_unchanged_coverage_data() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let passing = Arc::new(healthy(ScriptedRunner::new(), &config, 90.0));

        let result = run(temp.path(), &config, &passing, ExecutionOptions::new("test"))
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.failure);
        let data_before = std::fs::read(&config.coverage.data_file).unwrap();

        // The failing run leaves the earlier data file untouched
        let failing = ScriptedRunner::new().on(
            "coverage run",
            ScriptedResponse::fail(1).stdout("==== 1 failed, 11 passed in 0.25s ===="),
        );
        let failing = Arc::new(healthy(failing, &config, 90.0));
        let result = run(temp.path(), &config, &failing, ExecutionOptions::new("test"))
            .await
            .unwrap();
        assert!(matches!(result.failure, Some(GateError::TestsFailed { .. })));
        assert_eq!(std::fs::read(&config.coverage.data_file).unwrap(), data_before);

        let mut options = ExecutionOptions::new("coverage");
        options.no_deps = true;
        let result = run(temp.path(), &config, &failing, options).await.unwrap();

        match result.failure {
            Some(GateError::DependencyNotSatisfied { stage, dependency, .. }) => {
                assert_eq!(stage, "coverage");
                assert_eq!(dependency, "test");
            }
            other => panic!("expected unsatisfied dependency, got {:?}", other),
        }
        assert!(!failing.ran("coverage json"));
    }

    #[tokio::test]
    async fn test_concurrent_run_on_same_environment_is_refused() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = Arc::new(healthy(ScriptedRunner::new(), &config, 90.0));

        let _held = EnvironmentLock::acquire(&config.lock_path()).unwrap();
        let result = run(temp.path(), &config, &runner, ExecutionOptions::new("check")).await;

        assert!(matches!(result, Err(GateError::EnvironmentLocked { .. })));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = Arc::new(ScriptedRunner::new());

        let mut options = ExecutionOptions::new("ci");
        options.dry_run = true;
        let result = run(temp.path(), &config, &runner, options).await.unwrap();

        assert!(result.success);
        assert!(result.outcomes.iter().all(|o| o.status == StageStatus::NotRun));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let runner = Arc::new(ScriptedRunner::new());

        let result = run(temp.path(), &config, &runner, ExecutionOptions::new("deploy")).await;
        assert!(matches!(result, Err(GateError::UnknownStage { .. })));
    }
}
