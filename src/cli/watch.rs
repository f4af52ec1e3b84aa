// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Watch command - re-run a target on source changes

use colored::Colorize;
use miette::Result;
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

use super::GateContext;
use crate::config::GateConfig;
use crate::errors::GateError;
use crate::pipeline::Pipeline;

/// Directories whose changes never trigger a run
const IGNORED_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".eggs",
    "build",
    "dist",
];

/// Run the watch command
pub async fn run(ctx: &GateContext, target: &str, debounce_ms: u64) -> Result<()> {
    let pipeline = Pipeline::standard(&ctx.config, &ctx.working_dir);
    if let Some(stage) = pipeline.get_stage(target) {
        if stage.kind.mutates_source() {
            return Err(miette::miette!(
                "Watching '{}' would re-trigger on its own rewrites; watch 'linter' instead",
                target
            ));
        }
    }

    let report = ctx.report.as_ref().map(|r| ctx.working_dir.join(r));

    println!("{}", "Starting watch mode...".bold());
    println!("Running '{}' on changes (debounce: {}ms)", target, debounce_ms);
    println!("Press {} to exit.", "Ctrl+C".cyan());
    println!();

    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut debouncer = new_debouncer(Duration::from_millis(debounce_ms), move |res: DebounceEventResult| {
        let _ = tx.send(res);
    })
    .map_err(|e| miette::miette!("Failed to create file watcher: {}", e))?;

    debouncer
        .watcher()
        .watch(&ctx.working_dir, RecursiveMode::Recursive)
        .map_err(|e| miette::miette!("Failed to start watching: {}", e))?;

    if run_once(ctx, target).await {
        return Ok(());
    }

    loop {
        let received = tokio::select! {
            received = rx.recv() => received,
            _ = tokio::signal::ctrl_c() => break,
        };

        match received {
            Some(Ok(events)) => {
                let relevant: Vec<_> = events
                    .iter()
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                    .filter(|e| is_relevant(&e.path, &ctx.config, &ctx.working_dir, report.as_deref()))
                    .collect();

                if !relevant.is_empty() {
                    println!();
                    println!("{}", "─".repeat(50).dimmed());
                    println!("{}: {} file(s) changed", "Change detected".yellow(), relevant.len());

                    if ctx.verbose {
                        for event in &relevant {
                            println!("  {}", event.path.display());
                        }
                    }

                    println!();
                    if run_once(ctx, target).await {
                        break;
                    }
                }
            }
            Some(Err(e)) => {
                eprintln!("{}: {:?}", "Watch error".red(), e);
            }
            None => {
                eprintln!("{}", "File watcher stopped".red());
                break;
            }
        }
    }

    Ok(())
}

/// Run the target once; returns true when the run was interrupted
async fn run_once(ctx: &GateContext, target: &str) -> bool {
    match super::run::execute(ctx, target).await {
        Ok(result) => match result.failure {
            Some(GateError::Interrupted { .. }) => true,
            Some(e) => {
                eprintln!("{:?}", miette::Report::new(e));
                false
            }
            None => false,
        },
        Err(e) => {
            eprintln!("{:?}", e);
            false
        }
    }
}

/// Whether a changed path should trigger a run; `report` is the `--report` file
pub fn is_relevant(path: &Path, config: &GateConfig, working_dir: &Path, report: Option<&Path>) -> bool {
    if path.starts_with(&config.environment)
        || path == config.coverage.data_file
        || path == config.coverage.report_file
        || path == config.lock_path()
        || report == Some(path)
    {
        return false;
    }

    let relative = path.strip_prefix(working_dir).unwrap_or(path);
    if relative.components().any(|c| {
        let part = c.as_os_str().to_string_lossy();
        IGNORED_DIRS.iter().any(|d| *d == part)
    }) {
        return false;
    }

    // coverage.py writes parallel data files next to the main one
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    !name.starts_with(".coverage")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_gate_outputs_do_not_trigger_runs() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let config = GateConfig::default().rooted_at(root);
        let report = root.join("gate.json");
        let relevant = |path: &Path| is_relevant(path, &config, root, Some(report.as_path()));

        assert!(relevant(&root.join("qe2e/core.py")));
        assert!(relevant(&root.join("requirements.txt")));

        assert!(!relevant(&root.join(".venv/lib/site.py")));
        assert!(!relevant(&root.join(".coverage")));
        assert!(!relevant(&root.join(".coverage.host.123")));
        assert!(!relevant(&root.join("coverage.json")));
        assert!(!relevant(&root.join(".venv.lock")));
        assert!(!relevant(&root.join("qe2e/__pycache__/core.pyc")));
        assert!(!relevant(&root.join(".mypy_cache/3.11/core.json")));
        assert!(!relevant(&report));
    }

    #[test]
    fn test_report_file_only_ignored_when_requested() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let config = GateConfig::default().rooted_at(root);

        assert!(is_relevant(&root.join("gate.json"), &config, root, None));
        assert!(!is_relevant(&root.join("gate.json"), &config, root, Some(root.join("gate.json").as_path())));
    }
}
