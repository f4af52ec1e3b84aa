// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Clean command - tear down the environment and coverage artifacts

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::GateContext;
use crate::config::GateConfig;
use crate::errors::GateResult;
use crate::pipeline::EnvironmentLock;

/// Run the clean command
pub async fn run(ctx: &GateContext) -> Result<()> {
    let removed = clean(&ctx.config)?;

    if removed.is_empty() {
        println!("{}", "Nothing to clean".dimmed());
        return Ok(());
    }

    for path in &removed {
        let shown = path.strip_prefix(&ctx.working_dir).unwrap_or(path);
        println!("  {} Removed {}", "✓".green(), shown.display());
    }

    Ok(())
}

/// Remove the environment (with its stamps) and coverage outputs
pub fn clean(config: &GateConfig) -> GateResult<Vec<PathBuf>> {
    // Refuse while a run owns the environment
    let _lock = EnvironmentLock::acquire(&config.lock_path())?;
    let mut removed = Vec::new();

    if config.environment.is_dir() {
        std::fs::remove_dir_all(&config.environment)?;
        removed.push(config.environment.clone());
    }

    for file in [&config.coverage.data_file, &config.coverage.report_file] {
        if file.is_file() {
            std::fs::remove_file(file)?;
            removed.push(file.clone());
        }
    }

    tracing::debug!(count = removed.len(), "clean finished");
    Ok(removed)
}
