// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Stage commands - run a target and everything it depends on

use colored::Colorize;
use miette::Result;

use super::GateContext;
use crate::errors::RecoverySuggestion;
use crate::pipeline::{GateExecutor, GateValidator, Pipeline, PipelineResult};
use crate::report::GateReport;
use crate::runners::ProcessRunner;

/// Run a target, failing with the error that stopped it
pub async fn run(ctx: &GateContext, target: &str) -> Result<()> {
    let result = execute(ctx, target).await?;

    match result.failure {
        Some(e) => {
            if let Some(suggestion) = RecoverySuggestion::for_error(&e) {
                eprintln!();
                eprint!("{}", suggestion);
            }
            Err(e.into())
        }
        None => Ok(()),
    }
}

/// Run a target and return the full result
pub async fn execute(ctx: &GateContext, target: &str) -> Result<PipelineResult> {
    let pipeline = Pipeline::standard(&ctx.config, &ctx.working_dir);

    let validation = GateValidator::validate(&pipeline, &ctx.config);
    if !validation.is_valid() {
        eprintln!("{}", "Configuration is invalid:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Configuration is invalid; run 'qgate validate' for details"));
    }

    if validation.has_warnings() && ctx.verbose {
        eprintln!("{}", "Configuration warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let executor = GateExecutor::new(ctx.config.clone(), &ctx.working_dir, Box::new(ProcessRunner::new()));
    let result = executor.execute(&pipeline, &ctx.options(target)).await?;

    if let Some(ref measurement) = result.coverage {
        println!(
            "{}: {}% (threshold {}%)",
            "Coverage".bold(),
            measurement.percent,
            measurement.threshold
        );
    }

    if let Some(ref path) = ctx.report {
        if !ctx.dry_run {
            GateReport::from_result(&result).write(path)?;
            tracing::info!(path = %path.display(), "run report written");
        }
    }

    Ok(result)
}
