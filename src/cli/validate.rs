// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Validate command - check configuration and the stage graph

use colored::Colorize;
use miette::Result;

use super::GateContext;
use crate::pipeline::{GateValidator, Pipeline};
use crate::utils::{print_error, print_header, print_info, print_success, print_warning};

/// Run the validate command
pub async fn run(ctx: &GateContext) -> Result<()> {
    print_header("Validating configuration");

    if ctx.sources.is_empty() {
        print_info("No configuration file found, using defaults");
    }
    for source in &ctx.sources {
        print_success(&format!("Loaded {}", source.display()));
    }

    let pipeline = Pipeline::standard(&ctx.config, &ctx.working_dir);
    let validation = GateValidator::validate(&pipeline, &ctx.config);
    let environment = GateValidator::validate_environment(&ctx.config, &ctx.working_dir);

    if !validation.errors.is_empty() {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            print_error(error);
        }
    }

    if validation.has_warnings() || !environment.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in validation.warnings.iter().chain(environment.iter()) {
            print_warning(warning);
        }
    }

    println!();
    if !validation.is_valid() {
        return Err(miette::miette!(
            "Validation failed with {} error(s)",
            validation.errors.len()
        ));
    }

    println!(
        "{} ({} stages, threshold {}%)",
        "Configuration is valid".green().bold(),
        pipeline.stages.len(),
        ctx.config.coverage.threshold
    );

    if ctx.verbose {
        println!();
        println!("{}:", "Stages".bold());
        for stage in &pipeline.stages {
            println!("  {} ({})", stage.name, stage.kind);
            for command in &stage.commands {
                println!("    {} {}", "$".dimmed(), command);
            }
        }
    }

    Ok(())
}
