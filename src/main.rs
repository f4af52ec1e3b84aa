// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! qgate - quality gate pipeline
//!
//! Environment, type checks, formatting, tests and coverage for the qe2e package.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qgate::cli::{Cli, Commands, GateContext};
use qgate::pipeline::DEFAULT_TARGET;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qgate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    qgate::utils::configure_colors();

    let cli = Cli::parse();

    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    let command = cli.command.clone().unwrap_or(Commands::Check);

    // help must work whatever state the project is in
    if command == Commands::Help {
        let ctx = GateContext::load(&cli).ok();
        return qgate::cli::help::run(ctx.as_ref()).await;
    }

    let ctx = GateContext::load(&cli)?;

    match command {
        Commands::Help => qgate::cli::help::run(Some(&ctx)).await,
        Commands::Graph { format } => qgate::cli::graph::run(&ctx, format).await,
        Commands::Validate => qgate::cli::validate::run(&ctx).await,
        Commands::Init => qgate::cli::init::run(&ctx.working_dir, ctx.force, ctx.verbose).await,
        Commands::Clean => qgate::cli::clean::run(&ctx).await,
        Commands::Watch { target, debounce } => qgate::cli::watch::run(&ctx, &target, debounce).await,
        stage => {
            let target = stage.stage_name().unwrap_or(DEFAULT_TARGET);
            qgate::cli::run::run(&ctx, target).await
        }
    }
}
