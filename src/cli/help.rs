// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Help command - list every command with its description
//!
//! Never fails: with no usable configuration it lists the default stages.

use colored::Colorize;
use miette::Result;
use std::path::Path;

use super::GateContext;
use crate::config::GateConfig;
use crate::pipeline::{Pipeline, DEFAULT_TARGET};

const AUXILIARY: &[(&str, &str)] = &[
    ("help", "List every command with its description"),
    ("graph", "Show the stage graph (--format text|dot|mermaid)"),
    ("validate", "Validate configuration and the stage graph"),
    ("init", "Write a default .qgate.yaml"),
    ("clean", "Remove the environment, stamps and coverage artifacts"),
    ("watch", "Re-run a target whenever sources change"),
];

/// Run the help command
pub async fn run(ctx: Option<&GateContext>) -> Result<()> {
    let pipeline = match ctx {
        Some(ctx) => Pipeline::standard(&ctx.config, &ctx.working_dir),
        None => Pipeline::standard(&GateConfig::default(), Path::new(".")),
    };

    print!("{}", render_help(&pipeline));
    Ok(())
}

/// Help text for a pipeline
pub fn render_help(pipeline: &Pipeline) -> String {
    let width = pipeline
        .stages
        .iter()
        .map(|s| s.name.len())
        .chain(AUXILIARY.iter().map(|(name, _)| name.len()))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    out.push_str(&format!("{} qgate [command] [options]\n\n", "Usage:".bold()));

    out.push_str(&format!("{}\n", "Stages:".bold()));
    for stage in &pipeline.stages {
        let deps = if stage.depends_on.is_empty() {
            String::new()
        } else {
            format!(" [after: {}]", stage.depends_on.join(", "))
        };
        out.push_str(&format!(
            "  {:width$}  {}{}\n",
            stage.name,
            stage.description,
            deps.dimmed(),
            width = width
        ));
    }

    out.push_str(&format!("\n{}\n", "Commands:".bold()));
    for (name, description) in AUXILIARY {
        out.push_str(&format!("  {:width$}  {}\n", name, description, width = width));
    }

    out.push_str(&format!(
        "\nWith no command, qgate runs '{}'. See 'qgate --help' for options.\n",
        DEFAULT_TARGET
    ));
    out
}
