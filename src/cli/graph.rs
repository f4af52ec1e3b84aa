// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Graph command - visualize the stage graph

use miette::Result;

use super::{GateContext, GraphFormat};
use crate::pipeline::{DagBuilder, Pipeline};

/// Run the graph command
pub async fn run(ctx: &GateContext, format: GraphFormat) -> Result<()> {
    let pipeline = Pipeline::standard(&ctx.config, &ctx.working_dir);
    let dag = DagBuilder::build(&pipeline)?;

    let output = match format {
        GraphFormat::Text => dag.to_text(&pipeline),
        GraphFormat::Dot => dag.to_dot(),
        GraphFormat::Mermaid => dag.to_mermaid(),
    };

    print!("{}", output);

    Ok(())
}
