// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! DAG (Directed Acyclic Graph) builder for stage dependencies
//!
//! Builds and validates the dependency graph between stages, detects
//! cycles, and derives the order in which a target's stages run.

use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

use crate::errors::GateError;
use crate::pipeline::Pipeline;

/// Builder for stage dependency DAGs
pub struct DagBuilder {
    graph: DiGraph<usize, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    index_to_name: HashMap<NodeIndex, String>,
}

impl DagBuilder {
    /// Create a new DAG builder
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            name_to_index: HashMap::new(),
            index_to_name: HashMap::new(),
        }
    }

    /// Build a DAG from a pipeline
    pub fn build(pipeline: &Pipeline) -> Result<Self, GateError> {
        let mut builder = Self::new();

        for (idx, stage) in pipeline.stages.iter().enumerate() {
            let node = builder.graph.add_node(idx);
            builder.name_to_index.insert(stage.name.clone(), node);
            builder.index_to_name.insert(node, stage.name.clone());
        }

        for stage in &pipeline.stages {
            let stage_node = builder.name_to_index[&stage.name];

            for dep_name in &stage.depends_on {
                let dep_node = builder.name_to_index.get(dep_name).ok_or_else(|| {
                    GateError::UnknownDependency {
                        stage: stage.name.clone(),
                        dependency: dep_name.clone(),
                    }
                })?;

                if !builder.graph.contains_edge(*dep_node, stage_node) {
                    builder.graph.add_edge(*dep_node, stage_node, ());
                }
            }
        }

        builder.validate_acyclic()?;

        Ok(builder)
    }

    fn validate_acyclic(&self) -> Result<(), GateError> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(GateError::CircularDependency {
                stages: self.find_cycle_members(cycle.node_id()),
            }),
        }
    }

    /// Stages in the strongly connected component containing `start`
    fn find_cycle_members(&self, start: NodeIndex) -> Vec<String> {
        let component = kosaraju_scc(&self.graph)
            .into_iter()
            .find(|c| c.contains(&start))
            .unwrap_or_else(|| vec![start]);

        // Declaration order keeps the message stable
        let mut nodes = component;
        nodes.sort_by_key(|n| self.graph[*n]);

        let mut stages: Vec<String> = nodes.iter().map(|n| self.index_to_name[n].clone()).collect();
        if let Some(first) = stages.first().cloned() {
            stages.push(first);
        }
        stages
    }

    /// Stage indices `target` needs, dependencies first, ending with `target`
    ///
    /// Dependencies are visited depth-first in declared order and each stage
    /// appears once, so `check` runs setup, install, mypy, linter, test,
    /// coverage and finally check itself.
    pub fn execution_order(&self, pipeline: &Pipeline, target: &str) -> Result<Vec<usize>, GateError> {
        if !self.name_to_index.contains_key(target) {
            return Err(GateError::UnknownStage {
                stage: target.to_string(),
            });
        }

        let mut order = Vec::new();
        let mut seen = HashSet::new();
        self.visit(pipeline, target, &mut seen, &mut order);
        Ok(order)
    }

    /// Every stage, each after its dependencies
    pub fn full_order(&self, pipeline: &Pipeline) -> Vec<usize> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        for stage in &pipeline.stages {
            self.visit(pipeline, &stage.name, &mut seen, &mut order);
        }
        order
    }

    fn visit(&self, pipeline: &Pipeline, name: &str, seen: &mut HashSet<String>, order: &mut Vec<usize>) {
        if !seen.insert(name.to_string()) {
            return;
        }
        let Some(node) = self.name_to_index.get(name) else {
            return;
        };
        let idx = self.graph[*node];

        for dep in &pipeline.stages[idx].depends_on {
            self.visit(pipeline, dep, seen, order);
        }
        order.push(idx);
    }

    fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.graph.edge_indices().filter_map(|edge| {
            let (from, to) = self.graph.edge_endpoints(edge)?;
            Some((self.index_to_name[&from].as_str(), self.index_to_name[&to].as_str()))
        })
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for node in self.graph.node_indices() {
            let name = &self.index_to_name[&node];
            out.push_str(&format!("    {}[{}]\n", name, name));
        }

        for (from, to) in self.edges() {
            out.push_str(&format!("    {} --> {}\n", from, to));
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph qgate {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for (from, to) in self.edges() {
            out.push_str(&format!("    \"{}\" -> \"{}\";\n", from, to));
        }

        for node in self.graph.node_indices() {
            if self.graph.neighbors_undirected(node).count() == 0 {
                out.push_str(&format!("    \"{}\";\n", self.index_to_name[&node]));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of execution order
    pub fn to_text(&self, pipeline: &Pipeline) -> String {
        let mut out = String::new();

        for (i, idx) in self.full_order(pipeline).iter().enumerate() {
            let stage = &pipeline.stages[*idx];

            out.push_str(&format!("{}. {} ({})", i + 1, stage.name, stage.kind));
            if !stage.depends_on.is_empty() {
                out.push_str(&format!(" [depends: {}]", stage.depends_on.join(", ")));
            }
            out.push('\n');
        }

        out
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}
