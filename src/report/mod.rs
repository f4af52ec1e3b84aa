// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Run reports
//!
//! A machine-readable summary of one gate run, written with `--report`.

pub mod coverage;
pub mod diagnostics;

pub use coverage::{CoverageMeasurement, CoverageTotals};

use serde::Serialize;
use std::path::Path;

use crate::errors::{GateError, GateResult};
use crate::pipeline::PipelineResult;

/// Serializable summary of a run
#[derive(Debug, Serialize)]
pub struct GateReport {
    pub target: String,
    pub success: bool,
    pub duration_secs: f64,
    pub stages: Vec<StageEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageMeasurement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureEntry>,
}

#[derive(Debug, Serialize)]
pub struct StageEntry {
    pub name: String,
    pub status: String,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct FailureEntry {
    pub category: String,
    pub message: String,
}

impl GateReport {
    pub fn from_result(result: &PipelineResult) -> Self {
        Self {
            target: result.target.clone(),
            success: result.success,
            duration_secs: result.duration.as_secs_f64(),
            stages: result
                .outcomes
                .iter()
                .map(|o| StageEntry {
                    name: o.name.clone(),
                    status: o.status.to_string(),
                    duration_secs: o.duration.as_secs_f64(),
                    exit_code: o.exit_code,
                })
                .collect(),
            coverage: result.coverage.clone(),
            failure: result.failure.as_ref().map(|e| FailureEntry {
                category: e.category().to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Write the report as pretty JSON
    pub fn write(&self, path: &Path) -> GateResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| GateError::FileWriteError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }
}
