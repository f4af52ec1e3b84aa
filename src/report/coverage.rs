// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Coverage measurement and threshold enforcement
//!
//! Reads the `totals` block of a coverage.py JSON report. The percentage is
//! rounded to the configured precision before it is compared, and the
//! threshold is inclusive: 80% passes a threshold of 80.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{GateError, GateResult};

/// Totals from a coverage.py JSON report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageTotals {
    pub percent_covered: f64,
    #[serde(default)]
    pub covered_lines: u64,
    #[serde(default)]
    pub num_statements: u64,
    #[serde(default)]
    pub covered_branches: Option<u64>,
    #[serde(default)]
    pub num_branches: Option<u64>,
}

#[derive(Deserialize)]
struct ReportFile {
    totals: CoverageTotals,
}

impl CoverageTotals {
    /// Parse a coverage.py JSON report
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<ReportFile>(json).map(|r| r.totals)
    }

    /// Read a coverage.py JSON report from disk
    pub fn from_file(path: &Path) -> GateResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| GateError::CoverageReportInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_json(&content).map_err(|e| GateError::CoverageReportInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// A coverage result that met its threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageMeasurement {
    /// Percentage after rounding to the configured precision
    pub percent: f64,
    pub threshold: f64,
    pub totals: CoverageTotals,
}

/// Finest rounding an f64 percentage can carry
pub const MAX_PRECISION: u32 = 15;

/// Round a percentage to `precision` decimal places (at most [`MAX_PRECISION`])
pub fn round_percent(percent: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision.min(MAX_PRECISION) as i32);
    (percent * factor).round() / factor
}

/// Compare totals against a threshold
pub fn evaluate(totals: CoverageTotals, threshold: f64, precision: u32) -> GateResult<CoverageMeasurement> {
    let percent = round_percent(totals.percent_covered, precision);

    // A 100% requirement is only met by exactly 100%, never by rounding up
    let below = if !percent.is_finite() {
        true
    } else if threshold >= 100.0 {
        totals.percent_covered < 100.0
    } else {
        percent < threshold
    };

    if below {
        return Err(GateError::CoverageBelowThreshold {
            percent,
            threshold,
            shortfall: round_percent(threshold - percent, precision.max(2)),
        });
    }

    Ok(CoverageMeasurement {
        percent,
        threshold,
        totals,
    })
}
