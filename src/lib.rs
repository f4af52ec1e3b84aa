// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! # qgate - Quality Gate Pipeline
//!
//! `qgate` drives the quality checks for the `qe2e` package: it creates an
//! isolated environment, installs dependencies, and runs type checking,
//! formatting checks, the test suite and a coverage threshold in dependency
//! order, stopping at the first failure.
//!
//! ## Features
//!
//! - **Ordered stages** - every stage declares what it needs; a target pulls in its dependencies
//! - **Persistent state** - environment, install and test runs leave stamps, so `--no-deps` can trust them
//! - **Clear failures** - type errors, formatting divergence, test failures and coverage shortfalls are reported apart
//! - **One owner per environment** - concurrent runs on the same environment are refused
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the full gate
//! qgate
//!
//! # Run the CI sequence under its time limit
//! qgate ci
//!
//! # Re-check coverage without re-running the tests
//! qgate coverage --no-deps --threshold 85
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod report;
pub mod runners;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use config::GateConfig;
pub use errors::{GateError, GateResult};
pub use pipeline::{Pipeline, Stage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
