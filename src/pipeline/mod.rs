// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Pipeline definitions and execution
//!
//! The stage catalog, the dependency graph over it, validation, and the
//! executor that runs a target.

mod catalog;
mod dag;
mod definition;
mod executor;
mod lock;
mod validation;

pub use dag::DagBuilder;
pub use definition::*;
pub use executor::{ExecutionOptions, GateExecutor, PipelineResult, StageOutcome, StageStatus};
pub use lock::EnvironmentLock;
pub use validation::{GateValidator, ValidationResult};
