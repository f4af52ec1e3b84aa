// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Utility modules
//!
//! Terminal helpers shared by the CLI and the executor.

pub mod colors;
pub mod spinner;

pub use colors::*;
pub use spinner::*;
