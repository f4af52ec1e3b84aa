// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Tool output parsing
//!
//! Pulls the interesting parts out of mypy, black and pytest output so a
//! failed stage can say what went wrong, not just that it exited nonzero.

use regex::Regex;
use std::sync::OnceLock;

fn mypy_error() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(?P<file>[^:\n]+):(?P<line>\d+):(?:\d+:)? error: (?P<message>.+)$")
            .expect("valid mypy pattern")
    })
}

fn mypy_summary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Found (\d+) errors? in \d+ files?").expect("valid mypy summary pattern"))
}

fn would_reformat() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^would reformat (.+?)\s*$").expect("valid black pattern"))
}

fn pytest_counts() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+) (failed|errors?)\b").expect("valid pytest pattern"))
}

/// Type errors reported by mypy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeErrors {
    /// Count from the summary line, falling back to the number of error lines
    pub count: usize,
    /// Every `file:line: error: message` line, verbatim
    pub lines: Vec<String>,
}

/// Parse mypy output
pub fn parse_mypy(output: &str) -> TypeErrors {
    let lines: Vec<String> = mypy_error()
        .find_iter(output)
        .map(|m| m.as_str().trim_end().to_string())
        .collect();

    let count = mypy_summary()
        .captures(output)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(lines.len());

    TypeErrors { count, lines }
}

/// Files the formatter would rewrite
pub fn parse_black(output: &str) -> Vec<String> {
    would_reformat()
        .captures_iter(output)
        .map(|c| c[1].to_string())
        .collect()
}

/// Failed plus errored tests from the pytest summary line
pub fn parse_pytest_failures(output: &str) -> Option<usize> {
    let summary = output
        .lines()
        .rev()
        .find(|l| l.starts_with('=') && (l.contains(" failed") || l.contains(" error")))?;

    let total = pytest_counts()
        .captures_iter(summary)
        .filter_map(|c| c[1].parse::<usize>().ok())
        .sum();

    Some(total)
}
