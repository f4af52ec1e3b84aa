// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Layered configuration loading
//!
//! Layers, lowest precedence first: built-in defaults, the user config file,
//! the project file, then command-line overrides (which also carry the
//! `QGATE_*` environment variables through clap). Files are merged as JSON
//! values so a layer only needs to mention the keys it changes.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::GateConfig;
use crate::errors::{GateError, GateResult};

/// Project configuration files, checked in order
pub const PROJECT_FILES: &[&str] = &[".qgate.yaml", ".qgate.yml", "qgate.toml"];

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub threshold: Option<f64>,
    pub environment: Option<PathBuf>,
    pub package: Option<PathBuf>,
    pub nlp_model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut GateConfig) {
        if let Some(threshold) = self.threshold {
            config.coverage.threshold = threshold;
        }
        if let Some(ref environment) = self.environment {
            config.environment = environment.clone();
        }
        if let Some(ref package) = self.package {
            config.package = package.clone();
        }
        if let Some(ref model) = self.nlp_model {
            config.nlp_model = Some(model.clone());
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = Some(timeout);
        }
    }
}

/// Where to look for configuration
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Project root
    pub working_dir: PathBuf,
    /// Explicit project file (skips discovery)
    pub config_file: Option<PathBuf>,
    /// Read the per-user config file
    pub user_config: bool,
    pub overrides: ConfigOverrides,
}

impl LoadOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            config_file: None,
            user_config: true,
            overrides: ConfigOverrides::default(),
        }
    }
}

/// A resolved configuration and the files it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: GateConfig,
    pub sources: Vec<PathBuf>,
}

impl LoadedConfig {
    /// Load and merge every layer
    pub fn load(options: &LoadOptions) -> GateResult<Self> {
        let mut merged = Value::Object(Map::new());
        let mut sources = Vec::new();

        if options.user_config {
            if let Some(path) = user_config_path().filter(|p| p.exists()) {
                merge_values(&mut merged, read_layer(&path)?);
                sources.push(path);
            }
        }

        let project = match options.config_file {
            Some(ref explicit) => {
                let path = if explicit.is_absolute() {
                    explicit.clone()
                } else {
                    options.working_dir.join(explicit)
                };
                if !path.exists() {
                    return Err(GateError::FileReadError {
                        path,
                        error: "file does not exist".into(),
                    });
                }
                Some(path)
            }
            None => PROJECT_FILES
                .iter()
                .map(|name| options.working_dir.join(name))
                .find(|p| p.exists()),
        };

        if let Some(path) = project {
            merge_values(&mut merged, read_layer(&path)?);
            sources.push(path);
        }

        let mut config: GateConfig = serde_json::from_value(merged)?;
        options.overrides.apply(&mut config);

        debug!(sources = ?sources, "configuration loaded");

        Ok(Self {
            config: config.rooted_at(&options.working_dir),
            sources,
        })
    }
}

/// Per-user configuration file, e.g. `~/.config/qgate/config.toml`
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "qgate").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Read one configuration file into a JSON value
fn read_layer(path: &Path) -> GateResult<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| GateError::FileReadError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let value = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let parsed: toml::Value = toml::from_str(&content)?;
            serde_json::to_value(parsed)?
        }
        _ => {
            let parsed: serde_yaml::Value = serde_yaml::from_str(&content)?;
            serde_json::to_value(parsed)?
        }
    };

    // An empty YAML document is null; treat it as "no keys"
    Ok(match value {
        Value::Null => Value::Object(Map::new()),
        other => other,
    })
}

/// Deep-merge `overlay` into `base`; objects merge key by key, anything else replaces
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
