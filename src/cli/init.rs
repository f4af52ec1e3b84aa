// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 qgate contributors

//! Init command - write a default project configuration

use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};

use crate::config::GateConfig;
use crate::errors::{GateError, GateResult};

const CONFIG_FILE: &str = ".qgate.yaml";

const HEADER: &str = "\
# qgate configuration
#
# Every key is optional; omitted keys keep their defaults.
# Per-run overrides: --threshold, --env-dir, --package, --nlp-model, --timeout
# (or QGATE_THRESHOLD, QGATE_ENV_DIR, QGATE_PACKAGE, QGATE_NLP_MODEL, QGATE_TIMEOUT).

";

/// Run the init command
pub async fn run(working_dir: &Path, force: bool, verbose: bool) -> Result<()> {
    println!("{}", "Initializing qgate...".bold());
    println!();

    let path = write_default(working_dir, force)?;
    println!("  {} Created {}", "✓".green(), CONFIG_FILE);

    if !working_dir.join(&GateConfig::default().package).is_dir() {
        println!(
            "  {} Package directory '{}' does not exist yet; set 'package' if yours lives elsewhere",
            "⚠".yellow(),
            GateConfig::default().package.display()
        );
    }

    println!();
    println!("Next steps:");
    println!("  1. Review {}", CONFIG_FILE.cyan());
    println!("  2. Run {} to check it", "qgate validate".cyan());
    println!("  3. Run {} to run the gate", "qgate".cyan());
    println!();

    if verbose {
        println!("Wrote {}", path.display());
    }

    Ok(())
}

/// Write the default configuration, refusing to overwrite unless forced
pub fn write_default(working_dir: &Path, force: bool) -> GateResult<PathBuf> {
    let path = working_dir.join(CONFIG_FILE);
    if path.exists() && !force {
        return Err(GateError::InvalidConfig {
            reason: format!("{} already exists", CONFIG_FILE),
            help: Some("Use --force to overwrite it".into()),
        });
    }

    let content = format!("{}{}", HEADER, GateConfig::default().to_yaml()?);
    std::fs::write(&path, content).map_err(|e| GateError::FileWriteError {
        path: path.clone(),
        error: e.to_string(),
    })?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_written_config_loads_back_as_default() {
        let temp = TempDir::new().unwrap();
        let path = write_default(temp.path(), false).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let config = GateConfig::from_yaml(&content).unwrap();
        assert_eq!(config.coverage.threshold, 80.0);
        assert_eq!(config.package, PathBuf::from("qe2e"));
    }

    #[test]
    fn test_refuses_to_overwrite_without_force() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "package: mine\n").unwrap();

        assert!(matches!(
            write_default(temp.path(), false),
            Err(GateError::InvalidConfig { .. })
        ));
        assert!(write_default(temp.path(), true).is_ok());
    }
}
