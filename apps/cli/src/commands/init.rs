//! Init command implementation.
//!
//! Writes a configuration file holding every default.

use anyhow::{Context, Result};
use colored::Colorize;
use roost_core::{DEFAULT_CONFIG_FILE, PipelineConfig};
use std::path::PathBuf;

/// Execute the init command.
pub fn execute(path: Option<PathBuf>, force: bool) -> Result<()> {
    let target = match path {
        Some(p) if p.is_dir() => p.join(DEFAULT_CONFIG_FILE),
        Some(p) => p,
        None => std::env::current_dir().context("Failed to get current directory")?.join(DEFAULT_CONFIG_FILE),
    };

    if target.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", target.display());
    }
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    PipelineConfig::default()
        .save_to_file(&target)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    println!("{} {}", "Wrote".green().bold(), target.display());
    Ok(())
}
