//! Command implementations for the Roost CLI.

pub mod init;
pub mod run;
pub mod score;
pub mod stage;

use anyhow::{Context, Result};
use roost_core::PipelineConfig;
use std::path::Path;

/// Loads and validates the pipeline configuration.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        anyhow::bail!(
            "configuration file {} not found (run `roost init` to create one)",
            path.display()
        );
    }
    PipelineConfig::load_from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
