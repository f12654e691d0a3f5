//! Stage command implementation.
//!
//! Runs one stage on its own. Earlier stages must already have persisted
//! their artifacts.

use anyhow::{Context, Result};
use colored::Colorize;
use roost_core::{StageKind, run_single_stage};
use roost_orchestrator::TracingObserver;
use std::path::Path;
use std::sync::Arc;

use super::load_config;

/// Execute the stage command.
pub fn execute(config_path: &Path, kind: StageKind) -> Result<()> {
    let config = load_config(config_path)?;
    println!("{} {}", "roost stage".bold().cyan(), kind.id());
    println!();

    let report = run_single_stage(&config, kind, Arc::new(TracingObserver))
        .with_context(|| format!("{kind} failed"))?;
    println!("  {} {} ({:.2?})", "✓".green(), report.name, report.elapsed);
    Ok(())
}
