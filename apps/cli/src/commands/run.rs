//! Run command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use roost_core::run_pipeline;
use roost_orchestrator::TracingObserver;
use roost_training::ScoreRecord;
use std::path::Path;
use std::sync::Arc;

use super::load_config;

/// Execute the run command.
pub fn execute(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    println!("{}", "roost run".bold().cyan());
    println!();

    let report = run_pipeline(&config, Arc::new(TracingObserver)).context("Pipeline run failed")?;
    for stage in &report.stages {
        println!("  {} {} ({:.2?})", "✓".green(), stage.name, stage.elapsed);
    }

    let score_path = config.evaluation_config().score_path;
    let score = ScoreRecord::read(&score_path)
        .with_context(|| format!("Failed to read score from {}", score_path.display()))?;
    println!();
    println!("  loss:     {:.4}", score.loss);
    println!("  accuracy: {:.4}", score.accuracy);
    println!();
    println!("{} in {:.2?}", "Pipeline completed".green().bold(), report.elapsed());
    Ok(())
}
