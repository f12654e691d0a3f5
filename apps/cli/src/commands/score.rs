//! Score command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use roost_training::ScoreRecord;
use std::path::Path;

use super::load_config;

/// Execute the score command.
pub fn execute(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let score_path = config.evaluation_config().score_path;
    let score = ScoreRecord::read(&score_path)
        .with_context(|| format!("No score at {} (run the evaluation stage first)", score_path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&score)?);
    } else {
        println!("{}", "Evaluation score".bold().cyan());
        println!("  file:     {}", score_path.display());
        println!("  loss:     {:.4}", score.loss);
        println!("  accuracy: {:.4}", score.accuracy);
    }
    Ok(())
}
