//! Roost CLI - runs the image-classifier pipeline.
//!
//! Provides a `roost` command that loads `roost.toml`, runs the four
//! pipeline stages (or a single one) and prints the persisted score.

mod commands;

use clap::{Parser, Subcommand};
use roost_core::{DEFAULT_CONFIG_FILE, StageKind};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{init, run, score, stage};

/// Roost - transfer-learning pipeline for image classifiers
///
/// Unpacks a labelled image archive, adapts a pretrained base network with a
/// new classification head, trains the head and scores the result on a
/// held-out validation split.
#[derive(Parser, Debug)]
#[command(name = "roost", author, version, about = "Roost - image-classifier training pipeline")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Pipeline configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every stage in order, stopping at the first failure
    Run,

    /// Run a single stage against already-persisted artifacts
    ///
    /// One of: data-ingestion, prepare-base-model, training, evaluation.
    Stage {
        /// Stage identifier
        stage: StageKind,
    },

    /// Print the persisted evaluation score
    Score {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default configuration file
    Init {
        /// Target file or directory (defaults to ./roost.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_level(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&args.log_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Run => run::execute(&args.config)?,
        Command::Stage { stage: kind } => stage::execute(&args.config, kind)?,
        Command::Score { json } => score::execute(&args.config, json)?,
        Command::Init { path, force } => init::execute(path, force)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn test_stage_argument_parses() {
        let args = Args::try_parse_from(["roost", "stage", "prepare-base-model"]).unwrap();
        assert!(matches!(args.command, Command::Stage { stage: StageKind::PrepareBaseModel }));
        assert!(Args::try_parse_from(["roost", "stage", "deploy"]).is_err());
    }
}
