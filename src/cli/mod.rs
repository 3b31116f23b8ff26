//! Hoopline CLI
//!
//! Commands:
//! - `hoopline train`   - Fit scaler, forecast model and classifier
//! - `hoopline tune`    - Hyperparameter search
//! - `hoopline predict` - Score games and rank spread picks by EV
//! - `hoopline odds`    - American odds calculator

pub mod odds;
pub mod output;
pub mod predict;
pub mod train;
pub mod tune;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::tuning::Task;

/// Basketball margin forecasts and spread edges
#[derive(Parser, Debug)]
#[command(name = "hoopline")]
#[command(author, version, about = "Distributional margin forecasts and spread EV")]
pub struct Cli {
    /// Configuration directory (default.toml, $HOOPLINE_ENV.toml)
    #[arg(long, global = true, default_value = "config", env = "HOOPLINE_CONFIG_DIR")]
    pub config: PathBuf,

    /// Artifact directory, overrides inference.artifact_dir
    #[arg(long, global = true)]
    pub artifacts: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the forecast model (and classifier) and write artifacts
    Train {
        /// Training CSV with team points and feature columns
        #[arg(long)]
        data: PathBuf,
        /// Start from the persisted best tuning parameters
        #[arg(long)]
        use_best: bool,
    },

    /// Search hyperparameters with successive halving
    Tune {
        #[arg(long)]
        data: PathBuf,
        #[arg(long, value_enum, default_value = "forecast")]
        task: Task,
        /// Number of trials, overrides tuning.n_trials
        #[arg(long)]
        trials: Option<usize>,
        /// Ignore previously persisted best parameters
        #[arg(long)]
        fresh: bool,
    },

    /// Score a JSON array of games
    Predict {
        #[arg(long)]
        games: PathBuf,
        /// Write results to this path (JSON for a .json extension, CSV otherwise)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Run date for games without their own date (default: today, UTC)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Convert American odds; with --prob also fair odds and EV
    Odds {
        #[arg(allow_negative_numbers = true)]
        odds: f64,
        /// True win probability (0-1)
        #[arg(long)]
        prob: Option<f64>,
    },
}

impl Cli {
    /// Whether the command needs full (file + structured) logging.
    pub fn wants_full_logging(&self) -> bool {
        !matches!(self.command, Commands::Odds { .. })
    }

    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load_from(&self.config)
            .with_context(|| format!("loading configuration from {}", self.config.display()))?;
        if let Some(dir) = &self.artifacts {
            config.inference.artifact_dir = dir.clone();
        }
        if let Err(errors) = config.validate() {
            anyhow::bail!("invalid configuration: {}", errors.join("; "));
        }
        Ok(config)
    }

    pub async fn run(self, config: AppConfig) -> Result<()> {
        match self.command {
            // Training is CPU-bound and uses blocking channel calls.
            Commands::Train { data, use_best } => {
                tokio::task::spawn_blocking(move || train::run(&config, &data, use_best))
                    .await
                    .context("training task panicked")?
            }
            Commands::Tune {
                data,
                task,
                trials,
                fresh,
            } => {
                let mut config = config;
                if let Some(n) = trials {
                    config.tuning.n_trials = n;
                }
                config.tuning.fresh |= fresh;
                tokio::task::spawn_blocking(move || tune::run(config, &data, task))
                    .await
                    .context("tuning task panicked")?
            }
            Commands::Predict {
                games,
                out,
                json,
                as_of,
            } => predict::run(&config, &games, out.as_deref(), json, as_of),
            Commands::Odds { odds, prob } => odds::run(odds, prob),
        }
    }
}
