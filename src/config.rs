use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ml::Precision;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network topology hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Width of the first hidden stage
    pub hidden: usize,
    /// Width of the second hidden stage
    pub hidden2: usize,
    /// Dropout applied after each hidden stage
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden: 256,
            hidden2: 128,
            dropout: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Seed for initialisation, shuffling and dropout
    pub seed: u64,
    /// Batches buffered by the prefetch thread (0 = assemble inline)
    pub prefetch_depth: usize,
    pub precision: Precision,
    /// Also fit the home-win classifier
    pub train_classifier: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 4096,
            learning_rate: 1e-3,
            seed: 42,
            prefetch_depth: 4,
            precision: Precision::Full,
            train_classifier: true,
        }
    }
}

/// Hyperparameter search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub n_trials: usize,
    /// Epochs before the first pruning rung
    pub min_resource: usize,
    /// Successive-halving reduction factor (eta)
    pub reduction_factor: usize,
    pub validation_fraction: f64,
    pub seed: u64,
    /// Directory holding `best_<task>.json`
    pub output_dir: PathBuf,
    /// Ignore previously persisted best parameters
    pub fresh: bool,
    pub space: SearchSpaceConfig,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            n_trials: 30,
            min_resource: 30,
            reduction_factor: 3,
            validation_fraction: 0.2,
            seed: 42,
            output_dir: PathBuf::from("artifacts"),
            fresh: false,
            space: SearchSpaceConfig::default(),
        }
    }
}

/// Bounds for sampled hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSpaceConfig {
    pub hidden_min: usize,
    pub hidden_max: usize,
    pub hidden_step: usize,
    pub hidden2_min: usize,
    pub hidden2_step: usize,
    pub dropout_max: f64,
    pub lr_min: f64,
    pub lr_max: f64,
    pub epochs_min: usize,
    pub epochs_max: usize,
    pub batch_sizes: Vec<usize>,
}

impl Default for SearchSpaceConfig {
    fn default() -> Self {
        Self {
            hidden_min: 64,
            hidden_max: 512,
            hidden_step: 64,
            hidden2_min: 32,
            hidden2_step: 32,
            dropout_max: 0.5,
            lr_min: 5e-5,
            lr_max: 5e-3,
            epochs_min: 30,
            epochs_max: 200,
            batch_sizes: vec![256, 512, 1024],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Directory holding model artifacts and the feature-order descriptor
    pub artifact_dir: PathBuf,
    /// Input width used for legacy artifacts without a feature order
    pub default_input_dim: usize,
    /// Refuse to score without a trained win classifier
    pub require_classifier: bool,
    /// Score on raw features when the scaler artifact is missing
    pub allow_unscaled_fallback: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("artifacts"),
            default_input_dim: 30,
            require_classifier: false,
            allow_unscaled_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily-rolling log files (console only when unset)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("HOOPLINE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (HOOPLINE_TRAINING__EPOCHS, etc.)
            .add_source(
                Environment::with_prefix("HOOPLINE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.model.hidden == 0 || self.model.hidden2 == 0 {
            errors.push("model.hidden and model.hidden2 must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            errors.push(format!("model.dropout {} must be in [0, 1)", self.model.dropout));
        }

        if self.training.epochs == 0 {
            errors.push("training.epochs must be positive".to_string());
        }
        if self.training.batch_size == 0 {
            errors.push("training.batch_size must be positive".to_string());
        }
        if !(self.training.learning_rate > 0.0 && self.training.learning_rate.is_finite()) {
            errors.push("training.learning_rate must be positive".to_string());
        }

        if self.tuning.reduction_factor < 2 {
            errors.push("tuning.reduction_factor must be >= 2".to_string());
        }
        if self.tuning.min_resource == 0 {
            errors.push("tuning.min_resource must be positive".to_string());
        }
        if !(0.0 < self.tuning.validation_fraction && self.tuning.validation_fraction < 1.0) {
            errors.push("tuning.validation_fraction must be in (0, 1)".to_string());
        }
        let space = &self.tuning.space;
        if space.hidden_min == 0 || space.hidden_min > space.hidden_max {
            errors.push("tuning.space hidden bounds are invalid".to_string());
        }
        if !(space.lr_min > 0.0 && space.lr_min <= space.lr_max) {
            errors.push("tuning.space learning-rate bounds are invalid".to_string());
        }
        if space.epochs_min == 0 || space.epochs_min > space.epochs_max {
            errors.push("tuning.space epoch bounds are invalid".to_string());
        }
        if space.batch_sizes.is_empty() || space.batch_sizes.contains(&0) {
            errors.push("tuning.space.batch_sizes must be non-empty and positive".to_string());
        }

        if self.inference.default_input_dim == 0 {
            errors.push("inference.default_input_dim must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
