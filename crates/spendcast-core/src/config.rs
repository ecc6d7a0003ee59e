//! Forecasting configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/spendcast/config/spendcast.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::ml::FitOptions;
use crate::policy::RetrainPolicy;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/spendcast.toml");

/// Settings for a user training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub validation_split: f64,
    pub patience: usize,
    /// Minimum training pairs before fitting is attempted
    pub min_pairs: usize,
    pub max_batch_size: usize,
    pub timeout: Option<Duration>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            validation_split: 0.2,
            patience: 10,
            min_pairs: 3,
            max_batch_size: 32,
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl TrainingConfig {
    /// Fit options for a run starting now
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            epochs: self.epochs,
            max_batch_size: self.max_batch_size,
            validation_split: self.validation_split,
            patience: self.patience,
            restore_best_weights: true,
            deadline: self.timeout.map(|t| Instant::now() + t),
        }
    }
}

/// Architecture settings for newly fitted base models
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_units: 32,
            learning_rate: 0.001,
            seed: 42,
        }
    }
}

/// Complete forecasting configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    pub data_dir: PathBuf,
    pub retrain: RetrainPolicy,
    pub training: TrainingConfig,
    pub model: ModelConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            retrain: RetrainPolicy::default(),
            training: TrainingConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl ForecastConfig {
    /// Load from an explicit path, the data-dir override, or the embedded defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Failed to read config {}: {}", path.display(), e))
            })?,
            None => match default_config_path() {
                Some(default_path) if default_path.exists() => fs::read_to_string(&default_path)
                    .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?,
                _ => DEFAULT_CONFIG.to_string(),
            },
        };

        parse_config(&content)
    }

    /// Defaults rooted at a specific data directory (for tests and embedding)
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }
}

/// Default data directory (~/.local/share/spendcast)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spendcast")
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendcast").join("config").join("spendcast.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    storage: Option<RawStorage>,
    retraining: Option<RawRetraining>,
    training: Option<RawTraining>,
    model: Option<RawModel>,
}

#[derive(Debug, Deserialize)]
struct RawStorage {
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawRetraining {
    min_transactions: Option<usize>,
    min_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawTraining {
    epochs: Option<usize>,
    validation_split: Option<f64>,
    patience: Option<usize>,
    min_pairs: Option<usize>,
    max_batch_size: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    hidden_units: Option<usize>,
    learning_rate: Option<f64>,
    seed: Option<u64>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<ForecastConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = ForecastConfig::default();

    if let Some(storage) = raw.storage {
        if let Some(dir) = storage.data_dir {
            config.data_dir = dir;
        }
    }

    if let Some(retraining) = raw.retraining {
        if let Some(min) = retraining.min_transactions {
            config.retrain.min_transactions = min;
        }
        if let Some(days) = retraining.min_days {
            config.retrain.min_days = days;
        }
    }

    if let Some(training) = raw.training {
        if let Some(epochs) = training.epochs {
            config.training.epochs = epochs;
        }
        if let Some(split) = training.validation_split {
            if !(0.0..1.0).contains(&split) {
                return Err(Error::Config(format!(
                    "validation_split must be in [0, 1), got {}",
                    split
                )));
            }
            config.training.validation_split = split;
        }
        if let Some(patience) = training.patience {
            config.training.patience = patience;
        }
        if let Some(min_pairs) = training.min_pairs {
            config.training.min_pairs = min_pairs;
        }
        if let Some(batch) = training.max_batch_size {
            config.training.max_batch_size = batch.max(1);
        }
        if let Some(secs) = training.timeout_secs {
            config.training.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
    }

    if let Some(model) = raw.model {
        if let Some(hidden) = model.hidden_units {
            config.model.hidden_units = hidden.max(1);
        }
        if let Some(lr) = model.learning_rate {
            config.model.learning_rate = lr;
        }
        if let Some(seed) = model.seed {
            config.model.seed = seed;
        }
    }

    Ok(config)
}
