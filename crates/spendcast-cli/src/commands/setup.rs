//! Shared utilities for command implementations

use std::path::Path;

use anyhow::{Context, Result};
use spendcast_core::{ForecastConfig, ForecastService};

/// Load config, letting `--data-dir` override the configured directory
pub fn load_config(config_path: Option<&Path>, data_dir: Option<&Path>) -> Result<ForecastConfig> {
    let mut config = ForecastConfig::load(config_path).context("Failed to load config")?;
    if let Some(dir) = data_dir {
        config.data_dir = dir.to_path_buf();
    }
    Ok(config)
}

pub fn open_service(config: ForecastConfig) -> ForecastService {
    ForecastService::new(config)
}
