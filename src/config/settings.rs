use std::path::Path;

use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::node::AllocationRatios;

/// Planner configuration, layered from defaults, config files and
/// environment variables. The allocation ratios travel from here into the
/// simulation builder; nothing reads them as global constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub allocation: AllocationRatios,
    pub planner: PlannerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Nodes above `average * threshold` count as overutilized.
    pub overutilized_threshold: f64,
    /// Fraction of average pressure that target hosts should land near.
    pub target_utilization_factor: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            overutilized_threshold: 1.2,
            target_utilization_factor: 0.9,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            allocation: AllocationRatios::default(),
            planner: PlannerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `$CONFIG_PATH` (default `config/`): hardcoded
    /// defaults, then `default.toml`, then `local.toml`, then environment
    /// variables with the `APP_` prefix, each layer overriding the last.
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());

        info!("loading configuration from path: {}", config_path);

        let config = Config::builder()
            .set_default("allocation.cpu", 8.0)?
            .set_default("allocation.ram", 1.5)?
            .set_default("planner.overutilized_threshold", 1.2)?
            .set_default("planner.target_utilization_factor", 0.9)?
            .add_source(File::with_name(&format!("{}/default", config_path)).required(false))
            .add_source(File::with_name(&format!("{}/local", config_path)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Load settings from one explicit file, with no layering.
    pub fn new_from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("allocation.cpu", 8.0)?
            .set_default("allocation.ram", 1.5)?
            .set_default("planner.overutilized_threshold", 1.2)?
            .set_default("planner.target_utilization_factor", 0.9)?
            .add_source(File::from(path))
            .build()?;

        config.try_deserialize()
    }
}
