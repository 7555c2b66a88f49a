//! Session configuration loading

use crate::types::{SessionConfig, MAX_LEAF_GRAMS};
use embassy_time::Duration;
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "SENCHA_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid session config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl SessionConfig {
    /// Parse inline JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        config.leaf_grams = config.leaf_grams.min(MAX_LEAF_GRAMS);
        Ok(config)
    }

    /// Read `SENCHA_CONFIG` if it is set, otherwise use defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(json) if !json.trim().is_empty() => Self::from_json(&json),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_ms == 0 {
            return Err(ConfigError::Zero("tick_period_ms"));
        }
        if self.cue_duration_ms == 0 {
            return Err(ConfigError::Zero("cue_duration_ms"));
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn cue_duration(&self) -> Duration {
        Duration::from_millis(self.cue_duration_ms)
    }
}
