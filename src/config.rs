//! Configuration management
//!
//! One TOML file carries the ensemble, online-learning, learner and logging
//! sections.

use crate::ensemble::EnsembleConfig;
use crate::error::Result;
use crate::learners::LearnerParams;
use crate::online::OnlineLearningConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub ensemble: EnsembleConfig,
    pub online: OnlineLearningConfig,
    pub learners: LearnerParams,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load and validate configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, or defaults if it is missing or invalid
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        Self::load(path).unwrap_or_else(|e| {
            warn!("Using default config, could not load {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.ensemble.validate()?;
        self.online.validate()?;
        for &kind in &self.ensemble.base_learner_types {
            self.learners.validate_kind(kind)?;
        }
        Ok(())
    }
}
