//! Configuration manager: loads and merges layered build-setup configuration.

use std::sync::{Arc, RwLock};

use crate::config::partial::PartialBuildSetupConfig;
use crate::config::source::ConfigSource;

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error when reading configuration.
    Io(std::io::Error),
    /// Parsing error for configuration content.
    ParseError(String),
    /// Invalid configuration value: (field, message).
    InvalidValue(String, String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "I/O error: {}", err),
            ConfigError::ParseError(err) => write!(f, "parse error: {}", err),
            ConfigError::InvalidValue(field, msg) => {
                write!(f, "invalid value for {}: {}", field, msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::error::CoreError {
    fn from(err: ConfigError) -> Self {
        crate::error::CoreError::config(err.to_string())
    }
}

/// Loads and merges configuration from multiple layered sources.
pub struct ConfigManager {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Arc<RwLock<PartialBuildSetupConfig>>,
}

impl ConfigManager {
    /// Create a new, empty configuration manager.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            config: Arc::new(RwLock::new(PartialBuildSetupConfig::default())),
        }
    }

    /// Add a configuration source.
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Load configuration by merging all sources in ascending priority order,
    /// so a source with `priority() == 30` is merged last and wins over one
    /// with `priority() == 0`. Layering, lowest to highest: defaults, file,
    /// environment, programmatic overrides.
    pub fn load(&self) -> Result<(), ConfigError> {
        let mut merged = PartialBuildSetupConfig::default();
        let mut sources = self.sources.iter().collect::<Vec<_>>();
        sources.sort_by_key(|s| s.priority());
        for source in sources {
            let cfg = source.load()?;
            merged.merge(cfg)?;
        }
        let mut lock = self.config.write().unwrap();
        *lock = merged;
        Ok(())
    }

    /// Get the current merged (partial) configuration.
    pub fn config(&self) -> Arc<RwLock<PartialBuildSetupConfig>> {
        Arc::clone(&self.config)
    }

    /// Load and resolve to a complete [`crate::config::BuildSetupConfig`].
    pub fn load_complete(&self) -> Result<crate::config::BuildSetupConfig, ConfigError> {
        self.load()?;
        self.config().read().unwrap().to_complete()
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
