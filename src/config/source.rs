//! Configuration sources for loading partial build-setup configuration.

use crate::config::environment::{EnvironmentProvider, SystemEnvironmentProvider};
use crate::config::manager::ConfigError;
use crate::config::partial::PartialBuildSetupConfig;
use std::path::PathBuf;

/// A layer that can produce a [`PartialBuildSetupConfig`].
pub trait ConfigSource: Send + Sync {
    /// Load this layer's partial configuration.
    fn load(&self) -> Result<PartialBuildSetupConfig, ConfigError>;
    /// Merge order: lower values are merged first and are overridden by
    /// higher-priority sources.
    fn priority(&self) -> u8;
    /// Source name for logging.
    fn source_name(&self) -> &'static str;
    /// File system paths to watch for changes (only file-based sources need override).
    fn watch_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Built-in defaults, wrapped as the lowest-priority source.
pub struct DefaultsSource {
    defaults: PartialBuildSetupConfig,
}

impl DefaultsSource {
    /// Wrap a fixed partial configuration as the defaults layer.
    pub fn new(defaults: PartialBuildSetupConfig) -> Self {
        Self { defaults }
    }
}

impl ConfigSource for DefaultsSource {
    fn load(&self) -> Result<PartialBuildSetupConfig, ConfigError> {
        Ok(self.defaults.clone())
    }

    fn priority(&self) -> u8 {
        0
    }

    fn source_name(&self) -> &'static str {
        "defaults"
    }
}

/// A `build-setup.toml` file inside the workspace.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Create a new file source for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<PartialBuildSetupConfig, ConfigError> {
        if !self.path.exists() {
            return Ok(PartialBuildSetupConfig::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let cfg = toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(cfg)
    }

    fn priority(&self) -> u8 {
        10
    }

    fn source_name(&self) -> &'static str {
        "file"
    }

    fn watch_paths(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }
}

/// `SEMINDEX_*` environment variables.
pub struct EnvSource {
    provider: Box<dyn EnvironmentProvider>,
}

impl EnvSource {
    /// Create a source reading from the real process environment.
    pub fn new() -> Self {
        Self {
            provider: Box::new(SystemEnvironmentProvider::new()),
        }
    }

    /// Create a source reading from an injected [`EnvironmentProvider`], for tests.
    pub fn with_provider(provider: Box<dyn EnvironmentProvider>) -> Self {
        Self { provider }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for EnvSource {
    fn load(&self) -> Result<PartialBuildSetupConfig, ConfigError> {
        let mut cfg = PartialBuildSetupConfig::default();
        if let Some(val) = self.provider.get_var("SEMINDEX_CONFIGURATION") {
            cfg.configuration = match val.to_ascii_lowercase().as_str() {
                "debug" => Some(crate::config::partial::BuildConfiguration::Debug),
                "release" => Some(crate::config::partial::BuildConfiguration::Release),
                other => {
                    return Err(ConfigError::InvalidValue(
                        "SEMINDEX_CONFIGURATION".to_string(),
                        format!("unrecognized configuration '{}'", other),
                    ));
                }
            };
        }
        if let Some(val) = self.provider.get_var("SEMINDEX_SCRATCH_PATH") {
            cfg.scratch_path = Some(PathBuf::from(val));
        }
        if let Some(val) = self.provider.get_var("SEMINDEX_MAX_CONCURRENT_TASKS") {
            let parsed = val.parse::<usize>().map_err(|_| {
                ConfigError::InvalidValue(
                    "SEMINDEX_MAX_CONCURRENT_TASKS".to_string(),
                    format!("'{}' is not a positive integer", val),
                )
            })?;
            cfg.max_concurrent_tasks = Some(parsed);
        }
        Ok(cfg)
    }

    fn priority(&self) -> u8 {
        20
    }

    fn source_name(&self) -> &'static str {
        "environment"
    }
}

/// Programmatic overrides passed to `init`, highest priority.
pub struct OverridesSource {
    overrides: PartialBuildSetupConfig,
}

impl OverridesSource {
    /// Wrap caller-supplied overrides as the top layer.
    pub fn new(overrides: PartialBuildSetupConfig) -> Self {
        Self { overrides }
    }
}

impl ConfigSource for OverridesSource {
    fn load(&self) -> Result<PartialBuildSetupConfig, ConfigError> {
        Ok(self.overrides.clone())
    }

    fn priority(&self) -> u8 {
        30
    }

    fn source_name(&self) -> &'static str {
        "overrides"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::environment::TestEnvironmentProvider;
    use std::collections::HashMap;

    #[test]
    fn test_env_source_reads_scratch_path() {
        let mut vars = HashMap::new();
        vars.insert(
            "SEMINDEX_SCRATCH_PATH".to_string(),
            "/tmp/scratch".to_string(),
        );
        let source = EnvSource::with_provider(Box::new(TestEnvironmentProvider::with_variables(
            vars,
        )));
        let cfg = source.load().unwrap();
        assert_eq!(cfg.scratch_path, Some(PathBuf::from("/tmp/scratch")));
    }

    #[test]
    fn test_env_source_rejects_non_numeric_concurrency() {
        let mut vars = HashMap::new();
        vars.insert(
            "SEMINDEX_MAX_CONCURRENT_TASKS".to_string(),
            "not-a-number".to_string(),
        );
        let source = EnvSource::with_provider(Box::new(TestEnvironmentProvider::with_variables(
            vars,
        )));
        assert!(source.load().is_err());
    }

    #[test]
    fn test_file_source_missing_file_yields_empty_config() {
        let source = FileSource::new(PathBuf::from("/nonexistent/build-setup.toml"));
        let cfg = source.load().unwrap();
        assert_eq!(cfg.max_concurrent_tasks, None);
    }
}
