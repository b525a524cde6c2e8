//! Partial build-setup configuration and its merge semantics.
//!
//! Every layer (defaults, file, environment, programmatic overrides) produces
//! a `PartialBuildSetupConfig`. Layers are merged left-to-right: a later
//! layer's present scalar fields replace the accumulator's, and flag vectors
//! are appended in layering order rather than replaced.

use crate::config::manager::ConfigError;
use serde::{Deserialize, Serialize};

/// Build configuration selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildConfiguration {
    /// Debug build (the default when unset).
    Debug,
    /// Release build.
    Release,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        BuildConfiguration::Debug
    }
}

/// How the workspace's build description should be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkspaceType {
    /// Query an external build-server-protocol endpoint.
    BuildServer,
    /// Read a compilation database.
    CompDb,
    /// Load the package manifest directly (the default when unset).
    PackageManifest,
}

impl Default for WorkspaceType {
    fn default() -> Self {
        WorkspaceType::PackageManifest
    }
}

/// Per-language extra compiler flags, appended to the flags the package
/// loader already derives for a target.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageFlags {
    /// Extra flags for C compilation units.
    pub c: Vec<String>,
    /// Extra flags for C++ compilation units.
    pub cxx: Vec<String>,
    /// Extra flags for the package's primary language.
    pub swift: Vec<String>,
    /// Extra flags passed to the linker.
    pub linker: Vec<String>,
}

impl LanguageFlags {
    fn append(&mut self, other: LanguageFlags) {
        self.c.extend(other.c);
        self.cxx.extend(other.cxx);
        self.swift.extend(other.swift);
        self.linker.extend(other.linker);
    }
}

/// Partial build-setup configuration: every field optional so a layer can
/// leave a field unspecified and defer to the previous layer's value.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialBuildSetupConfig {
    /// Debug or release.
    pub configuration: Option<BuildConfiguration>,
    /// How to obtain the build description.
    pub default_workspace_type: Option<WorkspaceType>,
    /// Scratch directory for build artifacts; must be absolute when present.
    pub scratch_path: Option<std::path::PathBuf>,
    /// Extra per-language flags, appended across layers.
    pub flags: LanguageFlags,
    /// Scheduler concurrency budget; defaults to the CPU count.
    pub max_concurrent_tasks: Option<usize>,
}

impl PartialBuildSetupConfig {
    /// Merge `other` into `self`. Present scalar fields in `other` replace
    /// the corresponding field in `self`; flag vectors are appended.
    pub fn merge(&mut self, other: PartialBuildSetupConfig) -> Result<(), ConfigError> {
        if let Some(v) = other.configuration {
            self.configuration = Some(v);
        }
        if let Some(v) = other.default_workspace_type {
            self.default_workspace_type = Some(v);
        }
        if let Some(v) = other.scratch_path {
            self.scratch_path = Some(v);
        }
        if let Some(v) = other.max_concurrent_tasks {
            self.max_concurrent_tasks = Some(v);
        }
        self.flags.append(other.flags);
        Ok(())
    }

    /// Fill in defaults for any unset field, producing a complete config.
    pub fn to_complete(&self) -> Result<crate::config::BuildSetupConfig, ConfigError> {
        let scratch_path = match &self.scratch_path {
            Some(p) if !p.is_absolute() => {
                return Err(ConfigError::InvalidValue(
                    "scratch_path".to_string(),
                    "must be an absolute path".to_string(),
                ));
            }
            Some(p) => Some(p.clone()),
            None => None,
        };
        Ok(crate::config::BuildSetupConfig {
            configuration: self.configuration.unwrap_or_default(),
            default_workspace_type: self.default_workspace_type.unwrap_or_default(),
            scratch_path,
            flags: self.flags.clone(),
            max_concurrent_tasks: self.max_concurrent_tasks.unwrap_or_else(num_cpus::get),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_scalar_last_wins() {
        let mut base = PartialBuildSetupConfig {
            configuration: Some(BuildConfiguration::Debug),
            ..Default::default()
        };
        let override_cfg = PartialBuildSetupConfig {
            configuration: Some(BuildConfiguration::Release),
            ..Default::default()
        };

        base.merge(override_cfg).unwrap();
        assert_eq!(base.configuration, Some(BuildConfiguration::Release));
    }

    #[test]
    fn test_merge_flags_append_in_order() {
        let mut base = PartialBuildSetupConfig::default();
        base.flags.swift = vec!["-Xfrontend".to_string()];
        let mut override_cfg = PartialBuildSetupConfig::default();
        override_cfg.flags.swift = vec!["-enable-testing".to_string()];

        base.merge(override_cfg).unwrap();
        assert_eq!(
            base.flags.swift,
            vec!["-Xfrontend".to_string(), "-enable-testing".to_string()]
        );
    }

    #[test]
    fn test_to_complete_defaults_concurrency_to_cpu_count() {
        let partial = PartialBuildSetupConfig::default();
        let complete = partial.to_complete().unwrap();
        assert_eq!(complete.max_concurrent_tasks, num_cpus::get());
        assert_eq!(complete.configuration, BuildConfiguration::Debug);
    }

    #[test]
    fn test_to_complete_rejects_relative_scratch_path() {
        let mut partial = PartialBuildSetupConfig::default();
        partial.scratch_path = Some(std::path::PathBuf::from("relative/scratch"));
        assert!(partial.to_complete().is_err());
    }
}
