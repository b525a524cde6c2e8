//! Data model for the build-settings resolver: targets, configured
//! targets, build settings, and the build graph produced by a reload.

use std::collections::HashMap;
use std::path::PathBuf;

/// Addressable identity for a target in a specific build configuration.
///
/// The empty-`target_id`/empty-`run_destination_id` pair is a reserved
/// sentinel meaning "the package manifest itself" — it never collides with
/// a user target, since user targets have non-empty names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfiguredTarget {
    /// Stable target name.
    pub target_id: String,
    /// Build-destination discriminator (e.g. host vs. a cross target).
    pub run_destination_id: String,
}

impl ConfiguredTarget {
    /// Construct an ordinary configured target.
    pub fn new(target_id: impl Into<String>, run_destination_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            run_destination_id: run_destination_id.into(),
        }
    }

    /// The reserved sentinel addressing the package manifest.
    pub fn manifest_sentinel() -> Self {
        Self {
            target_id: String::new(),
            run_destination_id: String::new(),
        }
    }

    /// Whether this is the manifest sentinel.
    pub fn is_manifest_sentinel(&self) -> bool {
        self.target_id.is_empty() && self.run_destination_id.is_empty()
    }
}

/// A build target: its identity, topological rank, and source files.
#[derive(Debug, Clone)]
pub struct Target {
    /// This target's addressable identity.
    pub configured_target: ConfiguredTarget,
    /// Integer rank consistent with the dependency DAG; lower = more
    /// fundamental. Dependencies always have a strictly smaller index.
    pub topological_index: usize,
    /// Absolute paths of every source file this target lists.
    pub sources: Vec<PathBuf>,
    /// The target's source root, used to map files below it that aren't
    /// individually listed (e.g. headers).
    pub source_root: PathBuf,
    /// Base compiler arguments for files in this target, keyed by the
    /// source path they apply to.
    pub compile_args: HashMap<PathBuf, Vec<String>>,
}

impl Target {
    /// The lexicographically least source path, used as a substitute
    /// template when synthesizing settings for an unlisted file.
    pub fn substitute_source(&self) -> Option<&PathBuf> {
        self.sources.iter().min()
    }
}

/// Compiler invocation for a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBuildSettings {
    /// Full argument vector, including the compiler executable as `args[0]`.
    pub arguments: Vec<String>,
    /// Working directory the arguments should be interpreted relative to.
    pub working_directory: PathBuf,
}

/// Result of a successful package load: the module graph and the three
/// lookup maps the resolver serves queries from.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    /// All targets, keyed by configured target identity.
    pub targets: HashMap<ConfiguredTarget, Target>,
    /// Every source file mapped to its owning target's identity.
    pub file_to_target: HashMap<PathBuf, ConfiguredTarget>,
    /// Every target's source root mapped to its identity, for ancestor walks.
    pub source_dir_to_target: HashMap<PathBuf, ConfiguredTarget>,
    /// Interpreter flags reported by the package loader for the owning
    /// package, used when serving build settings for the manifest sentinel.
    pub interpreter_flags: Vec<String>,
}

/// The kind of change a host reports for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// The file was created.
    Created,
    /// The file's contents changed.
    Changed,
    /// The file was deleted.
    Deleted,
    /// The host could not classify the change.
    Unknown,
}

/// A single file-system change reported by the host via `files_did_change`.
#[derive(Debug, Clone)]
pub struct FileEvent {
    /// Absolute path of the changed file.
    pub path: PathBuf,
    /// What kind of change occurred.
    pub kind: FileEventKind,
}
