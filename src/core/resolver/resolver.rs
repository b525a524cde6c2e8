//! Build-settings resolver: loads the package manifest, maps files to
//! targets, and serves per-file compiler-argument queries.

use super::loader::PackageLoader;
use super::types::{BuildGraph, ConfiguredTarget, FileBuildSettings, FileEvent, FileEventKind, Target};
use crate::config::WorkspaceConfig;
use crate::core::delegate::DelegateBus;
use crate::error::CoreError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// What a changed-file event implies the resolver should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEventClassification {
    /// Reload the package graph.
    TriggerReload,
    /// No reload needed, but dependent files should be reported as having
    /// updated dependencies.
    DependentsUpdated(HashSet<PathBuf>),
    /// No action.
    Nothing,
}

/// Loads a package manifest and serves configured-target and build-setting
/// queries. Reloads are serialized by an internal lock and either fully
/// succeed or fully preserve prior state.
pub struct BuildSettingsResolver {
    workspace: WorkspaceConfig,
    loader: Arc<dyn PackageLoader>,
    is_for_index_build: bool,
    graph: Arc<RwLock<BuildGraph>>,
    symlink_memo: Mutex<HashMap<PathBuf, PathBuf>>,
    delegate: DelegateBus,
}

impl BuildSettingsResolver {
    /// Construct a resolver for `workspace`, backed by `loader`.
    pub fn new(
        workspace: WorkspaceConfig,
        loader: Arc<dyn PackageLoader>,
        is_for_index_build: bool,
        delegate: DelegateBus,
    ) -> Self {
        Self {
            workspace,
            loader,
            is_for_index_build,
            graph: Arc::new(RwLock::new(BuildGraph::default())),
            symlink_memo: Mutex::new(HashMap::new()),
            delegate,
        }
    }

    /// The workspace this resolver serves.
    pub fn workspace(&self) -> &WorkspaceConfig {
        &self.workspace
    }

    /// Reload the package graph. On failure, prior maps are left intact
    /// and the error is returned; the caller's reload-status callback (if
    /// any) still fires for both `Start` and `End`, mirroring the scoped
    /// release used by the system this resolver's design is drawn from —
    /// see the open question recorded in this crate's design notes.
    pub async fn reload(&self) -> crate::Result<()> {
        log::debug!("resolver: reload start for {}", self.workspace.root.display());

        let loaded = self
            .loader
            .load(&self.workspace.root, &self.workspace.build_setup, self.is_for_index_build)
            .await;

        let loaded = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                log::warn!("resolver: reload failed, preserving prior state: {}", err);
                log::debug!("resolver: reload end for {}", self.workspace.root.display());
                return Err(err);
            }
        };

        let indices = topological_indices(&loaded.targets);

        let mut targets = HashMap::new();
        let mut file_to_target = HashMap::new();
        let mut source_dir_to_target = HashMap::new();

        for description in &loaded.targets {
            let configured = ConfiguredTarget::new(
                description.target_id.clone(),
                description.run_destination_id.clone(),
            );
            let index = *indices.get(&description.target_id).unwrap_or(&usize::MAX);

            if targets.contains_key(&configured) {
                log::warn!(
                    "resolver: duplicate configured target {:?}; last load wins",
                    configured
                );
            }

            for source in &description.sources {
                if file_to_target.contains_key(source) {
                    log::warn!("resolver: file {} claimed by multiple targets; last load wins", source.display());
                }
                file_to_target.insert(source.clone(), configured.clone());
            }
            source_dir_to_target.insert(description.source_root.clone(), configured.clone());

            targets.insert(
                configured.clone(),
                Target {
                    configured_target: configured,
                    topological_index: index,
                    sources: description.sources.clone(),
                    source_root: description.source_root.clone(),
                    compile_args: description.compile_args.clone(),
                },
            );
        }

        let manifest_path = self.workspace.root.join(&self.workspace.manifest_filename);
        file_to_target.insert(manifest_path, ConfiguredTarget::manifest_sentinel());

        {
            let mut guard = self.graph.write().unwrap();
            *guard = BuildGraph {
                targets,
                file_to_target,
                source_dir_to_target,
                interpreter_flags: loaded.interpreter_flags.clone(),
            };
        }
        self.symlink_memo.lock().unwrap().clear();

        log::debug!("resolver: reload end for {}", self.workspace.root.display());

        let watched: HashSet<PathBuf> = self.graph.read().unwrap().file_to_target.keys().cloned().collect();
        self.delegate
            .notify_build_settings_changed(path_set_to_string_set(&watched))
            .await;
        self.delegate.notify_handling_capability_changed().await;

        Ok(())
    }

    /// Configured targets that claim `path`. Empty if the file is unowned.
    pub fn configured_targets_for(&self, path: &Path) -> Vec<ConfiguredTarget> {
        let graph = self.graph.read().unwrap();

        if let Some(target) = graph.file_to_target.get(path) {
            return vec![target.clone()];
        }
        if let Some(resolved) = self.resolve_symlink_memoized(path) {
            if let Some(target) = graph.file_to_target.get(&resolved) {
                return vec![target.clone()];
            }
        }

        if path.file_name().map(|n| n == self.workspace.manifest_filename.as_str()).unwrap_or(false) {
            return vec![ConfiguredTarget::manifest_sentinel()];
        }

        let mut dir = path.parent();
        while let Some(d) = dir {
            if let Some(target) = graph.source_dir_to_target.get(d) {
                return vec![target.clone()];
            }
            if let Some(resolved) = self.resolve_symlink_memoized(d) {
                if let Some(target) = graph.source_dir_to_target.get(&resolved) {
                    return vec![target.clone()];
                }
            }
            dir = d.parent();
        }

        Vec::new()
    }

    /// Whether any target claims `path`.
    pub fn file_handling_capability(&self, path: &Path) -> bool {
        !self.configured_targets_for(path).is_empty()
    }

    /// Every known source file across all targets, excluding the manifest
    /// sentinel entry. Used to seed a full background indexing pass.
    pub fn known_source_files(&self) -> Vec<PathBuf> {
        let graph = self.graph.read().unwrap();
        graph
            .file_to_target
            .keys()
            .filter(|path| {
                !path
                    .file_name()
                    .map(|n| n == self.workspace.manifest_filename.as_str())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Build settings for `path` under `target`. `language` is currently
    /// unused by the substitute-file heuristic but kept for parity with
    /// the host interface, which dispatches per-language flag overlays
    /// before invoking this query.
    pub fn build_settings(
        &self,
        path: &Path,
        target: &ConfiguredTarget,
        _language: &str,
    ) -> crate::Result<FileBuildSettings> {
        if target.is_manifest_sentinel() {
            let graph = self.graph.read().unwrap();
            let mut arguments = graph.interpreter_flags.clone();
            arguments.push(self.workspace.root.join(&self.workspace.manifest_filename).display().to_string());
            return Ok(FileBuildSettings {
                arguments,
                working_directory: self.workspace.root.clone(),
            });
        }

        let graph = self.graph.read().unwrap();
        let resolved_target = graph
            .targets
            .get(target)
            .ok_or_else(|| CoreError::MissingTarget(path.to_path_buf()))?;

        if let Some(args) = resolved_target.compile_args.get(path) {
            return Ok(FileBuildSettings {
                arguments: args.clone(),
                working_directory: self.workspace.root.clone(),
            });
        }

        let substitute = resolved_target
            .substitute_source()
            .ok_or_else(|| CoreError::MissingTarget(path.to_path_buf()))?;
        let substitute_args = resolved_target
            .compile_args
            .get(substitute)
            .ok_or_else(|| CoreError::MissingTarget(path.to_path_buf()))?;

        let resolved_path = self.resolve_symlink_memoized(path).unwrap_or_else(|| path.to_path_buf());
        let substitute_str = substitute.to_string_lossy().into_owned();
        let resolved_str = resolved_path.to_string_lossy().into_owned();

        let patched = substitute_args
            .iter()
            .map(|arg| arg.replace(&substitute_str, &resolved_str))
            .collect();

        Ok(FileBuildSettings {
            arguments: patched,
            working_directory: self.workspace.root.clone(),
        })
    }

    fn resolve_symlink_memoized(&self, path: &Path) -> Option<PathBuf> {
        if let Some(resolved) = self.symlink_memo.lock().unwrap().get(path) {
            return Some(resolved.clone());
        }
        let resolved = std::fs::canonicalize(path).ok()?;
        if resolved != path {
            self.symlink_memo
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), resolved.clone());
        }
        Some(resolved)
    }

    /// Stable sort by stored topological index; unknown targets (no
    /// `index` recorded) sort to the end.
    pub fn topological_sort(&self, targets: &[ConfiguredTarget]) -> Vec<ConfiguredTarget> {
        let graph = self.graph.read().unwrap();
        let mut sorted = targets.to_vec();
        sorted.sort_by_key(|t| graph.targets.get(t).map(|target| target.topological_index).unwrap_or(usize::MAX));
        sorted
    }

    /// Over-approximation: every known target with an index greater than
    /// the minimum index among `targets`. If any input target is unknown,
    /// conservatively returns every known target.
    pub fn targets_depending_on(&self, targets: &[ConfiguredTarget]) -> Vec<ConfiguredTarget> {
        let graph = self.graph.read().unwrap();

        let mut indices = Vec::with_capacity(targets.len());
        for t in targets {
            match graph.targets.get(t) {
                Some(target) => indices.push(target.topological_index),
                None => return graph.targets.keys().cloned().collect(),
            }
        }
        let min_index = match indices.into_iter().min() {
            Some(m) => m,
            None => return Vec::new(),
        };

        graph
            .targets
            .values()
            .filter(|target| target.topological_index > min_index)
            .map(|target| target.configured_target.clone())
            .collect()
    }

    /// Classify a batch of file-change events.
    pub fn classify(&self, events: &[FileEvent]) -> FileEventClassification {
        let manifest_name = self.workspace.manifest_filename.as_str();

        for event in events {
            let basename_matches = event
                .path
                .file_name()
                .map(|n| n == manifest_name)
                .unwrap_or(false);

            match event.kind {
                FileEventKind::Created | FileEventKind::Deleted => {
                    return FileEventClassification::TriggerReload;
                }
                FileEventKind::Changed if basename_matches => {
                    return FileEventClassification::TriggerReload;
                }
                _ => {}
            }
        }

        let graph = self.graph.read().unwrap();

        // A changed compiled-module artifact invalidates every known file's
        // dependencies, not just its own target's — but only when building
        // against the user's real build outputs; index-only builds use an
        // isolated scratch directory those artifacts don't affect.
        if !self.is_for_index_build {
            let module_artifact_changed = events
                .iter()
                .any(|event| event.kind == FileEventKind::Changed && is_compiled_module_artifact(&event.path));
            if module_artifact_changed {
                let all_known: HashSet<PathBuf> = graph.file_to_target.keys().cloned().collect();
                return if all_known.is_empty() {
                    FileEventClassification::Nothing
                } else {
                    FileEventClassification::DependentsUpdated(all_known)
                };
            }
        }

        let mut dependents = HashSet::new();
        for event in events {
            if event.kind != FileEventKind::Changed {
                continue;
            }
            if let Some(target_id) = graph.file_to_target.get(&event.path) {
                if let Some(target) = graph.targets.get(target_id) {
                    dependents.extend(target.sources.iter().cloned());
                }
            }
        }

        if dependents.is_empty() {
            FileEventClassification::Nothing
        } else {
            FileEventClassification::DependentsUpdated(dependents)
        }
    }
}

/// Whether `path` names a compiled-module artifact (`.swiftmodule`), whose
/// change invalidates every known file's dependencies rather than just the
/// owning target's, per the over-approximating fan-out policy.
fn is_compiled_module_artifact(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("swiftmodule")
}

fn path_set_to_string_set(paths: &HashSet<PathBuf>) -> HashSet<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

/// Kahn's algorithm over `depends_on` edges, producing a topological index
/// per target id. Ties among targets with no remaining dependency are
/// broken by ascending target id for determinism.
fn topological_indices(targets: &[super::loader::TargetDescription]) -> HashMap<String, usize> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for t in targets {
        in_degree.entry(&t.target_id).or_insert(0);
        for dep in &t.depends_on {
            *in_degree.entry(&t.target_id).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(&t.target_id);
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort_unstable();
    let mut queue: VecDeque<&str> = ready.into_iter().collect();

    let mut indices = HashMap::new();
    let mut next_index = 0;
    while let Some(id) = queue.pop_front() {
        indices.insert(id.to_string(), next_index);
        next_index += 1;

        if let Some(deps) = dependents.get(id) {
            let mut newly_ready = Vec::new();
            for dep in deps {
                if let Some(deg) = in_degree.get_mut(dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(*dep);
                    }
                }
            }
            newly_ready.sort_unstable();
            for dep in newly_ready {
                queue.push_back(dep);
            }
        }
    }

    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::partial::LanguageFlags;
    use crate::config::BuildSetupConfig;
    use crate::core::resolver::loader::{FakePackageLoader, LoadedPackage, TargetDescription};

    fn workspace_config(root: PathBuf) -> WorkspaceConfig {
        WorkspaceConfig {
            root,
            manifest_filename: "Package.semindex".to_string(),
            package_description_sentinel: "semindex-package".to_string(),
            build_setup: BuildSetupConfig {
                configuration: crate::config::partial::BuildConfiguration::Debug,
                default_workspace_type: crate::config::partial::WorkspaceType::PackageManifest,
                scratch_path: None,
                flags: LanguageFlags::default(),
                max_concurrent_tasks: 4,
            },
        }
    }

    fn lib_target(root: &Path) -> TargetDescription {
        let mut compile_args = HashMap::new();
        let a = root.join("Sources/Lib/a.swift");
        let b = root.join("Sources/Lib/b.swift");
        compile_args.insert(a.clone(), vec!["swiftc".to_string(), a.display().to_string()]);
        compile_args.insert(b.clone(), vec!["swiftc".to_string(), b.display().to_string()]);
        TargetDescription {
            target_id: "Lib".to_string(),
            run_destination_id: "dummy".to_string(),
            depends_on: vec![],
            sources: vec![a, b],
            source_root: root.join("Sources/Lib"),
            compile_args,
        }
    }

    #[tokio::test]
    async fn test_header_inference_uses_lexically_least_substitute() {
        let root = PathBuf::from("/tmp/ws");
        let ws = workspace_config(root.clone());
        let loader = Arc::new(FakePackageLoader::with_package(LoadedPackage {
            targets: vec![lib_target(&root)],
            interpreter_flags: vec![],
        }));
        let resolver = BuildSettingsResolver::new(ws, loader, false, DelegateBus::new());
        resolver.reload().await.unwrap();

        let header = root.join("Sources/Lib/include/h.h");
        let targets = resolver.configured_targets_for(&header);
        assert_eq!(targets, vec![ConfiguredTarget::new("Lib", "dummy")]);

        let settings = resolver
            .build_settings(&header, &targets[0], "c")
            .unwrap();
        let a = root.join("Sources/Lib/a.swift");
        assert!(!settings.arguments.iter().any(|arg| arg.contains(&a.display().to_string())));
        assert!(settings
            .arguments
            .iter()
            .any(|arg| arg.contains(&header.display().to_string())));
    }

    #[tokio::test]
    async fn test_manifest_addressing_returns_sentinel_and_interpreter_flags() {
        let root = PathBuf::from("/tmp/ws2");
        let ws = workspace_config(root.clone());
        let loader = Arc::new(FakePackageLoader::with_package(LoadedPackage {
            targets: vec![lib_target(&root)],
            interpreter_flags: vec!["-swift-version".to_string(), "5".to_string()],
        }));
        let resolver = BuildSettingsResolver::new(ws, loader, false, DelegateBus::new());
        resolver.reload().await.unwrap();

        let manifest = root.join("Package.semindex");
        let targets = resolver.configured_targets_for(&manifest);
        assert_eq!(targets, vec![ConfiguredTarget::manifest_sentinel()]);

        let settings = resolver.build_settings(&manifest, &targets[0], "swift").unwrap();
        assert_eq!(settings.arguments[0], "-swift-version");
        assert_eq!(settings.arguments.last().unwrap(), &manifest.display().to_string());
    }

    #[tokio::test]
    async fn test_reload_preserves_prior_state_on_failure() {
        let root = PathBuf::from("/tmp/ws3");
        let ws = workspace_config(root.clone());
        let loader = Arc::new(FakePackageLoader::with_package(LoadedPackage {
            targets: vec![lib_target(&root)],
            interpreter_flags: vec![],
        }));
        let resolver = BuildSettingsResolver::new(ws, loader.clone(), false, DelegateBus::new());
        resolver.reload().await.unwrap();

        let before = resolver.graph.read().unwrap().clone();

        loader.set_error("boom");
        assert!(resolver.reload().await.is_err());

        let after = resolver.graph.read().unwrap().clone();
        assert_eq!(before.targets.len(), after.targets.len());
    }

    #[test]
    fn test_topological_indices_respect_dependency_order() {
        let targets = vec![
            TargetDescription {
                target_id: "App".to_string(),
                run_destination_id: "dummy".to_string(),
                depends_on: vec!["Lib".to_string()],
                sources: vec![],
                source_root: PathBuf::from("Sources/App"),
                compile_args: HashMap::new(),
            },
            TargetDescription {
                target_id: "Lib".to_string(),
                run_destination_id: "dummy".to_string(),
                depends_on: vec![],
                sources: vec![],
                source_root: PathBuf::from("Sources/Lib"),
                compile_args: HashMap::new(),
            },
        ];
        let indices = topological_indices(&targets);
        assert!(indices["Lib"] < indices["App"]);
    }

    #[tokio::test]
    async fn test_targets_depending_on_over_approximates_on_unknown_input() {
        let root = PathBuf::from("/tmp/ws4");
        let ws = workspace_config(root.clone());
        let loader = Arc::new(FakePackageLoader::with_package(LoadedPackage {
            targets: vec![lib_target(&root)],
            interpreter_flags: vec![],
        }));
        let resolver = BuildSettingsResolver::new(ws, loader, false, DelegateBus::new());
        resolver.reload().await.unwrap();

        let unknown = ConfiguredTarget::new("Nonexistent", "dummy");
        let result = resolver.targets_depending_on(&[unknown]);
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_changed_module_artifact_reports_all_known_files_outside_index_build() {
        let root = PathBuf::from("/tmp/ws5");
        let ws = workspace_config(root.clone());
        let loader = Arc::new(FakePackageLoader::with_package(LoadedPackage {
            targets: vec![lib_target(&root)],
            interpreter_flags: vec![],
        }));
        let resolver = BuildSettingsResolver::new(ws, loader, false, DelegateBus::new());
        resolver.reload().await.unwrap();

        let artifact = root.join(".build/debug/Lib.swiftmodule");
        let events = vec![FileEvent {
            path: artifact,
            kind: FileEventKind::Changed,
        }];
        match resolver.classify(&events) {
            FileEventClassification::DependentsUpdated(files) => {
                assert!(files.contains(&root.join("Sources/Lib/a.swift")));
                assert!(files.contains(&root.join("Sources/Lib/b.swift")));
            }
            other => panic!("expected dependents-updated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_changed_module_artifact_is_ignored_for_index_only_build() {
        let root = PathBuf::from("/tmp/ws6");
        let ws = workspace_config(root.clone());
        let loader = Arc::new(FakePackageLoader::with_package(LoadedPackage {
            targets: vec![lib_target(&root)],
            interpreter_flags: vec![],
        }));
        let resolver = BuildSettingsResolver::new(ws, loader, true, DelegateBus::new());
        resolver.reload().await.unwrap();

        let artifact = root.join(".build/debug/Lib.swiftmodule");
        let events = vec![FileEvent {
            path: artifact,
            kind: FileEventKind::Changed,
        }];
        assert_eq!(resolver.classify(&events), FileEventClassification::Nothing);
    }
}
