//! Demo binary: watches a package workspace and keeps its semantic index
//! up to date, using the real toolchain and indexer binaries configured on
//! the command line.

use clap::Parser;
use notify::{RecursiveMode, Watcher};
use semindex_core::config::init_config;
use semindex_core::core::delegate::{BuildSystemDelegate, DelegateBus};
use semindex_core::core::index_manager::SemanticIndexManager;
use semindex_core::core::index_store::ExternalIndexStore;
use semindex_core::core::preparation::SubprocessRunner;
use semindex_core::core::resolver::types::{FileEvent, FileEventKind};
use semindex_core::core::resolver::BuildSettingsResolver;
use semindex_core::core::scheduler::TaskScheduler;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Watches a package-manifest workspace and drives its semantic index.
#[derive(Parser, Debug)]
#[command(name = "semindex-demo")]
#[command(about = "Keeps a package workspace's semantic index up to date")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Workspace root containing the package manifest.
    workspace: PathBuf,

    /// Toolchain binary used to build targets (e.g. `swift`).
    #[arg(long, default_value = "swift")]
    toolchain: String,

    /// Indexer binary invoked per file once its target is prepared.
    #[arg(long, default_value = "swift-indexer")]
    indexer: String,

    /// Primary language used when resolving build settings.
    #[arg(long, default_value = "swift")]
    language: String,
}

struct LoggingDelegate;

#[async_trait::async_trait]
impl BuildSystemDelegate for LoggingDelegate {
    async fn file_build_settings_changed(&self, files: HashSet<String>) {
        log::info!("build settings changed for {} file(s)", files.len());
    }
    async fn file_dependencies_updated(&self, files: HashSet<String>) {
        log::info!("dependencies updated for {} file(s)", files.len());
    }
    async fn file_handling_capability_changed(&self) {
        log::info!("file handling capability changed");
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let workspace_config = match init_config(args.workspace.clone(), None) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            std::process::exit(1);
        }
    };

    // TODO: substitute a real package loader once one is wired up; this
    // demo only exercises the scheduling and notification machinery.
    let loader = Arc::new(semindex_core::core::resolver::FakePackageLoader::with_package(
        semindex_core::core::resolver::LoadedPackage::default(),
    ));

    let delegate_bus = DelegateBus::new();
    let delegate: Arc<dyn BuildSystemDelegate> = Arc::new(LoggingDelegate);
    delegate_bus.set_delegate(&delegate);

    let resolver = Arc::new(BuildSettingsResolver::new(
        workspace_config.clone(),
        loader,
        false,
        delegate_bus.clone(),
    ));
    if let Err(err) = resolver.reload().await {
        eprintln!("initial package load failed: {}", err);
        std::process::exit(1);
    }

    let scheduler = Arc::new(TaskScheduler::new(workspace_config.concurrency_budget()));
    let preparation = Arc::new(SubprocessRunner::new());
    let index_store = Arc::new(ExternalIndexStore::new(args.indexer.clone()));

    let manager = SemanticIndexManager::new(
        &workspace_config,
        args.toolchain.clone(),
        args.language.clone(),
        Arc::clone(&resolver),
        scheduler,
        preparation,
        index_store,
        delegate_bus,
    );

    let handle = manager
        .schedule_build_graph_generation_and_background_index_all_files()
        .await;
    if let Some(handle) = handle {
        handle.wait_until_finished().await;
    }
    log::info!("initial background index complete");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    }) {
        Ok(w) => w,
        Err(err) => {
            eprintln!("failed to start file watcher: {}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = watcher.watch(&args.workspace, RecursiveMode::Recursive) {
        eprintln!("failed to watch {}: {}", args.workspace.display(), err);
        std::process::exit(1);
    }

    log::info!("watching {} for changes", args.workspace.display());
    while let Some(event) = rx.recv().await {
        let events: Vec<FileEvent> = event
            .paths
            .into_iter()
            .map(|path| FileEvent {
                path,
                kind: classify_notify_event(&event.kind),
            })
            .collect();
        if events.is_empty() {
            continue;
        }

        match resolver.classify(&events) {
            semindex_core::core::resolver::FileEventClassification::TriggerReload => {
                if let Err(err) = resolver.reload().await {
                    log::warn!("reload failed: {}", err);
                    continue;
                }
                let files = resolver.known_source_files();
                let _ = manager.schedule_background_index(files);
            }
            semindex_core::core::resolver::FileEventClassification::DependentsUpdated(files) => {
                let _ = manager.schedule_background_index(files.into_iter().collect());
            }
            semindex_core::core::resolver::FileEventClassification::Nothing => {}
        }
    }
}

fn classify_notify_event(kind: &notify::EventKind) -> FileEventKind {
    use notify::EventKind;
    match kind {
        EventKind::Create(_) => FileEventKind::Created,
        EventKind::Modify(_) => FileEventKind::Changed,
        EventKind::Remove(_) => FileEventKind::Deleted,
        _ => FileEventKind::Unknown,
    }
}
