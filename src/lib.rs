//! `semindex-core`: the scheduler and build-settings resolver that bridge a
//! package-manifest build system to a semantic index pipeline.
//!
//! This crate is the indexing-adjacent core of a language-server-like tool.
//! Given a workspace rooted at a package manifest, it loads the package,
//! maps source files to build targets, and schedules preparation (build)
//! and index-store-update work with bounded concurrency, cooperative
//! cancellation, and topological ordering. It does not speak the LSP wire
//! protocol, does not read the on-disk index store it updates, and does not
//! itself compile anything — it launches an external build tool and waits.

/// Crate version, re-exported for hosts that want to report it.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod core;
pub mod error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, error::CoreError>;
