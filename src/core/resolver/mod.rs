//! Build-settings resolution: package loading, the build graph, and the
//! resolver that serves per-file compiler-argument queries.

pub mod loader;
pub mod resolver;
pub mod types;

pub use loader::{FakePackageLoader, LoadedPackage, PackageLoader, TargetDescription};
pub use resolver::{BuildSettingsResolver, FileEventClassification};
pub use types::{BuildGraph, ConfiguredTarget, FileBuildSettings, FileEvent, FileEventKind, Target};
