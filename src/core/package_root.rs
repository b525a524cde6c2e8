//! Package-root discovery: walk upward from a path until a recognized
//! manifest is found.

use std::path::{Path, PathBuf};

/// Walk upward from `start` until a file named `manifest_filename` is found
/// whose contents contain `sentinel`, or the filesystem root is reached.
///
/// Returns the directory containing the manifest, not the manifest path
/// itself.
pub fn find_package_root(
    start: &Path,
    manifest_filename: &str,
    sentinel: &str,
) -> Option<PathBuf> {
    let mut dir = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = dir.join(manifest_filename);
        if candidate.is_file() {
            if let Ok(contents) = std::fs::read_to_string(&candidate) {
                if contents.contains(sentinel) {
                    return Some(dir);
                }
            }
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_finds_manifest_in_ancestor_directory() {
        let root = TempDir::new().unwrap();
        let pkg_dir = root.path().join("pkg");
        let src_dir = pkg_dir.join("Sources").join("Lib");
        std::fs::create_dir_all(&src_dir).unwrap();
        std::fs::write(pkg_dir.join("Package.semindex"), "// semindex-package\n").unwrap();
        let source_file = src_dir.join("a.swift");
        std::fs::write(&source_file, "// nothing").unwrap();

        let found = find_package_root(&source_file, "Package.semindex", "semindex-package");
        assert_eq!(found, Some(pkg_dir));
    }

    #[test]
    fn test_manifest_without_sentinel_is_ignored() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("Package.semindex"), "unrelated content").unwrap();

        let found = find_package_root(root.path(), "Package.semindex", "semindex-package");
        assert_eq!(found, None);
    }

    #[test]
    fn test_reaching_filesystem_root_returns_none() {
        let found = find_package_root(Path::new("/"), "Package.semindex", "semindex-package");
        assert_eq!(found, None);
    }
}
