//! Removal of generated build state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::layout::SKBUILD_DIR;
use crate::util::fs::remove_dir_all_if_exists;
use crate::util::shell::{Shell, Status};

/// Remove every build directory of `plat_name` under `_skbuild`, whatever
/// interpreter version it was made for.
///
/// `_skbuild` itself goes away once empty. Returns the removed directories.
pub fn clean(shell: &Shell, root: &Path, plat_name: &str) -> Result<Vec<PathBuf>> {
    let skbuild = root.join(SKBUILD_DIR);
    if !skbuild.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}-", plat_name);
    let mut removed = Vec::new();

    let entries = std::fs::read_dir(&skbuild)
        .with_context(|| format!("failed to read {}", skbuild.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() || !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        if remove_dir_all_if_exists(&path)? {
            shell.status(Status::Removed, path.display());
            removed.push(path);
        }
    }

    let empty = std::fs::read_dir(&skbuild)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if empty {
        std::fs::remove_dir(&skbuild)
            .with_context(|| format!("failed to remove {}", skbuild.display()))?;
    }

    removed.sort();
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clean_removes_platform_dirs() {
        let tmp = TempDir::new().unwrap();
        let skbuild = tmp.path().join(SKBUILD_DIR);
        std::fs::create_dir_all(skbuild.join("linux-x86_64-3.12").join("cmake-build")).unwrap();
        std::fs::create_dir_all(skbuild.join("linux-x86_64-3.11")).unwrap();
        std::fs::create_dir_all(skbuild.join("win-amd64-3.12")).unwrap();

        let removed = clean(&Shell::quiet(), tmp.path(), "linux-x86_64").unwrap();

        assert_eq!(removed.len(), 2);
        assert!(!skbuild.join("linux-x86_64-3.12").exists());
        assert!(skbuild.join("win-amd64-3.12").exists());
    }

    #[test]
    fn test_clean_removes_empty_skbuild() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(SKBUILD_DIR).join("linux-x86_64-3.12")).unwrap();

        clean(&Shell::quiet(), tmp.path(), "linux-x86_64").unwrap();
        assert!(!tmp.path().join(SKBUILD_DIR).exists());

        // Nothing to do the second time.
        assert!(clean(&Shell::quiet(), tmp.path(), "linux-x86_64").unwrap().is_empty());
    }
}
