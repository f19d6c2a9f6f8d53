//! Relative symlink management.
//!
//! Used in three places: staging vendor files inside a keg (symlink-tree
//! layouts, shared-library staging), the `opt/` link, and linking a keg's
//! public directories into the prefix. Every link is relative so a keg can be
//! poured into a different prefix.

use crate::layout::InstallLayout;
use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Directories to symlink from a keg into the prefix
const LINKABLE_DIRS: &[&str] = &["bin", "sbin", "lib", "include", "share", "etc"];

/// Lexically normalize a path, resolving `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path of `target` relative to the directory `from`.
///
/// Both are normalized first; when they share no root the absolute target is returned.
pub fn relative_path(from: &Path, target: &Path) -> PathBuf {
    let from = normalize_path(from);
    let target = normalize_path(target);
    if from.has_root() != target.has_root() {
        return target;
    }

    let from_parts: Vec<_> = from.components().collect();
    let target_parts: Vec<_> = target.components().collect();
    let common = from_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from_parts.len() {
        rel.push("..");
    }
    for part in &target_parts[common..] {
        rel.push(part.as_os_str());
    }
    rel
}

/// Create `<dir>/<file name of source>` as a relative symlink to `source`.
///
/// Returns the link path when it exists afterwards pointing at `source`, which
/// makes repeated calls idempotent. An existing entry pointing elsewhere is
/// left alone and `None` is returned.
pub fn install_symlink(source: &Path, dir: &Path) -> Result<Option<PathBuf>> {
    let file_name = source
        .file_name()
        .with_context(|| format!("No file name in {}", source.display()))?;
    let target = dir.join(file_name);
    let relative = relative_path(dir, source);

    if let Ok(meta) = target.symlink_metadata() {
        if fs::read_link(&target).is_ok_and(|existing| existing == relative) {
            return Ok(Some(target));
        }
        if meta.file_type().is_symlink() && !target.exists() {
            tracing::debug!("replacing broken symlink {}", target.display());
            fs::remove_file(&target)?;
            return install_symlink(source, dir);
        }
        tracing::warn!(
            "Not linking {}: {} already exists",
            source.display(),
            target.display()
        );
        return Ok(None);
    }

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    unix_fs::symlink(&relative, &target).with_context(|| {
        format!(
            "Failed to create symlink: {} -> {}",
            target.display(),
            relative.display()
        )
    })?;

    Ok(Some(target))
}

/// [`install_symlink`] for each source, in order.
pub fn install_symlinks<P: AsRef<Path>>(sources: &[P], dir: &Path) -> Result<Vec<PathBuf>> {
    let mut links = Vec::new();
    for source in sources {
        if let Some(link) = install_symlink(source.as_ref(), dir)? {
            links.push(link);
        }
    }
    Ok(links)
}

/// Sorted entries of a directory, empty if it does not exist.
pub fn dir_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

fn is_shared_object(name: &str) -> bool {
    name.ends_with(".so") || name.contains(".so.")
}

/// Link every `*.so*` found below `<root>/<dir_prefix>*/` into `lib_dir`.
///
/// Lets a linkage checker see bundled libraries; the tools themselves keep
/// using their own copies through their embedded runtime search path.
pub fn stage_shared_libraries(root: &Path, dir_prefix: &str, lib_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut libraries = Vec::new();

    for top in dir_entries(root)? {
        let matches_prefix = top
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with(dir_prefix));
        if !matches_prefix || !top.is_dir() {
            continue;
        }

        for entry in WalkDir::new(&top)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_dir() {
                continue;
            }
            if is_shared_object(&entry.file_name().to_string_lossy()) {
                libraries.push(entry.into_path());
            }
        }
    }

    install_symlinks(&libraries, lib_dir)
}

/// Link a keg's public directories into the prefix.
pub fn link_keg(layout: &InstallLayout, prefix: &Path) -> Result<Vec<PathBuf>> {
    let mut linked_files = Vec::new();

    for dir_name in LINKABLE_DIRS {
        let source_dir = layout.root.join(dir_name);
        if !source_dir.is_dir() {
            continue;
        }

        let target_dir = prefix.join(dir_name);
        fs::create_dir_all(&target_dir)
            .with_context(|| format!("Failed to create directory: {}", target_dir.display()))?;

        link_directory(&source_dir, &target_dir, &mut linked_files)?;
    }

    Ok(linked_files)
}

fn link_directory(source: &Path, target: &Path, linked_files: &mut Vec<PathBuf>) -> Result<()> {
    for source_path in dir_entries(source)? {
        let is_real_dir = source_path
            .symlink_metadata()
            .is_ok_and(|m| m.file_type().is_dir());

        if is_real_dir {
            let Some(name) = source_path.file_name() else {
                continue;
            };
            let target_path = target.join(name);
            fs::create_dir_all(&target_path)?;
            link_directory(&source_path, &target_path, linked_files)?;
        } else if let Some(link) = install_symlink(&source_path, target)? {
            linked_files.push(link);
        }
    }

    Ok(())
}

/// Remove prefix symlinks that point into this keg.
pub fn unlink_keg(layout: &InstallLayout, prefix: &Path) -> Result<Vec<PathBuf>> {
    let mut unlinked_files = Vec::new();

    for dir_name in LINKABLE_DIRS {
        let source_dir = layout.root.join(dir_name);
        let target_dir = prefix.join(dir_name);
        if !source_dir.is_dir() || !target_dir.is_dir() {
            continue;
        }
        unlink_directory(&source_dir, &target_dir, &layout.root, &mut unlinked_files)?;
    }

    Ok(unlinked_files)
}

fn unlink_directory(
    source: &Path,
    target: &Path,
    keg: &Path,
    unlinked_files: &mut Vec<PathBuf>,
) -> Result<()> {
    for source_path in dir_entries(source)? {
        let Some(name) = source_path.file_name() else {
            continue;
        };
        let target_path = target.join(name);

        let target_meta = match target_path.symlink_metadata() {
            Ok(meta) => meta,
            Err(_) => continue,
        };

        if target_meta.file_type().is_dir() {
            unlink_directory(&source_path, &target_path, keg, unlinked_files)?;
        } else if let Ok(link_target) = fs::read_link(&target_path) {
            let resolved = normalize_path(&target.join(&link_target));
            if resolved.starts_with(keg) {
                fs::remove_file(&target_path)?;
                unlinked_files.push(target_path);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("foo/bar/../baz")), PathBuf::from("foo/baz"));
        assert_eq!(normalize_path(Path::new("./foo/./bar")), PathBuf::from("foo/bar"));
        assert_eq!(normalize_path(Path::new("foo/../../bar")), PathBuf::from("../bar"));
        assert_eq!(normalize_path(Path::new("/usr/local/bin/../lib")), PathBuf::from("/usr/local/lib"));
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/p/Cellar/cuda/1/lib"), Path::new("/p/Cellar/cuda/1/libexec/nsight/a.so")),
            PathBuf::from("../libexec/nsight/a.so")
        );
        assert_eq!(
            relative_path(Path::new("/p/opt"), Path::new("/p/Cellar/cuda/1")),
            PathBuf::from("../Cellar/cuda/1")
        );
        assert_eq!(relative_path(Path::new("/a/b"), Path::new("/a/b")), PathBuf::new());
    }

    #[test]
    fn test_install_symlink_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("libexec/bin/nvcc");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "bin").unwrap();
        let bin = temp.path().join("bin");

        let first = install_symlink(&source, &bin).unwrap();
        let second = install_symlink(&source, &bin).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_link(bin.join("nvcc")).unwrap(), PathBuf::from("../libexec/bin/nvcc"));
    }

    #[test]
    fn test_install_symlink_keeps_foreign_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("libexec/tool");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "bin").unwrap();
        let bin = temp.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("tool"), "user script").unwrap();

        assert_eq!(install_symlink(&source, &bin).unwrap(), None);
        assert_eq!(fs::read_to_string(bin.join("tool")).unwrap(), "user script");
    }

    #[test]
    fn test_shared_object_names() {
        assert!(is_shared_object("libnvperf.so"));
        assert!(is_shared_object("libQt6Core.so.6"));
        assert!(!is_shared_object("libfoo.a"));
        assert!(!is_shared_object("soname.txt"));
    }
}
