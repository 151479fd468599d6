//! Path arithmetic and symlink helpers for relocatable trees.
//!
//! A tarball install can be unpacked anywhere, so links inside the staging
//! root must be relative. These helpers compute and (re)create such links.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::symlink;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::io_at(path, e))
}

/// True if `path` is a directory without entries.
pub fn is_dir_empty(path: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(path).map_err(|e| Error::io_at(path, e))?;
    Ok(entries.next().is_none())
}

/// Relative path leading from directory `from` to `to`.
///
/// Both paths must be absolute and lexically normal (no `..`).
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}

/// Create `link` pointing at `target` unless something already exists there.
pub fn safe_symlink(target: &Path, link: &Path) -> Result<()> {
    match symlink(target, link) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(Error::io_at(link, e)),
    }
}

/// Replace whatever is at `link` (file or symlink) with a symlink to `target`.
pub fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.is_dir() => {
            return Err(Error::io_at(
                link,
                std::io::Error::new(ErrorKind::Other, "refusing to replace a directory"),
            ))
        }
        Ok(_) => fs::remove_file(link).map_err(|e| Error::io_at(link, e))?,
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io_at(link, e)),
    }
    if let Some(parent) = link.parent() {
        ensure_dir_exists(parent)?;
    }
    symlink(target, link).map_err(|e| Error::io_at(link, e))
}
