//! Symlinks that go through the alternatives system.
//!
//! `/etc/alternatives` is host state and is left out of the tarball, so any
//! link that reaches its target through it would dangle after unpacking.
//! Every such link is resolved inside the root, as if chrooted, and replaced
//! with a relative link straight to the final target.

use std::collections::VecDeque;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::common::{relative_path, replace_symlink};
use crate::error::{Error, Result};

const ALTERNATIVES_DIRS: &[&str] = &["etc/alternatives", "var/lib/alternatives"];

/// Symlink loops give up after this many hops, like the kernel does.
const MAX_HOPS: usize = 40;

/// Where a path ends up when resolved inside the root.
#[derive(Debug, PartialEq, Eq)]
struct Resolved {
    /// Relative to the root.
    path: PathBuf,
    through_alternatives: bool,
    exists: bool,
}

fn is_alternatives(rel: &Path) -> bool {
    ALTERNATIVES_DIRS.iter().any(|dir| rel.starts_with(dir))
}

/// Resolve `rel` (relative to `root`) component by component, following
/// symlinks with `root` as `/`. `..` never climbs above the root.
fn resolve(root: &Path, rel: &Path) -> Result<Option<Resolved>> {
    let mut pending: VecDeque<PathBuf> = rel
        .components()
        .map(|c| PathBuf::from(c.as_os_str()))
        .collect();
    let mut resolved = PathBuf::new();
    let mut through_alternatives = false;
    let mut exists = true;
    let mut hops = 0;

    while let Some(part) = pending.pop_front() {
        match part.components().next() {
            Some(Component::RootDir) => resolved = PathBuf::new(),
            Some(Component::ParentDir) => {
                resolved.pop();
            }
            Some(Component::Normal(name)) => {
                let candidate = resolved.join(name);
                if is_alternatives(&candidate) {
                    through_alternatives = true;
                }
                let full = root.join(&candidate);
                match fs::symlink_metadata(&full) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_HOPS {
                            warn!("too many levels of symbolic links at {}", full.display());
                            return Ok(None);
                        }
                        let target = fs::read_link(&full).map_err(|e| Error::io_at(&full, e))?;
                        for component in target.components().rev() {
                            pending.push_front(PathBuf::from(component.as_os_str()));
                        }
                    }
                    Ok(_) => resolved = candidate,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        exists = false;
                        resolved = candidate;
                    }
                    Err(e) => return Err(Error::io_at(&full, e)),
                }
            }
            _ => {}
        }
    }

    Ok(Some(Resolved {
        path: resolved,
        through_alternatives,
        exists,
    }))
}

/// Rewrite every symlink under `root` that resolves through the
/// alternatives directories. Returns how many links were rewritten.
pub fn fix_alternatives_links(root: &Path) -> Result<usize> {
    let mut links = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            Error::io_at(path, e.into())
        })?;
        if !entry.path_is_symlink() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        if !is_alternatives(rel) && !rel.starts_with("proc") {
            links.push(rel.to_path_buf());
        }
    }

    // Resolve all links before rewriting any; chains share links.
    let mut plans = Vec::new();
    for rel in links {
        if let Some(resolved) = resolve(root, &rel)? {
            if resolved.through_alternatives {
                plans.push((rel, resolved));
            }
        }
    }

    let mut fixed = 0;
    for (rel, resolved) in plans {
        let link = root.join(&rel);
        if !resolved.exists {
            warn!(
                "{} goes through alternatives to {}, which is not in the tree; leaving it",
                rel.display(),
                resolved.path.display()
            );
            continue;
        }
        let parent = link.parent().unwrap_or(root);
        let target = relative_path(parent, &root.join(&resolved.path));
        debug!("{} -> {}", rel.display(), target.display());
        replace_symlink(&target, &link)?;
        fixed += 1;
    }
    Ok(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        fs::create_dir_all(root.join("usr/lib/jvm/jre-1.8.0/bin")).unwrap();
        fs::create_dir_all(root.join("etc/alternatives")).unwrap();
        fs::write(root.join("usr/lib/jvm/jre-1.8.0/bin/java"), "").unwrap();
        dir
    }

    #[test]
    fn test_link_through_alternatives_becomes_relative() {
        let dir = setup();
        let root = dir.path().canonicalize().unwrap();
        symlink("/usr/lib/jvm/jre-1.8.0/bin/java", root.join("etc/alternatives/java")).unwrap();
        symlink("/etc/alternatives/java", root.join("usr/bin/java")).unwrap();

        assert_eq!(fix_alternatives_links(&root).unwrap(), 1);
        assert_eq!(
            fs::read_link(root.join("usr/bin/java")).unwrap(),
            PathBuf::from("../lib/jvm/jre-1.8.0/bin/java")
        );
        assert!(root.join("usr/bin/java").exists());
    }

    #[test]
    fn test_transitive_chain_and_directory_links() {
        let dir = setup();
        let root = dir.path().canonicalize().unwrap();
        // jre -> /etc/alternatives/jre -> /usr/lib/jvm/jre-1.8.0
        symlink("/usr/lib/jvm/jre-1.8.0", root.join("etc/alternatives/jre")).unwrap();
        symlink("/etc/alternatives/jre", root.join("usr/lib/jvm/jre")).unwrap();
        symlink("../lib/jvm/jre/bin/java", root.join("usr/bin/java")).unwrap();

        assert_eq!(fix_alternatives_links(&root).unwrap(), 2);
        assert_eq!(
            fs::read_link(root.join("usr/bin/java")).unwrap(),
            PathBuf::from("../lib/jvm/jre-1.8.0/bin/java")
        );
        assert_eq!(
            fs::read_link(root.join("usr/lib/jvm/jre")).unwrap(),
            PathBuf::from("jre-1.8.0")
        );
    }

    #[test]
    fn test_unrelated_and_dangling_links_untouched() {
        let dir = setup();
        let root = dir.path().canonicalize().unwrap();
        symlink("java-real", root.join("usr/bin/plain")).unwrap();
        symlink("/etc/alternatives/missing", root.join("usr/bin/gone")).unwrap();

        assert_eq!(fix_alternatives_links(&root).unwrap(), 0);
        assert_eq!(fs::read_link(root.join("usr/bin/plain")).unwrap(), PathBuf::from("java-real"));
        assert_eq!(
            fs::read_link(root.join("usr/bin/gone")).unwrap(),
            PathBuf::from("/etc/alternatives/missing")
        );
    }

    #[test]
    fn test_parent_dir_cannot_escape_root() {
        let dir = setup();
        let root = dir.path().canonicalize().unwrap();
        let resolved = resolve(&root, Path::new("../../../usr/bin")).unwrap().unwrap();
        assert_eq!(resolved.path, PathBuf::from("usr/bin"));
        assert!(resolved.exists);
        assert!(!resolved.through_alternatives);
    }

    #[test]
    fn test_symlink_loop_gives_up() {
        let dir = setup();
        let root = dir.path().canonicalize().unwrap();
        symlink("b", root.join("usr/bin/a")).unwrap();
        symlink("a", root.join("usr/bin/b")).unwrap();
        assert!(resolve(&root, Path::new("usr/bin/a")).unwrap().is_none());
    }
}
