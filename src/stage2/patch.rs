//! Patch sets applied to the installed tree.
//!
//! Each patch directory is searched in `common`, `common/<dver>`, `<series>`
//! and `<series>/<dver>`. The collected files are applied in order of their
//! file name alone, so `01-foo.patch` in `common/` runs before
//! `02-bar.patch` in `3.6/el7/` regardless of which directory they came from.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::process::Cmd;
use crate::target::Dver;

/// Collect `*.patch` files from the subdirectories of `patch_dir` that apply
/// to this build, sorted by basename.
pub fn collect_patches(patch_dir: &Path, dver: Dver, series: &str) -> Result<Vec<PathBuf>> {
    if !patch_dir.is_dir() {
        return Err(Error::Config(format!(
            "patch directory ({}) not found",
            patch_dir.display()
        )));
    }

    let subdirs = [
        PathBuf::from("common"),
        Path::new("common").join(dver.as_str()),
        PathBuf::from(series),
        Path::new(series).join(dver.as_str()),
    ];

    let mut patches = Vec::new();
    for subdir in &subdirs {
        let dir = patch_dir.join(subdir);
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&dir).map_err(|e| Error::io_at(&dir, e))? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "patch") {
                patches.push(path);
            }
        }
    }
    // stable sort: equal basenames keep directory order
    patches.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(patches)
}

/// Apply every patch from `patch_dirs` to `root`.
pub fn apply_patches(root: &Path, patch_dirs: &[PathBuf], dver: Dver, series: &str) -> Result<usize> {
    let mut applied = 0;
    for patch_dir in patch_dirs {
        let patch_dir = patch_dir
            .canonicalize()
            .map_err(|e| Error::io_at(patch_dir, e))?;
        info!("Patching packages using {}", patch_dir.display());
        for patch in collect_patches(&patch_dir, dver, series)? {
            apply_patch(root, &patch)?;
            applied += 1;
        }
    }
    Ok(applied)
}

fn apply_patch(root: &Path, patch: &Path) -> Result<()> {
    info!(
        "Applying patch {}",
        patch.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    );
    let result = Cmd::new("patch")
        .args(["-p1", "--force", "--input"])
        .arg_path(patch)
        .dir(root)
        .allow_fail()
        .run()?;
    if !result.success() {
        return Err(Error::Patch {
            patch: patch.to_path_buf(),
            code: result.code(),
        });
    }
    Ok(())
}
