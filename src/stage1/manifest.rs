//! Stage 1 manifests.
//!
//! `stage1_filelist` lists every non-directory path in the stage 1 root,
//! `./`-prefixed like `find . -not -type d` prints them. Stage 2 excludes
//! all of them from the tarball. `stage1_rpmlist` records what the database
//! claims is installed, for the operator's reference.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::common::write_file_with_dirs;
use crate::error::{Error, Result, VerifyError};

pub const STAGE1_FILELIST: &str = "stage1_filelist";
pub const STAGE1_RPMLIST: &str = "stage1_rpmlist";

/// Collect every non-directory path under `root`, sorted.
///
/// The manifests themselves and anything under a mounted `proc` are left out.
pub fn collect_filelist(root: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == "proc"));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            Error::io_at(path, e.into())
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::Config(format!("{} escapes the root", entry.path().display())))?;
        if entry.depth() == 1 && (rel == Path::new(STAGE1_FILELIST) || rel == Path::new(STAGE1_RPMLIST)) {
            continue;
        }
        entries.push(format!("./{}", rel.display()));
    }
    entries.sort();
    Ok(entries)
}

/// Write the file manifest into the root and return its entries.
pub fn write_filelist(root: &Path) -> Result<Vec<String>> {
    let entries = collect_filelist(root)?;
    write_lines(&root.join(STAGE1_FILELIST), &entries)?;
    Ok(entries)
}

pub fn write_rpmlist(root: &Path, packages: &[String]) -> Result<()> {
    write_lines(&root.join(STAGE1_RPMLIST), packages)
}

/// Read the file manifest back.
pub fn read_filelist(root: &Path) -> Result<Vec<String>> {
    let path = root.join(STAGE1_FILELIST);
    if !path.is_file() {
        return Err(VerifyError::MissingManifest(path).into());
    }
    let text = fs::read_to_string(&path).map_err(|e| Error::io_at(&path, e))?;
    Ok(text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect())
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    write_file_with_dirs(path, text)
}
