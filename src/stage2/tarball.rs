//! Archiving the stage 2 root.
//!
//! The tarball holds a single top-level directory named after the stage 2
//! root. Everything stage 1 put there, package manager state and host-only
//! directories are excluded. Afterwards the archive is repacked without
//! empty directories, except for a couple the deployed software expects.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::common::{ensure_dir_exists, is_dir_empty, write_file_with_dirs};
use crate::error::{Error, Result};
use crate::process::Cmd;
use crate::stage1::{STAGE1_FILELIST, STAGE1_RPMLIST};
use crate::target::{Basearch, Dver, PlatformCaps};

/// Globs relative to the root that never go into a tarball.
pub const FIXED_EXCLUDES: &[&str] = &[
    "var/log/yum.log",
    "var/log/dnf*",
    "tmp/*",
    "var/tmp/*",
    "var/cache/yum/*",
    "var/cache/dnf/*",
    "var/lib/yum/*",
    "var/lib/dnf/*",
    "dev/*",
    "proc/*",
    "etc/alternatives/*",
    "var/lib/alternatives/*",
    "usr/bin/yum*",
    "usr/bin/dnf*",
];

/// Empty directories that must survive repacking.
pub const PRESERVED_DIRS: &[&str] = &["etc/grid-security/certificates", "var/lib/osg"];

/// `<metapackage>-<version>-<dver>-<basearch>.tar.gz`, or the historical
/// `<metapackage>-<dver>-<basearch>-nonroot.tar.gz` without a version.
pub fn tarball_name(metapackage: &str, version: Option<&str>, dver: Dver, basearch: Basearch) -> String {
    match version {
        Some(version) => format!("{}-{}-{}-{}.tar.gz", metapackage, version, dver, basearch),
        None => format!("{}-{}-{}-nonroot.tar.gz", metapackage, dver, basearch),
    }
}

/// Every exclude pattern, relative to the root: fixed globs, the package
/// database and each stage 1 manifest entry.
pub fn exclude_patterns(caps: &PlatformCaps, manifest: &[String]) -> Vec<String> {
    let mut patterns: Vec<String> = FIXED_EXCLUDES.iter().map(|s| s.to_string()).collect();
    patterns.push(format!("{}/*", caps.rpmdb_dir));
    for entry in manifest {
        let entry = entry.strip_prefix("./").unwrap_or(entry);
        if !entry.is_empty() {
            patterns.push(escape_glob(entry));
        }
    }
    patterns
}

/// Manifest entries are literal paths; tar reads exclude files as globs.
fn escape_glob(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn split_root(root: &Path) -> Result<(PathBuf, String)> {
    let root = root.canonicalize().map_err(|e| Error::io_at(root, e))?;
    let base = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Config(format!("cannot archive {}", root.display())))?;
    let parent = root.parent().unwrap_or(Path::new("/")).to_path_buf();
    Ok((parent, base))
}

fn run_tar(cmd: Cmd, tarball: &Path) -> Result<()> {
    let result = cmd.allow_fail().run()?;
    if !result.success() {
        if !result.stderr.trim().is_empty() {
            warn!("{}", result.stderr.trim());
        }
        return Err(Error::Archive {
            tarball: tarball.to_path_buf(),
            code: result.code(),
        });
    }
    Ok(())
}

/// Create `tarball` from `root`, leaving out `patterns`.
pub fn create_tarball(root: &Path, tarball: &Path, patterns: &[String]) -> Result<()> {
    let (parent, base) = split_root(root)?;
    if let Some(dir) = tarball.parent().filter(|d| !d.as_os_str().is_empty()) {
        ensure_dir_exists(dir)?;
    }

    let mut exclude_file = tempfile::Builder::new()
        .prefix("tarball-excludes")
        .tempfile()?;
    for pattern in patterns {
        writeln!(exclude_file, "{}/{}", base, pattern)?;
    }
    exclude_file.flush()?;
    debug!("{} exclude patterns", patterns.len());

    info!("Creating tarball {}", tarball.display());
    let cmd = Cmd::new("tar")
        .arg("-C")
        .arg_path(&parent)
        .arg("-czf")
        .arg_path(tarball)
        .arg(format!("--exclude-from={}", exclude_file.path().display()))
        .arg(format!("--exclude={}/{}", base, STAGE1_FILELIST))
        .arg(format!("--exclude={}/{}", base, STAGE1_RPMLIST))
        .arg(&base);
    let result = run_tar(cmd, tarball);

    let exclude_path = exclude_file.path().to_path_buf();
    if let Err(e) = exclude_file.close() {
        warn!("unable to remove {}: {}", exclude_path.display(), e);
    }
    result
}

/// Delete empty directories under `dir`, deepest first. `dir` itself stays.
pub fn remove_empty_dirs(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(dir).follow_links(false).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            Error::io_at(path, e.into())
        })?;
        if entry.file_type().is_dir() && is_dir_empty(entry.path())? {
            fs::remove_dir(entry.path()).map_err(|e| Error::io_at(entry.path(), e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Repack `tarball` without empty directories, keeping `PRESERVED_DIRS`.
pub fn post_process(tarball: &Path) -> Result<()> {
    let tarball = tarball.canonicalize().map_err(|e| Error::io_at(tarball, e))?;
    let out_dir = tarball.parent().unwrap_or(Path::new("/"));
    let scratch = tempfile::Builder::new()
        .prefix(".tarball-repack")
        .tempdir_in(out_dir)?;

    let result = repack(&tarball, scratch.path());

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!("unable to remove {}: {}", scratch_path.display(), e);
    }
    result
}

fn repack(tarball: &Path, scratch: &Path) -> Result<()> {
    run_tar(
        Cmd::new("tar").arg("-C").arg_path(scratch).arg("-xzf").arg_path(tarball),
        tarball,
    )?;

    let mut bases = Vec::new();
    for entry in fs::read_dir(scratch).map_err(|e| Error::io_at(scratch, e))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            bases.push(entry.file_name());
        }
    }
    if bases.len() != 1 {
        return Err(Error::Config(format!(
            "{} should hold exactly one top-level directory, found {}",
            tarball.display(),
            bases.len()
        )));
    }
    let base = PathBuf::from(&bases[0]);

    let removed = remove_empty_dirs(&scratch.join(&base))?;
    debug!("removed {} empty directories", removed);
    for dir in PRESERVED_DIRS {
        ensure_dir_exists(&scratch.join(&base).join(dir))?;
    }

    let mut repacked = tarball.as_os_str().to_owned();
    repacked.push(".new");
    let repacked = PathBuf::from(repacked);
    run_tar(
        Cmd::new("tar")
            .arg("-C")
            .arg_path(scratch)
            .arg("-czf")
            .arg_path(&repacked)
            .arg_path(&base),
        tarball,
    )?;
    fs::rename(&repacked, tarball).map_err(|e| Error::io_at(tarball, e))?;
    Ok(())
}

/// Write `<tarball>.sha256` in `sha256sum` format and return the digest.
pub fn write_checksum(tarball: &Path) -> Result<String> {
    let file = File::open(tarball).map_err(|e| Error::io_at(tarball, e))?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher).map_err(|e| Error::io_at(tarball, e))?;
    let digest = format!("{:x}", hasher.finalize());

    let name = tarball
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut sum_path = tarball.as_os_str().to_owned();
    sum_path.push(".sha256");
    write_file_with_dirs(PathBuf::from(sum_path), format!("{}  {}\n", digest, name))?;
    Ok(digest)
}
