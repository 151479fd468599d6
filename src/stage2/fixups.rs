//! Hand-coded corrections to the installed tree.
//!
//! Each fixup targets one known packaging problem that breaks a tree
//! deployed at an arbitrary location. They are all no-ops when the
//! affected package is not installed.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::common::{ensure_dir_exists, replace_symlink, safe_symlink};
use crate::envsetup;
use crate::error::{Error, Result};
use crate::target::{Basearch, Dver, PlatformCaps};

const GSISSH_DIR: &str = "etc/gsissh";
const GSISSH_LINK: &str = "usr/etc/ssh";
const GSISSH_TARGET: &str = "../../etc/gsissh";

pub const VERSION_FILE: &str = "etc/osg-version";
const TARBALL_MARKER: &str = "tarball";

const COG_AXIS_LINK: &str = "usr/share/java/cog-axis-1.8.0.jar";
const COG_AXIS_TARGET: &str = "cog-jglobus-axis.jar";

/// fetch-crl paths as (unversioned, versioned).
const FETCH_CRL_PAIRS: &[(&str, &str)] = &[
    ("etc/fetch-crl.conf", "etc/fetch-crl3.conf"),
    ("usr/sbin/fetch-crl", "usr/sbin/fetch-crl3"),
    (
        "usr/share/man/man8/fetch-crl.8.gz",
        "usr/share/man/man8/fetch-crl3.8.gz",
    ),
];

/// Copied from the post-install directory into `<root>/osg`.
pub const POST_INSTALL_SCRIPTS: &[&str] = &["osg-post-install", "osgrun.in"];
pub const POST_INSTALL_DEST: &str = "osg";

/// gsissh looks for `$GLOBUS_LOCATION/etc/ssh` but its files live in
/// `etc/gsissh`. The link must be relative to survive relocation.
pub fn fix_gsissh_config_dir(root: &Path) -> Result<()> {
    if !root.join(GSISSH_DIR).is_dir() {
        return Ok(());
    }
    let link = root.join(GSISSH_LINK);
    match fs::symlink_metadata(&link) {
        Ok(meta) if meta.is_dir() => {
            warn!("{} is a real directory; not linking it to {}", link.display(), GSISSH_DIR);
            Ok(())
        }
        _ => replace_symlink(Path::new(GSISSH_TARGET), &link),
    }
}

fn version_regex() -> Result<Regex> {
    Regex::new(r"^([0-9.]+)").map_err(|e| Error::Config(e.to_string()))
}

/// Rewrite a version line `X.Y.Z...` to `X.Y.Z-tarball[-relnum]...`.
///
/// Lines that already carry the marker come back unchanged. A release
/// number of 0 means none.
pub fn stamp_version_line(line: &str, relnum: Option<u32>) -> Result<String> {
    let re = version_regex()?;
    if !re.is_match(line) {
        return Err(Error::Config(format!("{:?} does not contain a version", line)));
    }
    if line.contains(TARBALL_MARKER) {
        return Ok(line.to_string());
    }
    let suffix = relnum
        .filter(|&n| n != 0)
        .map(|n| format!("-{}", n))
        .unwrap_or_default();
    Ok(re
        .replace(line, |caps: &regex::Captures| {
            format!("{}-{}{}", &caps[1], TARBALL_MARKER, suffix)
        })
        .into_owned())
}

/// Mark the version file as belonging to a tarball install.
///
/// Returns false when the file is absent (the version package is not part
/// of this bundle).
pub fn fix_version_file(root: &Path, relnum: Option<u32>) -> Result<bool> {
    let path = root.join(VERSION_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("{} not found; not stamping version", VERSION_FILE);
            return Ok(false);
        }
        Err(e) => return Err(Error::io_at(&path, e)),
    };

    let (first, rest) = match text.split_once('\n') {
        Some((first, rest)) => (first, Some(rest)),
        None => (text.as_str(), None),
    };
    if first.trim().is_empty() {
        return Err(Error::Config(format!(
            "Could not read version string from {}",
            path.display()
        )));
    }

    let mut stamped = stamp_version_line(first, relnum)?;
    if let Some(rest) = rest {
        stamped.push('\n');
        stamped.push_str(rest);
    }
    if stamped != text {
        fs::write(&path, &stamped).map_err(|e| Error::io_at(&path, e))?;
        debug!("{}: {}", VERSION_FILE, stamped.lines().next().unwrap_or_default());
    }
    Ok(true)
}

/// The cog-axis JAR ships as an absolute link to its sibling.
pub fn fix_cog_axis_link(root: &Path) -> Result<()> {
    let link = root.join(COG_AXIS_LINK);
    // symlink_metadata: the broken link is exactly what we are looking for
    if fs::symlink_metadata(&link).is_ok() {
        replace_symlink(Path::new(COG_AXIS_TARGET), &link)?;
    }
    Ok(())
}

/// Link `fetch-crl` and `fetch-crl3` names to each other.
///
/// Whichever name the installed package uses is the real file; the other
/// becomes a relative link to it. The unversioned name wins if both exist.
/// Platforms that only ever shipped one name are left alone.
pub fn create_fetch_crl_links(root: &Path, caps: &PlatformCaps) -> Result<()> {
    if !caps.fetch_crl_compat_links {
        return Ok(());
    }
    for (plain, versioned) in FETCH_CRL_PAIRS {
        let plain = root.join(plain);
        let versioned = root.join(versioned);
        let (real, link) = if fs::symlink_metadata(&plain).is_ok() {
            (plain, versioned)
        } else if fs::symlink_metadata(&versioned).is_ok() {
            (versioned, plain)
        } else {
            continue;
        };
        if let Some(name) = real.file_name() {
            safe_symlink(Path::new(name), &link)?;
        }
    }
    Ok(())
}

/// Copy the post-install scripts and write the setup templates into
/// `<root>/osg`.
pub fn copy_post_install(root: &Path, scripts_dir: &Path, dver: Dver, basearch: Basearch) -> Result<()> {
    if !scripts_dir.is_dir() {
        return Err(Error::Config(format!(
            "script directory ({}) not found",
            scripts_dir.display()
        )));
    }
    let dest_dir = root.join(POST_INSTALL_DEST);
    ensure_dir_exists(&dest_dir)?;

    for script in POST_INSTALL_SCRIPTS {
        let src = scripts_dir.join(script);
        let dest = dest_dir.join(script);
        fs::copy(&src, &dest).map_err(|e| Error::io_at(&src, e))?;
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o755))
            .map_err(|e| Error::io_at(&dest, e))?;
    }
    envsetup::write_setup_in_files(&dest_dir, dver, basearch)?;
    info!("Copied post-install scripts into {}", dest_dir.display());
    Ok(())
}

/// Give the owner read/write on every file and read/write/search on every
/// directory. Symlinks are left alone.
pub fn normalize_permissions(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            Error::io_at(path, e.into())
        })?;
        let file_type = entry.file_type();
        let wanted = if file_type.is_dir() {
            0o700
        } else if file_type.is_file() {
            0o600
        } else {
            continue;
        };
        let meta = entry.metadata().map_err(|e| Error::io_at(entry.path(), e.into()))?;
        let mode = meta.permissions().mode() & 0o7777;
        if mode & wanted != wanted {
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode | wanted))
                .map_err(|e| Error::io_at(entry.path(), e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use std::path::PathBuf;

    #[test]
    fn test_stamp_version_line() {
        assert_eq!(stamp_version_line("3.6.0", None).unwrap(), "3.6.0-tarball");
        assert_eq!(stamp_version_line("3.6.0", Some(2)).unwrap(), "3.6.0-tarball-2");
        assert_eq!(stamp_version_line("3.6.0", Some(0)).unwrap(), "3.6.0-tarball");
        assert_eq!(
            stamp_version_line("3.6.0-tarball-2", Some(3)).unwrap(),
            "3.6.0-tarball-2"
        );
        assert!(stamp_version_line("unknown", None).is_err());
    }

    #[test]
    fn test_fix_version_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(VERSION_FILE);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "23.0.1\n").unwrap();

        assert!(fix_version_file(dir.path(), Some(1)).unwrap());
        let once = fs::read_to_string(&path).unwrap();
        assert!(fix_version_file(dir.path(), Some(1)).unwrap());
        let twice = fs::read_to_string(&path).unwrap();
        assert_eq!(once, "23.0.1-tarball-1\n");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_fix_version_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!fix_version_file(dir.path(), None).unwrap());
    }

    #[test]
    fn test_gsissh_absolute_link_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("etc/gsissh")).unwrap();
        fs::create_dir_all(root.join("usr/etc")).unwrap();
        symlink("/etc/gsissh", root.join("usr/etc/ssh")).unwrap();

        fix_gsissh_config_dir(root).unwrap();
        assert_eq!(
            fs::read_link(root.join("usr/etc/ssh")).unwrap(),
            PathBuf::from("../../etc/gsissh")
        );
        assert!(root.join("usr/etc/ssh").is_dir());
    }

    #[test]
    fn test_gsissh_absent_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        fix_gsissh_config_dir(dir.path()).unwrap();
        assert!(!dir.path().join("usr").exists());
    }

    #[test]
    fn test_cog_axis_broken_link_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let java = dir.path().join("usr/share/java");
        fs::create_dir_all(&java).unwrap();
        symlink("/usr/share/java/cog-jglobus-axis.jar", java.join("cog-axis-1.8.0.jar")).unwrap();
        fix_cog_axis_link(dir.path()).unwrap();
        assert_eq!(
            fs::read_link(java.join("cog-axis-1.8.0.jar")).unwrap(),
            PathBuf::from("cog-jglobus-axis.jar")
        );
    }

    #[test]
    fn test_fetch_crl_links_follow_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("usr/sbin")).unwrap();
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::write(root.join("usr/sbin/fetch-crl"), "").unwrap();
        fs::write(root.join("etc/fetch-crl3.conf"), "").unwrap();

        create_fetch_crl_links(root, &Dver::El6.caps()).unwrap();
        assert_eq!(
            fs::read_link(root.join("usr/sbin/fetch-crl3")).unwrap(),
            PathBuf::from("fetch-crl")
        );
        assert_eq!(
            fs::read_link(root.join("etc/fetch-crl.conf")).unwrap(),
            PathBuf::from("fetch-crl3.conf")
        );
        assert!(!root.join("usr/share/man").exists());
    }

    #[test]
    fn test_fetch_crl_links_only_where_renamed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("usr/sbin")).unwrap();
        fs::write(root.join("usr/sbin/fetch-crl"), "").unwrap();

        for dver in [Dver::El7, Dver::El8, Dver::El9] {
            create_fetch_crl_links(root, &dver.caps()).unwrap();
        }
        assert!(fs::symlink_metadata(root.join("usr/sbin/fetch-crl3")).is_err());
        assert!(fs::symlink_metadata(root.join("etc/fetch-crl.conf")).is_err());
    }

    #[test]
    fn test_copy_post_install() {
        let scripts = tempfile::tempdir().unwrap();
        for script in POST_INSTALL_SCRIPTS {
            fs::write(scripts.path().join(script), "#!/bin/sh\n").unwrap();
        }
        let root = tempfile::tempdir().unwrap();
        copy_post_install(root.path(), scripts.path(), Dver::El7, Basearch::X86_64).unwrap();

        let dest = root.path().join("osg/osg-post-install");
        assert_eq!(fs::metadata(&dest).unwrap().permissions().mode() & 0o777, 0o755);
        assert!(root.path().join("osg/setup.sh.in").is_file());

        let err = copy_post_install(root.path(), Path::new("/nonexistent"), Dver::El7, Basearch::X86_64)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_normalize_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("usr/share");
        fs::create_dir_all(&sub).unwrap();
        let file = sub.join("readonly");
        fs::write(&file, "").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o444)).unwrap();
        fs::set_permissions(&sub, fs::Permissions::from_mode(0o555)).unwrap();

        normalize_permissions(dir.path()).unwrap();
        assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o644);
        assert_eq!(fs::metadata(&sub).unwrap().permissions().mode() & 0o777, 0o755);
    }
}
