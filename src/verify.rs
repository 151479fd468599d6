//! Structural checks on a staging root.
//!
//! These run instead of `rpm --verify`, which is both slow and guaranteed to
//! fail on a stage 1 database that deliberately lacks payload. The checks run
//! in order and the first failure stops the rest, so nothing is queried
//! through rpm once the database itself is known to be missing.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result, VerifyError};
use crate::target::PlatformCaps;
use crate::yum::RpmDatabase;

/// Foundational packages every stage 1 root must have registered, besides
/// the package manager's own package.
pub const SPOT_CHECK_PACKAGES: &[&str] = &["bash", "coreutils", "filesystem"];

/// Legacy Berkeley DB files and the newer single-file sqlite backend.
const DB_FILE_PATTERNS: &[DbPattern] = &[
    DbPattern::Exact("Packages"),
    DbPattern::Prefix("__db."),
    DbPattern::Exact("rpmdb.sqlite"),
];

enum DbPattern {
    Exact(&'static str),
    Prefix(&'static str),
}

impl DbPattern {
    fn matches(&self, name: &str) -> bool {
        match self {
            DbPattern::Exact(exact) => name == *exact,
            DbPattern::Prefix(prefix) => name.starts_with(prefix),
        }
    }
}

/// Paths stage 1 is allowed to leave behind when it only registers packages
/// in the database.
///
/// An allowed path admits everything below it. Its parent directories are
/// admitted as directories only, so `usr/lib/sysimage/rpm` lets `usr` exist
/// but not `usr/bin`.
#[derive(Debug, Clone)]
pub struct StrayCheck {
    allowed: Vec<PathBuf>,
}

impl StrayCheck {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathBuf>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    fn check(&self, root: &Path) -> Result<()> {
        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                Error::io_at(path, e.into())
            })?;
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let is_dir = entry.file_type().is_dir();

            if self.allowed.iter().any(|a| rel.starts_with(a)) {
                if is_dir {
                    walker.skip_current_dir();
                }
                continue;
            }
            if is_dir && self.allowed.iter().any(|a| a.starts_with(rel)) {
                continue;
            }
            return Err(VerifyError::UnexpectedEntry(entry.path().to_path_buf()).into());
        }
        Ok(())
    }
}

/// Database directory of `root` for this platform generation.
pub fn rpmdb_dir(root: &Path, caps: &PlatformCaps) -> PathBuf {
    root.join(caps.rpmdb_dir)
}

/// Verify a staging root.
///
/// `stray` is only passed for database-only stage 1 roots.
pub fn verify_staging_root(
    root: &Path,
    caps: &PlatformCaps,
    db: &dyn RpmDatabase,
    stray: Option<&StrayCheck>,
) -> Result<()> {
    info!("Verifying {}", root.display());

    if !root.is_dir() {
        return Err(VerifyError::MissingRoot(root.to_path_buf()).into());
    }

    let db_dir = rpmdb_dir(root, caps);
    if !db_dir.is_dir() {
        return Err(VerifyError::MissingDatabase(db_dir).into());
    }

    let mut found = false;
    for entry in fs::read_dir(&db_dir).map_err(|e| Error::io_at(&db_dir, e))? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if DB_FILE_PATTERNS.iter().any(|p| p.matches(&name)) {
            debug!("found database file {}", name);
            found = true;
            break;
        }
    }
    if !found {
        return Err(VerifyError::EmptyDatabase(db_dir).into());
    }

    let own = caps.package_manager.own_package();
    for package in SPOT_CHECK_PACKAGES.iter().copied().chain(std::iter::once(own)) {
        if !db.is_installed(root, package)? {
            return Err(VerifyError::PackageMissing {
                package: package.to_string(),
                root: root.to_path_buf(),
            }
            .into());
        }
    }

    if let Some(stray) = stray {
        stray.check(root)?;
    }

    info!("Verified {}", root.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Dver;
    use std::cell::Cell;

    /// Database double that registers everything and counts queries.
    struct CountingDb {
        queries: Cell<usize>,
        missing: Option<&'static str>,
    }

    impl CountingDb {
        fn new(missing: Option<&'static str>) -> Self {
            Self {
                queries: Cell::new(0),
                missing,
            }
        }
    }

    impl RpmDatabase for CountingDb {
        fn init_db(&self, _root: &Path) -> Result<()> {
            Ok(())
        }

        fn is_installed(&self, _root: &Path, package: &str) -> Result<bool> {
            self.queries.set(self.queries.get() + 1);
            Ok(self.missing != Some(package))
        }

        fn list_installed(&self, _root: &Path) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn make_db(root: &Path, file: &str) {
        let dir = root.join("var/lib/rpm");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), "").unwrap();
    }

    #[test]
    fn test_missing_database_skips_queries() {
        let dir = tempfile::tempdir().unwrap();
        let db = CountingDb::new(None);
        let err = verify_staging_root(dir.path(), &Dver::El7.caps(), &db, None).unwrap_err();
        assert!(matches!(err, Error::Verify(VerifyError::MissingDatabase(_))));
        assert_eq!(db.queries.get(), 0);
    }

    #[test]
    fn test_missing_root() {
        let db = CountingDb::new(None);
        let err = verify_staging_root(
            Path::new("/nonexistent/stage1"),
            &Dver::El7.caps(),
            &db,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Verify(VerifyError::MissingRoot(_))));
    }

    #[test]
    fn test_unrecognized_db_files() {
        let dir = tempfile::tempdir().unwrap();
        make_db(dir.path(), "README");
        let db = CountingDb::new(None);
        let err = verify_staging_root(dir.path(), &Dver::El7.caps(), &db, None).unwrap_err();
        assert!(matches!(err, Error::Verify(VerifyError::EmptyDatabase(_))));
        assert_eq!(db.queries.get(), 0);
    }

    #[test]
    fn test_legacy_and_sqlite_backends_accepted() {
        for file in ["__db.001", "Packages", "rpmdb.sqlite"] {
            let dir = tempfile::tempdir().unwrap();
            make_db(dir.path(), file);
            let db = CountingDb::new(None);
            verify_staging_root(dir.path(), &Dver::El7.caps(), &db, None).unwrap();
            assert_eq!(db.queries.get(), 4);
        }
    }

    #[test]
    fn test_spot_check_stops_at_first_missing() {
        let dir = tempfile::tempdir().unwrap();
        make_db(dir.path(), "Packages");
        let db = CountingDb::new(Some("coreutils"));
        let err = verify_staging_root(dir.path(), &Dver::El7.caps(), &db, None).unwrap_err();
        match err {
            Error::Verify(VerifyError::PackageMissing { package, .. }) => {
                assert_eq!(package, "coreutils")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(db.queries.get(), 2);
    }

    #[test]
    fn test_stray_entry_detected() {
        let dir = tempfile::tempdir().unwrap();
        make_db(dir.path(), "Packages");
        fs::create_dir_all(dir.path().join("opt/leftover")).unwrap();
        let db = CountingDb::new(None);
        let stray = StrayCheck::new(["var", "etc"]);
        let err = verify_staging_root(dir.path(), &Dver::El7.caps(), &db, Some(&stray))
            .unwrap_err();
        assert!(matches!(err, Error::Verify(VerifyError::UnexpectedEntry(ref p)) if p.ends_with("opt")));
    }

    #[test]
    fn test_stray_check_admits_only_chain_to_allowed_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("usr/lib/sysimage/rpm/sub")).unwrap();
        fs::write(root.join("usr/lib/sysimage/rpm/sub/rpmdb.sqlite"), "").unwrap();
        let stray = StrayCheck::new(["usr/lib/sysimage/rpm"]);
        stray.check(root).unwrap();

        fs::write(root.join("usr/lib/libc.so"), "").unwrap();
        let err = stray.check(root).unwrap_err();
        assert!(matches!(err, Error::Verify(VerifyError::UnexpectedEntry(ref p)) if p == &root.join("usr/lib/libc.so")));
    }

    #[test]
    fn test_stray_check_rejects_file_named_like_parent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("var"), "").unwrap();
        let stray = StrayCheck::new(["var/lib/rpm"]);
        let err = stray.check(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Verify(VerifyError::UnexpectedEntry(ref p)) if p.ends_with("var")));
    }
}
