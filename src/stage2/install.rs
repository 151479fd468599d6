//! Package installation into the stage 2 root.

use std::path::Path;

use tracing::{info, warn};

use crate::common::ensure_dir_exists;
use crate::error::{Error, Result};
use crate::mount::with_proc;
use crate::yum::{PackageManager, RpmDatabase};

/// Some `%post` scriptlets fail outright without these.
const SCRATCH_DIRS: &[&str] = &["tmp", "var/tmp"];

pub fn ensure_scratch_dirs(root: &Path) -> Result<()> {
    for dir in SCRATCH_DIRS {
        ensure_dir_exists(&root.join(dir))?;
    }
    Ok(())
}

/// Install `packages` and confirm each one ended up in the database.
///
/// The package manager exit code is not trusted: it is non-zero whenever a
/// scriptlet fails, which is routine in a root that lacks half the system,
/// but it says nothing about packages that were never found. The database
/// query afterwards is what decides.
pub fn install_packages(
    root: &Path,
    packages: &[String],
    pm: &dyn PackageManager,
    db: &dyn RpmDatabase,
    mount_proc: bool,
) -> Result<()> {
    ensure_scratch_dirs(root)?;

    info!("Installing packages {}. Ignore POSTIN scriptlet failures.", packages.join(" "));
    with_proc(root, mount_proc, || match pm.install(root, packages) {
        Err(Error::Install { code, .. }) => {
            warn!("package manager exited with {}, checking the database", code);
            Ok(())
        }
        other => other,
    })?;

    for package in packages {
        if !db.is_installed(root, package)? {
            return Err(Error::NotRegistered {
                package: package.clone(),
                root: root.to_path_buf(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FlakyYum;

    impl PackageManager for FlakyYum {
        fn install(&self, root: &Path, packages: &[String]) -> Result<()> {
            Err(Error::Install {
                packages: packages.to_vec(),
                root: root.to_path_buf(),
                code: 1,
            })
        }
        fn force_install(
            &self,
            _root: &Path,
            _packages: &[String],
            _opts: crate::yum::ForceInstallOptions,
        ) -> Result<()> {
            Ok(())
        }
        fn fake_install(&self, _root: &Path, _packages: &[String]) -> Result<()> {
            Ok(())
        }
        fn clean(&self) -> Result<()> {
            Ok(())
        }
    }

    struct ListDb(RefCell<Vec<String>>);

    impl RpmDatabase for ListDb {
        fn init_db(&self, _root: &Path) -> Result<()> {
            Ok(())
        }
        fn is_installed(&self, _root: &Path, package: &str) -> Result<bool> {
            Ok(self.0.borrow().iter().any(|p| p == package))
        }
        fn list_installed(&self, _root: &Path) -> Result<Vec<String>> {
            Ok(self.0.borrow().clone())
        }
    }

    #[test]
    fn test_scriptlet_failure_tolerated_when_registered() {
        let dir = tempfile::tempdir().unwrap();
        let db = ListDb(RefCell::new(vec!["wget".to_string()]));
        install_packages(dir.path(), &["wget".to_string()], &FlakyYum, &db, false).unwrap();
        assert!(dir.path().join("var/tmp").is_dir());
        assert!(dir.path().join("tmp").is_dir());
    }

    #[test]
    fn test_unregistered_package_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let db = ListDb(RefCell::new(vec!["wget".to_string()]));
        let err = install_packages(
            dir.path(),
            &["wget".to_string(), "osg-wn-client".to_string()],
            &FlakyYum,
            &db,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotRegistered { ref package, .. } if package == "osg-wn-client"));
    }
}
