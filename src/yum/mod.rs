//! Package manager adapter.
//!
//! The rest of the pipeline talks to two seams:
//! - [`PackageManager`]: install, force install, fake install, cache clean
//! - [`RpmDatabase`]: database init and per-package existence queries
//!
//! [`Yum`] and [`Rpm`] implement them by shelling out to yum/dnf,
//! yumdownloader and rpm against an isolated install root.

pub mod conf;
mod installer;
mod rpmdb;

use std::path::Path;

use crate::error::{Error, Result};

pub use conf::YumConfig;
pub use installer::Yum;
pub use rpmdb::Rpm;

/// Options for [`PackageManager::force_install`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceInstallOptions {
    /// Also download dependencies of the requested packages.
    pub resolve: bool,
    /// Do not run install scriptlets.
    pub no_scripts: bool,
}

pub trait PackageManager {
    /// Install `packages` into `root` normally, dependencies included.
    fn install(&self, root: &Path, packages: &[String]) -> Result<()>;

    /// Download `packages` and unpack them into `root` with rpm directly,
    /// bypassing ordering and dependency checks.
    fn force_install(&self, root: &Path, packages: &[String], opts: ForceInstallOptions) -> Result<()>;

    /// Register `packages` in the database of `root` without any payload.
    fn fake_install(&self, root: &Path, packages: &[String]) -> Result<()>;

    /// Drop cached metadata so a previous build cannot leak into this one.
    fn clean(&self) -> Result<()>;
}

pub trait RpmDatabase {
    /// Create an empty package database under `root`.
    fn init_db(&self, root: &Path) -> Result<()>;

    /// Whether `package` is registered in the database under `root`.
    fn is_installed(&self, root: &Path, package: &str) -> Result<bool>;

    /// Every registered package, one NEVRA per entry.
    fn list_installed(&self, root: &Path) -> Result<Vec<String>>;
}

/// Shared preconditions of every install-type operation.
pub(crate) fn check_install_args(root: &Path, packages: &[String]) -> Result<()> {
    if root.as_os_str().is_empty() {
        return Err(Error::InvalidArgument("'root' empty".to_string()));
    }
    if packages.is_empty() || packages.iter().all(|p| p.trim().is_empty()) {
        return Err(Error::InvalidArgument("'packages' empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_install_args() {
        let pkgs = vec!["bash".to_string()];
        assert!(check_install_args(Path::new("/tmp/root"), &pkgs).is_ok());
        assert!(matches!(
            check_install_args(Path::new(""), &pkgs),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            check_install_args(Path::new("/tmp/root"), &[]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
