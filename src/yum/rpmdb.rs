use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::process::Cmd;
use crate::target::PlatformCaps;

use super::RpmDatabase;

/// `rpm` run against an alternate root.
#[derive(Debug, Clone)]
pub struct Rpm {
    /// Database path inside the root, absolute as rpm expects it.
    dbpath: String,
}

impl Rpm {
    pub fn new(caps: &PlatformCaps) -> Self {
        Self {
            dbpath: format!("/{}", caps.rpmdb_dir),
        }
    }

    fn cmd(&self, root: &Path) -> Cmd {
        Cmd::new("rpm")
            .c_locale()
            .arg("--root")
            .arg_path(root)
            .args(["--dbpath", &self.dbpath])
    }

    /// Install local package files with rpm, no dependency checks.
    pub(crate) fn install_files(
        &self,
        root: &Path,
        packages: &[String],
        files: &[PathBuf],
        extra: &[&str],
    ) -> Result<()> {
        let result = self
            .cmd(root)
            .args(["--install", "--verbose", "--nodeps"])
            .args(extra)
            .arg_paths(files)
            .allow_fail()
            .run_interactive()?;
        if !result.success() {
            return Err(Error::Install {
                packages: packages.to_vec(),
                root: root.to_path_buf(),
                code: result.code(),
            });
        }
        Ok(())
    }
}

impl RpmDatabase for Rpm {
    fn init_db(&self, root: &Path) -> Result<()> {
        self.cmd(root).arg("--initdb").run().map(|_| ())
    }

    fn is_installed(&self, root: &Path, package: &str) -> Result<bool> {
        let result = self.cmd(root).args(["-q", package]).allow_fail().run()?;
        debug!(package, registered = result.success(), "rpm -q");
        Ok(result.success())
    }

    fn list_installed(&self, root: &Path) -> Result<Vec<String>> {
        let result = self.cmd(root).arg("-qa").run()?;
        let mut packages: Vec<String> = result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        packages.sort();
        Ok(packages)
    }
}
