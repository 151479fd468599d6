use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::process::Cmd;
use crate::target::PlatformCaps;

use super::{check_install_args, ForceInstallOptions, PackageManager, Rpm, YumConfig};

/// yum/dnf driven with a rendered repository configuration.
///
/// Only exists inside [`Yum::scoped`], which owns the temporary config file.
pub struct Yum<'a> {
    conf_path: &'a Path,
    repo_args: Vec<String>,
    caps: PlatformCaps,
    rpm: Rpm,
}

impl<'a> Yum<'a> {
    /// Materialize `config`, run `f` with a package manager bound to it and
    /// remove the config file on every exit path.
    pub fn scoped<T, F>(config: &YumConfig, caps: PlatformCaps, f: F) -> Result<T>
    where
        F: FnOnce(&Yum<'_>) -> Result<T>,
    {
        config.scoped(|conf_path| {
            let yum = Yum {
                conf_path,
                repo_args: config.repo_args(),
                caps,
                rpm: Rpm::new(&caps),
            };
            f(&yum)
        })
    }

    fn program(&self) -> &'static str {
        self.caps.package_manager.program()
    }

    /// Download `packages` into a scratch directory and return the rpm files.
    fn download(
        &self,
        root: &Path,
        packages: &[String],
        resolve: bool,
        dest: &Path,
    ) -> Result<Vec<PathBuf>> {
        let (program, lead) = self.caps.package_manager.download_command();
        let mut cmd = Cmd::new(program)
            .c_locale()
            .args(lead)
            .arg("--destdir")
            .arg_path(dest)
            .arg("--installroot")
            .arg_path(root)
            .arg("-c")
            .arg_path(self.conf_path)
            .args(["-d1", "--nogpgcheck"])
            .args(&self.repo_args);
        if resolve {
            cmd = cmd.arg("--resolve");
        }
        let result = cmd.args(packages).allow_fail().run_interactive()?;
        if !result.success() {
            return Err(Error::Download {
                packages: packages.to_vec(),
                root: root.to_path_buf(),
                code: result.code(),
            });
        }

        let mut rpms = Vec::new();
        for entry in fs::read_dir(dest).map_err(|e| Error::io_at(dest, e))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "rpm") {
                rpms.push(path);
            }
        }
        rpms.sort();
        if rpms.is_empty() {
            return Err(Error::Download {
                packages: packages.to_vec(),
                root: root.to_path_buf(),
                code: 0,
            });
        }
        Ok(rpms)
    }

    fn download_and_register(
        &self,
        root: &Path,
        packages: &[String],
        resolve: bool,
        rpm_flags: &[&str],
    ) -> Result<()> {
        check_install_args(root, packages)?;
        let scratch = tempfile::Builder::new()
            .suffix(".fake-install")
            .tempdir()?;
        let rpms = self.download(root, packages, resolve, scratch.path())?;
        info!("Registering {} package file(s) into {}", rpms.len(), root.display());
        let result = self.rpm.install_files(root, packages, &rpms, rpm_flags);

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!("unable to remove {}: {}", scratch_path.display(), e);
        }
        result
    }
}

impl PackageManager for Yum<'_> {
    fn install(&self, root: &Path, packages: &[String]) -> Result<()> {
        check_install_args(root, packages)?;
        info!("{} install {}", self.program(), packages.join(" "));
        let result = Cmd::new(self.program())
            .c_locale()
            .args(["install", "-y", "--installroot"])
            .arg_path(root)
            .arg("-c")
            .arg_path(self.conf_path)
            .args(["-d1", "--nogpgcheck"])
            .args(&self.repo_args)
            .args(packages)
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

    fn force_install(&self, root: &Path, packages: &[String], opts: ForceInstallOptions) -> Result<()> {
        info!(
            resolve = opts.resolve,
            no_scripts = opts.no_scripts,
            "force installing {}",
            packages.join(" ")
        );
        let mut flags = vec!["--force"];
        if opts.no_scripts {
            flags.push("--noscripts");
        }
        self.download_and_register(root, packages, opts.resolve, &flags)
    }

    fn fake_install(&self, root: &Path, packages: &[String]) -> Result<()> {
        info!("registering {} without payload", packages.join(" "));
        self.download_and_register(root, packages, true, &["--justdb", "--noscripts"])
    }

    fn clean(&self) -> Result<()> {
        for what in ["all", "expire-cache"] {
            let result = Cmd::new(self.program())
                .c_locale()
                .args(["clean", what, "-c"])
                .arg_path(self.conf_path)
                .arg("--enablerepo=*")
                .allow_fail()
                .run()?;
            if !result.success() {
                warn!("{} clean {} exited with {}", self.program(), what, result.code());
            }
        }
        Ok(())
    }
}
