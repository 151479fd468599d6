//! Stage 1: the base root that stands in for the target host.
//!
//! Stage 1 holds an RPM database listing the packages a user is expected to
//! have on their machine already (bash, coreutils, ...). Stage 2 installs on
//! top of a copy of it so the package manager considers those dependencies
//! satisfied, and the finished tarball leaves out everything stage 1 put on
//! disk.
//!
//! On older platforms the foundational packages are unpacked for real since
//! later scriptlets execute them. Newer platforms only register them in the
//! database.

pub mod devices;
pub mod manifest;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::common::{ensure_dir_exists, is_dir_empty, touch, ReusePolicy};
use crate::error::{Error, Result};
use crate::mount::with_proc;
use crate::target::{PlatformCaps, TargetEnv};
use crate::verify::{verify_staging_root, StrayCheck};
use crate::yum::{ForceInstallOptions, PackageManager, RpmDatabase};

pub use manifest::{read_filelist, STAGE1_FILELIST, STAGE1_RPMLIST};

/// Installed with payload first so the rest of the tree has its directories.
const FILESYSTEM_PACKAGE: &str = "filesystem";

/// Minimal userland needed by scriptlets of later packages.
const SHELL_PACKAGES: &[&str] = &["bash", "grep", "info", "findutils", "libacl", "libattr"];

const COREUTILS_PACKAGE: &str = "coreutils";

const PRIORITIES_PLUGIN: &str = "yum-plugin-priorities";

/// Files some scriptlets expect to exist.
const PLACEHOLDER_FILES: &[&str] = &["etc/fstab", "etc/mtab"];
const PLACEHOLDER_DIRS: &[&str] = &["etc/modprobe.d"];

/// Split a stage 1 package list into package names.
///
/// Words are separated like a shell would; `#` starts a comment.
pub fn parse_package_list(text: &str) -> Result<Vec<String>> {
    let mut packages = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => line,
        };
        let words = shlex::split(line).ok_or_else(|| {
            Error::Config(format!(
                "stage 1 package list, line {}: unbalanced quoting",
                lineno + 1
            ))
        })?;
        packages.extend(words.into_iter().filter(|w| !w.is_empty()));
    }
    if packages.is_empty() {
        return Err(Error::Config("stage 1 package list is empty".to_string()));
    }
    Ok(packages)
}

/// Read and parse a stage 1 package list file.
pub fn read_package_list(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
    parse_package_list(&text)
}

/// Package manager state a database-only install may write under `var`.
const PACKAGE_MANAGER_STATE: &[&str] = &[
    "var/lib/rpm",
    "var/lib/yum",
    "var/lib/dnf",
    "var/cache",
    "var/log",
    "var/tmp",
];

/// Paths a database-only stage 1 root may contain.
///
/// Under `usr` only the chain leading to the database is admitted, so a
/// package that slipped through with payload is caught.
pub fn expected_entries(caps: &PlatformCaps) -> StrayCheck {
    let mut allowed = vec![caps.rpmdb_dir];
    allowed.extend(PACKAGE_MANAGER_STATE);
    allowed.extend(["etc", "dev", "proc", "tmp", STAGE1_FILELIST, STAGE1_RPMLIST]);
    StrayCheck::new(allowed)
}

/// What a finished stage 1 looks like.
#[derive(Debug, Clone)]
pub struct Stage1Report {
    pub root: PathBuf,
    /// Entries written to `stage1_filelist`.
    pub files: usize,
    /// Packages registered in the database.
    pub packages: Vec<String>,
}

pub struct Stage1Builder<'a> {
    root: PathBuf,
    env: &'a TargetEnv,
    packages: Vec<String>,
    reuse: ReusePolicy,
    mount_proc: bool,
    pm: &'a dyn PackageManager,
    db: &'a dyn RpmDatabase,
}

impl<'a> Stage1Builder<'a> {
    pub fn new(
        root: impl Into<PathBuf>,
        env: &'a TargetEnv,
        packages: Vec<String>,
        pm: &'a dyn PackageManager,
        db: &'a dyn RpmDatabase,
    ) -> Self {
        Self {
            root: root.into(),
            env,
            packages,
            reuse: ReusePolicy::Prompt,
            mount_proc: true,
            pm,
            db,
        }
    }

    pub fn reuse(mut self, policy: ReusePolicy) -> Self {
        self.reuse = policy;
        self
    }

    /// Skip mounting procfs (tests, or hosts where scriptlets don't need it).
    pub fn without_proc_mount(mut self) -> Self {
        self.mount_proc = false;
        self
    }

    /// Build and verify the stage 1 root.
    ///
    /// On failure the directory is left as is for inspection.
    pub fn build(&self) -> Result<Stage1Report> {
        let caps = self.env.caps();
        let root = self.prepare_root()?;
        info!("Using {} for stage 1 directory", root.display());

        info!("Initializing stage 1 rpm db");
        self.db.init_db(&root)?;

        if caps.dev_nodes {
            info!("Initializing /dev in root dir");
            devices::create_devices(&root)?;
        }

        for file in PLACEHOLDER_FILES {
            touch(root.join(file))?;
        }
        for dir in PLACEHOLDER_DIRS {
            ensure_dir_exists(&root.join(dir))?;
        }

        info!("Installing {} stage 1 packages", self.packages.len());
        with_proc(&root, self.mount_proc, || {
            self.pm.clean()?;
            if caps.unpack_foundation {
                self.install_unpacked(&root, &caps)
            } else {
                self.install_registered(&root, &caps)
            }
        })?;

        info!("Making file list");
        let files = manifest::write_filelist(&root)?;

        info!("Making rpm list");
        let packages = self.db.list_installed(&root)?;
        manifest::write_rpmlist(&root, &packages)?;

        let stray = (!caps.unpack_foundation).then(|| expected_entries(&caps));
        verify_staging_root(&root, &caps, self.db, stray.as_ref())?;

        Ok(Stage1Report {
            root,
            files: files.len(),
            packages,
        })
    }

    /// Resolve the root and make sure it is an empty directory.
    fn prepare_root(&self) -> Result<PathBuf> {
        let root = std::path::absolute(&self.root).map_err(|e| Error::io_at(&self.root, e))?;
        let root = if root.exists() {
            root.canonicalize().map_err(|e| Error::io_at(&root, e))?
        } else {
            root
        };
        if root == Path::new("/") {
            return Err(Error::Config(
                "You may not use '/' as the stage 1 directory".to_string(),
            ));
        }

        if root.exists() {
            if !root.is_dir() {
                return Err(Error::Config(format!(
                    "{} exists and is not a directory",
                    root.display()
                )));
            }
            if !is_dir_empty(&root)? {
                let question = format!(
                    "Stage 1 directory ({}) already exists. Reuse it? Note that the contents will be emptied!",
                    root.display()
                );
                if !self.reuse.confirm(&question)? {
                    return Err(Error::Aborted(format!(
                        "Not overwriting {}. Remove it or pass a different directory",
                        root.display()
                    )));
                }
                empty_dir(&root)?;
            }
        }
        ensure_dir_exists(&root)?;
        Ok(root)
    }

    /// Older platforms: unpack the foundation so scriptlets can run it.
    fn install_unpacked(&self, root: &Path, caps: &PlatformCaps) -> Result<()> {
        self.pm.force_install(
            root,
            &owned(&[FILESYSTEM_PACKAGE]),
            ForceInstallOptions::default(),
        )?;
        self.pm.force_install(
            root,
            &owned(SHELL_PACKAGES),
            ForceInstallOptions {
                resolve: true,
                no_scripts: true,
            },
        )?;
        self.pm.force_install(
            root,
            &owned(&[COREUTILS_PACKAGE]),
            ForceInstallOptions {
                resolve: false,
                no_scripts: true,
            },
        )?;
        if !caps.extra_foundation.is_empty() {
            self.pm.force_install(
                root,
                &owned(caps.extra_foundation),
                ForceInstallOptions {
                    resolve: true,
                    no_scripts: false,
                },
            )?;
        }
        if caps.priorities_plugin {
            self.pm.install(root, &owned(&[PRIORITIES_PLUGIN]))?;
        }
        self.pm.install(root, &self.package_set(caps))
    }

    /// Newer platforms: database entries only.
    fn install_registered(&self, root: &Path, caps: &PlatformCaps) -> Result<()> {
        let mut packages = owned(&[FILESYSTEM_PACKAGE]);
        packages.extend(owned(SHELL_PACKAGES));
        packages.push(COREUTILS_PACKAGE.to_string());
        for package in self.package_set(caps) {
            if !packages.contains(&package) {
                packages.push(package);
            }
        }
        self.pm.fake_install(root, &packages)
    }

    /// The configured list plus the package manager's own package.
    fn package_set(&self, caps: &PlatformCaps) -> Vec<String> {
        let mut packages = self.packages.clone();
        let own = caps.package_manager.own_package();
        if !packages.iter().any(|p| p == own) {
            packages.push(own.to_string());
        }
        packages
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn empty_dir(dir: &Path) -> Result<()> {
    warn!("Emptying {}", dir.display());
    for entry in fs::read_dir(dir).map_err(|e| Error::io_at(dir, e))? {
        let path = entry?.path();
        let meta = fs::symlink_metadata(&path).map_err(|e| Error::io_at(&path, e))?;
        if meta.is_dir() {
            fs::remove_dir_all(&path).map_err(|e| Error::io_at(&path, e))?;
        } else {
            fs::remove_file(&path).map_err(|e| Error::io_at(&path, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Dver;

    #[test]
    fn test_parse_package_list_comments_and_quotes() {
        let text = "# base\nbash coreutils  # shells\n\n'perl(Getopt::Long)'\n";
        assert_eq!(
            parse_package_list(text).unwrap(),
            vec!["bash", "coreutils", "perl(Getopt::Long)"]
        );
    }

    #[test]
    fn test_parse_package_list_errors() {
        assert!(matches!(parse_package_list("# nothing\n"), Err(Error::Config(_))));
        assert!(matches!(parse_package_list("bash 'open\n"), Err(Error::Config(_))));
    }

    #[test]
    fn test_builtin_package_list_parses() {
        let packages = parse_package_list(crate::config::DEFAULT_STAGE1_PACKAGES).unwrap();
        assert!(packages.iter().any(|p| p == "bash"));
    }

    #[test]
    fn test_expected_entries_follow_rpmdb_location() {
        let check = expected_entries(&Dver::El9.caps());
        let debug = format!("{:?}", check);
        assert!(debug.contains("usr/lib/sysimage/rpm"));
        assert!(!debug.contains("\"usr\""));
        assert!(debug.contains("stage1_filelist"));
    }

    #[test]
    fn test_empty_dir_keeps_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("f"), "x").unwrap();
        empty_dir(dir.path()).unwrap();
        assert!(is_dir_empty(dir.path()).unwrap());
    }
}
