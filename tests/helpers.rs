//! Shared test utilities for tarball-client tests.
//!
//! `FakeYum` and `FakeRpm` stand in for the package manager and rpm. They
//! keep a plain-text registry inside the database directory, so everything
//! the pipeline queries is real filesystem state under the staging root.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use tarball_client::error::Result;
use tarball_client::target::PlatformCaps;
use tarball_client::yum::{ForceInstallOptions, PackageManager, RpmDatabase};

/// Registry file kept next to the fake database file.
pub const REGISTRY: &str = "fake-registry";

/// Where a package's payload lands inside a root.
pub fn payload_path(package: &str) -> PathBuf {
    PathBuf::from("usr/share/fake-payload").join(package)
}

/// Test environment with a temporary work area.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub stage1: PathBuf,
    pub stage2: PathBuf,
    pub output: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir
            .path()
            .canonicalize()
            .expect("Failed to resolve temp dir");

        Self {
            stage1: base.join("stage1"),
            stage2: base.join("stage2"),
            output: base.join("output"),
            _temp_dir: temp_dir,
        }
    }
}

fn db_dir(root: &Path, caps: &PlatformCaps) -> PathBuf {
    root.join(caps.rpmdb_dir)
}

fn register(root: &Path, caps: &PlatformCaps, packages: &[String]) {
    let registry = db_dir(root, caps).join(REGISTRY);
    let mut known = fs::read_to_string(&registry).unwrap_or_default();
    for package in packages {
        if !known.lines().any(|l| l == package) {
            known.push_str(package);
            known.push('\n');
        }
    }
    fs::write(&registry, known).expect("Failed to write registry");
}

fn unpack(root: &Path, packages: &[String]) {
    for package in packages {
        let path = root.join(payload_path(package));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("{}\n", package)).unwrap();
    }
}

/// One recorded package manager call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Install(Vec<String>),
    ForceInstall(Vec<String>, ForceInstallOptions),
    FakeInstall(Vec<String>),
    Clean,
}

/// Package manager that unpacks a marker file per package.
pub struct FakeYum {
    pub caps: PlatformCaps,
    pub calls: RefCell<Vec<Call>>,
    /// Written by `fake_install`, as a misbehaving tool would.
    pub stray: Option<&'static str>,
}

impl FakeYum {
    pub fn new(caps: PlatformCaps) -> Self {
        Self {
            caps,
            calls: RefCell::new(Vec::new()),
            stray: None,
        }
    }

    pub fn with_stray(mut self, path: &'static str) -> Self {
        self.stray = Some(path);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

impl PackageManager for FakeYum {
    fn install(&self, root: &Path, packages: &[String]) -> Result<()> {
        self.calls.borrow_mut().push(Call::Install(packages.to_vec()));
        unpack(root, packages);
        fs::create_dir_all(root.join("var/log")).unwrap();
        fs::write(root.join("var/log/yum.log"), packages.join("\n")).unwrap();
        fs::create_dir_all(root.join("tmp")).unwrap();
        fs::write(root.join("tmp/yum-scratch"), "").unwrap();
        register(root, &self.caps, packages);
        Ok(())
    }

    fn force_install(&self, root: &Path, packages: &[String], opts: ForceInstallOptions) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(Call::ForceInstall(packages.to_vec(), opts));
        unpack(root, packages);
        register(root, &self.caps, packages);
        Ok(())
    }

    fn fake_install(&self, root: &Path, packages: &[String]) -> Result<()> {
        self.calls.borrow_mut().push(Call::FakeInstall(packages.to_vec()));
        if let Some(stray) = self.stray {
            let path = root.join(stray);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        register(root, &self.caps, packages);
        Ok(())
    }

    fn clean(&self) -> Result<()> {
        self.calls.borrow_mut().push(Call::Clean);
        Ok(())
    }
}

/// Database that reads the registry `FakeYum` writes.
pub struct FakeRpm {
    pub caps: PlatformCaps,
}

impl FakeRpm {
    pub fn new(caps: PlatformCaps) -> Self {
        Self { caps }
    }

    fn registered(&self, root: &Path) -> Vec<String> {
        fs::read_to_string(db_dir(root, &self.caps).join(REGISTRY))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl RpmDatabase for FakeRpm {
    fn init_db(&self, root: &Path) -> Result<()> {
        let dir = db_dir(root, &self.caps);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("rpmdb.sqlite"), "")?;
        Ok(())
    }

    fn is_installed(&self, root: &Path, package: &str) -> Result<bool> {
        Ok(self.registered(root).iter().any(|p| p == package))
    }

    fn list_installed(&self, root: &Path) -> Result<Vec<String>> {
        let mut packages: Vec<String> = self
            .registered(root)
            .into_iter()
            .map(|p| format!("{}-1.0-1.x86_64", p))
            .collect();
        packages.sort();
        Ok(packages)
    }
}

/// Names inside a gzipped tarball, as `tar -tzf` prints them.
pub fn tar_listing(tarball: &Path) -> Vec<String> {
    let output = std::process::Command::new("tar")
        .arg("-tzf")
        .arg(tarball)
        .output()
        .expect("Failed to run tar");
    assert!(output.status.success(), "tar -tzf failed");
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| l.trim_end_matches('/').to_string())
        .collect()
}

pub fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
