//! Stage 2: the real install, patched, fixed up and archived.
//!
//! A stage 2 root starts as a copy of a verified stage 1 root. The builder
//! moves through its states strictly forward; any error parks it in
//! [`Stage2State::Failed`] and is handed back to the caller unchanged.

pub mod alternatives;
pub mod fixups;
pub mod install;
pub mod patch;
pub mod tarball;

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::common::{ensure_dir_exists, is_dir_empty};
use crate::error::{Error, Result, VerifyError};
use crate::process::Cmd;
use crate::stage1::read_filelist;
use crate::target::TargetEnv;
use crate::verify::verify_staging_root;
use crate::yum::{PackageManager, RpmDatabase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage2State {
    Init,
    Installed,
    Patched,
    FixedUp,
    Archived,
    Done,
    Failed,
}

impl fmt::Display for Stage2State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage2State::Init => "init",
            Stage2State::Installed => "installed",
            Stage2State::Patched => "patched",
            Stage2State::FixedUp => "fixed-up",
            Stage2State::Archived => "archived",
            Stage2State::Done => "done",
            Stage2State::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Stage2Report {
    pub root: PathBuf,
    pub tarball: PathBuf,
    pub sha256: String,
    pub patches_applied: usize,
    pub links_fixed: usize,
}

/// Copy a stage 1 root to `stage2_root` with `cp -a`.
///
/// `stage2_root` must not exist or be empty.
pub fn seed_from_stage1(stage1_root: &Path, stage2_root: &Path) -> Result<()> {
    if !stage1_root.is_dir() {
        return Err(VerifyError::MissingRoot(stage1_root.to_path_buf()).into());
    }
    if stage2_root.exists() {
        if !is_dir_empty(stage2_root)? {
            return Err(Error::Config(format!(
                "{} already exists and is not empty",
                stage2_root.display()
            )));
        }
        std::fs::remove_dir(stage2_root).map_err(|e| Error::io_at(stage2_root, e))?;
    }
    if let Some(parent) = stage2_root.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir_exists(parent)?;
    }
    info!("Copying {} to {}", stage1_root.display(), stage2_root.display());
    Cmd::new("cp")
        .arg("-a")
        .arg_path(stage1_root)
        .arg_path(stage2_root)
        .run()?;
    Ok(())
}

pub struct Stage2Builder<'a> {
    root: PathBuf,
    env: &'a TargetEnv,
    packages: Vec<String>,
    tarball: PathBuf,
    patch_dirs: Vec<PathBuf>,
    post_install_dir: Option<PathBuf>,
    relnum: Option<u32>,
    mount_proc: bool,
    pm: &'a dyn PackageManager,
    db: &'a dyn RpmDatabase,
    state: Stage2State,
}

impl<'a> Stage2Builder<'a> {
    pub fn new(
        root: impl Into<PathBuf>,
        env: &'a TargetEnv,
        packages: Vec<String>,
        tarball: impl Into<PathBuf>,
        pm: &'a dyn PackageManager,
        db: &'a dyn RpmDatabase,
    ) -> Self {
        Self {
            root: root.into(),
            env,
            packages,
            tarball: tarball.into(),
            patch_dirs: Vec::new(),
            post_install_dir: None,
            relnum: None,
            mount_proc: true,
            pm,
            db,
            state: Stage2State::Init,
        }
    }

    pub fn patch_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.patch_dirs = dirs;
        self
    }

    pub fn post_install_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.post_install_dir = dir;
        self
    }

    /// Release number appended to the version stamp.
    pub fn relnum(mut self, relnum: Option<u32>) -> Self {
        self.relnum = relnum;
        self
    }

    pub fn without_proc_mount(mut self) -> Self {
        self.mount_proc = false;
        self
    }

    pub fn state(&self) -> Stage2State {
        self.state
    }

    fn advance(&mut self, next: Stage2State) {
        info!("stage 2: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Run every step and return the finished tarball.
    pub fn build(&mut self) -> Result<Stage2Report> {
        if self.state != Stage2State::Init {
            return Err(Error::Config(format!(
                "stage 2 builder already ran (state: {})",
                self.state
            )));
        }
        match self.run() {
            Ok(report) => {
                self.advance(Stage2State::Done);
                Ok(report)
            }
            Err(e) => {
                error!("stage 2 failed after state {}: {}", self.state, e);
                self.state = Stage2State::Failed;
                Err(e)
            }
        }
    }

    fn run(&mut self) -> Result<Stage2Report> {
        let caps = self.env.caps();
        if !self.root.is_dir() {
            return Err(VerifyError::MissingRoot(self.root.clone()).into());
        }
        let root = self.root.canonicalize().map_err(|e| Error::io_at(&self.root, e))?;
        let tarball = std::path::absolute(&self.tarball).map_err(|e| Error::io_at(&self.tarball, e))?;
        info!("Making stage 2 tarball in {}", root.display());

        verify_staging_root(&root, &caps, self.db, None)?;

        install::install_packages(&root, &self.packages, self.pm, self.db, self.mount_proc)?;
        self.advance(Stage2State::Installed);

        let patches_applied = patch::apply_patches(&root, &self.patch_dirs, self.env.dver, &self.env.series)?;
        self.advance(Stage2State::Patched);

        info!("Fixing up installed tree");
        fixups::fix_gsissh_config_dir(&root)?;
        fixups::fix_version_file(&root, self.relnum)?;
        fixups::fix_cog_axis_link(&root)?;
        fixups::create_fetch_crl_links(&root, &caps)?;
        let links_fixed = alternatives::fix_alternatives_links(&root)?;
        if let Some(dir) = &self.post_install_dir {
            fixups::copy_post_install(&root, dir, self.env.dver, self.env.basearch)?;
        }
        // fixups create links and files with whatever mode the umask gives
        fixups::normalize_permissions(&root)?;
        self.advance(Stage2State::FixedUp);

        let manifest = read_filelist(&root)?;
        let patterns = tarball::exclude_patterns(&caps, &manifest);
        tarball::create_tarball(&root, &tarball, &patterns)?;
        self.advance(Stage2State::Archived);

        tarball::post_process(&tarball)?;
        let sha256 = tarball::write_checksum(&tarball)?;
        info!("Created {} (sha256 {})", tarball.display(), sha256);

        Ok(Stage2Report {
            root,
            tarball,
            sha256,
            patches_applied,
            links_fixed,
        })
    }
}
