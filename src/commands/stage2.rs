//! Stage 2 command - installs into, patches and archives a stage 2 root.

use std::path::PathBuf;

use anyhow::{bail, Result};

use tarball_client::config::Config;
use tarball_client::stage2::tarball::tarball_name;
use tarball_client::stage2::{seed_from_stage1, Stage2Builder};
use tarball_client::target::TargetEnv;
use tarball_client::yum::{Rpm, Yum, YumConfig};

pub struct Stage2Options {
    /// The stage 2 root.
    pub dir: PathBuf,
    /// Copy this stage 1 root into `dir` first.
    pub from_stage1: Option<PathBuf>,
    pub metapackage: String,
    /// Installed alongside the metapackage.
    pub extra_packages: Vec<String>,
    pub tarball: Option<PathBuf>,
    pub patch_dirs: Vec<PathBuf>,
    pub relnum: Option<u32>,
}

pub fn cmd_stage2(config: &Config, env: &TargetEnv, opts: Stage2Options) -> Result<()> {
    if opts.metapackage.trim().is_empty() {
        bail!("metapackage must not be empty");
    }
    let table = config.release_table()?;
    let release = table.get(&env.series)?;
    let yum_config = YumConfig::new(&config.repo_template_text()?, env, release)?;

    let mut packages = opts.extra_packages.clone();
    packages.push(opts.metapackage.clone());

    let tarball = opts.tarball.clone().unwrap_or_else(|| {
        config
            .output_dir
            .join(tarball_name(&opts.metapackage, None, env.dver, env.basearch))
    });

    if let Some(stage1) = &opts.from_stage1 {
        seed_from_stage1(stage1, &opts.dir)?;
    }

    let caps = env.caps();
    let rpm = Rpm::new(&caps);
    let report = Yum::scoped(&yum_config, caps, |yum| {
        Stage2Builder::new(&opts.dir, env, packages, &tarball, yum, &rpm)
            .patch_dirs(opts.patch_dirs.clone())
            .post_install_dir(config.post_install_dir.clone())
            .relnum(opts.relnum)
            .build()
    })?;

    println!("\nTarball: {}", report.tarball.display());
    println!("  SHA256: {}", report.sha256);
    println!("  {} patches applied, {} links fixed", report.patches_applied, report.links_fixed);
    Ok(())
}
