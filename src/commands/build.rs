//! Build command - stage 1, stage 2 and tarball for one release bundle.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use tracing::warn;

use tarball_client::common::ReusePolicy;
use tarball_client::config::Config;
use tarball_client::stage1::Stage1Builder;
use tarball_client::stage2::tarball::tarball_name;
use tarball_client::stage2::{seed_from_stage1, Stage2Builder};
use tarball_client::target::TargetEnv;
use tarball_client::yum::{Rpm, Yum, YumConfig};

use super::clear_stage_dir;

pub struct BuildOptions {
    /// Bundle name or metapackage.
    pub bundle: String,
    pub relnum: Option<u32>,
    pub reuse: ReusePolicy,
    /// Leave the stage directories behind for inspection.
    pub keep_stage_dirs: bool,
}

/// Execute the build command.
pub fn cmd_build(config: &Config, env: &TargetEnv, opts: &BuildOptions) -> Result<PathBuf> {
    println!(
        "=== Building {} for {} {} {} ===\n",
        opts.bundle, env.series, env.dver, env.basearch
    );
    let build_start = Instant::now();

    let table = config.release_table()?;
    let release = table.get(&env.series)?;
    if !release.supports(env.dver) {
        bail!("Release {} is not built for {}", env.series, env.dver);
    }
    let bundle = release
        .bundle(&opts.bundle)
        .ok_or_else(|| anyhow!("Release {} has no bundle {:?}", env.series, opts.bundle))?;

    let yum_config = YumConfig::new(&config.repo_template_text()?, env, release)?;
    let stage1_packages = config.stage1_packages()?;

    let stage_dir = config
        .work_dir
        .join(format!("{}-{}-{}", env.series, env.dver, env.basearch));
    let stage1_root = stage_dir.join("stage1");
    let stage2_root = stage_dir.join("stage2");
    let tarball = config.output_dir.join(tarball_name(
        &bundle.metapackage,
        Some(&env.series),
        env.dver,
        env.basearch,
    ));

    let mut patch_dirs = Vec::new();
    for set in &bundle.patch_sets {
        let dir = config.patches_dir.join(set);
        if dir.is_dir() {
            patch_dirs.push(dir);
        } else {
            warn!("patch set {} not found at {}", set, dir.display());
        }
    }

    clear_stage_dir(&stage2_root, opts.reuse)?;

    let caps = env.caps();
    let rpm = Rpm::new(&caps);
    let report = Yum::scoped(&yum_config, caps, |yum| {
        let stage1 = Stage1Builder::new(&stage1_root, env, stage1_packages, yum, &rpm)
            .reuse(opts.reuse)
            .build()?;
        seed_from_stage1(&stage1.root, &stage2_root)?;
        Stage2Builder::new(&stage2_root, env, bundle.packages(), &tarball, yum, &rpm)
            .patch_dirs(patch_dirs)
            .post_install_dir(config.post_install_dir.clone())
            .relnum(opts.relnum)
            .build()
    })?;

    if !opts.keep_stage_dirs {
        if let Err(e) = fs::remove_dir_all(&stage_dir) {
            warn!("unable to remove {}: {}", stage_dir.display(), e);
        }
    }

    println!("\n=== Build Complete ({:.1}s) ===", build_start.elapsed().as_secs_f64());
    println!("  Tarball: {}", report.tarball.display());
    println!("  SHA256:  {}", report.sha256);
    Ok(report.tarball)
}
