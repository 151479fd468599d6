//! Stage 1 command - builds a stage 1 root on its own.

use std::path::Path;

use anyhow::Result;

use tarball_client::common::ReusePolicy;
use tarball_client::config::Config;
use tarball_client::stage1::Stage1Builder;
use tarball_client::target::TargetEnv;
use tarball_client::yum::{Rpm, Yum, YumConfig};

pub fn cmd_stage1(config: &Config, env: &TargetEnv, dir: &Path, reuse: ReusePolicy) -> Result<()> {
    let table = config.release_table()?;
    let release = table.get(&env.series)?;
    let yum_config = YumConfig::new(&config.repo_template_text()?, env, release)?;
    let packages = config.stage1_packages()?;

    let caps = env.caps();
    let rpm = Rpm::new(&caps);
    let report = Yum::scoped(&yum_config, caps, |yum| {
        Stage1Builder::new(dir, env, packages, yum, &rpm)
            .reuse(reuse)
            .build()
    })?;

    println!("\nStage 1 root: {}", report.root.display());
    println!("  {} files in manifest", report.files);
    println!("  {} packages registered", report.packages.len());
    Ok(())
}
