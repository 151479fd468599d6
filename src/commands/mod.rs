//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Stage 1, stage 2 and tarball for one release bundle
//! - `stage1` - Build only a stage 1 root
//! - `stage2` - Install, patch and archive an existing stage 2 root
//! - `show` - Display configuration, releases or rendered repositories
//! - `envsetup` - Write the setup script templates
//! - `preflight` - Run preflight checks

pub mod build;
mod envsetup;
mod preflight;
pub mod show;
mod stage1;
pub mod stage2;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use tarball_client::common::{is_dir_empty, ReusePolicy};

pub use build::cmd_build;
pub use envsetup::cmd_envsetup;
pub use preflight::cmd_preflight;
pub use show::cmd_show;
pub use stage1::cmd_stage1;
pub use stage2::cmd_stage2;

/// Remove a leftover stage directory after asking according to `reuse`.
fn clear_stage_dir(dir: &Path, reuse: ReusePolicy) -> Result<()> {
    if !dir.exists() || is_dir_empty(dir)? {
        return Ok(());
    }
    let question = format!(
        "Stage directory ({}) already exists. Its contents will be removed. Continue?",
        dir.display()
    );
    if !reuse.confirm(&question)? {
        bail!("Not overwriting {}. Remove it or pass a different directory", dir.display());
    }
    fs::remove_dir_all(dir).with_context(|| format!("Failed to remove {}", dir.display()))?;
    Ok(())
}
