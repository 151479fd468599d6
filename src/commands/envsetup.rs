//! Envsetup command - writes the setup script templates.

use std::path::Path;

use anyhow::Result;

use tarball_client::envsetup::write_setup_in_files;
use tarball_client::target::{Basearch, Dver};

pub fn cmd_envsetup(dest_dir: &Path, dver: Dver, basearch: Basearch) -> Result<()> {
    for path in write_setup_in_files(dest_dir, dver, basearch)? {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
