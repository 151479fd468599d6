//! procfs mount guard for package installs.
//!
//! Some install scriptlets inspect `/proc`, so it is mounted inside the
//! staging root for the duration of an install and unmounted afterwards on
//! every exit path. Unmounting is best effort: a scriptlet may leave a
//! process behind that keeps the mount busy, which is logged, not fatal.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::process::Cmd;

pub struct ProcMount {
    proc_dir: PathBuf,
    mounted: bool,
}

impl ProcMount {
    /// Mount procfs at `<root>/proc`.
    pub fn new(root: &Path) -> Result<Self> {
        let proc_dir = root.join("proc");
        fs::create_dir_all(&proc_dir).map_err(|e| Error::io_at(&proc_dir, e))?;
        Cmd::new("mount")
            .args(["-t", "proc", "proc"])
            .arg_path(&proc_dir)
            .run()?;
        debug!("mounted proc at {}", proc_dir.display());
        Ok(Self {
            proc_dir,
            mounted: true,
        })
    }

    /// Unmount now instead of at drop.
    pub fn unmount(mut self) {
        self.impl_unmount();
    }

    fn impl_unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        match Cmd::new("umount").arg_path(&self.proc_dir).allow_fail().run() {
            Ok(result) if result.success() => {
                debug!("unmounted {}", self.proc_dir.display());
            }
            Ok(result) => warn!(
                "umount {} exited with {}: {}",
                self.proc_dir.display(),
                result.code(),
                result.stderr.trim()
            ),
            Err(e) => warn!("umount {} failed: {}", self.proc_dir.display(), e),
        }
    }
}

impl Drop for ProcMount {
    fn drop(&mut self) {
        self.impl_unmount();
    }
}

/// Run `f` with procfs mounted in `root` when `enabled`.
pub fn with_proc<T, F>(root: &Path, enabled: bool, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    if !enabled {
        return f();
    }
    let mount = ProcMount::new(root)?;
    let result = f();
    mount.unmount();
    result
}
