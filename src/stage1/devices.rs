//! Character devices for the stage 1 chroot.

use std::fs;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::stat::{makedev, mknod, Mode, SFlag};
use nix::unistd::{chown, Group};
use tracing::debug;

use crate::error::{Error, Result};

/// Devices to put in `/dev`: name, major, minor, group, perms.
pub const DEVICES: &[(&str, u64, u64, &str, u32)] = &[
    ("core", 1, 6, "root", 0o600),
    ("mem", 1, 1, "kmem", 0o640),
    ("null", 1, 3, "root", 0o666),
    ("port", 1, 4, "kmem", 0o640),
    ("zero", 1, 5, "root", 0o666),
    ("urandom", 1, 9, "root", 0o666),
];

/// Create `DEVICES` under `<root>/dev`.
pub fn create_devices(root: &Path) -> Result<()> {
    let dev_dir = root.join("dev");
    fs::create_dir_all(&dev_dir).map_err(|e| Error::io_at(&dev_dir, e))?;

    for &(name, major, minor, group, perms) in DEVICES {
        let path = dev_dir.join(name);
        mknod(
            &path,
            SFlag::S_IFCHR,
            Mode::from_bits_truncate(perms),
            makedev(major, minor),
        )
        .map_err(|errno| device_error(name, errno))?;

        // A host without the group keeps root ownership
        if let Some(group) = Group::from_name(group).map_err(|errno| device_error(name, errno))? {
            chown(&path, None, Some(group.gid)).map_err(|errno| device_error(name, errno))?;
        }
        debug!("created /dev/{}", name);
    }
    Ok(())
}

fn device_error(name: &str, errno: Errno) -> Error {
    match errno {
        Errno::EPERM | Errno::EACCES => Error::Privilege(format!(
            "could not create /dev/{} in the chroot: {}",
            name, errno
        )),
        other => Error::io_at(
            format!("dev/{}", name),
            std::io::Error::from_raw_os_error(other as i32),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_maps_to_privilege_error() {
        assert!(matches!(device_error("null", Errno::EPERM), Error::Privilege(_)));
        assert!(matches!(device_error("null", Errno::EEXIST), Error::IoAt { .. }));
    }

    #[test]
    fn test_device_table_is_character_devices_on_major_1() {
        assert!(DEVICES.iter().all(|d| d.1 == 1));
        assert!(DEVICES.iter().any(|d| d.0 == "null" && d.4 == 0o666));
    }
}
