// SPDX-License-Identifier: GPL-3.0-only

//! Device node discovery and synthesis
//!
//! The quota-control call needs a block special file for the mounted device,
//! but the `/dev` entry is not always present or discoverable by name
//! (device-mapper and loop devices in containers in particular). The
//! locator checks the conventional places first and only then creates a
//! node in a private scratch directory.

use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use nix::sys::stat::{makedev, major, minor, mknod, Mode, SFlag};
use quota_types::DeviceNumber;
use tracing::{debug, warn};

use crate::config::QuotaConfig;
use crate::error::{QuotaError, Result};

/// Maps a device number to a path usable as the quota-control special file
pub trait DeviceLocator {
    fn locate(&self, device: DeviceNumber) -> Result<PathBuf>;
}

/// Locator backed by sysfs metadata and the `/dev` tree
pub struct SysfsDeviceLocator {
    sysfs_root: PathBuf,
    dev_root: PathBuf,
    scratch_dir: PathBuf,
    is_usable: fn(&Path, DeviceNumber) -> bool,
}

impl SysfsDeviceLocator {
    pub fn new(config: &QuotaConfig) -> Self {
        Self {
            sysfs_root: config.sysfs_root.clone(),
            dev_root: config.dev_root.clone(),
            scratch_dir: config.scratch_dir.clone(),
            is_usable: is_block_node,
        }
    }

    /// Accept any existing path as a node, so fixtures can use plain files
    #[cfg(test)]
    fn accepting_stand_ins(mut self) -> Self {
        fn exists(path: &Path, _device: DeviceNumber) -> bool {
            path.exists()
        }
        self.is_usable = exists;
        self
    }

    fn sysfs_dir(&self, device: DeviceNumber) -> PathBuf {
        self.sysfs_root.join("dev/block").join(device.to_string())
    }

    /// Kernel name of the device (`DEVNAME` in its uevent file)
    pub fn device_name(&self, device: DeviceNumber) -> Option<String> {
        let uevent = fs::read_to_string(self.sysfs_dir(device).join("uevent")).ok()?;
        uevent.lines().find_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == "DEVNAME" && !value.trim().is_empty())
                .then(|| value.trim().to_string())
        })
    }

    /// Device-mapper name, present only for dm devices
    fn mapper_name(&self, device: DeviceNumber) -> Option<String> {
        let name = fs::read_to_string(self.sysfs_dir(device).join("dm/name")).ok()?;
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    /// Conventional node paths for the device, in lookup order
    pub fn candidates(&self, device: DeviceNumber) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let name = self.device_name(device);

        if let Some(mapper) = self.mapper_name(device).or_else(|| name.clone()) {
            paths.push(self.dev_root.join("mapper").join(mapper));
        }
        if let Some(name) = &name {
            paths.push(self.dev_root.join(name));
        }
        paths.push(self.dev_root.join("block").join(device.to_string()));
        if let Some(name) = &name {
            paths.extend(links_to(&self.dev_root.join("disk/by-uuid"), name));
            paths.extend(links_to(&self.dev_root.join("disk/by-label"), name));
            paths.push(self.scratch_dir.join(name));
        }

        paths
    }

    /// Deterministic fallback node path keyed by `major_minor`
    pub fn scratch_path(&self, device: DeviceNumber) -> PathBuf {
        self.scratch_dir
            .join(format!("{}_{}", device.major, device.minor))
    }

    fn create_node(&self, path: &Path, device: DeviceNumber) -> Result<()> {
        fs::create_dir_all(&self.scratch_dir)?;
        mknod(
            path,
            SFlag::S_IFBLK,
            Mode::S_IRUSR | Mode::S_IWUSR,
            makedev(u64::from(device.major), u64::from(device.minor)),
        )?;
        Ok(())
    }
}

impl DeviceLocator for SysfsDeviceLocator {
    fn locate(&self, device: DeviceNumber) -> Result<PathBuf> {
        for path in self.candidates(device) {
            if (self.is_usable)(&path, device) {
                debug!("Using device node {} for {}", path.display(), device);
                return Ok(path);
            }
        }

        let scratch = self.scratch_path(device);
        if (self.is_usable)(&scratch, device) {
            return Ok(scratch);
        }

        match self.create_node(&scratch, device) {
            Ok(()) => {
                debug!("Created device node {} for {}", scratch.display(), device);
                Ok(scratch)
            }
            Err(e) => {
                warn!("Failed to create device node {}: {}", scratch.display(), e);
                Err(QuotaError::DeviceNotFound(format!(
                    "no usable node for device {}: {}",
                    device, e
                )))
            }
        }
    }
}

/// A block special file carrying exactly this device number
fn is_block_node(path: &Path, device: DeviceNumber) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.file_type().is_block_device() {
        return false;
    }

    let rdev = meta.rdev();
    major(rdev) == u64::from(device.major) && minor(rdev) == u64::from(device.minor)
}

/// Entries of a `/dev/disk/by-*` directory that resolve to the named device
fn links_to(dir: &Path, name: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut links: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            fs::canonicalize(path)
                .ok()
                .and_then(|target| target.file_name().map(|f| f == name))
                .unwrap_or(false)
        })
        .collect();
    links.sort();
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TempDir;

    fn locator_in(temp: &TempDir) -> SysfsDeviceLocator {
        let config = QuotaConfig {
            sysfs_root: temp.path.join("sys"),
            dev_root: temp.path.join("dev"),
            scratch_dir: temp.path.join("scratch"),
            ..QuotaConfig::default()
        };
        SysfsDeviceLocator::new(&config)
    }

    fn write_uevent(temp: &TempDir, device: &str, body: &str) {
        let dir = temp.path.join("sys/dev/block").join(device);
        fs::create_dir_all(&dir).expect("create sysfs dir");
        fs::write(dir.join("uevent"), body).expect("write uevent");
    }

    #[test]
    fn reads_devname_from_uevent() {
        let temp = TempDir::new("device-name");
        write_uevent(&temp, "7:3", "MAJOR=7\nMINOR=3\nDEVNAME=loop3\nDEVTYPE=disk\n");

        let locator = locator_in(&temp);
        assert_eq!(locator.device_name(DeviceNumber::new(7, 3)), Some("loop3".to_string()));
        assert_eq!(locator.device_name(DeviceNumber::new(7, 4)), None);
    }

    #[test]
    fn tries_templates_in_priority_order() {
        let temp = TempDir::new("device-order");
        write_uevent(&temp, "253:1", "DEVNAME=dm-1\n");
        fs::create_dir_all(temp.path.join("sys/dev/block/253:1/dm")).expect("create dm dir");
        fs::write(temp.path.join("sys/dev/block/253:1/dm/name"), "vg-data\n").expect("dm name");

        let locator = locator_in(&temp);
        let candidates = locator.candidates(DeviceNumber::new(253, 1));
        assert_eq!(candidates[0], temp.path.join("dev/mapper/vg-data"));
        assert_eq!(candidates[1], temp.path.join("dev/dm-1"));
        assert_eq!(candidates[2], temp.path.join("dev/block/253:1"));
        assert_eq!(candidates.last(), Some(&temp.path.join("scratch/dm-1")));
    }

    #[test]
    fn finds_flat_dev_node() {
        let temp = TempDir::new("device-flat");
        write_uevent(&temp, "8:17", "DEVNAME=sdb1\n");
        fs::create_dir_all(temp.path.join("dev")).expect("create dev");
        fs::write(temp.path.join("dev/sdb1"), b"").expect("create node stand-in");

        let located = locator_in(&temp)
            .accepting_stand_ins()
            .locate(DeviceNumber::new(8, 17))
            .expect("locate");
        assert_eq!(located, temp.path.join("dev/sdb1"));
    }

    #[test]
    fn follows_by_uuid_links() {
        let temp = TempDir::new("device-uuid");
        write_uevent(&temp, "259:2", "DEVNAME=nvme0n1p2\n");
        let hidden = temp.path.join("hidden");
        fs::create_dir_all(&hidden).expect("create hidden");
        fs::write(hidden.join("nvme0n1p2"), b"").expect("create target");
        let by_uuid = temp.path.join("dev/disk/by-uuid");
        fs::create_dir_all(&by_uuid).expect("create by-uuid");
        std::os::unix::fs::symlink(hidden.join("nvme0n1p2"), by_uuid.join("1234-abcd"))
            .expect("symlink");

        let located = locator_in(&temp)
            .accepting_stand_ins()
            .locate(DeviceNumber::new(259, 2))
            .expect("locate");
        assert_eq!(located, by_uuid.join("1234-abcd"));
    }

    #[test]
    fn reuses_existing_scratch_node() {
        let temp = TempDir::new("device-scratch");
        let locator = locator_in(&temp).accepting_stand_ins();
        let device = DeviceNumber::new(7, 9);
        fs::create_dir_all(temp.path.join("scratch")).expect("create scratch");
        fs::write(locator.scratch_path(device), b"").expect("create scratch node");

        assert_eq!(locator.locate(device).expect("locate"), temp.path.join("scratch/7_9"));
    }

    #[test]
    fn regular_files_are_not_device_nodes() {
        let temp = TempDir::new("device-regular");
        let stray = temp.path.join("sdb1");
        fs::write(&stray, b"").expect("create stray file");

        assert!(!is_block_node(&stray, DeviceNumber::new(8, 17)));
        assert!(!is_block_node(&temp.path, DeviceNumber::new(8, 17)));
        assert!(!is_block_node(&temp.path.join("absent"), DeviceNumber::new(8, 17)));
    }

    #[test]
    fn failed_node_creation_is_device_not_found() {
        let temp = TempDir::new("device-create");
        write_uevent(&temp, "8:17", "DEVNAME=sdb1\n");
        // A stray regular file where the node would be found is skipped
        fs::create_dir_all(temp.path.join("dev")).expect("create dev");
        fs::write(temp.path.join("dev/sdb1"), b"").expect("create stray file");
        // The scratch directory cannot be created beneath a regular file
        let blocker = temp.path.join("blocker");
        fs::write(&blocker, b"").expect("create blocker");

        let config = QuotaConfig {
            sysfs_root: temp.path.join("sys"),
            dev_root: temp.path.join("dev"),
            scratch_dir: blocker.join("scratch"),
            ..QuotaConfig::default()
        };
        let err = SysfsDeviceLocator::new(&config)
            .locate(DeviceNumber::new(8, 17))
            .expect_err("no node can be made");
        assert!(matches!(err, QuotaError::DeviceNotFound(_)));
    }
}
