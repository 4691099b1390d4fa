// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::kind::FsFamily;

/// Block device major:minor pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceNumber {
    pub major: u32,
    pub minor: u32,
}

impl DeviceNumber {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse the `major:minor` form used by mountinfo and sysfs
    pub fn parse(value: &str) -> Option<Self> {
        let (major, minor) = value.split_once(':')?;
        Some(Self {
            major: major.trim().parse().ok()?,
            minor: minor.trim().parse().ok()?,
        })
    }
}

impl std::fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// One parsed mount table line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    /// Mount source as written in the table (e.g. `/dev/sda1`)
    pub device_field: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
    /// Only known up front for mountinfo-style tables
    pub device: Option<DeviceNumber>,
}

impl MountEntry {
    pub fn family(&self) -> FsFamily {
        FsFamily::from_fs_type(&self.fs_type)
    }
}

/// A path resolved to its mount and a usable device node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub mount_point: PathBuf,
    pub fs_type: FsFamily,
    pub device_major: u32,
    pub device_minor: u32,
    pub resolved_node_path: PathBuf,
}

impl DeviceBinding {
    pub fn device(&self) -> DeviceNumber {
        DeviceNumber::new(self.device_major, self.device_minor)
    }
}
