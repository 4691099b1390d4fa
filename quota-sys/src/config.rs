// SPDX-License-Identifier: GPL-3.0-only

//! Locations of kernel-exposed tables and scan tunables
//!
//! Every external path is configurable so fixtures can stand in for
//! `/proc`, `/sys` and `/dev`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{QuotaError, Result};

/// Environment variable naming a TOML configuration file
pub const CONFIG_ENV: &str = "QUOTA_SYS_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Mount table to resolve paths against; mountinfo or mounts format
    pub mount_table: PathBuf,
    pub sysfs_root: PathBuf,
    pub dev_root: PathBuf,
    /// Private directory for synthesized device nodes
    pub scratch_dir: PathBuf,
    pub procfs_quota_root: PathBuf,
    /// Upper identity bound for scans when the caller gives none
    pub default_max_identity: u32,
    /// Hard ceiling on records collected by the next-identity loop
    pub max_records: usize,
    /// Consecutive query failures that end an adaptive scan
    pub failure_threshold: u32,
    /// List ext4 quotas from the quota file and procfs before asking the kernel
    pub ext4_bypass_kernel: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            mount_table: PathBuf::from("/proc/self/mountinfo"),
            sysfs_root: PathBuf::from("/sys"),
            dev_root: PathBuf::from("/dev"),
            scratch_dir: PathBuf::from("/run/quota-sys/dev"),
            procfs_quota_root: PathBuf::from("/proc/fs/quota"),
            default_max_identity: 65536,
            max_records: 1 << 20,
            failure_threshold: 1000,
            ext4_bypass_kernel: false,
        }
    }
}

impl QuotaConfig {
    /// Load a TOML configuration file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw)
            .map_err(|e| QuotaError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Configuration named by `QUOTA_SYS_CONFIG`, or defaults when unset
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                tracing::debug!("Loading quota configuration from {:?}", path);
                Self::load(Path::new(&path))
            }
            None => Ok(Self::default()),
        }
    }
}
