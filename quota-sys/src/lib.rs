// SPDX-License-Identifier: GPL-3.0-only

//! Disk quota management for ext4 and XFS
//!
//! This crate provides direct system call interfaces for quota work:
//! - Resolving a path to its mount and a usable block device node
//! - The `quotactl` primitive and its per-family record layouts
//! - Enumerating every configured identity through the best available source
//! - Project identity attributes on files and directories
//!
//! Setting limits and project ids requires `CAP_SYS_ADMIN`.

pub mod codec;
pub mod config;
pub mod device;
pub mod enumerate;
pub mod error;
pub mod facade;
pub mod mounts;
pub mod project;
pub mod quotactl;

#[cfg(test)]
mod test_support;

pub use config::{QuotaConfig, CONFIG_ENV};
pub use device::{DeviceLocator, SysfsDeviceLocator};
pub use enumerate::EnumerationStrategy;
pub use error::{QuotaError, Result};
pub use facade::{
    default_manager, detect_filesystem, get_quota, list_quotas, remove_quota, set_quota, test_quota,
    QuotaManager,
};
pub use mounts::MountResolver;
pub use project::{clear_project_id, get_project_id, set_project_id};
pub use quotactl::{KernelRelease, LinuxQuotaControl, QuotaCommand, QuotaControl, RawQuota};

// Re-export shared models
pub use quota_types::*;
