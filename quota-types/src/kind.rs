// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Which identity space a quota applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaKind {
    User,
    Group,
    #[default]
    Project,
}

impl QuotaKind {
    /// Kernel quota type (`USRQUOTA`, `GRPQUOTA`, `PRJQUOTA`)
    pub fn as_raw(self) -> i32 {
        match self {
            QuotaKind::User => 0,
            QuotaKind::Group => 1,
            QuotaKind::Project => 2,
        }
    }

    /// Directory name used for this kind under the procfs quota tree
    pub fn procfs_name(self) -> &'static str {
        match self {
            QuotaKind::User => "usrquota",
            QuotaKind::Group => "grpquota",
            QuotaKind::Project => "prjquota",
        }
    }

    /// Conventional quota file name beneath a mount point
    pub fn quota_file_name(self) -> &'static str {
        match self {
            QuotaKind::User => "aquota.user",
            QuotaKind::Group => "aquota.group",
            QuotaKind::Project => "aquota.project",
        }
    }
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaKind::User => write!(f, "user"),
            QuotaKind::Group => write!(f, "group"),
            QuotaKind::Project => write!(f, "project"),
        }
    }
}

impl std::str::FromStr for QuotaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "usr" | "u" => Ok(QuotaKind::User),
            "group" | "grp" | "g" => Ok(QuotaKind::Group),
            "project" | "proj" | "prj" | "p" => Ok(QuotaKind::Project),
            _ => Err(format!(
                "Invalid quota type: {} (must be user, group, or project)",
                s
            )),
        }
    }
}

/// Filesystem families with quota support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsFamily {
    /// Generic quota interface, block limits already in 1 KiB units
    Ext4,
    /// XFS quota interface, block counts in 512-byte basic blocks
    Xfs,
    Other,
}

impl FsFamily {
    /// Map a mount table filesystem type to a family
    pub fn from_fs_type(fs_type: &str) -> Self {
        match fs_type {
            "ext4" => FsFamily::Ext4,
            "xfs" => FsFamily::Xfs,
            _ => FsFamily::Other,
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, FsFamily::Other)
    }
}

impl std::fmt::Display for FsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FsFamily::Ext4 => write!(f, "ext4"),
            FsFamily::Xfs => write!(f, "xfs"),
            FsFamily::Other => write!(f, "other"),
        }
    }
}
