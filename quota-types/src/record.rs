// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

use crate::kind::QuotaKind;

/// Identity reserved by every quota source; never a real entry
pub const RESERVED_ID: u32 = 0;

/// All-ones sentinel used by quota files and the kernel as "no identity"
pub const SENTINEL_ID: u32 = u32::MAX;

/// Quota limits and usage for one identity
///
/// Block fields are always in KiB (1024-byte units) regardless of the
/// native unit of the filesystem they came from. Grace expiries are epoch
/// seconds, 0 when no timer is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub identity: u32,
    pub kind: QuotaKind,
    pub block_hard_limit: u64,
    pub block_soft_limit: u64,
    pub block_used: u64,
    pub inode_hard_limit: u64,
    pub inode_soft_limit: u64,
    pub inode_used: u64,
    pub block_grace_expiry: u64,
    pub inode_grace_expiry: u64,
}

impl QuotaRecord {
    /// An empty record for `identity`
    pub fn empty(identity: u32, kind: QuotaKind) -> Self {
        Self {
            identity,
            kind,
            block_hard_limit: 0,
            block_soft_limit: 0,
            block_used: 0,
            inode_hard_limit: 0,
            inode_soft_limit: 0,
            inode_used: 0,
            block_grace_expiry: 0,
            inode_grace_expiry: 0,
        }
    }

    /// True when at least one of the four limits is set
    pub fn is_configured(&self) -> bool {
        self.block_hard_limit > 0
            || self.block_soft_limit > 0
            || self.inode_hard_limit > 0
            || self.inode_soft_limit > 0
    }

    /// True when the identity carries any usage
    pub fn has_usage(&self) -> bool {
        self.block_used > 0 || self.inode_used > 0
    }

    /// The reserved id 0 and the all-ones sentinel never name real entries
    pub fn has_valid_identity(&self) -> bool {
        is_valid_identity(self.identity)
    }
}

pub fn is_valid_identity(identity: u32) -> bool {
    identity != RESERVED_ID && identity != SENTINEL_ID
}

/// Limits supplied by a caller when setting a quota (blocks in KiB)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub block_hard: u64,
    pub block_soft: u64,
    pub inode_hard: u64,
    pub inode_soft: u64,
}

impl QuotaLimits {
    pub fn new(block_hard: u64, block_soft: u64, inode_hard: u64, inode_soft: u64) -> Self {
        Self {
            block_hard,
            block_soft,
            inode_hard,
            inode_soft,
        }
    }

    /// All limits zeroed; writing this removes the quota
    pub fn cleared() -> Self {
        Self::default()
    }
}

/// Outcome of a quota presence test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaStatus {
    Configured,
    NotConfigured,
}

impl QuotaStatus {
    pub fn is_configured(self) -> bool {
        matches!(self, QuotaStatus::Configured)
    }
}
