// SPDX-License-Identifier: GPL-3.0-only

//! Normalization between native quota records and `QuotaRecord`
//!
//! Canonical block values are KiB. The generic interface already reports
//! limits in KiB and usage in bytes; XFS reports everything in 512-byte
//! basic blocks, halved on read and doubled on write. A zero limit means
//! "unset" and is written as a literal zero.

use quota_types::{QuotaKind, QuotaLimits, QuotaRecord};

use crate::quotactl::{
    xfs_kind_flag, FsDiskQuota, IfNextDqblk, RawQuota, FS_DQUOT_VERSION, FS_DQ_LIMIT_MASK,
    QIF_LIMITS,
};

const BASIC_BLOCKS_PER_KIB: u64 = 2;
const BYTES_PER_KIB: u64 = 1024;

/// Size of the info header in front of the flat quota file record array
pub const DISK_HEADER_SIZE: usize = 24;
/// Size of one flat quota file record
pub const DISK_RECORD_SIZE: usize = 48;

impl RawQuota {
    /// Decode into a canonical record. `id` is used when the native record
    /// does not carry its own identity (plain `Q_GETQUOTA`).
    pub fn decode(&self, kind: QuotaKind, id: u32) -> QuotaRecord {
        match self {
            RawQuota::Generic(dq) => decode_generic(dq, kind, id),
            RawQuota::Xfs(dq) => decode_xfs(dq, kind, id),
        }
    }

    /// Identity reported by a get-next response
    pub fn next_identity(&self) -> u32 {
        match self {
            RawQuota::Generic(dq) => dq.dqb_id,
            RawQuota::Xfs(dq) => dq.d_id,
        }
    }

    /// Encode `limits` for a set-limits call, in the dialect of `self`
    pub fn encode_limits(&mut self, kind: QuotaKind, id: u32, limits: &QuotaLimits) {
        match self {
            RawQuota::Generic(dq) => *dq = encode_generic(limits),
            RawQuota::Xfs(dq) => *dq = encode_xfs(kind, id, limits),
        }
    }
}

fn decode_generic(dq: &IfNextDqblk, kind: QuotaKind, id: u32) -> QuotaRecord {
    QuotaRecord {
        identity: id,
        kind,
        block_hard_limit: dq.dqb_bhardlimit,
        block_soft_limit: dq.dqb_bsoftlimit,
        block_used: dq.dqb_curspace / BYTES_PER_KIB,
        inode_hard_limit: dq.dqb_ihardlimit,
        inode_soft_limit: dq.dqb_isoftlimit,
        inode_used: dq.dqb_curinodes,
        block_grace_expiry: dq.dqb_btime,
        inode_grace_expiry: dq.dqb_itime,
    }
}

fn encode_generic(limits: &QuotaLimits) -> IfNextDqblk {
    IfNextDqblk {
        dqb_bhardlimit: limits.block_hard,
        dqb_bsoftlimit: limits.block_soft,
        dqb_ihardlimit: limits.inode_hard,
        dqb_isoftlimit: limits.inode_soft,
        dqb_valid: QIF_LIMITS,
        ..IfNextDqblk::default()
    }
}

fn decode_xfs(dq: &FsDiskQuota, kind: QuotaKind, id: u32) -> QuotaRecord {
    QuotaRecord {
        identity: if dq.d_id != 0 { dq.d_id } else { id },
        kind,
        block_hard_limit: dq.d_blk_hardlimit / BASIC_BLOCKS_PER_KIB,
        block_soft_limit: dq.d_blk_softlimit / BASIC_BLOCKS_PER_KIB,
        block_used: dq.d_bcount / BASIC_BLOCKS_PER_KIB,
        inode_hard_limit: dq.d_ino_hardlimit,
        inode_soft_limit: dq.d_ino_softlimit,
        inode_used: dq.d_icount,
        block_grace_expiry: xfs_timer(dq.d_btimer, dq.d_btimer_hi),
        inode_grace_expiry: xfs_timer(dq.d_itimer, dq.d_itimer_hi),
    }
}

fn encode_xfs(kind: QuotaKind, id: u32, limits: &QuotaLimits) -> FsDiskQuota {
    FsDiskQuota {
        d_version: FS_DQUOT_VERSION,
        d_flags: xfs_kind_flag(kind),
        d_fieldmask: FS_DQ_LIMIT_MASK,
        d_id: id,
        d_blk_hardlimit: kib_to_basic_blocks(limits.block_hard),
        d_blk_softlimit: kib_to_basic_blocks(limits.block_soft),
        d_ino_hardlimit: limits.inode_hard,
        d_ino_softlimit: limits.inode_soft,
        ..FsDiskQuota::default()
    }
}

fn kib_to_basic_blocks(kib: u64) -> u64 {
    if kib == 0 {
        return 0;
    }
    kib.saturating_mul(BASIC_BLOCKS_PER_KIB)
}

/// Timers are 32-bit seconds with 8 extra high bits for dates past 2038
fn xfs_timer(low: i32, high: i8) -> u64 {
    (u64::from(high as u8) << 32) | u64::from(low as u32)
}

/// Decode one record of a flat quota file
///
/// Layout (little endian): `id, ihard, isoft, curinodes, bhard, bsoft` as
/// u32, then `curspace` (bytes), `btime`, `itime` as u64.
pub fn decode_disk_record(bytes: &[u8; DISK_RECORD_SIZE], kind: QuotaKind) -> QuotaRecord {
    let u32_at = |offset: usize| {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    };
    let u64_at = |offset: usize| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[offset..offset + 8]);
        u64::from_le_bytes(buf)
    };

    QuotaRecord {
        identity: u32_at(0),
        kind,
        inode_hard_limit: u64::from(u32_at(4)),
        inode_soft_limit: u64::from(u32_at(8)),
        inode_used: u64::from(u32_at(12)),
        block_hard_limit: u64::from(u32_at(16)),
        block_soft_limit: u64::from(u32_at(20)),
        block_used: u64_at(24) / BYTES_PER_KIB,
        block_grace_expiry: u64_at(32),
        inode_grace_expiry: u64_at(40),
    }
}
