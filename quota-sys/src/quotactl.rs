// SPDX-License-Identifier: GPL-3.0-only

//! Binding to the `quotactl(2)` primitive
//!
//! The two filesystem families speak different dialects of the same call:
//! ext4 uses the generic `Q_GETQUOTA`/`Q_SETQUOTA` commands with an
//! `if_dqblk` record, XFS uses the `Q_X*` commands with `fs_disk_quota`.
//! Both have a "get next configured identity" variant.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::Errno;
use quota_types::{FsFamily, QuotaKind};

// linux/quota.h
const SUBCMDSHIFT: i32 = 8;
const SUBCMDMASK: i32 = 0x00ff;
const Q_GETQUOTA: i32 = 0x800007;
const Q_SETQUOTA: i32 = 0x800008;
const Q_GETNEXTQUOTA: i32 = 0x800009;

// linux/dqblk_xfs.h: XQM_CMD(x) = ('X' << 8) + x
const Q_XGETQUOTA: i32 = (('X' as i32) << 8) + 3;
const Q_XSETQLIM: i32 = (('X' as i32) << 8) + 4;
const Q_XGETNEXTQUOTA: i32 = (('X' as i32) << 8) + 9;

pub const QIF_BLIMITS: u32 = 1;
pub const QIF_ILIMITS: u32 = 4;
pub const QIF_LIMITS: u32 = QIF_BLIMITS | QIF_ILIMITS;

pub const FS_DQUOT_VERSION: i8 = 1;
pub const FS_USER_QUOTA: i8 = 1;
pub const FS_PROJ_QUOTA: i8 = 2;
pub const FS_GROUP_QUOTA: i8 = 4;
pub const FS_DQ_ISOFT: u16 = 1 << 0;
pub const FS_DQ_IHARD: u16 = 1 << 1;
pub const FS_DQ_BSOFT: u16 = 1 << 2;
pub const FS_DQ_BHARD: u16 = 1 << 3;
pub const FS_DQ_LIMIT_MASK: u16 = FS_DQ_ISOFT | FS_DQ_IHARD | FS_DQ_BSOFT | FS_DQ_BHARD;

/// Generic quota record (`struct if_nextdqblk`, a superset of `if_dqblk`)
///
/// Block limits are in 1 KiB units, `dqb_curspace` in bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IfNextDqblk {
    pub dqb_bhardlimit: u64,
    pub dqb_bsoftlimit: u64,
    pub dqb_curspace: u64,
    pub dqb_ihardlimit: u64,
    pub dqb_isoftlimit: u64,
    pub dqb_curinodes: u64,
    pub dqb_btime: u64,
    pub dqb_itime: u64,
    pub dqb_valid: u32,
    pub dqb_id: u32,
}

/// XFS quota record (`struct fs_disk_quota`); block counts in 512-byte units
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsDiskQuota {
    pub d_version: i8,
    pub d_flags: i8,
    pub d_fieldmask: u16,
    pub d_id: u32,
    pub d_blk_hardlimit: u64,
    pub d_blk_softlimit: u64,
    pub d_ino_hardlimit: u64,
    pub d_ino_softlimit: u64,
    pub d_bcount: u64,
    pub d_icount: u64,
    pub d_itimer: i32,
    pub d_btimer: i32,
    pub d_iwarns: u16,
    pub d_bwarns: u16,
    pub d_itimer_hi: i8,
    pub d_btimer_hi: i8,
    pub d_rtbtimer_hi: i8,
    pub d_padding2: i8,
    pub d_rtb_hardlimit: u64,
    pub d_rtb_softlimit: u64,
    pub d_rtbcount: u64,
    pub d_rtbtimer: i32,
    pub d_rtbwarns: u16,
    pub d_padding3: i16,
    pub d_padding4: [i8; 8],
}

/// XFS `d_flags` value for a quota kind
pub fn xfs_kind_flag(kind: QuotaKind) -> i8 {
    match kind {
        QuotaKind::User => FS_USER_QUOTA,
        QuotaKind::Group => FS_GROUP_QUOTA,
        QuotaKind::Project => FS_PROJ_QUOTA,
    }
}

/// The fixed-size in/out buffer of a quota-control call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawQuota {
    Generic(IfNextDqblk),
    Xfs(FsDiskQuota),
}

impl RawQuota {
    /// A zeroed buffer in the dialect `family` speaks
    pub fn empty_for(family: FsFamily) -> Self {
        match family {
            FsFamily::Xfs => RawQuota::Xfs(FsDiskQuota::default()),
            _ => RawQuota::Generic(IfNextDqblk::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCommand {
    Get,
    GetNext,
    SetLimits,
}

impl QuotaCommand {
    /// Full `QCMD(cmd, type)` value for this command in the dialect of `raw`
    pub fn code(self, raw: &RawQuota, kind: QuotaKind) -> i32 {
        let cmd = match (self, raw) {
            (QuotaCommand::Get, RawQuota::Generic(_)) => Q_GETQUOTA,
            (QuotaCommand::GetNext, RawQuota::Generic(_)) => Q_GETNEXTQUOTA,
            (QuotaCommand::SetLimits, RawQuota::Generic(_)) => Q_SETQUOTA,
            (QuotaCommand::Get, RawQuota::Xfs(_)) => Q_XGETQUOTA,
            (QuotaCommand::GetNext, RawQuota::Xfs(_)) => Q_XGETNEXTQUOTA,
            (QuotaCommand::SetLimits, RawQuota::Xfs(_)) => Q_XSETQLIM,
        };
        qcmd(cmd, kind.as_raw())
    }
}

fn qcmd(cmd: i32, kind: i32) -> i32 {
    (cmd << SUBCMDSHIFT) | (kind & SUBCMDMASK)
}

/// The quota-control primitive: `(command, kind, device, id)` against a
/// fixed-size record that is read, written, or both
pub trait QuotaControl {
    fn quotactl(
        &self,
        command: QuotaCommand,
        kind: QuotaKind,
        device: &Path,
        id: u32,
        record: &mut RawQuota,
    ) -> Result<(), Errno>;
}

/// The real system call
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxQuotaControl;

impl QuotaControl for LinuxQuotaControl {
    fn quotactl(
        &self,
        command: QuotaCommand,
        kind: QuotaKind,
        device: &Path,
        id: u32,
        record: &mut RawQuota,
    ) -> Result<(), Errno> {
        let special = CString::new(device.as_os_str().as_bytes()).map_err(|_| Errno::EINVAL)?;
        let cmd = command.code(record, kind);
        let data: *mut libc::c_char = match record {
            RawQuota::Generic(dq) => (dq as *mut IfNextDqblk).cast(),
            RawQuota::Xfs(dq) => (dq as *mut FsDiskQuota).cast(),
        };

        let ret = unsafe { libc::quotactl(cmd, special.as_ptr(), id as libc::c_int, data) };
        Errno::result(ret).map(drop)
    }
}

/// Kernel release as `major.minor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KernelRelease {
    pub major: u32,
    pub minor: u32,
}

impl KernelRelease {
    /// Parse a `uname -r` string such as `6.8.0-45-generic`
    pub fn parse(release: &str) -> Option<Self> {
        let mut parts = release.split(|c: char| !c.is_ascii_digit());
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some(Self { major, minor })
    }

    pub fn current() -> Option<Self> {
        let uts = nix::sys::utsname::uname().ok()?;
        Self::parse(&uts.release().to_string_lossy())
    }

    /// `Q_GETNEXTQUOTA` appeared in 4.6
    pub fn has_next_quota(self) -> bool {
        self.major > 4 || (self.major == 4 && self.minor >= 6)
    }
}
