// SPDX-License-Identifier: GPL-3.0-only

//! Project identity of files and directories
//!
//! Project quotas charge usage to the project id stored in an inode's
//! extended attributes. Both ext4 and XFS expose it through the
//! `FS_IOC_FSGETXATTR`/`FS_IOC_FSSETXATTR` ioctls.

use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::errno::Errno;
use tracing::info;

use crate::error::{QuotaError, Result};

// linux/fs.h: _IOR('X', 31, struct fsxattr) and _IOW('X', 32, struct fsxattr)
const FS_IOC_FSGETXATTR: libc::c_ulong = 0x801c_581f;
const FS_IOC_FSSETXATTR: libc::c_ulong = 0x401c_5820;

/// New children inherit the directory's project id
pub const FS_XFLAG_PROJINHERIT: u32 = 0x0000_0200;

/// `struct fsxattr`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsXattr {
    pub fsx_xflags: u32,
    pub fsx_extsize: u32,
    pub fsx_nextents: u32,
    pub fsx_projid: u32,
    pub fsx_cowextsize: u32,
    pub fsx_pad: [u8; 8],
}

impl FsXattr {
    fn with_project(mut self, id: u32) -> Self {
        self.fsx_projid = id;
        self.fsx_xflags |= FS_XFLAG_PROJINHERIT;
        self
    }

    fn without_project(mut self) -> Self {
        self.fsx_projid = 0;
        self.fsx_xflags &= !FS_XFLAG_PROJINHERIT;
        self
    }
}

fn read_xattr(file: &File) -> Result<FsXattr> {
    let mut attr = FsXattr::default();
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_FSGETXATTR, &mut attr) };
    if ret < 0 {
        return Err(QuotaError::Platform(Errno::last()));
    }
    Ok(attr)
}

fn write_xattr(file: &File, attr: &FsXattr) -> Result<()> {
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_FSSETXATTR, attr) };
    if ret < 0 {
        return Err(QuotaError::Platform(Errno::last()));
    }
    Ok(())
}

fn open(path: &Path) -> Result<File> {
    if path.as_os_str().is_empty() {
        return Err(QuotaError::InvalidArgument("empty path".to_string()));
    }
    Ok(File::open(path)?)
}

pub fn get_project_id(path: &Path) -> Result<u32> {
    let file = open(path)?;
    Ok(read_xattr(&file)?.fsx_projid)
}

/// Assign project `id` to `path` and mark it so new children inherit it
pub fn set_project_id(path: &Path, id: u32) -> Result<()> {
    let file = open(path)?;
    let attr = read_xattr(&file)?.with_project(id);
    write_xattr(&file, &attr)?;
    info!("Set project id {} on {}", id, path.display());
    Ok(())
}

pub fn clear_project_id(path: &Path) -> Result<()> {
    let file = open(path)?;
    let attr = read_xattr(&file)?.without_project();
    write_xattr(&file, &attr)?;
    info!("Cleared project id on {}", path.display());
    Ok(())
}
