// SPDX-License-Identifier: GPL-3.0-only

//! Fixtures shared by the unit tests

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use nix::errno::Errno;
use quota_types::{DeviceBinding, DeviceNumber, FsFamily, QuotaKind, QuotaLimits, QuotaRecord};

use crate::codec::DISK_RECORD_SIZE;
use crate::device::DeviceLocator;
use crate::error::Result;
use crate::quotactl::{QuotaCommand, QuotaControl, RawQuota};

static COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct TempDir {
    pub path: PathBuf,
}

impl TempDir {
    pub fn new(label: &str) -> Self {
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "quota-sys-{label}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("create temp dir");
        Self { path }
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Locator that answers every device with the same node
pub struct StaticLocator {
    node: PathBuf,
}

impl StaticLocator {
    pub fn new(node: impl Into<PathBuf>) -> Self {
        Self { node: node.into() }
    }
}

impl DeviceLocator for StaticLocator {
    fn locate(&self, _device: DeviceNumber) -> Result<PathBuf> {
        Ok(self.node.clone())
    }
}

pub fn fixture_binding(family: FsFamily, mount_point: impl Into<PathBuf>) -> DeviceBinding {
    DeviceBinding {
        mount_point: mount_point.into(),
        fs_type: family,
        device_major: 7,
        device_minor: 0,
        resolved_node_path: PathBuf::from("/dev/loop0"),
    }
}

/// Flat quota file record for `record`, the inverse of `decode_disk_record`
pub fn encode_disk_record(record: &QuotaRecord) -> [u8; DISK_RECORD_SIZE] {
    let mut out = [0u8; DISK_RECORD_SIZE];
    let narrow = |value: u64| u32::try_from(value).unwrap_or(u32::MAX);

    out[0..4].copy_from_slice(&record.identity.to_le_bytes());
    out[4..8].copy_from_slice(&narrow(record.inode_hard_limit).to_le_bytes());
    out[8..12].copy_from_slice(&narrow(record.inode_soft_limit).to_le_bytes());
    out[12..16].copy_from_slice(&narrow(record.inode_used).to_le_bytes());
    out[16..20].copy_from_slice(&narrow(record.block_hard_limit).to_le_bytes());
    out[20..24].copy_from_slice(&narrow(record.block_soft_limit).to_le_bytes());
    out[24..32].copy_from_slice(&(record.block_used * 1024).to_le_bytes());
    out[32..40].copy_from_slice(&record.block_grace_expiry.to_le_bytes());
    out[40..48].copy_from_slice(&record.inode_grace_expiry.to_le_bytes());
    out
}

/// Quota file with a zeroed info header and one record per entry
pub fn write_quota_file(path: &Path, records: &[QuotaRecord]) {
    let mut bytes = vec![0u8; crate::codec::DISK_HEADER_SIZE];
    for record in records {
        bytes.extend_from_slice(&encode_disk_record(record));
    }
    fs::write(path, bytes).expect("write quota file");
}

#[derive(Clone, Copy)]
enum Failure {
    At(u32),
    From(u32),
}

impl Failure {
    fn hits(self, id: u32) -> bool {
        match self {
            Failure::At(at) => id == at,
            Failure::From(from) => id >= from,
        }
    }
}

/// In-memory quota table speaking the native record dialect of one family
pub struct FakeQuotaControl {
    family: FsFamily,
    next_supported: bool,
    absent_as_enoent: bool,
    table: RefCell<BTreeMap<(u8, u32), RawQuota>>,
    failures: RefCell<Vec<(QuotaKind, Failure, Errno)>>,
    calls: Cell<usize>,
}

impl FakeQuotaControl {
    pub fn new(family: FsFamily) -> Self {
        Self {
            family,
            next_supported: true,
            absent_as_enoent: false,
            table: RefCell::new(BTreeMap::new()),
            failures: RefCell::new(Vec::new()),
            calls: Cell::new(0),
        }
    }

    /// Reject get-next requests the way pre-4.6 kernels do
    pub fn without_next(mut self) -> Self {
        self.next_supported = false;
        self
    }

    /// Answer plain gets of unknown identities with `ENOENT`, as XFS does
    pub fn absent_as_enoent(mut self) -> Self {
        self.absent_as_enoent = true;
        self
    }

    pub fn insert_limits(&self, kind: QuotaKind, id: u32, limits: QuotaLimits) {
        let mut raw = RawQuota::empty_for(self.family);
        raw.encode_limits(kind, id, &limits);
        self.store(kind, id, raw);
    }

    pub fn insert_usage_only(&self, kind: QuotaKind, id: u32, block_kib: u64) {
        let mut raw = RawQuota::empty_for(self.family);
        match &mut raw {
            RawQuota::Generic(dq) => dq.dqb_curspace = block_kib * 1024,
            RawQuota::Xfs(dq) => {
                dq.d_id = id;
                dq.d_bcount = block_kib * 2;
            }
        }
        self.store(kind, id, raw);
    }

    /// Fail reads of exactly `id`
    pub fn fail_at(&self, kind: QuotaKind, id: u32, errno: Errno) {
        self.failures.borrow_mut().push((kind, Failure::At(id), errno));
    }

    /// Fail reads of every id from `id` upward
    pub fn fail_from(&self, kind: QuotaKind, id: u32, errno: Errno) {
        self.failures.borrow_mut().push((kind, Failure::From(id), errno));
    }

    /// Number of quota-control calls made so far
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    fn store(&self, kind: QuotaKind, id: u32, raw: RawQuota) {
        self.table.borrow_mut().insert((kind.as_raw() as u8, id), raw);
    }

    fn failure_for(&self, kind: QuotaKind, id: u32) -> Option<Errno> {
        self.failures
            .borrow()
            .iter()
            .find(|(failed_kind, failure, _)| *failed_kind == kind && failure.hits(id))
            .map(|(_, _, errno)| *errno)
    }

    fn is_present(raw: &RawQuota, kind: QuotaKind, id: u32) -> bool {
        let record = raw.decode(kind, id);
        record.is_configured() || record.has_usage()
    }
}

impl QuotaControl for FakeQuotaControl {
    fn quotactl(
        &self,
        command: QuotaCommand,
        kind: QuotaKind,
        _device: &Path,
        id: u32,
        record: &mut RawQuota,
    ) -> std::result::Result<(), Errno> {
        self.calls.set(self.calls.get() + 1);
        let key = kind.as_raw() as u8;

        match command {
            QuotaCommand::SetLimits => {
                self.store(kind, id, *record);
                Ok(())
            }
            QuotaCommand::Get => {
                if let Some(errno) = self.failure_for(kind, id) {
                    return Err(errno);
                }
                *record = match self.table.borrow().get(&(key, id)) {
                    Some(raw) => *raw,
                    None if self.absent_as_enoent => return Err(Errno::ENOENT),
                    None => RawQuota::empty_for(self.family),
                };
                Ok(())
            }
            QuotaCommand::GetNext => {
                if !self.next_supported {
                    return Err(Errno::EINVAL);
                }
                if let Some(errno) = self.failure_for(kind, id) {
                    return Err(errno);
                }
                let table = self.table.borrow();
                let (found, raw) = table
                    .range((key, id)..=(key, u32::MAX))
                    .find(|((_, found), raw)| Self::is_present(raw, kind, *found))
                    .map(|((_, found), raw)| (*found, *raw))
                    .ok_or(Errno::ENOENT)?;

                let mut raw = raw;
                match &mut raw {
                    RawQuota::Generic(dq) => dq.dqb_id = found,
                    RawQuota::Xfs(dq) => dq.d_id = found,
                }
                *record = raw;
                Ok(())
            }
        }
    }
}
