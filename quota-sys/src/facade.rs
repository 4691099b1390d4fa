// SPDX-License-Identifier: GPL-3.0-only

//! Per-path quota operations
//!
//! Every operation resolves its path afresh into a [`DeviceBinding`] and
//! threads that binding through the call; nothing about the last resolved
//! device outlives the operation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use nix::sys::statfs::{statfs, EXT4_SUPER_MAGIC, XFS_SUPER_MAGIC};
use quota_types::{
    DeviceBinding, DeviceNumber, FsFamily, QuotaKind, QuotaLimits, QuotaRecord, QuotaStatus,
};
use tracing::{debug, info, warn};

use crate::config::QuotaConfig;
use crate::device::{DeviceLocator, SysfsDeviceLocator};
use crate::enumerate::{self, supports_next_quota, strategy_order, EnumerationStrategy, ScanContext};
use crate::error::{QuotaError, Result};
use crate::mounts::MountResolver;
use crate::quotactl::{KernelRelease, LinuxQuotaControl, QuotaCommand, QuotaControl, RawQuota};

/// Identify the quota family of the filesystem holding `path`
pub fn detect_filesystem(path: &Path) -> Result<FsFamily> {
    let stat = statfs(path)?;
    let magic = stat.filesystem_type();
    if magic == EXT4_SUPER_MAGIC {
        Ok(FsFamily::Ext4)
    } else if magic == XFS_SUPER_MAGIC {
        Ok(FsFamily::Xfs)
    } else {
        Err(QuotaError::Unsupported(format!(
            "{} is on a filesystem without quota support ({:?})",
            path.display(),
            magic
        )))
    }
}

/// Quota operations over one quota-control primitive and device locator
pub struct QuotaManager<C = LinuxQuotaControl, L = SysfsDeviceLocator> {
    config: QuotaConfig,
    resolver: MountResolver,
    control: C,
    locator: L,
    kernel: Option<KernelRelease>,
    next_support: Mutex<HashMap<(DeviceNumber, FsFamily), bool>>,
}

impl QuotaManager {
    /// Manager over the real system call, configured from `QUOTA_SYS_CONFIG`
    pub fn new() -> Result<Self> {
        Ok(Self::with_config(QuotaConfig::from_env()?))
    }

    pub fn with_config(config: QuotaConfig) -> Self {
        let locator = SysfsDeviceLocator::new(&config);
        Self::with_parts(config, LinuxQuotaControl, locator)
    }
}

impl<C: QuotaControl, L: DeviceLocator> QuotaManager<C, L> {
    pub fn with_parts(config: QuotaConfig, control: C, locator: L) -> Self {
        Self {
            resolver: MountResolver::new(&config.mount_table),
            config,
            control,
            locator,
            kernel: KernelRelease::current(),
            next_support: Mutex::new(HashMap::new()),
        }
    }

    /// Override the kernel release used to gate get-next probing
    pub fn with_kernel_release(mut self, kernel: Option<KernelRelease>) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Resolve `path` to its mount and device node
    ///
    /// The filesystem family comes from the mount entry; `statfs` is only
    /// consulted when the entry names neither supported family.
    pub fn resolve(&self, path: &Path) -> Result<DeviceBinding> {
        let mut binding = self.resolver.resolve(path, &self.locator)?;
        if binding.fs_type == FsFamily::Other
            && let Ok(family) = detect_filesystem(&binding.mount_point)
        {
            debug!(
                "Mount table type unrecognized for {}; statfs reports {}",
                binding.mount_point.display(),
                family
            );
            binding.fs_type = family;
        }
        Ok(binding)
    }

    fn resolve_supported(&self, path: &Path) -> Result<DeviceBinding> {
        let binding = self.resolve(path)?;
        if !binding.fs_type.is_supported() {
            return Err(QuotaError::Unsupported(format!(
                "{} is not on an ext4 or xfs filesystem",
                binding.mount_point.display()
            )));
        }
        Ok(binding)
    }

    fn call(
        &self,
        binding: &DeviceBinding,
        command: QuotaCommand,
        kind: QuotaKind,
        id: u32,
        raw: &mut RawQuota,
    ) -> Result<()> {
        self.control
            .quotactl(command, kind, &binding.resolved_node_path, id, raw)
            .map_err(QuotaError::Platform)
    }

    /// Set all four limits of `id`; block limits in KiB
    pub fn set_quota(&self, path: &Path, id: u32, kind: QuotaKind, limits: QuotaLimits) -> Result<()> {
        let binding = self.resolve_supported(path)?;
        let mut raw = RawQuota::empty_for(binding.fs_type);
        raw.encode_limits(kind, id, &limits);
        self.call(&binding, QuotaCommand::SetLimits, kind, id, &mut raw)?;

        info!(
            "Set {} quota for {} on {}: blocks {}/{} KiB, inodes {}/{}",
            kind,
            id,
            binding.mount_point.display(),
            limits.block_soft,
            limits.block_hard,
            limits.inode_soft,
            limits.inode_hard
        );
        Ok(())
    }

    /// Current limits and usage of `id`, configured or not
    pub fn get_quota(&self, path: &Path, id: u32, kind: QuotaKind) -> Result<QuotaRecord> {
        let binding = self.resolve_supported(path)?;
        let mut raw = RawQuota::empty_for(binding.fs_type);
        self.call(&binding, QuotaCommand::Get, kind, id, &mut raw)?;
        Ok(raw.decode(kind, id))
    }

    /// Zero every limit of `id`; removing an absent quota succeeds
    pub fn remove_quota(&self, path: &Path, id: u32, kind: QuotaKind) -> Result<()> {
        let binding = self.resolve_supported(path)?;
        let mut raw = RawQuota::empty_for(binding.fs_type);
        raw.encode_limits(kind, id, &QuotaLimits::cleared());
        self.call(&binding, QuotaCommand::SetLimits, kind, id, &mut raw)?;

        info!(
            "Removed {} quota for {} on {}",
            kind,
            id,
            binding.mount_point.display()
        );
        Ok(())
    }

    pub fn test_quota(&self, path: &Path, id: u32, kind: QuotaKind) -> Result<QuotaStatus> {
        let record = self.get_quota(path, id, kind)?;
        Ok(if record.is_configured() {
            QuotaStatus::Configured
        } else {
            QuotaStatus::NotConfigured
        })
    }

    /// Every configured identity of `kind`, using the best available source
    ///
    /// `max_identity` is an inclusive bound. On a failure after some records
    /// were gathered the error is [`QuotaError::Incomplete`] carrying them.
    pub fn list_quotas(
        &self,
        path: &Path,
        kind: QuotaKind,
        max_identity: Option<u32>,
    ) -> Result<Vec<QuotaRecord>> {
        let binding = self.resolve_supported(path)?;
        let next_supported = self.next_supported(&binding, kind);
        let order = strategy_order(binding.fs_type, next_supported, &self.config);
        let ctx = self.scan_context(&binding, kind, max_identity);

        let mut last_error = None;
        for (index, strategy) in order.iter().enumerate() {
            match enumerate::run(*strategy, &ctx) {
                Ok(records) => {
                    debug!("{} found {} {} record(s)", strategy, records.len(), kind);
                    return Ok(records);
                }
                Err(e) if e.is_source_missing() && index + 1 < order.len() => {
                    warn!("{} unavailable ({}); trying {}", strategy, e, order[index + 1]);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            QuotaError::Unsupported(format!(
                "no enumeration strategy for {}",
                binding.fs_type
            ))
        }))
    }

    /// List with one caller-chosen strategy and no fallback
    pub fn list_quotas_with(
        &self,
        path: &Path,
        kind: QuotaKind,
        max_identity: Option<u32>,
        strategy: EnumerationStrategy,
    ) -> Result<Vec<QuotaRecord>> {
        let binding = self.resolve_supported(path)?;
        let ctx = self.scan_context(&binding, kind, max_identity);
        enumerate::run(strategy, &ctx)
    }

    fn scan_context<'a>(
        &'a self,
        binding: &'a DeviceBinding,
        kind: QuotaKind,
        max_identity: Option<u32>,
    ) -> ScanContext<'a> {
        ScanContext {
            control: &self.control,
            binding,
            kind,
            max_identity,
            config: &self.config,
        }
    }

    /// Whether get-next works on this device, checked once per device
    fn next_supported(&self, binding: &DeviceBinding, kind: QuotaKind) -> bool {
        let key = (binding.device(), binding.fs_type);
        let mut cache = self
            .next_support
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cache
            .entry(key)
            .or_insert_with(|| supports_next_quota(&self.control, binding, kind, self.kernel))
    }
}

/// Process-wide manager behind the free functions
///
/// Configuration is read and the get-next capability checked once per
/// process; later calls reuse both.
pub fn default_manager() -> Result<&'static QuotaManager> {
    static MANAGER: OnceLock<QuotaManager> = OnceLock::new();

    if let Some(manager) = MANAGER.get() {
        return Ok(manager);
    }
    let manager = QuotaManager::new()?;
    Ok(MANAGER.get_or_init(|| manager))
}

/// Set limits using the process-wide manager
pub fn set_quota(path: &Path, id: u32, kind: QuotaKind, limits: QuotaLimits) -> Result<()> {
    default_manager()?.set_quota(path, id, kind, limits)
}

pub fn get_quota(path: &Path, id: u32, kind: QuotaKind) -> Result<QuotaRecord> {
    default_manager()?.get_quota(path, id, kind)
}

pub fn list_quotas(path: &Path, kind: QuotaKind, max_identity: Option<u32>) -> Result<Vec<QuotaRecord>> {
    default_manager()?.list_quotas(path, kind, max_identity)
}

pub fn remove_quota(path: &Path, id: u32, kind: QuotaKind) -> Result<()> {
    default_manager()?.remove_quota(path, id, kind)
}

pub fn test_quota(path: &Path, id: u32, kind: QuotaKind) -> Result<QuotaStatus> {
    default_manager()?.test_quota(path, id, kind)
}
