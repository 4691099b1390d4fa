// SPDX-License-Identifier: GPL-3.0-only

//! Quota record enumeration
//!
//! Four strategies produce the same canonical records at different cost:
//!
//! - [`EnumerationStrategy::DirectNext`] walks configured identities with the
//!   kernel's get-next request, skipping empty id ranges in one call
//! - [`EnumerationStrategy::AdaptiveScan`] samples the id space with a stride
//!   sized to the bound and refines around every hit
//! - [`EnumerationStrategy::OnDiskFile`] reads the ext4 quota file beneath the
//!   mount point as a flat record array
//! - [`EnumerationStrategy::ProcfsTree`] walks the procfs quota tree,
//!   independent of the resolved device

pub mod adaptive;
pub mod direct_next;
pub mod procfs;
pub mod quota_file;

use nix::errno::Errno;
use quota_types::{DeviceBinding, FsFamily, QuotaKind, QuotaRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::QuotaConfig;
use crate::error::{QuotaError, Result};
use crate::quotactl::{KernelRelease, QuotaCommand, QuotaControl, RawQuota};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnumerationStrategy {
    DirectNext,
    AdaptiveScan,
    OnDiskFile,
    ProcfsTree,
}

impl EnumerationStrategy {
    pub const ALL: [EnumerationStrategy; 4] = [
        EnumerationStrategy::DirectNext,
        EnumerationStrategy::AdaptiveScan,
        EnumerationStrategy::OnDiskFile,
        EnumerationStrategy::ProcfsTree,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EnumerationStrategy::DirectNext => "direct-next",
            EnumerationStrategy::AdaptiveScan => "adaptive-scan",
            EnumerationStrategy::OnDiskFile => "on-disk-file",
            EnumerationStrategy::ProcfsTree => "procfs-tree",
        }
    }
}

impl std::fmt::Display for EnumerationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EnumerationStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EnumerationStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Invalid strategy: {}", s))
    }
}

/// Everything one enumeration run needs; borrowed for the run only
pub struct ScanContext<'a> {
    pub control: &'a dyn QuotaControl,
    pub binding: &'a DeviceBinding,
    pub kind: QuotaKind,
    /// Inclusive upper identity bound
    pub max_identity: Option<u32>,
    pub config: &'a QuotaConfig,
}

impl ScanContext<'_> {
    fn call(&self, command: QuotaCommand, id: u32) -> std::result::Result<RawQuota, Errno> {
        let mut raw = RawQuota::empty_for(self.binding.fs_type);
        self.control.quotactl(
            command,
            self.kind,
            &self.binding.resolved_node_path,
            id,
            &mut raw,
        )?;
        Ok(raw)
    }

    /// Plain get for one identity, decoded
    pub fn get(&self, id: u32) -> std::result::Result<QuotaRecord, Errno> {
        self.call(QuotaCommand::Get, id)
            .map(|raw| raw.decode(self.kind, id))
    }

    /// Get-next at or above `id`, decoded with the identity it reports
    pub fn get_next(&self, id: u32) -> std::result::Result<QuotaRecord, Errno> {
        self.call(QuotaCommand::GetNext, id).map(|raw| {
            let identity = raw.next_identity();
            raw.decode(self.kind, identity)
        })
    }
}

/// Run a single strategy
pub fn run(strategy: EnumerationStrategy, ctx: &ScanContext<'_>) -> Result<Vec<QuotaRecord>> {
    debug!(
        "Enumerating {} quotas on {} with {}",
        ctx.kind,
        ctx.binding.mount_point.display(),
        strategy
    );

    match strategy {
        EnumerationStrategy::DirectNext => direct_next::list(ctx),
        EnumerationStrategy::AdaptiveScan => adaptive::list(ctx),
        EnumerationStrategy::OnDiskFile => {
            if ctx.binding.fs_type != FsFamily::Ext4 {
                return Err(QuotaError::Unsupported(format!(
                    "quota files are only read on ext4, not {}",
                    ctx.binding.fs_type
                )));
            }
            let path = quota_file::quota_file_path(&ctx.binding.mount_point, ctx.kind);
            quota_file::read_quota_file(&path, ctx.kind)
        }
        EnumerationStrategy::ProcfsTree => {
            procfs::scan_tree(&ctx.config.procfs_quota_root, ctx.kind)
        }
    }
}

/// Strategies to try, in order, for a family
pub fn strategy_order(
    family: FsFamily,
    next_supported: bool,
    config: &QuotaConfig,
) -> Vec<EnumerationStrategy> {
    let kernel = if next_supported {
        EnumerationStrategy::DirectNext
    } else {
        EnumerationStrategy::AdaptiveScan
    };

    match family {
        FsFamily::Ext4 if config.ext4_bypass_kernel => vec![
            EnumerationStrategy::OnDiskFile,
            EnumerationStrategy::ProcfsTree,
            kernel,
        ],
        FsFamily::Ext4 | FsFamily::Xfs => vec![kernel],
        FsFamily::Other => Vec::new(),
    }
}

/// Trial get-next call, gated on the kernel release
///
/// A trial that finds no identity (`ENOENT`, `ESRCH`) still proves the request is
/// understood.
pub fn supports_next_quota(
    control: &dyn QuotaControl,
    binding: &DeviceBinding,
    kind: QuotaKind,
    kernel: Option<KernelRelease>,
) -> bool {
    if !kernel.is_some_and(KernelRelease::has_next_quota) {
        debug!("Kernel {:?} predates get-next quota requests", kernel);
        return false;
    }

    let mut raw = RawQuota::empty_for(binding.fs_type);
    let result = control.quotactl(
        QuotaCommand::GetNext,
        kind,
        &binding.resolved_node_path,
        0,
        &mut raw,
    );
    let supported = matches!(result, Ok(()) | Err(Errno::ENOENT | Errno::ESRCH));
    debug!(
        "Get-next quota support on {}: {:?} (supported: {})",
        binding.resolved_node_path.display(),
        result,
        supported
    );
    supported
}

/// Wrap a terminating error so records gathered so far are not lost
pub(crate) fn incomplete(collected: Vec<QuotaRecord>, source: QuotaError) -> QuotaError {
    if collected.is_empty() {
        return source;
    }
    QuotaError::Incomplete {
        collected,
        source: Box::new(source),
    }
}

/// Keep the first record per identity, ordered by identity
pub(crate) fn sort_unique(records: &mut Vec<QuotaRecord>) {
    records.sort_by_key(|record| record.identity);
    records.dedup_by_key(|record| record.identity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture_binding, write_quota_file, FakeQuotaControl, TempDir};
    use quota_types::QuotaLimits;
    use std::fs;

    #[test]
    fn strategy_names_round_trip_through_from_str() {
        for strategy in EnumerationStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<EnumerationStrategy>(), Ok(strategy));
        }
        assert!("bogus".parse::<EnumerationStrategy>().is_err());
    }

    #[test]
    fn order_prefers_next_query() {
        let config = QuotaConfig::default();
        assert_eq!(
            strategy_order(FsFamily::Xfs, true, &config),
            vec![EnumerationStrategy::DirectNext]
        );
        assert_eq!(
            strategy_order(FsFamily::Ext4, false, &config),
            vec![EnumerationStrategy::AdaptiveScan]
        );
        assert!(strategy_order(FsFamily::Other, true, &config).is_empty());
    }

    #[test]
    fn ext4_bypass_reads_legacy_sources_first() {
        let config = QuotaConfig {
            ext4_bypass_kernel: true,
            ..QuotaConfig::default()
        };
        assert_eq!(
            strategy_order(FsFamily::Ext4, true, &config),
            vec![
                EnumerationStrategy::OnDiskFile,
                EnumerationStrategy::ProcfsTree,
                EnumerationStrategy::DirectNext,
            ]
        );
        assert_eq!(
            strategy_order(FsFamily::Xfs, true, &config),
            vec![EnumerationStrategy::DirectNext]
        );
    }

    #[test]
    fn next_support_respects_kernel_gate() {
        let binding = fixture_binding(FsFamily::Ext4, "/tmp");
        let control = FakeQuotaControl::new(FsFamily::Ext4);
        let new_kernel = Some(KernelRelease { major: 6, minor: 1 });
        let old_kernel = Some(KernelRelease { major: 4, minor: 4 });

        assert!(supports_next_quota(&control, &binding, QuotaKind::User, new_kernel));
        assert!(!supports_next_quota(&control, &binding, QuotaKind::User, old_kernel));
        assert!(!supports_next_quota(&control, &binding, QuotaKind::User, None));

        let legacy = FakeQuotaControl::new(FsFamily::Ext4).without_next();
        assert!(!supports_next_quota(&legacy, &binding, QuotaKind::User, new_kernel));
    }

    #[test]
    fn kernel_strategies_agree() {
        let binding = fixture_binding(FsFamily::Xfs, "/tmp");
        let control = FakeQuotaControl::new(FsFamily::Xfs);
        for id in [3, 4, 250, 251, 900] {
            control.insert_limits(QuotaKind::Project, id, QuotaLimits::new(100 * id as u64, 0, 0, 0));
        }
        control.insert_usage_only(QuotaKind::Project, 17, 64);

        let config = QuotaConfig::default();
        let ctx = ScanContext {
            control: &control,
            binding: &binding,
            kind: QuotaKind::Project,
            max_identity: Some(1000),
            config: &config,
        };

        let direct = run(EnumerationStrategy::DirectNext, &ctx).expect("direct");
        let scanned = run(EnumerationStrategy::AdaptiveScan, &ctx).expect("scan");
        assert_eq!(direct, scanned);
        assert_eq!(
            direct.iter().map(|r| r.identity).collect::<Vec<_>>(),
            vec![3, 4, 250, 251, 900]
        );
        assert_eq!(direct[2].block_hard_limit, 25_000);
    }

    #[test]
    fn every_strategy_sees_the_same_identities() {
        let temp = TempDir::new("all-strategies");
        let mount_point = temp.path.join("mnt");
        let procfs_root = temp.path.join("proc-quota");
        fs::create_dir_all(&mount_point).expect("create mount point");

        // 700, 1200 and 65000 fall on the adaptive stride; 1213 is found by refinement
        let limits = [(700, 64), (1200, 1024), (1213, 2048), (65_000, 4096)];
        let control = FakeQuotaControl::new(FsFamily::Ext4);
        let mut file_records = Vec::new();
        let entries = procfs_root.join("sda1").join("usrquota");
        fs::create_dir_all(&entries).expect("create procfs tree");

        for (id, block_hard) in limits {
            control.insert_limits(QuotaKind::User, id, QuotaLimits::new(block_hard, 0, 0, 0));

            let mut record = QuotaRecord::empty(id, QuotaKind::User);
            record.block_hard_limit = block_hard;
            file_records.push(record);

            fs::write(entries.join(id.to_string()), format!("block_hard_limit: {block_hard}
"))
                .expect("write procfs entry");
        }
        // The file also carries the reserved identities, which never surface
        file_records.push(QuotaRecord {
            block_hard_limit: 1,
            ..QuotaRecord::empty(0, QuotaKind::User)
        });
        file_records.push(QuotaRecord {
            block_hard_limit: 1,
            ..QuotaRecord::empty(u32::MAX, QuotaKind::User)
        });
        write_quota_file(&mount_point.join("aquota.user"), &file_records);

        let binding = fixture_binding(FsFamily::Ext4, &mount_point);
        let config = QuotaConfig {
            procfs_quota_root: procfs_root,
            ..QuotaConfig::default()
        };
        let ctx = ScanContext {
            control: &control,
            binding: &binding,
            kind: QuotaKind::User,
            max_identity: Some(65_535),
            config: &config,
        };

        let expected: Vec<(u32, u64)> = limits.to_vec();
        for strategy in EnumerationStrategy::ALL {
            let records = run(strategy, &ctx).expect("strategy lists");
            let found: Vec<(u32, u64)> = records
                .iter()
                .map(|r| (r.identity, r.block_hard_limit))
                .collect();
            assert_eq!(found, expected, "{strategy}");
        }
    }

    #[test]
    fn quota_file_is_ext4_only() {
        let binding = fixture_binding(FsFamily::Xfs, "/tmp");
        let control = FakeQuotaControl::new(FsFamily::Xfs);
        let config = QuotaConfig::default();
        let ctx = ScanContext {
            control: &control,
            binding: &binding,
            kind: QuotaKind::User,
            max_identity: None,
            config: &config,
        };
        let err = run(EnumerationStrategy::OnDiskFile, &ctx).expect_err("xfs has no quota file");
        assert!(matches!(err, QuotaError::Unsupported(_)));
    }
}
