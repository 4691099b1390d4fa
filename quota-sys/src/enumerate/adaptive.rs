// SPDX-License-Identifier: GPL-3.0-only

use nix::errno::Errno;
use quota_types::QuotaRecord;
use tracing::debug;

use super::ScanContext;
use crate::error::{push_record, QuotaError, Result};

/// Sampling stride for a scan bound; coarser for larger bounds
pub fn step_for(bound: u32) -> u32 {
    match bound {
        0..=1_000 => 1,
        1_001..=10_000 => 10,
        10_001..=100_000 => 100,
        100_001..=1_000_000 => 1_000,
        _ => 10_000,
    }
}

/// Scan identities `0..=bound` with plain get requests
///
/// Identities cluster, so the scan samples every `step_for(bound)`-th id and
/// queries every id between a hit and the next sample. `ENOENT` means the
/// identity has no quota. A run of `failure_threshold` consecutive failed
/// samples ends the scan; if no sample ever succeeded the last failure is
/// returned.
pub fn list(ctx: &ScanContext<'_>) -> Result<Vec<QuotaRecord>> {
    let bound = ctx.max_identity.unwrap_or(ctx.config.default_max_identity);
    let step = step_for(bound);
    let mut records = Vec::new();
    let mut consecutive_failures = 0u32;
    let mut last_error: Option<Errno> = None;
    let mut any_success = false;

    let mut id = 0u64;
    while id <= u64::from(bound) {
        let sample = id as u32;
        match ctx.get(sample) {
            Ok(record) => {
                consecutive_failures = 0;
                any_success = true;
                if record.is_configured() {
                    if record.has_valid_identity() {
                        push_record(&mut records, record)?;
                    }
                    if step > 1 {
                        refine(ctx, sample, step, bound, &mut records)?;
                    }
                }
            }
            // XFS has no dquot for an identity that never had a quota
            Err(Errno::ENOENT) => {
                consecutive_failures = 0;
                any_success = true;
            }
            Err(errno) => {
                consecutive_failures += 1;
                last_error = Some(errno);
                if consecutive_failures >= ctx.config.failure_threshold {
                    debug!(
                        "Abandoning scan at identity {} after {} consecutive failures ({})",
                        sample, consecutive_failures, errno
                    );
                    break;
                }
            }
        }
        id += u64::from(step);
    }

    match (any_success, last_error) {
        (false, Some(errno)) => Err(QuotaError::Platform(errno)),
        _ => Ok(records),
    }
}

/// Query every id strictly between a hit and the next sample point
fn refine(
    ctx: &ScanContext<'_>,
    hit: u32,
    step: u32,
    bound: u32,
    records: &mut Vec<QuotaRecord>,
) -> Result<()> {
    let end = u64::from(hit) + u64::from(step);
    let last = end.min(u64::from(bound) + 1);

    for id in (u64::from(hit) + 1)..last {
        if let Ok(record) = ctx.get(id as u32)
            && record.is_configured()
            && record.has_valid_identity()
        {
            push_record(records, record)?;
        }
    }
    Ok(())
}
