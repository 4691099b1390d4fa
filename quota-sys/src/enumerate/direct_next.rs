// SPDX-License-Identifier: GPL-3.0-only

use nix::errno::Errno;
use quota_types::{QuotaRecord, SENTINEL_ID};
use tracing::{debug, warn};

use super::{incomplete, ScanContext};
use crate::error::{push_record, QuotaError, Result};

/// Walk configured identities with get-next requests
///
/// Each response names its own identity, so the walk resumes one past it.
/// Ends when the kernel reports no further identity (`ENOENT`) or past the
/// caller's bound. Reaching the record ceiling while identities remain, or
/// any other failure, ends the walk with the records gathered so far
/// attached to the error.
pub fn list(ctx: &ScanContext<'_>) -> Result<Vec<QuotaRecord>> {
    let mut records = Vec::new();
    let mut next = 0u32;
    let mut responses = 0usize;

    loop {
        if ctx.max_identity.is_some_and(|bound| next > bound) {
            break;
        }
        if responses >= ctx.config.max_records {
            if remaining_within_bound(ctx, next) {
                warn!(
                    "Stopping get-next walk after {} responses at identity {}",
                    responses, next
                );
                return Err(incomplete(
                    records,
                    QuotaError::RecordLimit(ctx.config.max_records),
                ));
            }
            break;
        }

        let record = match ctx.get_next(next) {
            Ok(record) => record,
            Err(Errno::ENOENT) => break,
            Err(errno) => {
                debug!("Get-next at identity {} failed: {}", next, errno);
                return Err(incomplete(records, QuotaError::Platform(errno)));
            }
        };
        responses += 1;

        let identity = record.identity;
        if identity < next {
            warn!(
                "Get-next returned identity {} below requested {}; stopping",
                identity, next
            );
            break;
        }
        if ctx.max_identity.is_some_and(|bound| identity > bound) {
            break;
        }

        if record.has_valid_identity() && record.is_configured() {
            push_record(&mut records, record)?;
        }

        if identity == SENTINEL_ID {
            break;
        }
        next = identity + 1;
    }

    Ok(records)
}

/// Whether another identity at or above `next` is within the caller's bound
fn remaining_within_bound(ctx: &ScanContext<'_>, next: u32) -> bool {
    match ctx.get_next(next) {
        Ok(record) => !ctx
            .max_identity
            .is_some_and(|bound| record.identity > bound),
        Err(Errno::ENOENT) => false,
        Err(_) => true,
    }
}
