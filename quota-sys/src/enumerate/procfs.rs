// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::Path;

use quota_types::{is_valid_identity, QuotaKind, QuotaRecord};
use tracing::{debug, trace};

use super::sort_unique;
use crate::error::{push_record, Result};

/// Walk `root/<bucket>/<kind dir>/<identity>` and parse every leaf
///
/// Only records with at least one limit are kept. Unreadable buckets and
/// leaves are skipped; a missing root is an I/O error so callers can fall
/// back to another source.
pub fn scan_tree(root: &Path, kind: QuotaKind) -> Result<Vec<QuotaRecord>> {
    let mut records = Vec::new();

    for bucket in fs::read_dir(root)? {
        let Ok(bucket) = bucket else { continue };
        if is_hidden(&bucket.file_name()) {
            continue;
        }

        let kind_dir = bucket.path().join(kind.procfs_name());
        let Ok(leaves) = fs::read_dir(&kind_dir) else {
            continue;
        };

        for leaf in leaves.flatten() {
            let name = leaf.file_name();
            if is_hidden(&name) {
                continue;
            }
            let Some(id) = name.to_str().and_then(|name| name.parse::<u32>().ok()) else {
                trace!("Skipping non-numeric quota entry {:?}", name);
                continue;
            };
            if !is_valid_identity(id) {
                continue;
            }

            let Ok(contents) = fs::read_to_string(leaf.path()) else {
                debug!("Unreadable quota entry {}", leaf.path().display());
                continue;
            };
            let record = parse_entry(&contents, id, kind);
            if record.is_configured() {
                push_record(&mut records, record)?;
            }
        }
    }

    sort_unique(&mut records);
    debug!(
        "Found {} {} record(s) under {}",
        records.len(),
        kind,
        root.display()
    );
    Ok(records)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.as_encoded_bytes().first() == Some(&b'.')
}

/// Parse `key: value` lines; unknown keys and malformed values are ignored
pub fn parse_entry(contents: &str, id: u32, kind: QuotaKind) -> QuotaRecord {
    let mut record = QuotaRecord::empty(id, kind);

    for line in contents.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<u64>() else {
            continue;
        };
        match key.trim() {
            "block_hard_limit" => record.block_hard_limit = value,
            "block_soft_limit" => record.block_soft_limit = value,
            // Reported in bytes
            "block_current" => record.block_used = value / 1024,
            "inode_hard_limit" => record.inode_hard_limit = value,
            "inode_soft_limit" => record.inode_soft_limit = value,
            "inode_current" => record.inode_used = value,
            _ => {}
        }
    }

    record
}
