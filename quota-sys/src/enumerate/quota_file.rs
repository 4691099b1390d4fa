// SPDX-License-Identifier: GPL-3.0-only

//! Flat reading of ext4 `aquota.*` files
//!
//! The file is read as an info header followed by one homogeneous array of
//! fixed-size records. Quota files whose body uses tree indirection blocks
//! will not decode meaningfully through this path; callers fall back to the
//! kernel strategies for those.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use quota_types::{QuotaKind, QuotaRecord};
use tracing::debug;

use super::sort_unique;
use crate::codec::{decode_disk_record, DISK_HEADER_SIZE, DISK_RECORD_SIZE};
use crate::error::{push_record, Result};

/// Conventional location of the quota file for `kind`
pub fn quota_file_path(mount_point: &Path, kind: QuotaKind) -> PathBuf {
    mount_point.join(kind.quota_file_name())
}

/// Decode every present record of a quota file
///
/// Identity 0 and the all-ones sentinel are always skipped. A record is
/// present when it carries any limit or any usage. A short header is an
/// I/O error; a trailing partial record is ignored.
pub fn read_quota_file(path: &Path, kind: QuotaKind) -> Result<Vec<QuotaRecord>> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut header = [0u8; DISK_HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let mut records = Vec::new();
    let mut buf = [0u8; DISK_RECORD_SIZE];
    loop {
        match read_record(&mut reader, &mut buf)? {
            RecordRead::Full => {}
            RecordRead::Partial(len) => {
                debug!("Ignoring {} trailing bytes in {}", len, path.display());
                break;
            }
            RecordRead::Eof => break,
        }

        let record = decode_disk_record(&buf, kind);
        if !record.has_valid_identity() {
            continue;
        }
        if record.is_configured() || record.has_usage() {
            push_record(&mut records, record)?;
        }
    }

    sort_unique(&mut records);
    debug!("Read {} record(s) from {}", records.len(), path.display());
    Ok(records)
}

enum RecordRead {
    Full,
    Partial(usize),
    Eof,
}

fn read_record<R: Read>(reader: &mut R, buf: &mut [u8; DISK_RECORD_SIZE]) -> std::io::Result<RecordRead> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(match filled {
        0 => RecordRead::Eof,
        n if n == buf.len() => RecordRead::Full,
        n => RecordRead::Partial(n),
    })
}
