// SPDX-License-Identifier: GPL-3.0-only

use nix::errno::Errno;
use quota_types::{QuotaKind, QuotaRecord};
use thiserror::Error;

/// Error types for quota operations
#[derive(Error, Debug)]
pub enum QuotaError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Out of memory while collecting quota records")]
    OutOfMemory,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No quota configured for {kind} {id}")]
    NotConfigured { kind: QuotaKind, id: u32 },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("quotactl failed: {0}")]
    Platform(#[from] Errno),

    #[error("Record limit of {0} reached with identities remaining")]
    RecordLimit(usize),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Listing stopped after {} record(s): {source}", collected.len())]
    Incomplete {
        collected: Vec<QuotaRecord>,
        #[source]
        source: Box<QuotaError>,
    },
}

impl QuotaError {
    /// The platform error code behind this error, if any
    pub fn errno(&self) -> Option<Errno> {
        match self {
            QuotaError::Platform(errno) => Some(*errno),
            QuotaError::Io(e) => e.raw_os_error().map(Errno::from_raw),
            QuotaError::InvalidArgument(_) => Some(Errno::EINVAL),
            QuotaError::DeviceNotFound(_) => Some(Errno::ENODEV),
            QuotaError::OutOfMemory => Some(Errno::ENOMEM),
            QuotaError::NotConfigured { .. } => Some(Errno::ENOENT),
            QuotaError::Unsupported(_) => Some(Errno::ENOTSUP),
            QuotaError::RecordLimit(_) => Some(Errno::EOVERFLOW),
            QuotaError::Incomplete { source, .. } => source.errno(),
            QuotaError::Config(_) => None,
        }
    }

    /// Records gathered before a listing failed
    pub fn partial_records(&self) -> &[QuotaRecord] {
        match self {
            QuotaError::Incomplete { collected, .. } => collected,
            _ => &[],
        }
    }

    /// Missing or absent sources that a strategy fallback may skip past
    pub(crate) fn is_source_missing(&self) -> bool {
        match self {
            QuotaError::Unsupported(_) => true,
            QuotaError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}

/// Result type alias for quota operations
pub type Result<T> = std::result::Result<T, QuotaError>;

/// Append with fallible allocation so buffer growth failure surfaces as
/// `OutOfMemory` instead of aborting
pub(crate) fn push_record(records: &mut Vec<QuotaRecord>, record: QuotaRecord) -> Result<()> {
    records
        .try_reserve(1)
        .map_err(|_| QuotaError::OutOfMemory)?;
    records.push(record);
    Ok(())
}
