// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for disk quota management
//!
//! These models are the single shape every quota source is normalized into,
//! whichever filesystem family or enumeration path produced them:
//!
//! - `QuotaRecord` → per-identity limits, usage and grace timers, in KiB
//! - `DeviceBinding` → a path resolved to its mount and backing block device
//! - `MountEntry` → one parsed line of a mount table

pub mod device;
pub mod kind;
pub mod record;

pub use device::{DeviceBinding, DeviceNumber, MountEntry};
pub use kind::{FsFamily, QuotaKind};
pub use record::{is_valid_identity, QuotaLimits, QuotaRecord, QuotaStatus, RESERVED_ID, SENTINEL_ID};
