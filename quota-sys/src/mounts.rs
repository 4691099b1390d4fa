// SPDX-License-Identifier: GPL-3.0-only

//! Path to mount resolution over kernel mount tables
//!
//! Two line formats are accepted: mountinfo (`/proc/self/mountinfo`), which
//! carries `major:minor` and puts the filesystem type after a ` - `
//! separator, and the plain mounts format (`/proc/mounts`), which names the
//! device path directly.

use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use nix::sys::stat::{major, minor};
use quota_types::{DeviceBinding, DeviceNumber, MountEntry};
use tracing::debug;

use crate::device::DeviceLocator;
use crate::error::{QuotaError, Result};

pub struct MountResolver {
    mount_table: PathBuf,
}

impl MountResolver {
    pub fn new<P: Into<PathBuf>>(mount_table: P) -> Self {
        Self {
            mount_table: mount_table.into(),
        }
    }

    /// Resolve `path` to the mount it lives on and a usable device node
    pub fn resolve(&self, path: &Path, locator: &dyn DeviceLocator) -> Result<DeviceBinding> {
        if path.as_os_str().is_empty() {
            return Err(QuotaError::InvalidArgument("empty path".to_string()));
        }

        let table = fs::read_to_string(&self.mount_table).map_err(|e| {
            QuotaError::DeviceNotFound(format!(
                "cannot read mount table {}: {}",
                self.mount_table.display(),
                e
            ))
        })?;
        let entries = parse_mount_table(&table);

        let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let entry = select_mount(&entries, &target, |entry| {
            same_device(&entry.mount_point, &target)
        })
        .ok_or_else(|| {
            QuotaError::DeviceNotFound(format!("no mount entry for {}", target.display()))
        })?;

        debug!(
            "Resolved {} to mount {} ({}, source {})",
            target.display(),
            entry.mount_point.display(),
            entry.fs_type,
            entry.device_field
        );

        let device = match entry.device {
            Some(device) => device,
            None => device_number_for(entry).ok_or_else(|| {
                QuotaError::DeviceNotFound(format!(
                    "cannot determine device number of {}",
                    entry.device_field
                ))
            })?,
        };

        let resolved_node_path = locator.locate(device)?;

        Ok(DeviceBinding {
            mount_point: entry.mount_point.clone(),
            fs_type: entry.family(),
            device_major: device.major,
            device_minor: device.minor,
            resolved_node_path,
        })
    }
}

/// Pick the mount entry that backs `target`
///
/// `/` only matches a `/` entry of a supported family. Any other path takes
/// the longest mount point that is a path prefix of it and passes
/// `same_device`; later entries shadow earlier ones of equal length.
pub fn select_mount<'a, F>(entries: &'a [MountEntry], target: &Path, same_device: F) -> Option<&'a MountEntry>
where
    F: Fn(&MountEntry) -> bool,
{
    if target == Path::new("/") {
        return entries
            .iter()
            .find(|entry| entry.mount_point == Path::new("/") && entry.family().is_supported());
    }

    entries
        .iter()
        .filter(|entry| target.starts_with(&entry.mount_point))
        .filter(|entry| same_device(entry))
        .max_by_key(|entry| entry.mount_point.as_os_str().len())
}

pub fn parse_mount_table(input: &str) -> Vec<MountEntry> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let entry = parse_mount_line(line);
            if entry.is_none() {
                debug!("Skipping unparsable mount table line: {}", line);
            }
            entry
        })
        .collect()
}

/// Parse one line in either mountinfo or plain mounts format
pub fn parse_mount_line(line: &str) -> Option<MountEntry> {
    match line.split_once(" - ") {
        Some((left, right)) => parse_mountinfo_line(left, right),
        None => parse_mounts_line(line),
    }
}

fn parse_mountinfo_line(left: &str, right: &str) -> Option<MountEntry> {
    // mount_id parent_id major:minor root mount_point options [optional...]
    let mut left_fields = left.split_whitespace();
    let device = DeviceNumber::parse(left_fields.nth(2)?)?;
    let mount_point = left_fields.nth(1)?;

    // fs_type source super_options
    let mut right_fields = right.split_whitespace();
    let fs_type = right_fields.next()?;
    let source = right_fields.next().unwrap_or("none");

    Some(MountEntry {
        device_field: unescape_mount_field(source),
        mount_point: PathBuf::from(unescape_mount_field(mount_point)),
        fs_type: fs_type.to_string(),
        device: Some(device),
    })
}

fn parse_mounts_line(line: &str) -> Option<MountEntry> {
    let mut fields = line.split_whitespace();
    let device_field = fields.next()?;
    let mount_point = fields.next()?;
    let fs_type = fields.next()?;

    Some(MountEntry {
        device_field: unescape_mount_field(device_field),
        mount_point: PathBuf::from(unescape_mount_field(mount_point)),
        fs_type: fs_type.to_string(),
        device: None,
    })
}

/// Decode the octal escapes (`\040` and friends) the kernel writes for
/// whitespace in mount fields
pub fn unescape_mount_field(value: &str) -> String {
    let mut output = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 3 < bytes.len()
            && bytes[index + 1..index + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let octal = &value[index + 1..index + 4];
            if let Ok(num) = u8::from_str_radix(octal, 8) {
                output.push(num);
                index += 4;
                continue;
            }
        }

        output.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&output).into_owned()
}

fn same_device(mount_point: &Path, target: &Path) -> bool {
    match (fs::metadata(mount_point), fs::metadata(target)) {
        (Ok(mount), Ok(target)) => mount.dev() == target.dev(),
        _ => false,
    }
}

/// Device number for a plain mounts entry: the node's rdev when the source
/// is a block device, otherwise the device the mount point lives on
fn device_number_for(entry: &MountEntry) -> Option<DeviceNumber> {
    let dev = match fs::metadata(&entry.device_field) {
        Ok(meta) if meta.file_type().is_block_device() => meta.rdev(),
        _ => fs::metadata(&entry.mount_point).ok()?.dev(),
    };
    Some(DeviceNumber::new(major(dev) as u32, minor(dev) as u32))
}
