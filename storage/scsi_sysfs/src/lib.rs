// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Enumeration of SCSI devices, enclosures and expanders through sysfs.
//!
//! All functions take the directory to inspect as a parameter so that the
//! same code can run against `/sys/bus/scsi/devices` or a synthetic tree.

#![forbid(unsafe_code)]

use hctl::HctlAddress;
use std::io;
use std::path::Path;

/// The sysfs directory, relative to the sysfs mount, holding one entry per
/// SCSI device.
pub const BUS_SCSI_DEVICES: &str = "bus/scsi/devices";

/// The kind of a directory entry, as reported without following symlinks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A symbolic link.
    Symlink,
    /// A directory.
    Directory,
    /// Anything else (regular file, device node, ...).
    Other,
}

impl EntryKind {
    fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::Other
        }
    }

    /// Returns true for symlinks and directories.
    pub fn is_dir_or_link(&self) -> bool {
        matches!(self, EntryKind::Symlink | EntryKind::Directory)
    }
}

/// A single sysfs (or /dev) directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    /// The entry's file name.
    pub name: String,
    /// The entry's type.
    pub kind: EntryKind,
}

impl DeviceEntry {
    /// Parses the entry name as an HCTL address.
    pub fn hctl(&self) -> Result<HctlAddress, hctl::ParseHctlError> {
        self.name.parse()
    }
}

/// Lists the entries of `dir` accepted by `select`, in directory order.
pub fn list_entries(
    dir: &Path,
    mut select: impl FnMut(&DeviceEntry) -> bool,
) -> io::Result<Vec<DeviceEntry>> {
    let mut entries = Vec::new();
    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let entry = DeviceEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind: EntryKind::from_file_type(entry.file_type()?),
        };
        if select(&entry) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Returns true if `name` looks like a SCSI device leaf.
///
/// Host and target aggregation nodes are skipped, as are the `st`/`osst`
/// auxiliary names that very old kernels placed in the same directory.
pub fn is_scsi_device_name(name: &str) -> bool {
    if name.contains("mt") || name.contains("ot") || name.contains("gen") {
        return false;
    }
    if name.starts_with("host") || name.starts_with("target") {
        return false;
    }
    name.contains(':')
}

/// Lists the SCSI devices under `root` (normally `/sys/bus/scsi/devices`) in
/// HCTL order.
///
/// Entries whose names do not parse as HCTL addresses are placed first, in
/// directory order.
pub fn list_scsi_devices(root: &Path) -> io::Result<Vec<DeviceEntry>> {
    let entries = list_entries(root, |entry| is_scsi_device_name(&entry.name))?;

    let mut unparsed = Vec::new();
    let mut parsed = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.hctl() {
            Ok(address) => parsed.push((address, entry)),
            Err(err) => {
                tracing::warn!(
                    name = entry.name.as_str(),
                    error = &err as &dyn std::error::Error,
                    "unparseable scsi device name"
                );
                unparsed.push(entry);
            }
        }
    }
    parsed.sort_by(|(a, _), (b, _)| a.cmp(b));
    unparsed.extend(parsed.into_iter().map(|(_, entry)| entry));
    Ok(unparsed)
}

/// Returns the first symlink or directory in `dir`.
pub fn scan_for_first(dir: &Path) -> io::Result<Option<DeviceEntry>> {
    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let kind = EntryKind::from_file_type(entry.file_type()?);
        if kind.is_dir_or_link() {
            return Ok(Some(DeviceEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            }));
        }
    }
    Ok(None)
}

/// Returns the block device name (`sda`, ...) of the SCSI device at
/// `device_dir`, if it has one.
pub fn block_device_name(device_dir: &Path) -> io::Result<Option<String>> {
    match scan_for_first(&device_dir.join("block")) {
        Ok(entry) => Ok(entry.map(|entry| entry.name)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// The enclosure-related entries found in a device directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnclosureScan {
    /// Number of `enclosure*` entries, excluding `enclosure_device*`.
    pub enclosures: usize,
    /// The `enclosure_device:<name>` marker, present on disks behind HBAs
    /// that expose their slots by name.
    pub enclosure_device: Option<String>,
}

impl EnclosureScan {
    /// Returns true if the device is an enclosure (expander) node.
    pub fn is_expander(&self) -> bool {
        self.enclosures > 0
    }
}

/// Scans `device_dir` for `enclosure*` entries.
pub fn scan_enclosure(device_dir: &Path) -> io::Result<EnclosureScan> {
    let mut scan = EnclosureScan::default();
    for entry in list_entries(device_dir, |entry| {
        entry.kind.is_dir_or_link() && entry.name.starts_with("enclosure")
    })? {
        if entry.name.starts_with("enclosure_device") {
            scan.enclosure_device = Some(entry.name);
        } else {
            scan.enclosures += 1;
        }
    }
    Ok(scan)
}

/// Returns true if `device_dir` has an `enclosure` subdirectory, meaning the
/// device is an enclosure services node on an expander.
pub fn has_enclosure_subdir(device_dir: &Path) -> bool {
    match scan_enclosure(device_dir) {
        Ok(scan) => scan.is_expander(),
        Err(err) => {
            tracing::warn!(
                path = %device_dir.display(),
                error = &err as &dyn std::error::Error,
                "failed to scan for enclosure"
            );
            false
        }
    }
}

/// Reads the first line of the attribute `name` in `dir`, without the
/// trailing newline. Returns `None` if the attribute does not exist.
pub fn read_sysfs_attribute(dir: &Path, name: &str) -> io::Result<Option<String>> {
    match fs_err::read_to_string(dir.join(name)) {
        Ok(value) => Ok(Some(value.split('\n').next().unwrap_or_default().to_owned())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Reads the world-wide id of the expander whose enclosure node is at
/// `device_dir`, from its `sas_address` attribute.
///
/// The low six bits of an expander's SAS address are always set.
pub fn expander_wwid(device_dir: &Path) -> io::Result<Option<u64>> {
    let Some(value) = read_sysfs_attribute(device_dir, "sas_address")? else {
        return Ok(None);
    };
    tracing::debug!(value = value.as_str(), "found expander sas address");
    let value = value.trim();
    // The wwid is the last 16 hex digits.
    let digits = if value.len() >= 16 {
        value.get(value.len() - 16..)
    } else {
        Some(value.trim_start_matches("0x"))
    };
    Ok(digits
        .and_then(|digits| u64::from_str_radix(digits, 16).ok())
        .map(|wwid| wwid | 0x3f))
}

/// Reads the logical id of the enclosure attached to `expander`.
pub fn read_enclosure_id(devices_root: &Path, expander: &str) -> io::Result<Option<String>> {
    read_sysfs_attribute(
        &devices_root.join(expander).join("enclosure").join(expander),
        "id",
    )
}

/// Reads the SCSI peripheral device type of the device at `device_dir`.
pub fn read_device_type(device_dir: &Path) -> io::Result<Option<u8>> {
    Ok(read_sysfs_attribute(device_dir, "type")?.and_then(|value| value.trim().parse().ok()))
}

/// Returns the name of a SCSI peripheral device type.
pub fn scsi_device_type_name(device_type: u8) -> &'static str {
    const NAMES: [&str; 32] = [
        "Direct-Access",
        "Sequential-Access",
        "Printer",
        "Processor",
        "Write-once",
        "CD-ROM",
        "Scanner",
        "Optical memory",
        "Medium Changer",
        "Communications",
        "Unknown (0xa)",
        "Unknown (0xb)",
        "Storage array",
        "Enclosure",
        "Simplified direct-access",
        "Optical card read/writer",
        "Bridge controller",
        "Object based storage",
        "Automation Drive interface",
        "Security manager",
        "Zoned Block",
        "Reserved (0x15)",
        "Reserved (0x16)",
        "Reserved (0x17)",
        "Reserved (0x18)",
        "Reserved (0x19)",
        "Reserved (0x1a)",
        "Reserved (0x1b)",
        "Reserved (0x1c)",
        "Reserved (0x1d)",
        "Well known LU",
        "No device",
    ];
    NAMES
        .get(device_type as usize)
        .copied()
        .unwrap_or("Unknown")
}
