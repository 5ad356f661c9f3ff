// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Maps SCSI devices to enclosure slots.
//!
//! Discovery runs in passes over a [`Topology`]:
//!
//! 1. [`scan_scsi_topology`] walks sysfs, registers the expanders and places
//!    each disk in a slot from its SCSI addressing.
//! 2. [`slot_discover`] (or [`mpi3mr_slot_discover`]) talks SMP to each
//!    expander and attaches the DISCOVER response of each phy to its slot.
//!
//! Every pass tolerates partial failure: problems are handed to a
//! [`DiagnosticSink`] and the pass moves on to the next device or node.

#![forbid(unsafe_code)]

mod discovery;
mod inventory;
mod mapping;
mod registry;
mod scan;
#[cfg(test)]
mod testing;

pub use discovery::ExpanderReport;
pub use discovery::full_discover;
pub use discovery::set_phy_disabled;
pub use discovery::slot_discover;
pub use inventory::ControllerInventory;
pub use inventory::EnclosureInfo;
pub use inventory::ExpanderInfo;
pub use inventory::mpi3mr_inventory;
pub use inventory::mpi3mr_slot_discover;
pub use inventory::render_inventory;
pub use mapping::MappingError;
pub use mapping::array_device_slot;
pub use mapping::assign_expander;
pub use mapping::assign_slot;
pub use mapping::compute_slot_offset;
pub use registry::ExpanderEntry;
pub use registry::ExpanderRegistry;
pub use registry::LabelStyle;
pub use registry::SlotEntry;
pub use registry::SlotRegistry;
pub use scan::scan_scsi_topology;

use smp_transport::SmpTransport;
use smp_transport::TransportError;
use smp_transport::TransportKind;
use smp_transport::TransportSession;
use std::path::Path;
use std::path::PathBuf;

/// The shape of the slot table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TopologyLayout {
    /// Expanders per system.
    pub expanders: usize,
    /// Drive bays behind each expander.
    pub slots_per_expander: usize,
}

impl Default for TopologyLayout {
    fn default() -> Self {
        Self {
            expanders: 4,
            slots_per_expander: 28,
        }
    }
}

impl TopologyLayout {
    /// Total number of bays.
    pub fn slot_count(&self) -> usize {
        self.expanders * self.slots_per_expander
    }
}

/// Where discovery looks and how long it waits.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// The sysfs mount.
    pub sysfs_root: PathBuf,
    /// The bsg node directory.
    pub bsg_root: PathBuf,
    /// The device node directory holding the mpt control node.
    pub dev_root: PathBuf,
    /// The slot table shape.
    pub layout: TopologyLayout,
    /// Per-exchange timeout in milliseconds.
    pub timeout_ms: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys"),
            bsg_root: PathBuf::from("/dev/bsg"),
            dev_root: PathBuf::from("/dev"),
            layout: TopologyLayout::default(),
            timeout_ms: mpi_defs::bsg::DEFAULT_TIMEOUT_MS,
        }
    }
}

impl DiscoveryConfig {
    /// The directory with one entry per SCSI device.
    pub fn scsi_devices_root(&self) -> PathBuf {
        self.sysfs_root.join(scsi_sysfs::BUS_SCSI_DEVICES)
    }
}

/// Receives the non-fatal problems found during discovery.
pub trait DiagnosticSink {
    /// Reports one problem.
    fn report(&mut self, message: String);
}

impl DiagnosticSink for Vec<String> {
    fn report(&mut self, message: String) {
        self.push(message);
    }
}

/// Logs diagnostics as warnings.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&mut self, message: String) {
        tracing::warn!("{message}");
    }
}

/// Opens transport nodes for the discovery passes.
pub trait TransportOpener {
    /// The opened transport.
    type Transport: SmpTransport;

    /// Opens `path` as a `kind` transport.
    fn open(&mut self, path: &Path, kind: TransportKind) -> Result<Self::Transport, TransportError>;
}

/// Opens real kernel nodes.
#[derive(Debug, Copy, Clone)]
pub struct SessionOpener {
    timeout_ms: u32,
}

impl SessionOpener {
    /// An opener applying the timeout of `config`.
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            timeout_ms: config.timeout_ms,
        }
    }
}

impl TransportOpener for SessionOpener {
    type Transport = TransportSession;

    fn open(&mut self, path: &Path, kind: TransportKind) -> Result<TransportSession, TransportError> {
        let mut session = TransportSession::open(path, kind)?;
        session.set_timeout(self.timeout_ms);
        Ok(session)
    }
}

/// How the HBA exposes the enclosure slots in sysfs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum CardFamily {
    /// Slots follow from the target distance to the expander.
    #[default]
    PhyDistance,
    /// Disks carry an `enclosure_device:ArrayDeviceNN` marker.
    EnclosureDevice,
    /// A RAID controller hiding the disks. Not mapped.
    Raid,
}

/// The result of discovery.
#[derive(Debug, Clone)]
pub struct Topology {
    /// The table shape.
    pub layout: TopologyLayout,
    /// How slots were assigned.
    pub family: CardFamily,
    /// The drive bays.
    pub slots: SlotRegistry,
    /// The expanders.
    pub expanders: ExpanderRegistry,
}

impl Topology {
    /// An empty topology.
    pub fn new(layout: TopologyLayout) -> Self {
        Self {
            layout,
            family: CardFamily::default(),
            slots: SlotRegistry::new(&layout),
            expanders: ExpanderRegistry::new(&layout),
        }
    }
}

/// Formats an error with its sources, `outer: inner: ...`.
pub(crate) fn describe(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        text.push_str(": ");
        text.push_str(&err.to_string());
        source = err.source();
    }
    text
}
