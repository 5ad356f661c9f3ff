// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The sysfs pass: registers expanders and places disks in slots.

use crate::CardFamily;
use crate::DiagnosticSink;
use crate::DiscoveryConfig;
use crate::Topology;
use crate::describe;
use crate::mapping::MappingError;
use crate::mapping::array_device_slot;
use crate::mapping::assign_expander;
use crate::mapping::assign_slot;
use crate::mapping::compute_slot_offset;
use scsi_sysfs::DeviceEntry;
use scsi_sysfs::EnclosureScan;
use std::io;
use std::path::Path;

/// Walks the SCSI devices in HCTL order and fills the slot and expander
/// registries.
///
/// On phy-distance HBAs a disk's slot follows from its distance to the
/// expander enumerated after it, so disks are held until the next expander
/// shows up. A disk carrying an `enclosure_device` marker is placed by the
/// bay number in the marker instead.
pub fn scan_scsi_topology(config: &DiscoveryConfig, sink: &mut dyn DiagnosticSink) -> Topology {
    let mut topology = Topology::new(config.layout);
    let root = config.scsi_devices_root();
    let devices = match scsi_sysfs::list_scsi_devices(&root) {
        Ok(devices) => devices,
        Err(err) => {
            sink.report(format!(
                "cannot list {}: {}; the SCSI mid level module may not be loaded",
                root.display(),
                describe(&err)
            ));
            return topology;
        }
    };

    let mut pending = Vec::new();
    for device in devices {
        let dir = root.join(&device.name);
        let scan = scsi_sysfs::scan_enclosure(&dir).unwrap_or_else(|err| {
            tracing::warn!(
                device = device.name.as_str(),
                error = &err as &dyn std::error::Error,
                "failed to scan for enclosure entries"
            );
            EnclosureScan::default()
        });

        if scan.is_expander() {
            register_expander(&mut topology, &root, &device, &mut pending, sink);
        } else if let Some(marker) = scan.enclosure_device {
            topology.family = CardFamily::EnclosureDevice;
            match array_device_slot(&marker) {
                Ok(slot) => place(&mut topology, &root, &device.name, slot, sink),
                Err(err) => setting_error(sink, &device.name, &err),
            }
        } else {
            pending.push(device);
        }
    }

    if topology.family == CardFamily::PhyDistance && !pending.is_empty() {
        tracing::debug!(
            count = pending.len(),
            "devices after the last expander are not mapped"
        );
    }
    tracing::debug!(
        slots = topology.slots.count(),
        expanders = topology.expanders.count(),
        family = ?topology.family,
        "scsi topology scanned"
    );
    topology
}

fn setting_error(sink: &mut dyn DiagnosticSink, device: &str, err: &MappingError) {
    sink.report(format!("device [{device}] setting error: {}", describe(err)));
}

fn register_expander(
    topology: &mut Topology,
    root: &Path,
    expander: &DeviceEntry,
    pending: &mut Vec<DeviceEntry>,
    sink: &mut dyn DiagnosticSink,
) {
    let wwid = match scsi_sysfs::expander_wwid(&root.join(&expander.name)) {
        Ok(Some(wwid)) => wwid,
        Ok(None) => {
            sink.report(format!("error: cannot get expander [{}] wwid", expander.name));
            return;
        }
        Err(err) => {
            sink.report(format!(
                "error: cannot get expander [{}] wwid: {}",
                expander.name,
                describe(&err)
            ));
            return;
        }
    };
    let index = assign_expander(wwid);

    if topology.family == CardFamily::PhyDistance {
        for device in pending.drain(..) {
            match slot_by_distance(topology, &device, expander, index) {
                Ok(slot) => place(topology, root, &device.name, slot, sink),
                Err(err) => setting_error(sink, &device.name, &err),
            }
        }
    }

    let enclosure_id = match scsi_sysfs::read_enclosure_id(root, &expander.name) {
        Ok(id) => id.unwrap_or_default(),
        Err(err) => {
            tracing::warn!(
                expander = expander.name.as_str(),
                error = &err as &dyn std::error::Error,
                "failed to read the enclosure id"
            );
            String::new()
        }
    };
    tracing::debug!(
        expander = expander.name.as_str(),
        wwid = format_args!("{wwid:#x}"),
        index,
        "found expander"
    );
    if !topology
        .expanders
        .set_controller(index, expander.name.clone(), wwid, enclosure_id)
    {
        setting_error(sink, &expander.name, &MappingError::ExpanderOutOfRange(index));
    }
}

fn slot_by_distance(
    topology: &Topology,
    device: &DeviceEntry,
    expander: &DeviceEntry,
    index: usize,
) -> Result<usize, MappingError> {
    let offset = compute_slot_offset(&device.hctl()?, &expander.hctl()?, &topology.layout)?;
    assign_slot(&topology.layout, index, offset)
}

/// Reads a device's identity from sysfs and puts it in `slot`.
fn place(
    topology: &mut Topology,
    root: &Path,
    device: &str,
    slot: usize,
    sink: &mut dyn DiagnosticSink,
) {
    let dir = root.join(device);
    let wwid = optional(scsi_sysfs::read_sysfs_attribute(&dir, "wwid"), device, "wwid");
    let block = optional(scsi_sysfs::block_device_name(&dir), device, "block device");
    match topology
        .slots
        .assign(slot, device.to_owned(), wwid, block)
    {
        Ok(()) => tracing::debug!(device, slot, "mapped device"),
        Err(err) => setting_error(sink, device, &err),
    }
}

fn optional(value: io::Result<Option<String>>, device: &str, what: &str) -> String {
    value.unwrap_or_else(|err| {
        tracing::warn!(
            device,
            what,
            error = &err as &dyn std::error::Error,
            "failed to read device attribute"
        );
        None
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TopologyLayout;
    use std::fs;
    use std::path::PathBuf;

    /// Builds `bus/scsi/devices` under a temporary sysfs root.
    struct FakeSysfs {
        dir: tempfile::TempDir,
    }

    impl FakeSysfs {
        fn new() -> Self {
            let sysfs = Self {
                dir: tempfile::tempdir().unwrap(),
            };
            fs::create_dir_all(sysfs.devices()).unwrap();
            sysfs
        }

        fn devices(&self) -> PathBuf {
            self.dir.path().join("bus/scsi/devices")
        }

        fn config(&self) -> DiscoveryConfig {
            DiscoveryConfig {
                sysfs_root: self.dir.path().to_owned(),
                ..DiscoveryConfig::default()
            }
        }

        fn disk(&self, name: &str, block: &str) -> &Self {
            let dir = self.devices().join(name);
            fs::create_dir_all(dir.join("block").join(block)).unwrap();
            fs::write(dir.join("wwid"), format!("naa.5000c500{block:0>8}\n")).unwrap();
            self
        }

        fn marked_disk(&self, name: &str, block: &str, marker: &str) -> &Self {
            self.disk(name, block);
            fs::create_dir(self.devices().join(name).join(marker)).unwrap();
            self
        }

        fn expander(&self, name: &str, sas_address: Option<&str>) -> &Self {
            let dir = self.devices().join(name);
            let enclosure = dir.join("enclosure").join(name);
            fs::create_dir_all(&enclosure).unwrap();
            fs::write(enclosure.join("id"), "0x500c0ff0000000ff\n").unwrap();
            if let Some(sas_address) = sas_address {
                fs::write(dir.join("sas_address"), format!("{sas_address}\n")).unwrap();
            }
            self
        }
    }

    #[test]
    fn phy_distance_mapping() {
        let sysfs = FakeSysfs::new();
        sysfs
            .disk("0:0:0:0", "sda")
            .disk("0:0:1:0", "sdb")
            .expander("0:0:2:0", Some("0x5000c5000000003f"))
            .disk("0:0:3:0", "sdc")
            .expander("0:0:5:0", Some("0x5000c5000000007f"))
            .disk("1:0:0:0", "sdd")
            .expander("1:0:40:0", None)
            .expander("1:0:41:0", Some("0x5000c500000000bf"))
            .disk("1:0:42:0", "sde");

        let mut diagnostics = Vec::new();
        let topology = scan_scsi_topology(&sysfs.config(), &mut diagnostics);

        assert_eq!(topology.family, CardFamily::PhyDistance);
        assert_eq!(
            diagnostics,
            [
                "error: cannot get expander [1:0:40:0] wwid",
                "device [1:0:0:0] setting error: phy distance 41 is out of range",
            ]
        );

        let occupied: Vec<_> = topology
            .slots
            .iter()
            .filter(|(_, slot)| !slot.is_vacant())
            .map(|(i, slot)| (i, slot.device_name.as_str(), slot.block_device_name.as_str()))
            .collect();
        assert_eq!(
            occupied,
            [(26, "0:0:0:0", "sda"), (27, "0:0:1:0", "sdb"), (54, "0:0:3:0", "sdc")]
        );
        assert_eq!(topology.slots.count(), 3);
        assert_eq!(
            topology.slots.get(26).unwrap().world_wide_id,
            "naa.5000c50000000sda"
        );

        assert_eq!(topology.expanders.count(), 3);
        let first = topology.expanders.get(0).unwrap();
        assert_eq!(first.device_name, "0:0:2:0");
        assert_eq!(first.world_wide_id64, 0x5000_c500_0000_003f);
        assert_eq!(first.enclosure_id, "0x500c0ff0000000ff");
        assert_eq!(topology.expanders.get(1).unwrap().device_name, "0:0:5:0");
        assert_eq!(topology.expanders.get(2).unwrap().device_name, "1:0:41:0");
        assert_eq!(topology.expanders.wwid64(3), 0);
    }

    #[test]
    fn enclosure_device_markers() {
        let sysfs = FakeSysfs::new();
        sysfs
            .marked_disk("2:0:0:0", "sda", "enclosure_device:ArrayDevice09")
            .marked_disk("2:0:1:0", "sdb", "enclosure_device:ArrayDevice00")
            .disk("2:0:2:0", "sdc")
            .expander("2:0:3:0", Some("0x5000c5000000003f"));

        let mut diagnostics = Vec::new();
        let topology = scan_scsi_topology(&sysfs.config(), &mut diagnostics);

        assert_eq!(topology.family, CardFamily::EnclosureDevice);
        assert_eq!(
            diagnostics,
            [
                "device [2:0:1:0] setting error: invalid enclosure device name \"enclosure_device:ArrayDevice00\""
            ]
        );
        assert_eq!(topology.slots.get(8).unwrap().block_device_name, "sda");
        // no phy-distance placement once markers are seen
        assert_eq!(topology.slots.count(), 1);
        assert_eq!(topology.expanders.count(), 1);
    }

    #[test]
    fn duplicate_bay_keeps_the_first_device() {
        let sysfs = FakeSysfs::new();
        sysfs
            .marked_disk("3:0:0:0", "sda", "enclosure_device:ArrayDevice05")
            .marked_disk("3:0:1:0", "sdb", "enclosure_device:ArrayDevice05");

        let mut diagnostics = Vec::new();
        let topology = scan_scsi_topology(&sysfs.config(), &mut diagnostics);

        assert_eq!(
            diagnostics,
            ["device [3:0:1:0] setting error: slot 4 already holds device [3:0:0:0]"]
        );
        assert_eq!(topology.slots.count(), 1);
        assert_eq!(topology.slots.get(4).unwrap().block_device_name, "sda");
    }

    #[test]
    fn missing_sysfs() {
        let dir = tempfile::tempdir().unwrap();
        let config = DiscoveryConfig {
            sysfs_root: dir.path().join("nothing"),
            ..DiscoveryConfig::default()
        };
        let mut diagnostics = Vec::new();
        let topology = scan_scsi_topology(&config, &mut diagnostics);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].contains("SCSI mid level"));
        assert_eq!(topology.slots.count(), 0);
        assert_eq!(topology.slots.len(), TopologyLayout::default().slot_count());
    }
}
