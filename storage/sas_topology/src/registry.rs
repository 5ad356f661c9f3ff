// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The slot and expander tables filled by discovery.

use crate::TopologyLayout;
use crate::mapping::MappingError;
use smp_protocol::PhyDiscoveryRecord;
use smp_transport::TransportKind;
use std::path::Path;
use std::path::PathBuf;

/// How a slot is labelled for display.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LabelStyle {
    /// The last 16 characters of the device's world-wide id.
    Wwid,
    /// `N. sdX`
    #[default]
    Block,
    /// `N. h:c:t:l`
    Name,
}

/// A drive bay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotEntry {
    /// The HCTL name of the device in the bay; empty when none was mapped.
    pub device_name: String,
    /// The device's `wwid` attribute.
    pub world_wide_id: String,
    /// The block device name, `sda` etc.
    pub block_device_name: String,
    /// The DISCOVER response of the expander phy wired to the bay.
    pub last_discovery: Option<PhyDiscoveryRecord>,
}

impl SlotEntry {
    /// True when no device was mapped to the bay.
    pub fn is_vacant(&self) -> bool {
        self.device_name.is_empty()
    }

    /// The expander phy wired to the bay, from the last DISCOVER response.
    pub fn phy_id(&self) -> Option<u8> {
        self.last_discovery
            .as_ref()
            .filter(|record| record.response_len > 9)
            .map(|record| record.phy_id)
    }

    /// The display label of the bay at `index`.
    pub fn label(&self, style: LabelStyle, index: usize) -> String {
        if self.is_vacant() {
            return format!("Slot {}", index + 1);
        }
        match style {
            LabelStyle::Wwid => {
                let start = self.world_wide_id.len().saturating_sub(16);
                self.world_wide_id
                    .get(start..)
                    .unwrap_or(&self.world_wide_id)
                    .to_owned()
            }
            LabelStyle::Block => format!("{}. {}", index + 1, self.block_device_name),
            LabelStyle::Name => format!("{}. {}", index + 1, self.device_name),
        }
    }
}

/// The drive bays of all expanders, `expanders * slots_per_expander` of them.
#[derive(Debug, Clone)]
pub struct SlotRegistry {
    slots: Vec<SlotEntry>,
    count: usize,
    empty: SlotEntry,
}

impl SlotRegistry {
    /// An empty registry for `layout`.
    pub fn new(layout: &TopologyLayout) -> Self {
        Self {
            slots: vec![SlotEntry::default(); layout.slot_count()],
            count: 0,
            empty: SlotEntry::default(),
        }
    }

    /// The bay at `index`.
    pub fn get(&self, index: usize) -> Option<&SlotEntry> {
        self.slots.get(index)
    }

    /// The bay at `index`, or an empty entry when the index is out of range.
    ///
    /// Prefer [`Self::get`]; this exists for callers that index blindly.
    pub fn slot_or_default(&self, index: usize) -> &SlotEntry {
        self.slots.get(index).unwrap_or_else(|| {
            tracing::warn!(index, "incorrect device slot indexing");
            &self.empty
        })
    }

    /// True when `index` is a bay with no device. Out of range indices are
    /// not vacant.
    pub fn is_vacant(&self, index: usize) -> bool {
        self.get(index).is_some_and(SlotEntry::is_vacant)
    }

    /// Number of devices mapped.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of bays.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the layout has no bays.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The bays with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SlotEntry)> {
        self.slots.iter().enumerate()
    }

    /// Forgets every device and discovery result.
    pub fn clear(&mut self) {
        self.slots.fill(SlotEntry::default());
        self.count = 0;
    }

    /// Places a device in the bay at `index`. An occupied bay keeps its
    /// device.
    pub(crate) fn assign(
        &mut self,
        index: usize,
        device_name: String,
        world_wide_id: String,
        block_device_name: String,
    ) -> Result<(), MappingError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(MappingError::SlotOutOfRange(index))?;
        if !slot.is_vacant() {
            return Err(MappingError::SlotOccupied {
                slot: index,
                device: slot.device_name.clone(),
            });
        }
        slot.device_name = device_name;
        slot.world_wide_id = world_wide_id;
        slot.block_device_name = block_device_name;
        self.count += 1;
        Ok(())
    }

    /// Records the DISCOVER response for the bay at `index`.
    pub(crate) fn set_discovery(&mut self, index: usize, record: PhyDiscoveryRecord) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        slot.last_discovery = Some(record);
        true
    }
}

/// An expander and the transport that reaches it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpanderEntry {
    /// The HCTL name of the expander's enclosure services node.
    pub device_name: String,
    /// The expander SAS address.
    pub world_wide_id64: u64,
    /// The logical id of the attached enclosure.
    pub enclosure_id: String,
    /// The node SMP requests to this expander go through.
    pub bound_transport_path: Option<PathBuf>,
    /// The kind of the bound node.
    pub bound_transport_kind: Option<TransportKind>,
    /// The controller ordinal of the bound node.
    pub controller_ordinal: Option<u8>,
    /// The device name of the HBA port attached to the expander.
    pub attached_initiator_name: Option<u64>,
    /// The DISCOVER response of the phy linking to the HBA.
    pub last_discovery: Option<PhyDiscoveryRecord>,
}

/// The expanders, indexed by [`assign_expander`](crate::assign_expander).
#[derive(Debug, Clone)]
pub struct ExpanderRegistry {
    expanders: Vec<ExpanderEntry>,
    count: usize,
    empty: ExpanderEntry,
}

impl ExpanderRegistry {
    /// An empty registry for `layout`.
    pub fn new(layout: &TopologyLayout) -> Self {
        Self {
            expanders: vec![ExpanderEntry::default(); layout.expanders],
            count: 0,
            empty: ExpanderEntry::default(),
        }
    }

    /// The expander at `index`.
    pub fn get(&self, index: usize) -> Option<&ExpanderEntry> {
        self.expanders.get(index)
    }

    /// The expander at `index`, or an empty entry when the index is out of
    /// range.
    pub fn expander_or_default(&self, index: usize) -> &ExpanderEntry {
        self.expanders.get(index).unwrap_or_else(|| {
            tracing::warn!(index, "incorrect expander indexing");
            &self.empty
        })
    }

    /// The expander SAS address at `index`, zero when unknown.
    pub fn wwid64(&self, index: usize) -> u64 {
        self.get(index).map_or(0, |entry| entry.world_wide_id64)
    }

    /// Number of expanders found in sysfs.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.expanders.len()
    }

    /// True when the layout has no expanders.
    pub fn is_empty(&self) -> bool {
        self.expanders.is_empty()
    }

    /// The expanders with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ExpanderEntry)> {
        self.expanders.iter().enumerate()
    }

    /// Forgets every expander.
    pub fn clear(&mut self) {
        self.expanders.fill(ExpanderEntry::default());
        self.count = 0;
    }

    /// Registers the expander `device_name` found in sysfs at `index`.
    pub(crate) fn set_controller(
        &mut self,
        index: usize,
        device_name: String,
        wwid: u64,
        enclosure_id: String,
    ) -> bool {
        let Some(entry) = self.expanders.get_mut(index) else {
            return false;
        };
        entry.device_name = device_name;
        entry.world_wide_id64 = wwid;
        entry.enclosure_id = enclosure_id;
        self.count += 1;
        true
    }

    /// Binds the node reaching the expander at `index`.
    pub(crate) fn bind(
        &mut self,
        index: usize,
        path: &Path,
        kind: TransportKind,
        controller_ordinal: Option<u8>,
    ) -> Option<&mut ExpanderEntry> {
        let entry = self.expanders.get_mut(index)?;
        entry.bound_transport_path = Some(path.to_owned());
        entry.bound_transport_kind = Some(kind);
        entry.controller_ordinal = controller_ordinal;
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied() -> SlotEntry {
        SlotEntry {
            device_name: "0:0:5:0".into(),
            world_wide_id: "naa.5000c500a1b2c3d4e5f60718".into(),
            block_device_name: "sdc".into(),
            last_discovery: None,
        }
    }

    #[test]
    fn labels() {
        let slot = occupied();
        assert_eq!(slot.label(LabelStyle::Wwid, 4), "a1b2c3d4e5f60718");
        assert_eq!(slot.label(LabelStyle::Block, 4), "5. sdc");
        assert_eq!(slot.label(LabelStyle::Name, 4), "5. 0:0:5:0");
        assert_eq!(SlotEntry::default().label(LabelStyle::Block, 4), "Slot 5");

        let short = SlotEntry {
            world_wide_id: "t10.ATA".into(),
            ..occupied()
        };
        assert_eq!(short.label(LabelStyle::Wwid, 0), "t10.ATA");
    }

    #[test]
    fn slot_accessors() {
        let layout = TopologyLayout::default();
        let mut slots = SlotRegistry::new(&layout);
        assert_eq!(slots.len(), 112);
        slots
            .assign(53, "0:0:5:0".into(), String::new(), "sdc".into())
            .unwrap();
        assert!(matches!(
            slots.assign(112, "0:0:6:0".into(), String::new(), String::new()),
            Err(MappingError::SlotOutOfRange(112))
        ));
        let err = slots
            .assign(53, "0:0:7:0".into(), String::new(), "sdd".into())
            .unwrap_err();
        assert_eq!(err.to_string(), "slot 53 already holds device [0:0:5:0]");
        assert_eq!(slots.count(), 1);
        assert_eq!(slots.get(53).unwrap().block_device_name, "sdc");

        assert!(!slots.is_vacant(53));
        assert!(slots.is_vacant(52));
        assert!(!slots.is_vacant(500));
        assert_eq!(slots.get(53).unwrap().device_name, "0:0:5:0");
        assert!(slots.get(112).is_none());

        // out of range reads fall back to an empty entry
        assert_eq!(slots.slot_or_default(112), &SlotEntry::default());
        assert_eq!(slots.slot_or_default(53).block_device_name, "sdc");

        assert_eq!(
            slots.iter().filter(|(_, slot)| !slot.is_vacant()).count(),
            1
        );
        slots.clear();
        assert_eq!(slots.count(), 0);
        assert!(slots.is_vacant(53));
    }

    #[test]
    fn expander_accessors() {
        let layout = TopologyLayout::default();
        let mut expanders = ExpanderRegistry::new(&layout);
        assert!(expanders.set_controller(1, "0:0:30:0".into(), 0x5000_c500_0000_007f, "id".into()));
        assert!(!expanders.set_controller(4, "1:0:30:0".into(), 1, String::new()));
        assert_eq!(expanders.count(), 1);
        assert_eq!(expanders.wwid64(1), 0x5000_c500_0000_007f);
        assert_eq!(expanders.wwid64(9), 0);
        assert_eq!(expanders.expander_or_default(9), &ExpanderEntry::default());

        let path = Path::new("/dev/bsg/expander-0:1");
        let entry = expanders
            .bind(1, path, TransportKind::PassthroughV4, None)
            .unwrap();
        entry.attached_initiator_name = Some(0x5000_0000_0000_0001);
        assert!(expanders.bind(7, path, TransportKind::PassthroughV4, None).is_none());
        assert_eq!(
            expanders.get(1).unwrap().bound_transport_path.as_deref(),
            Some(path)
        );

        expanders.clear();
        assert_eq!(expanders.count(), 0);
        assert_eq!(expanders.get(1), Some(&ExpanderEntry::default()));
    }
}
