// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Translation of device and expander addressing into slot indices.

use crate::TopologyLayout;
use hctl::HctlAddress;
use thiserror::Error;

/// Errors placing a device or expander in the registries.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The device name is not an HCTL address.
    #[error("invalid device address")]
    Address(#[from] hctl::ParseHctlError),
    /// The device and the expander are on different hosts or channels.
    #[error("device {device} and expander {expander} are not on the same bus")]
    HostChannelMismatch {
        /// The device.
        device: HctlAddress,
        /// The expander.
        expander: HctlAddress,
    },
    /// The phy distance is outside `1..=slots_per_expander`.
    #[error("phy distance {0} is out of range")]
    OffsetOutOfRange(i64),
    /// The expander index is beyond the registry.
    #[error("expander index {0} is out of range")]
    ExpanderOutOfRange(usize),
    /// The enclosure device marker does not end in a hex bay number.
    #[error("invalid enclosure device name {0:?}")]
    InvalidEnclosureDeviceName(String),
    /// The slot index is beyond the registry.
    #[error("slot {0} is out of range")]
    SlotOutOfRange(usize),
    /// Another device was already mapped to the slot.
    #[error("slot {slot} already holds device [{device}]")]
    SlotOccupied {
        /// The slot index.
        slot: usize,
        /// The device already in the slot.
        device: String,
    },
}

/// Returns the phy distance between a device and the expander enumerated
/// after it, `expander.target - device.target`.
pub fn compute_slot_offset(
    device: &HctlAddress,
    expander: &HctlAddress,
    layout: &TopologyLayout,
) -> Result<u32, MappingError> {
    if !device.same_bus(expander) {
        return Err(MappingError::HostChannelMismatch {
            device: *device,
            expander: *expander,
        });
    }
    let offset = i64::from(expander.target) - i64::from(device.target);
    if offset < 1 || offset > layout.slots_per_expander as i64 {
        return Err(MappingError::OffsetOutOfRange(offset));
    }
    Ok(offset as u32)
}

/// Returns the slot of the device `offset` phys before expander `expander`.
pub fn assign_slot(
    layout: &TopologyLayout,
    expander: usize,
    offset: u32,
) -> Result<usize, MappingError> {
    if expander >= layout.expanders {
        return Err(MappingError::ExpanderOutOfRange(expander));
    }
    let offset = offset as usize;
    if offset == 0 || offset > layout.slots_per_expander {
        return Err(MappingError::OffsetOutOfRange(offset as i64));
    }
    Ok((expander + 1) * layout.slots_per_expander - offset)
}

/// Returns the expander index encoded in bits 6 and 7 of its world-wide id.
pub fn assign_expander(wwid: u64) -> usize {
    ((wwid & 0xff) >> 6) as usize
}

/// Returns the slot of an `enclosure_device:ArrayDeviceNN` marker, `NN` being
/// the one-based hex bay number.
pub fn array_device_slot(name: &str) -> Result<usize, MappingError> {
    let invalid = || MappingError::InvalidEnclosureDeviceName(name.to_owned());
    let digits = name
        .len()
        .checked_sub(2)
        .and_then(|start| name.get(start..))
        .ok_or_else(invalid)?;
    let bay = usize::from_str_radix(digits, 16).map_err(|_| invalid())?;
    bay.checked_sub(1).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> HctlAddress {
        text.parse().unwrap()
    }

    #[test]
    fn slot_offsets() {
        let layout = TopologyLayout::default();
        assert_eq!(
            compute_slot_offset(&addr("0:0:3:0"), &addr("0:0:7:0"), &layout).unwrap(),
            4
        );
        assert!(matches!(
            compute_slot_offset(&addr("0:0:3:0"), &addr("1:0:7:0"), &layout),
            Err(MappingError::HostChannelMismatch { .. })
        ));
        assert!(matches!(
            compute_slot_offset(&addr("0:0:7:0"), &addr("0:0:7:0"), &layout),
            Err(MappingError::OffsetOutOfRange(0))
        ));
        assert!(matches!(
            compute_slot_offset(&addr("0:0:0:0"), &addr("0:0:29:0"), &layout),
            Err(MappingError::OffsetOutOfRange(29))
        ));
        assert_eq!(
            compute_slot_offset(&addr("0:0:1:0"), &addr("0:0:29:0"), &layout).unwrap(),
            28
        );
    }

    #[test]
    fn slots() {
        let layout = TopologyLayout::default();
        assert_eq!(assign_slot(&layout, 1, 3).unwrap(), 53);
        assert_eq!(assign_slot(&layout, 0, 28).unwrap(), 0);
        assert_eq!(assign_slot(&layout, 3, 1).unwrap(), 111);
        assert!(matches!(
            assign_slot(&layout, 4, 1),
            Err(MappingError::ExpanderOutOfRange(4))
        ));
        assert!(matches!(
            assign_slot(&layout, 0, 0),
            Err(MappingError::OffsetOutOfRange(0))
        ));
    }

    #[test]
    fn expanders() {
        assert_eq!(assign_expander(0x5000_c500_0000_003f), 0);
        assert_eq!(assign_expander(0x5000_c500_0000_007f), 1);
        assert_eq!(assign_expander(0x5000_c500_0000_00bf), 2);
        assert_eq!(assign_expander(0x5000_c500_0000_00ff), 3);
    }

    #[test]
    fn array_devices() {
        assert_eq!(array_device_slot("enclosure_device:ArrayDevice09").unwrap(), 8);
        assert_eq!(array_device_slot("enclosure_device:ArrayDevice1c").unwrap(), 27);
        assert!(array_device_slot("enclosure_device:ArrayDevice00").is_err());
        assert!(array_device_slot("enclosure_device:Slot zz").is_err());
        assert!(array_device_slot("9").is_err());
    }
}
