// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `<scsi/scsi_bsg_mpi3mr.h>` definitions.
//!
//! A packet is a fixed header followed by either a driver command or an MPT
//! command. An MPT command carries a list of buffer descriptors. The
//! descriptors split the bsg data-out and data-in transfers into their
//! parts, in descriptor order.

use bitfield_struct::bitfield;
use open_enum::open_enum;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// `MPI3MR_DRV_CMD`.
pub const MPI3MR_DRV_CMD: u8 = 1;
/// `MPI3MR_MPT_CMD`.
pub const MPI3MR_MPT_CMD: u8 = 2;

/// Driver command opcodes.
#[open_enum]
#[derive(Debug, Copy, Clone)]
#[repr(u8)]
pub enum DriverOpcode {
    /// `MPI3MR_DRVBSG_OPCODE_ADPINFO`.
    ADAPTER_INFO = 1,
    /// `MPI3MR_DRVBSG_OPCODE_ALLTGTDEVINFO`.
    ALL_TARGET_DEVICE_INFO = 4,
}

/// Buffer descriptor types.
#[open_enum]
#[derive(Debug, Copy, Clone)]
#[repr(u8)]
pub enum BufferType {
    /// `MPI3MR_BSG_BUFTYPE_DATA_IN`.
    DATA_IN = 3,
    /// `MPI3MR_BSG_BUFTYPE_DATA_OUT`.
    DATA_OUT = 4,
    /// `MPI3MR_BSG_BUFTYPE_MPI_REPLY`.
    MPI_REPLY = 5,
    /// `MPI3MR_BSG_BUFTYPE_ERR_RESPONSE`.
    ERR_RESPONSE = 6,
    /// `MPI3MR_BSG_BUFTYPE_MPI_REQUEST`.
    MPI_REQUEST = 0xfe,
}

impl BufferType {
    /// True for descriptors that consume part of the data-out transfer.
    pub fn is_out(self) -> bool {
        matches!(self, Self::DATA_OUT | Self::MPI_REQUEST)
    }
}

/// `struct mpi3mr_bsg_packet`, without the command union.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PacketHeader {
    /// [`MPI3MR_DRV_CMD`] or [`MPI3MR_MPT_CMD`].
    pub cmd_type: u8,
    /// Reserved.
    pub rsvd1: u8,
    /// Reserved.
    pub rsvd2: u16,
    /// Reserved.
    pub rsvd3: u32,
}

/// `struct mpi3mr_bsg_drv_cmd`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct DriverCommand {
    /// Controller ordinal.
    pub mrioc_id: u8,
    /// A [`DriverOpcode`].
    pub opcode: u8,
    /// Reserved.
    pub rsvd1: u16,
    /// Reserved.
    pub rsvd2: [u32; 4],
}

/// `struct mpi3mr_bsg_mptcmd`, without the descriptor list.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct MptCommandHeader {
    /// Timeout in seconds.
    pub timeout: u32,
    /// Reserved.
    pub rsvd1: u32,
    /// Controller ordinal.
    pub mrioc_id: u8,
    /// Reserved.
    pub rsvd2: u8,
    /// Reserved.
    pub rsvd3: u16,
}

/// `struct mpi3mr_buf_entry_list`, without the entries.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct BufferEntryListHeader {
    /// Number of descriptors that follow.
    pub num_of_entries: u8,
    /// Reserved.
    pub rsvd1: u8,
    /// Reserved.
    pub rsvd2: u16,
    /// Reserved.
    pub rsvd3: u32,
}

/// `struct mpi3mr_buf_entry`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct BufferEntry {
    /// A [`BufferType`].
    pub buf_type: u8,
    /// Reserved.
    pub rsvd1: u8,
    /// Reserved.
    pub rsvd2: u16,
    /// Length of this part.
    pub buf_len: u32,
}

const_assert_eq!(size_of::<PacketHeader>(), 8);
const_assert_eq!(size_of::<DriverCommand>(), 20);
const_assert_eq!(size_of::<MptCommandHeader>(), 12);
const_assert_eq!(size_of::<BufferEntryListHeader>(), 8);
const_assert_eq!(size_of::<BufferEntry>(), 8);

/// Offset of the first descriptor in an MPT command packet.
pub const MPT_PACKET_ENTRIES_OFFSET: usize = size_of::<PacketHeader>()
    + size_of::<MptCommandHeader>()
    + size_of::<BufferEntryListHeader>();

/// `sizeof(struct mpi3mr_bsg_packet)`: the union holds an MPT command with
/// one descriptor.
pub const MPI3MR_PACKET_LEN: usize = MPT_PACKET_ENTRIES_OFFSET + size_of::<BufferEntry>();

const_assert_eq!(MPT_PACKET_ENTRIES_OFFSET, 28);
const_assert_eq!(MPI3MR_PACKET_LEN, 36);

/// Length of an MPT command packet with `entries` descriptors.
pub const fn mpt_packet_len(entries: usize) -> usize {
    MPT_PACKET_ENTRIES_OFFSET + entries * size_of::<BufferEntry>()
}

/// PCI location bits of the adapter information.
#[bitfield(u16)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PciLocation {
    /// Device number.
    #[bits(5)]
    pub device: u8,
    /// Function number.
    #[bits(3)]
    pub function: u8,
    /// Bus number.
    #[bits(8)]
    pub bus: u8,
}

/// `struct mpi3_driver_info_layout`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct DriverInfo {
    /// Length of this structure.
    pub information_length: u32,
    /// Signature.
    pub driver_signature: [u8; 12],
    /// Host OS name.
    pub os_name: [u8; 16],
    /// Host OS version.
    pub os_version: [u8; 12],
    /// Driver name.
    pub driver_name: [u8; 20],
    /// Driver version.
    pub driver_version: [u8; 32],
    /// Driver release date.
    pub driver_release_date: [u8; 20],
    /// Driver capability bits.
    pub driver_capabilities: u32,
}

const_assert_eq!(size_of::<DriverInfo>(), 120);

/// `struct mpi3mr_bsg_in_adpinfo`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct AdapterInfo {
    /// Adapter type.
    pub adp_type: u32,
    /// Reserved.
    pub rsvd1: u32,
    /// PCI device id.
    pub pci_dev_id: u32,
    /// PCI revision.
    pub pci_dev_hw_rev: u32,
    /// PCI subsystem device id.
    pub pci_subsys_dev_id: u32,
    /// PCI subsystem vendor id.
    pub pci_subsys_ven_id: u32,
    /// Device, function and bus.
    pub pci_location: PciLocation,
    /// Reserved.
    pub rsvd2: u16,
    /// PCI segment.
    pub pci_seg_id: u32,
    /// Application interface version.
    pub app_intfc_ver: u32,
    /// Adapter state.
    pub adp_state: u8,
    /// Reserved.
    pub rsvd3: u8,
    /// Reserved.
    pub rsvd4: u16,
    /// Reserved.
    pub rsvd5: [u32; 2],
    /// Driver information.
    pub driver_info: DriverInfo,
}

const_assert_eq!(size_of::<AdapterInfo>(), 168);

/// `struct mpi3mr_device_map_info`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct DeviceMapInfo {
    /// Firmware device handle.
    pub handle: u16,
    /// Persistent id.
    pub perst_id: u16,
    /// SCSI target id.
    pub target_id: u32,
    /// SCSI bus id.
    pub bus_id: u8,
    /// Reserved.
    pub rsvd1: u8,
    /// Reserved.
    pub rsvd2: u16,
}

const_assert_eq!(size_of::<DeviceMapInfo>(), 12);

/// Device map entries fetched by the all-target-info command.
pub const MAX_TARGET_DEVICES: usize = 101;

/// `struct mpi3mr_all_tgt_info` with a fixed device map.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct AllTargetInfo {
    /// Valid entries in `devices`.
    pub num_devices: u16,
    /// Reserved.
    pub rsvd1: u16,
    /// Reserved.
    pub rsvd2: u32,
    /// The device map.
    pub devices: [DeviceMapInfo; MAX_TARGET_DEVICES],
}

const_assert_eq!(size_of::<AllTargetInfo>(), 1220);

/// Returns the text of a fixed size, NUL padded string field.
pub fn fixed_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).trim_end().to_owned()
}
