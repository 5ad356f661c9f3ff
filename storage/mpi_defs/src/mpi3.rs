// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! MPI 3 message and configuration page layouts.

use open_enum::open_enum;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// An MPI 3 function code.
#[open_enum]
#[derive(Debug, Copy, Clone)]
#[repr(u8)]
pub enum Mpi3Function {
    /// `MPI3_FUNCTION_IOC_FACTS`.
    IOC_FACTS = 0x01,
    /// `MPI3_FUNCTION_CONFIG`.
    CONFIG = 0x04,
    /// `MPI3_FUNCTION_SCSI_IO`.
    SCSI_IO = 0x20,
    /// `MPI3_FUNCTION_SMP_PASSTHROUGH`.
    SMP_PASSTHROUGH = 0x22,
}

/// `MPI3_CONFIG_ACTION_PAGE_HEADER`.
pub const MPI3_CONFIG_ACTION_PAGE_HEADER: u8 = 0x00;
/// `MPI3_CONFIG_ACTION_READ_CURRENT`.
pub const MPI3_CONFIG_ACTION_READ_CURRENT: u8 = 0x02;

/// `MPI3_CONFIG_PAGETYPE_ENCLOSURE`.
pub const MPI3_CONFIG_PAGETYPE_ENCLOSURE: u8 = 0x11;
/// `MPI3_CONFIG_PAGETYPE_SAS_EXPANDER`.
pub const MPI3_CONFIG_PAGETYPE_SAS_EXPANDER: u8 = 0x31;

/// Personality bits of [`IocFactsData::flags`].
pub const MPI3_IOCFACTS_FLAGS_PERSONALITY_MASK: u32 = 0x0000_000c;
/// Enhanced HBA personality.
pub const MPI3_IOCFACTS_FLAGS_PERSONALITY_EHBA: u32 = 0x0000_0000;
/// RAID personality.
pub const MPI3_IOCFACTS_FLAGS_PERSONALITY_RAID_DDR: u32 = 0x0000_0008;

/// `MPI3_SCSIIO_FLAGS_DATADIRECTION_READ`.
pub const MPI3_SCSIIO_FLAGS_DATADIRECTION_READ: u32 = 0x0008_0000;

/// `struct mpi3_ioc_facts_request`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[expect(missing_docs)] // mirrors the firmware header
pub struct IocFactsRequest {
    pub host_tag: u16,
    pub ioc_use_only02: u8,
    pub function: u8,
    pub ioc_use_only04: u16,
    pub ioc_use_only06: u8,
    pub msg_flags: u8,
    pub change_count: u16,
    pub reserved0a: u16,
    pub reserved0c: u32,
    pub sgl: [u8; 16],
}

const_assert_eq!(size_of::<IocFactsRequest>(), 32);

/// `union mpi3_version_union`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[expect(missing_docs)] // mirrors the firmware header
pub struct Mpi3Version {
    pub dev: u8,
    pub unit: u8,
    pub minor: u8,
    pub major: u8,
}

/// `struct mpi3_comp_image_version`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[expect(missing_docs)] // mirrors the firmware header
pub struct ComponentImageVersion {
    pub build_num: u16,
    pub customer_id: u16,
    pub phase_minor: u8,
    pub phase_major: u8,
    pub gen_minor: u8,
    pub gen_major: u8,
}

/// `struct mpi3_ioc_facts_data`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[expect(missing_docs)] // mirrors the firmware header
pub struct IocFactsData {
    /// Length of the data in dwords.
    pub ioc_facts_data_length: u16,
    pub reserved02: u16,
    pub mpi_version: Mpi3Version,
    pub fw_version: ComponentImageVersion,
    pub ioc_capabilities: u32,
    pub ioc_number: u8,
    pub who_init: u8,
    pub max_msix_vectors: u16,
    pub max_outstanding_requests: u16,
    pub product_id: u16,
    pub ioc_request_frame_size: u16,
    /// Reply frame size in dwords.
    pub reply_frame_size: u16,
    pub ioc_exceptions: u16,
    pub max_persistent_id: u16,
    pub sge_modifier_mask: u8,
    pub sge_modifier_value: u8,
    pub sge_modifier_shift: u8,
    pub protocol_flags: u8,
    pub max_sas_initiators: u16,
    pub reserved2a: u16,
    pub max_sas_expanders: u16,
    pub max_enclosures: u16,
    pub min_dev_handle: u16,
    pub max_dev_handle: u16,
    pub max_pcie_switches: u16,
    pub max_nvme: u16,
    pub reserved38: u16,
    pub max_vds: u16,
    pub max_host_pds: u16,
    pub max_adv_host_pds: u16,
    pub max_raid_pds: u16,
    pub max_posted_cmd_buffers: u16,
    pub flags: u32,
    pub max_operational_request_queues: u16,
    pub max_operational_reply_queues: u16,
    pub shutdown_timeout: u16,
    pub reserved4e: u16,
    pub diag_trace_size: u32,
    pub diag_fw_size: u32,
    pub diag_driver_size: u32,
    pub max_host_pd_ns_count: u8,
    pub max_adv_host_pd_ns_count: u8,
    pub max_raidpd_ns_count: u8,
    pub max_devices_per_throttle_group: u8,
    pub io_throttle_data_length: u16,
    pub max_io_throttle_group: u16,
    pub io_throttle_low: u16,
    pub io_throttle_high: u16,
}

const_assert_eq!(size_of::<IocFactsData>(), 104);

/// `struct mpi3_config_request`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[expect(missing_docs)] // mirrors the firmware header
pub struct ConfigRequest {
    pub host_tag: u16,
    pub ioc_use_only02: u8,
    pub function: u8,
    pub ioc_use_only04: u16,
    pub ioc_use_only06: u8,
    pub msg_flags: u8,
    pub change_count: u16,
    pub reserved0a: u16,
    pub page_version: u8,
    pub page_number: u8,
    pub page_type: u8,
    pub action: u8,
    /// The form and handle selecting the page instance.
    pub page_address: u32,
    /// Zero for a header read.
    pub page_length: u16,
    pub reserved16: u16,
    pub reserved18: [u32; 2],
    pub sgl: [u8; 16],
}

const_assert_eq!(size_of::<ConfigRequest>(), 48);

/// `struct mpi3_config_page_header`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[expect(missing_docs)] // mirrors the firmware header
pub struct ConfigPageHeader {
    pub page_version: u8,
    pub reserved01: u8,
    pub page_number: u8,
    pub page_attribute: u8,
    pub page_length: u16,
    pub page_type: u8,
    pub reserved07: u8,
}

const_assert_eq!(size_of::<ConfigPageHeader>(), 8);

/// `struct mpi3_enclosure_page0`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[expect(missing_docs)] // mirrors the firmware header
pub struct EnclosurePage0 {
    pub header: ConfigPageHeader,
    pub enclosure_logical_id: u64,
    pub flags: u16,
    /// Handle of this enclosure; the next page is addressed by it.
    pub enclosure_handle: u16,
    pub num_slots: u16,
    pub start_slot: u16,
    pub io_unit_port: u8,
    pub enclosure_level: u8,
    /// Device handle of the SCSI enclosure processor, or zero.
    pub sep_dev_handle: u16,
    pub chassis_slot: u8,
    pub reserved1d: [u8; 3],
}

const_assert_eq!(size_of::<EnclosurePage0>(), 32);

/// `struct mpi3_sas_expander_page0`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[expect(missing_docs)] // mirrors the firmware header
pub struct SasExpanderPage0 {
    pub header: ConfigPageHeader,
    pub io_unit_port: u8,
    pub report_gen_length: u8,
    pub enclosure_handle: u16,
    pub reserved0c: u32,
    pub sas_address: u64,
    pub discovery_status: u32,
    /// Device handle of this expander; the next page is addressed by it.
    pub dev_handle: u16,
    pub parent_dev_handle: u16,
    pub expander_change_count: u16,
    pub expander_route_indexes: u16,
    pub num_phys: u8,
    pub sas_level: u8,
    pub flags: u16,
    pub stp_bus_inactivity_time_limit: u16,
    pub stp_max_connect_time_limit: u16,
    pub stp_smp_nexus_loss_time: u16,
    pub max_num_routed_sas_addresses: u16,
    pub active_zone_manager_sas_address: u64,
    pub zone_lock_inactivity_limit: u16,
    pub reserved3a: u16,
    pub time_to_reduced_func: u8,
    pub initial_time_to_reduced_func: u8,
    pub max_reduced_func_time: u8,
    pub exp_status: u8,
}

const_assert_eq!(size_of::<SasExpanderPage0>(), 64);

/// `struct mpi3_scsi_io_request`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[expect(missing_docs)] // mirrors the firmware header
pub struct ScsiIoRequest {
    pub host_tag: u16,
    pub ioc_use_only02: u8,
    pub function: u8,
    pub ioc_use_only04: u16,
    pub ioc_use_only06: u8,
    pub msg_flags: u8,
    pub change_count: u16,
    pub dev_handle: u16,
    pub flags: u32,
    pub skip_count: u32,
    pub data_length: u32,
    pub lun: [u8; 8],
    pub cdb: [u8; 32],
    pub sgl: [u8; 64],
}

const_assert_eq!(size_of::<ScsiIoRequest>(), 128);

/// `struct mpi3_smp_passthrough_request`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[expect(missing_docs)] // mirrors the firmware header
pub struct SmpPassthroughRequest {
    pub host_tag: u16,
    pub ioc_use_only02: u8,
    pub function: u8,
    pub ioc_use_only04: u16,
    pub ioc_use_only06: u8,
    pub msg_flags: u8,
    pub change_count: u16,
    pub reserved0a: u8,
    pub io_unit_port: u8,
    pub reserved0c: u32,
    pub sas_address: u64,
    pub request_sge: [u8; 16],
    pub response_sge: [u8; 16],
}

const_assert_eq!(size_of::<SmpPassthroughRequest>(), 56);

/// `struct mpi3_smp_passthrough_reply`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[expect(missing_docs)] // mirrors the firmware header
pub struct SmpPassthroughReply {
    pub host_tag: u16,
    pub ioc_use_only02: u8,
    pub function: u8,
    pub ioc_use_only04: u16,
    pub ioc_use_only06: u8,
    pub msg_flags: u8,
    pub ioc_use_only08: u16,
    pub ioc_status: u16,
    pub ioc_log_info: u32,
    /// SMP response length in bytes.
    pub response_data_length: u16,
    pub reserved12: u16,
}

const_assert_eq!(size_of::<SmpPassthroughReply>(), 20);

/// Reply area reserved for IOC facts and config requests.
pub const MPI3_SHORT_REPLY_LEN: usize = 21;
/// Reply area reserved for SCSI I/O requests.
pub const MPI3_SCSI_IO_REPLY_LEN: usize = 61;
/// Sense area reserved for SCSI I/O requests.
pub const MPI3_SCSI_IO_ERR_RESPONSE_LEN: usize = 252;

/// The page address form that selects the first instance of a page.
pub const MPI3_FIRST_PAGE_FORM: u32 = 0xffff;

/// The io unit port used for SMP passthrough: any port.
pub const MPI3_SMP_ANY_IO_UNIT_PORT: u8 = 0xff;

/// SCSI READ BUFFER, mode 1 (vendor specific), buffer id `0xe6`, offset
/// `0xff0f00`, reading `len` bytes.
pub fn read_buffer_cdb(len: u16) -> [u8; 9] {
    [
        0x3c,
        0x01,
        0xe6,
        0xff,
        0x0f,
        0x00,
        len as u8,
        (len >> 8) as u8,
        0x00,
    ]
}
