// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The `mptctl` / `mpt3ctl` ioctl interface and the MPI SMP passthrough
//! message it carries.

use open_enum::open_enum;
use static_assertions::const_assert_eq;
use std::mem::offset_of;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Character device major of the mpt control nodes.
pub const MPT_DEV_MAJOR: u32 = 10;
/// Minor of the first-generation `mptctl` node.
pub const MPT_DEV_MINOR: u32 = 220;
/// Minor of the `mpt2ctl` node.
pub const MPT2_DEV_MINOR: u32 = 221;
/// Minor of the `mpt3ctl` node.
pub const MPT3_DEV_MINOR: u32 = 222;

/// Ioctl type of `MPTCOMMAND`.
pub const MPT_MAGIC_NUMBER: u8 = b'm';
/// Ioctl type of `MPT2COMMAND`, shared by `mpt3ctl`.
pub const MPT2_MAGIC_NUMBER: u8 = b'L';
/// Ioctl number of both command ioctls.
pub const MPT_COMMAND_NR: u8 = 20;

/// Reply frame buffer size handed to the driver.
pub const MPT_REPLY_FRAME_LEN: usize = 1200;

/// `struct mpt_ioctl_header`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct MptIoctlHeader {
    /// IOC (controller) number.
    pub iocnum: u32,
    /// Port number, always zero.
    pub port: u32,
    /// Size of the whole ioctl block.
    pub max_data_size: i32,
}

/// `struct mpt_ioctl_command`. The MPI request frame starts at `mf` and
/// runs past the end of the structure.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct MptIoctlCommand {
    /// Common header.
    pub hdr: MptIoctlHeader,
    /// Timeout in seconds, zero for the driver default.
    pub timeout: i32,
    /// User address of the reply frame buffer.
    pub reply_frame_buf_ptr: u64,
    /// User address of the data-in buffer.
    pub data_in_buf_ptr: u64,
    /// User address of the data-out buffer.
    pub data_out_buf_ptr: u64,
    /// User address of the sense buffer.
    pub sense_data_ptr: u64,
    /// Capacity of the reply frame buffer.
    pub max_reply_bytes: i32,
    /// Bytes to read.
    pub data_in_size: i32,
    /// Bytes to write.
    pub data_out_size: i32,
    /// Capacity of the sense buffer.
    pub max_sense_bytes: i32,
    /// Offset of the SGL in the message frame, in dwords.
    pub data_sge_offset: i32,
    /// First bytes of the message frame.
    pub mf: [u8; 4],
}

const_assert_eq!(size_of::<MptIoctlCommand>(), 72);

/// Offset of the message frame within the ioctl block.
pub const MPT_MF_OFFSET: usize = offset_of!(MptIoctlCommand, mf);

const_assert_eq!(MPT_MF_OFFSET, 68);

/// MPI function code of an SMP passthrough.
pub const MPI_FUNCTION_SMP_PASSTHROUGH: u8 = 0x1a;

/// `SGE_SIMPLE64`: a flags/length word and a 64-bit address, four byte
/// aligned.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SgeSimple64 {
    /// Flags and length.
    pub flags_length: u32,
    /// Low half of the address.
    pub address_low: u32,
    /// High half of the address.
    pub address_high: u32,
}

const_assert_eq!(size_of::<SgeSimple64>(), 12);

/// `MSG_SMP_PASSTHROUGH_REQUEST`, with room for the two SGEs the driver
/// fills in.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SmpPassthroughRequest {
    /// Bit 7 set returns the payload in the reply.
    pub passthrough_flags: u8,
    /// Physical port.
    pub physical_port: u8,
    /// Chain offset.
    pub chain_offset: u8,
    /// [`MPI_FUNCTION_SMP_PASSTHROUGH`].
    pub function: u8,
    /// SMP request length, CRC excluded.
    pub request_data_length: u16,
    /// Connection rate.
    pub connection_rate: u8,
    /// Message flags.
    pub msg_flags: u8,
    /// Message context.
    pub msg_context: u32,
    /// Reserved.
    pub reserved1: u32,
    /// SAS address of the SMP target.
    pub sas_address: u64,
    /// Reserved.
    pub reserved2: u32,
    /// Reserved.
    pub reserved3: u32,
    /// Request and response SGEs.
    pub sgl: [SgeSimple64; 2],
}

const_assert_eq!(size_of::<SmpPassthroughRequest>(), 56);

/// Offset of the SGL within [`SmpPassthroughRequest`].
pub const SMP_PASSTHROUGH_SGL_OFFSET: usize = offset_of!(SmpPassthroughRequest, sgl);

const_assert_eq!(SMP_PASSTHROUGH_SGL_OFFSET, 32);

/// `MSG_SMP_PASSTHROUGH_REPLY`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SmpPassthroughReply {
    /// Passthrough flags.
    pub passthrough_flags: u8,
    /// Physical port.
    pub physical_port: u8,
    /// Message length.
    pub msg_length: u8,
    /// Function.
    pub function: u8,
    /// SMP response length.
    pub response_data_length: u16,
    /// Reserved.
    pub reserved1: u8,
    /// Message flags.
    pub msg_flags: u8,
    /// Message context.
    pub msg_context: u32,
    /// Reserved.
    pub reserved2: u8,
    /// SAS status of the exchange.
    pub sas_status: u8,
    /// IOC status of the exchange.
    pub ioc_status: u16,
    /// IOC log information.
    pub ioc_log_info: u32,
    /// Reserved.
    pub reserved3: u32,
    /// Inline response data.
    pub response_data: [u8; 4],
}

const_assert_eq!(size_of::<SmpPassthroughReply>(), 28);

/// The status bits of `IOCStatus`.
pub const MPI_IOCSTATUS_MASK: u16 = 0x7fff;

/// An MPI IOC status, masked.
#[open_enum]
#[derive(Debug, Copy, Clone)]
#[repr(u16)]
pub enum IocStatus {
    /// `MPI_IOCSTATUS_SUCCESS`.
    SUCCESS = 0x0000,
    /// `MPI_IOCSTATUS_SCSI_DEVICE_NOT_THERE`.
    SCSI_DEVICE_NOT_THERE = 0x0043,
    /// `MPI_IOCSTATUS_SAS_SMP_REQUEST_FAILED`.
    SAS_SMP_REQUEST_FAILED = 0x0090,
    /// `MPI_IOCSTATUS_SAS_SMP_DATA_OVERRUN`.
    SAS_SMP_DATA_OVERRUN = 0x0091,
}

impl IocStatus {
    /// Masks the log-info-available bit off a raw status.
    pub fn from_raw(raw: u16) -> Self {
        Self(raw & MPI_IOCSTATUS_MASK)
    }

    /// A description of the SMP related codes.
    pub fn description(self) -> Option<&'static str> {
        Some(match self {
            Self::SUCCESS => "success",
            Self::SAS_SMP_REQUEST_FAILED => "SMP request failed",
            Self::SAS_SMP_DATA_OVERRUN => "SMP data overrun",
            Self::SCSI_DEVICE_NOT_THERE => "device not there",
            _ => return None,
        })
    }
}

/// The `SASStatus` of an SMP passthrough reply.
#[open_enum]
#[derive(Debug, Copy, Clone)]
#[repr(u8)]
pub enum SasStatus {
    /// `MPI_SASSTATUS_SUCCESS`.
    SUCCESS = 0x00,
    /// `MPI_SASSTATUS_UNKNOWN_ERROR`.
    UNKNOWN_ERROR = 0x01,
    /// `MPI_SASSTATUS_INVALID_FRAME`.
    INVALID_FRAME = 0x02,
    /// `MPI_SASSTATUS_UTC_BAD_DEST`.
    UTC_BAD_DEST = 0x03,
    /// `MPI_SASSTATUS_UTC_BREAK_RECEIVED`.
    UTC_BREAK_RECEIVED = 0x04,
    /// `MPI_SASSTATUS_UTC_CONNECT_RATE_NOT_SUPPORTED`.
    UTC_CONNECT_RATE_NOT_SUPPORTED = 0x05,
    /// `MPI_SASSTATUS_UTC_PORT_LAYER_REQUEST`.
    UTC_PORT_LAYER_REQUEST = 0x06,
    /// `MPI_SASSTATUS_UTC_PROTOCOL_NOT_SUPPORTED`.
    UTC_PROTOCOL_NOT_SUPPORTED = 0x07,
    /// `MPI_SASSTATUS_UTC_STP_RESOURCES_BUSY`.
    UTC_STP_RESOURCES_BUSY = 0x08,
    /// `MPI_SASSTATUS_UTC_WRONG_DESTINATION`.
    UTC_WRONG_DESTINATION = 0x09,
    /// `MPI_SASSTATUS_SHORT_INFORMATION_UNIT`.
    SHORT_INFORMATION_UNIT = 0x0a,
    /// `MPI_SASSTATUS_LONG_INFORMATION_UNIT`.
    LONG_INFORMATION_UNIT = 0x0b,
    /// `MPI_SASSTATUS_XFER_RDY_INCORRECT_WRITE_DATA`.
    XFER_RDY_INCORRECT_WRITE_DATA = 0x0c,
    /// `MPI_SASSTATUS_XFER_RDY_REQUEST_OFFSET_ERROR`.
    XFER_RDY_REQUEST_OFFSET_ERROR = 0x0d,
    /// `MPI_SASSTATUS_XFER_RDY_NOT_EXPECTED`.
    XFER_RDY_NOT_EXPECTED = 0x0e,
    /// `MPI_SASSTATUS_DATA_INCORRECT_DATA_LENGTH`.
    DATA_INCORRECT_DATA_LENGTH = 0x0f,
    /// `MPI_SASSTATUS_DATA_TOO_MUCH_READ_DATA`.
    DATA_TOO_MUCH_READ_DATA = 0x10,
    /// `MPI_SASSTATUS_DATA_OFFSET_ERROR`.
    DATA_OFFSET_ERROR = 0x11,
    /// `MPI_SASSTATUS_SDSF_NAK_RECEIVED`.
    SDSF_NAK_RECEIVED = 0x12,
    /// `MPI_SASSTATUS_SDSF_CONNECTION_FAILED`.
    SDSF_CONNECTION_FAILED = 0x13,
    /// `MPI_SASSTATUS_INITIATOR_RESPONSE_TIMEOUT`.
    INITIATOR_RESPONSE_TIMEOUT = 0x14,
}

impl SasStatus {
    /// A description of the status.
    pub fn description(self) -> Option<&'static str> {
        Some(match self {
            Self::SUCCESS => "success",
            Self::UNKNOWN_ERROR => "unknown SAS (SMP) error",
            Self::INVALID_FRAME => "invalid frame",
            Self::UTC_BAD_DEST => "unable to connect (bad destination)",
            Self::UTC_BREAK_RECEIVED => "unable to connect (break received)",
            Self::UTC_CONNECT_RATE_NOT_SUPPORTED => {
                "unable to connect (connect rate not supported)"
            }
            Self::UTC_PORT_LAYER_REQUEST => "unable to connect (port layer request)",
            Self::UTC_PROTOCOL_NOT_SUPPORTED => {
                "unable to connect (protocol (SMP target) not supported)"
            }
            Self::UTC_STP_RESOURCES_BUSY => "unable to connect (STP resources busy)",
            Self::UTC_WRONG_DESTINATION => "unable to connect (wrong destination)",
            Self::SHORT_INFORMATION_UNIT => "short information unit",
            Self::LONG_INFORMATION_UNIT => "long information unit",
            Self::XFER_RDY_INCORRECT_WRITE_DATA => "XFER_RDY incorrect write data",
            Self::XFER_RDY_REQUEST_OFFSET_ERROR => "XFER_RDY request offset error",
            Self::XFER_RDY_NOT_EXPECTED => "XFER_RDY not expected",
            Self::DATA_INCORRECT_DATA_LENGTH => "incorrect data length",
            Self::DATA_TOO_MUCH_READ_DATA => "too much read data",
            Self::DATA_OFFSET_ERROR => "data offset error",
            Self::SDSF_NAK_RECEIVED => "SDSF NAK received",
            Self::SDSF_CONNECTION_FAILED => "SDSF connection failed",
            Self::INITIATOR_RESPONSE_TIMEOUT => "initiator response timeout",
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::FromZeros;

    #[test]
    fn reply_field_offsets() {
        let mut reply = SmpPassthroughReply::new_zeroed();
        reply.sas_status = 0x03;
        reply.ioc_status = 0x8090;
        let bytes = reply.as_bytes();
        assert_eq!(bytes[0x0d], 0x03);
        assert_eq!(&bytes[0x0e..0x10], &[0x90, 0x80]);
        assert_eq!(IocStatus::from_raw(reply.ioc_status), IocStatus::SAS_SMP_REQUEST_FAILED);
    }

    #[test]
    fn request_field_offsets() {
        let mut request = SmpPassthroughRequest::new_zeroed();
        request.function = MPI_FUNCTION_SMP_PASSTHROUGH;
        request.request_data_length = 12;
        request.sas_address = 0x5000_c500_0000_003f;
        let bytes = request.as_bytes();
        assert_eq!(bytes[3], 0x1a);
        assert_eq!(&bytes[4..6], &[12, 0]);
        assert_eq!(bytes[0x10], 0x3f);
        assert_eq!(bytes[0x17], 0x50);
    }

    #[test]
    fn status_descriptions() {
        assert_eq!(
            SasStatus::UTC_BAD_DEST.description(),
            Some("unable to connect (bad destination)")
        );
        assert_eq!(SasStatus(0x40).description(), None);
        assert_eq!(IocStatus(0x1234).description(), None);
    }

    #[test]
    fn status_names() {
        assert_eq!(format!("{:?}", SasStatus::UTC_BAD_DEST), "UTC_BAD_DEST");
        assert_eq!(
            format!("{:?}", IocStatus::from_raw(0x8090)),
            "SAS_SMP_REQUEST_FAILED"
        );
    }
}
