// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! SMP passthrough through the mpt control node.
//!
//! The ioctl block is an `mpt_ioctl_command` whose trailing `mf` field is
//! the start of an MPI `SmpPassthroughRequest`. The driver builds the SGEs
//! from the data-in and data-out buffers itself.

use crate::SmpExchange;
use crate::TransportError;
use crate::ioctl;
use crate::xfer_len;
use mpi_defs::mpt::IocStatus;
use mpi_defs::mpt::MPI_FUNCTION_SMP_PASSTHROUGH;
use mpi_defs::mpt::MPT_DEV_MAJOR;
use mpi_defs::mpt::MPT_DEV_MINOR;
use mpi_defs::mpt::MPT_MF_OFFSET;
use mpi_defs::mpt::MPT_REPLY_FRAME_LEN;
use mpi_defs::mpt::MPT2_DEV_MINOR;
use mpi_defs::mpt::MPT3_DEV_MINOR;
use mpi_defs::mpt::MptIoctlCommand;
use mpi_defs::mpt::MptIoctlHeader;
use mpi_defs::mpt::SMP_PASSTHROUGH_SGL_OFFSET;
use mpi_defs::mpt::SasStatus;
use mpi_defs::mpt::SmpPassthroughReply;
use mpi_defs::mpt::SmpPassthroughRequest;
use std::fs::File;
use std::path::Path;
use zerocopy::FromBytes;
use zerocopy::FromZeros;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Bytes of the SMP request not sent to the controller (the CRC).
const CRC_LEN: usize = 4;

/// Which ioctl the node accepts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Opcode {
    /// `MPTCOMMAND`, minor 220.
    MptCommand,
    /// `MPT2COMMAND`, minors 221 and 222.
    Mpt2Command,
}

impl Opcode {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Opcode::MptCommand => "MPTCOMMAND",
            Opcode::Mpt2Command => "MPT2COMMAND",
        }
    }
}

/// Picks the ioctl for a character device's numbers.
pub(crate) fn opcode_for(major: u64, minor: u64) -> Option<Opcode> {
    if major != u64::from(MPT_DEV_MAJOR) {
        return None;
    }
    match u32::try_from(minor).ok()? {
        MPT_DEV_MINOR => Some(Opcode::MptCommand),
        MPT2_DEV_MINOR | MPT3_DEV_MINOR => Some(Opcode::Mpt2Command),
        _ => None,
    }
}

/// Checks that `file` is an mpt control node.
pub(crate) fn identify(path: &Path, file: &File) -> Result<Opcode, TransportError> {
    let numbers = ioctl::char_device_numbers(file).map_err(|source| TransportError::Stat {
        path: path.to_owned(),
        source,
    })?;
    let (major, minor) = numbers.unwrap_or((0, 0));
    numbers
        .and_then(|(major, minor)| opcode_for(major, minor))
        .ok_or_else(|| TransportError::DeviceIdentity {
            path: path.to_owned(),
            major,
            minor,
        })
}

const BLOCK_WORDS: usize = (MPT_MF_OFFSET + size_of::<SmpPassthroughRequest>()).div_ceil(8);

/// The ioctl block: the command followed by the MPI request.
pub(crate) struct IoctlBlock([u64; BLOCK_WORDS]);

impl IoctlBlock {
    pub(crate) fn new(command: &MptIoctlCommand, request: &SmpPassthroughRequest) -> Self {
        let mut words = [0; BLOCK_WORDS];
        let bytes = words.as_mut_bytes();
        bytes[..size_of::<MptIoctlCommand>()].copy_from_slice(command.as_bytes());
        bytes[MPT_MF_OFFSET..][..size_of::<SmpPassthroughRequest>()]
            .copy_from_slice(request.as_bytes());
        Self(words)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut MptIoctlCommand {
        self.0.as_mut_ptr().cast()
    }
}

/// The reply frame buffer, with the reply header at its start.
#[repr(C)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
struct ReplyFrame {
    reply: SmpPassthroughReply,
    rest: [u8; MPT_REPLY_FRAME_LEN - size_of::<SmpPassthroughReply>()],
}

/// Builds the MPI request for an SMP frame of `request_len` bytes.
pub(crate) fn passthrough_request(
    sas_address: u64,
    request_len: usize,
) -> Result<SmpPassthroughRequest, TransportError> {
    let data_len = request_len.saturating_sub(CRC_LEN);
    Ok(SmpPassthroughRequest {
        request_data_length: u16::try_from(data_len)
            .map_err(|_| TransportError::RequestTooLarge(request_len))?,
        function: MPI_FUNCTION_SMP_PASSTHROUGH,
        sas_address,
        ..SmpPassthroughRequest::new_zeroed()
    })
}

/// Fails unless both statuses of the reply report success.
pub(crate) fn check_reply(reply: &SmpPassthroughReply) -> Result<(), TransportError> {
    let ioc_status = IocStatus::from_raw(reply.ioc_status);
    let sas_status = SasStatus(reply.sas_status);
    if ioc_status != IocStatus::SUCCESS || sas_status != SasStatus::SUCCESS {
        return Err(TransportError::SasStatus {
            ioc_status,
            sas_status,
            log_info: reply.ioc_log_info,
        });
    }
    Ok(())
}

fn ioctl_len(len: usize) -> Result<i32, TransportError> {
    i32::try_from(xfer_len(len)?).map_err(|_| TransportError::RequestTooLarge(len))
}

pub(crate) fn send(
    file: &File,
    opcode: Opcode,
    controller_ordinal: u8,
    sas_address: u64,
    exchange: &mut SmpExchange<'_>,
) -> Result<(), TransportError> {
    tracing::trace!(sas_address = format_args!("{sas_address:#x}"), "mpt smp request");

    let data_out_len = exchange.request.len().saturating_sub(CRC_LEN);
    let mut data_in = vec![0u8; exchange.response.len() + CRC_LEN];
    let mut frame = ReplyFrame::new_zeroed();

    let command = MptIoctlCommand {
        hdr: MptIoctlHeader {
            iocnum: controller_ordinal.into(),
            port: 0,
            max_data_size: 0,
        },
        timeout: 0,
        reply_frame_buf_ptr: frame.as_mut_bytes().as_mut_ptr() as u64,
        data_in_buf_ptr: data_in.as_mut_ptr() as u64,
        data_out_buf_ptr: exchange.request.as_ptr() as u64,
        sense_data_ptr: 0,
        max_reply_bytes: ioctl_len(MPT_REPLY_FRAME_LEN)?,
        data_in_size: ioctl_len(data_in.len())?,
        data_out_size: ioctl_len(data_out_len)?,
        max_sense_bytes: 0,
        data_sge_offset: ioctl_len(SMP_PASSTHROUGH_SGL_OFFSET / 4)?,
        mf: [0; 4],
    };
    let request = passthrough_request(sas_address, exchange.request.len())?;
    let mut block = IoctlBlock::new(&command, &request);

    ioctl::mpt_command(file, opcode, &mut block)?;

    let reply = &frame.reply;
    tracing::debug!(
        ioc_status = reply.ioc_status,
        ioc_log_info = reply.ioc_log_info,
        sas_status = reply.sas_status,
        "mpt smp reply"
    );
    check_reply(reply)?;

    let len = exchange.response.len();
    exchange.response.copy_from_slice(&data_in[..len]);
    exchange.actual_response_len = None;
    exchange.transport_status = 0;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes() {
        assert_eq!(opcode_for(10, 220), Some(Opcode::MptCommand));
        assert_eq!(opcode_for(10, 221), Some(Opcode::Mpt2Command));
        assert_eq!(opcode_for(10, 222), Some(Opcode::Mpt2Command));
        assert_eq!(opcode_for(10, 223), None);
        assert_eq!(opcode_for(11, 221), None);
        assert_eq!(Opcode::Mpt2Command.name(), "MPT2COMMAND");
    }

    #[test]
    fn block_layout() {
        let command = MptIoctlCommand {
            data_out_size: 12,
            data_in_size: 60,
            data_sge_offset: 8,
            ..MptIoctlCommand::new_zeroed()
        };
        let request = passthrough_request(0x5000_c500_0000_003f, 16).unwrap();
        assert_eq!(request.request_data_length, 12);

        let block = IoctlBlock::new(&command, &request);
        let bytes = block.as_bytes();
        assert_eq!(bytes.len(), 128);
        // data_in_size, data_out_size and data_sge_offset
        assert_eq!(&bytes[0x34..0x38], &60i32.to_le_bytes());
        assert_eq!(&bytes[0x38..0x3c], &12i32.to_le_bytes());
        assert_eq!(&bytes[0x40..0x44], &8i32.to_le_bytes());
        // the request starts at mf
        assert_eq!(bytes[MPT_MF_OFFSET + 3], MPI_FUNCTION_SMP_PASSTHROUGH);
        assert_eq!(&bytes[MPT_MF_OFFSET + 4..MPT_MF_OFFSET + 6], &[12, 0]);
        assert_eq!(
            &bytes[MPT_MF_OFFSET + 0x10..MPT_MF_OFFSET + 0x18],
            &0x5000_c500_0000_003fu64.to_le_bytes()
        );
    }

    #[test]
    fn reply_status() {
        let mut reply = SmpPassthroughReply::new_zeroed();
        check_reply(&reply).unwrap();

        reply.ioc_status = 0x8000;
        check_reply(&reply).unwrap();

        reply.sas_status = SasStatus::UTC_WRONG_DESTINATION.0;
        let err = check_reply(&reply).unwrap_err();
        assert!(matches!(
            err,
            TransportError::SasStatus {
                sas_status: SasStatus::UTC_WRONG_DESTINATION,
                ..
            }
        ));

        reply.sas_status = 0;
        reply.ioc_status = 0x8090;
        let err = check_reply(&reply).unwrap_err();
        assert!(matches!(
            err,
            TransportError::SasStatus {
                ioc_status: IocStatus::SAS_SMP_REQUEST_FAILED,
                ..
            }
        ));
    }
}
