// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! mpi3mr bsg packets.
//!
//! A packet describes how the bsg data-out and data-in transfers split into
//! parts. Data-out carries the SMP request (passthrough only) followed by
//! the MPI request. Data-in carries the caller's data followed by the MPI
//! reply area.

use crate::TransportError;
use crate::VendorCommand;
use crate::VendorReply;
use crate::ioctl;
use crate::xfer_len;
use mpi_defs::bsg::SgIoV4;
use mpi_defs::mpi3;
use mpi_defs::mpi3::Mpi3Function;
use mpi_defs::mpi3mr::BufferEntry;
use mpi_defs::mpi3mr::BufferEntryListHeader;
use mpi_defs::mpi3mr::BufferType;
use mpi_defs::mpi3mr::DriverCommand;
use mpi_defs::mpi3mr::DriverOpcode;
use mpi_defs::mpi3mr::MPI3MR_DRV_CMD;
use mpi_defs::mpi3mr::MPI3MR_MPT_CMD;
use mpi_defs::mpi3mr::MPI3MR_PACKET_LEN;
use mpi_defs::mpi3mr::MptCommandHeader;
use mpi_defs::mpi3mr::PacketHeader;
use std::fs::File;
use zerocopy::FromBytes;
use zerocopy::FromZeros;
use zerocopy::IntoBytes;

/// Timeout, in seconds, the driver applies to MPT commands.
const MPT_COMMAND_TIMEOUT: u32 = 180;

/// Size of the bsg response (sense) buffer.
const RESPONSE_BUFFER_LEN: usize = 1024;

/// The buffers of one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketPlan {
    /// The packet, handed to the kernel as the bsg request.
    pub packet: Vec<u8>,
    /// The data-out transfer.
    pub data_out: Vec<u8>,
    /// Bytes of MPI reply area following the caller's data in the data-in
    /// transfer.
    pub reply_len: usize,
}

fn driver_packet(mrioc_id: u8, opcode: DriverOpcode) -> PacketPlan {
    let header = PacketHeader {
        cmd_type: MPI3MR_DRV_CMD,
        ..PacketHeader::new_zeroed()
    };
    let command = DriverCommand {
        mrioc_id,
        opcode: opcode.0,
        ..DriverCommand::new_zeroed()
    };
    let mut packet = Vec::with_capacity(MPI3MR_PACKET_LEN);
    packet.extend_from_slice(header.as_bytes());
    packet.extend_from_slice(command.as_bytes());
    packet.resize(MPI3MR_PACKET_LEN, 0);
    PacketPlan {
        packet,
        data_out: Vec::new(),
        reply_len: 0,
    }
}

fn mpt_packet(
    mrioc_id: u8,
    entries: &[(BufferType, usize)],
    data_out: Vec<u8>,
) -> Result<PacketPlan, TransportError> {
    let header = PacketHeader {
        cmd_type: MPI3MR_MPT_CMD,
        ..PacketHeader::new_zeroed()
    };
    let command = MptCommandHeader {
        timeout: MPT_COMMAND_TIMEOUT,
        mrioc_id,
        ..MptCommandHeader::new_zeroed()
    };
    let list = BufferEntryListHeader {
        num_of_entries: entries.len() as u8,
        ..BufferEntryListHeader::new_zeroed()
    };

    let mut packet = Vec::with_capacity(mpi_defs::mpi3mr::mpt_packet_len(entries.len()));
    packet.extend_from_slice(header.as_bytes());
    packet.extend_from_slice(command.as_bytes());
    packet.extend_from_slice(list.as_bytes());
    let mut reply_len = 0;
    for &(buf_type, len) in entries {
        if matches!(buf_type, BufferType::MPI_REPLY | BufferType::ERR_RESPONSE) {
            reply_len += len;
        }
        let entry = BufferEntry {
            buf_type: buf_type.0,
            buf_len: xfer_len(len)?,
            ..BufferEntry::new_zeroed()
        };
        packet.extend_from_slice(entry.as_bytes());
    }

    Ok(PacketPlan {
        packet,
        data_out,
        reply_len,
    })
}

/// Lays out the packet and data-out transfer for `command`, receiving
/// `data_in_len` bytes of data.
pub fn build_packet(
    command: &VendorCommand<'_>,
    mrioc_id: u8,
    data_in_len: usize,
) -> Result<PacketPlan, TransportError> {
    let plan = match *command {
        VendorCommand::AdapterInfo => driver_packet(mrioc_id, DriverOpcode::ADAPTER_INFO),
        VendorCommand::AllTargetInfo => {
            driver_packet(mrioc_id, DriverOpcode::ALL_TARGET_DEVICE_INFO)
        }
        VendorCommand::IocFacts => {
            let request = mpi3::IocFactsRequest {
                function: Mpi3Function::IOC_FACTS.0,
                ..mpi3::IocFactsRequest::new_zeroed()
            };
            mpt_packet(
                mrioc_id,
                &[
                    (BufferType::DATA_IN, data_in_len),
                    (BufferType::MPI_REPLY, mpi3::MPI3_SHORT_REPLY_LEN),
                    (BufferType::MPI_REQUEST, size_of_val(&request)),
                ],
                request.as_bytes().to_vec(),
            )?
        }
        VendorCommand::Config(request) => mpt_packet(
            mrioc_id,
            &[
                (BufferType::DATA_IN, data_in_len),
                (BufferType::MPI_REPLY, mpi3::MPI3_SHORT_REPLY_LEN),
                (BufferType::MPI_REQUEST, size_of_val(request)),
            ],
            request.as_bytes().to_vec(),
        )?,
        VendorCommand::ScsiIo(request) => mpt_packet(
            mrioc_id,
            &[
                (BufferType::DATA_IN, data_in_len),
                (BufferType::MPI_REPLY, mpi3::MPI3_SCSI_IO_REPLY_LEN),
                (
                    BufferType::ERR_RESPONSE,
                    mpi3::MPI3_SCSI_IO_ERR_RESPONSE_LEN,
                ),
                (BufferType::MPI_REQUEST, size_of_val(request)),
            ],
            request.as_bytes().to_vec(),
        )?,
        VendorCommand::SmpPassthrough {
            sas_address,
            request,
        } => {
            let mpi_request = mpi3::SmpPassthroughRequest {
                function: Mpi3Function::SMP_PASSTHROUGH.0,
                io_unit_port: mpi3::MPI3_SMP_ANY_IO_UNIT_PORT,
                sas_address,
                ..mpi3::SmpPassthroughRequest::new_zeroed()
            };
            let mut data_out = Vec::with_capacity(request.len() + size_of_val(&mpi_request));
            data_out.extend_from_slice(request);
            data_out.extend_from_slice(mpi_request.as_bytes());
            mpt_packet(
                mrioc_id,
                &[
                    (BufferType::DATA_OUT, request.len()),
                    (BufferType::DATA_IN, data_in_len),
                    (
                        BufferType::MPI_REPLY,
                        size_of::<mpi3::SmpPassthroughReply>(),
                    ),
                    (BufferType::MPI_REQUEST, size_of_val(&mpi_request)),
                ],
                data_out,
            )?
        }
    };
    Ok(plan)
}

/// The valid length of the data-in part, per command.
pub(crate) fn response_len(command: &VendorCommand<'_>, data_in: &[u8], reply: &[u8]) -> usize {
    match command {
        VendorCommand::IocFacts => data_in
            .get(..2)
            .map_or(0, |len| usize::from(u16::from_le_bytes([len[0], len[1]])) * 4),
        VendorCommand::SmpPassthrough { .. } => {
            mpi3::SmpPassthroughReply::read_from_prefix(reply)
                .map_or(0, |(reply, _)| usize::from(reply.response_data_length))
        }
        VendorCommand::AdapterInfo
        | VendorCommand::AllTargetInfo
        | VendorCommand::Config(_)
        | VendorCommand::ScsiIo(_) => data_in.len(),
    }
}

pub(crate) fn submit(
    file: &File,
    mrioc_id: u8,
    timeout_ms: u32,
    command: &VendorCommand<'_>,
    data_in: &mut [u8],
) -> Result<VendorReply, TransportError> {
    let plan = build_packet(command, mrioc_id, data_in.len())?;
    let mut din = vec![0u8; data_in.len() + plan.reply_len];
    let mut response = vec![0u8; RESPONSE_BUFFER_LEN];

    let mut hdr = SgIoV4::smp(timeout_ms);
    hdr.request_len = xfer_len(plan.packet.len())?;
    hdr.request = plan.packet.as_ptr() as u64;
    hdr.max_response_len = xfer_len(response.len())?;
    hdr.response = response.as_mut_ptr() as u64;
    hdr.dout_xfer_len = xfer_len(plan.data_out.len())?;
    hdr.dout_xferp = plan.data_out.as_ptr() as u64;
    hdr.din_xfer_len = xfer_len(din.len())?;
    hdr.din_xferp = din.as_mut_ptr() as u64;
    tracing::debug!(
        mrioc_id,
        dout_xfer_len = hdr.dout_xfer_len,
        din_xfer_len = hdr.din_xfer_len,
        timeout = hdr.timeout,
        "mpi3mr packet"
    );

    ioctl::sg_io(file, &mut hdr)?;

    let (data, reply) = din.split_at(data_in.len());
    data_in.copy_from_slice(data);
    let reply = VendorReply {
        response_len: response_len(command, data, reply),
        transport_status: hdr.completion_status(),
    };
    tracing::debug!(
        driver_status = hdr.driver_status,
        transport_status = hdr.transport_status,
        device_status = hdr.device_status,
        response_len = reply.response_len,
        "mpi3mr reply"
    );
    Ok(reply)
}
