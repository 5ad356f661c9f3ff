// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Generic bsg SMP passthrough.

use crate::SmpExchange;
use crate::TransportError;
use crate::ioctl;
use crate::xfer_len;
use mpi_defs::bsg::SgIoV4;
use std::fs::File;

/// Length of the command block handed to the kernel. SMP ignores its
/// contents.
const UNUSED_COMMAND_LEN: usize = 16;

/// Builds the header for an SMP exchange: `request` is written to the
/// expander and the response lands in `response`.
pub(crate) fn smp_header(
    command: &[u8],
    request: &[u8],
    response: &mut [u8],
    timeout_ms: u32,
) -> Result<SgIoV4, TransportError> {
    let mut hdr = SgIoV4::smp(timeout_ms);
    hdr.request_len = xfer_len(command.len())?;
    hdr.request = command.as_ptr() as u64;
    hdr.dout_xfer_len = xfer_len(request.len())?;
    hdr.dout_xferp = request.as_ptr() as u64;
    hdr.din_xfer_len = xfer_len(response.len())?;
    hdr.din_xferp = response.as_mut_ptr() as u64;
    Ok(hdr)
}

pub(crate) fn send(
    file: &File,
    exchange: &mut SmpExchange<'_>,
    timeout_ms: u32,
) -> Result<(), TransportError> {
    let command = [0u8; UNUSED_COMMAND_LEN];
    let mut hdr = smp_header(&command, exchange.request, exchange.response, timeout_ms)?;
    tracing::debug!(
        dout_xfer_len = hdr.dout_xfer_len,
        din_xfer_len = hdr.din_xfer_len,
        timeout = hdr.timeout,
        "bsg smp request"
    );

    ioctl::sg_io(file, &mut hdr)?;

    exchange.actual_response_len = Some(hdr.din_actual());
    exchange.transport_status = hdr.completion_status();
    tracing::debug!(
        driver_status = hdr.driver_status,
        transport_status = hdr.transport_status,
        device_status = hdr.device_status,
        duration = hdr.duration,
        din_resid = hdr.din_resid,
        dout_resid = hdr.dout_resid,
        "bsg smp response"
    );
    Ok(())
}
