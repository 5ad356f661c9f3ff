// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `<linux/bsg.h>` definitions.

use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::FromZeros;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Guard value identifying a version 4 header.
pub const SG_IO_V4_GUARD: i32 = b'Q' as i32;
/// `BSG_PROTOCOL_SCSI`.
pub const BSG_PROTOCOL_SCSI: u32 = 0;
/// `BSG_SUB_PROTOCOL_SCSI_TRANSPORT`, used for SMP frames.
pub const BSG_SUB_PROTOCOL_SCSI_TRANSPORT: u32 = 2;
/// The `SG_IO` ioctl number. It predates the `_IOWR` encoding.
pub const SG_IO: u32 = 0x2285;
/// Default exchange timeout.
pub const DEFAULT_TIMEOUT_MS: u32 = 20000;

/// `struct sg_io_v4`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SgIoV4 {
    /// Always [`SG_IO_V4_GUARD`].
    pub guard: i32,
    /// Transport protocol.
    pub protocol: u32,
    /// Sub-protocol within `protocol`.
    pub subprotocol: u32,

    /// Length of the command at `request`.
    pub request_len: u32,
    /// User address of the command.
    pub request: u64,
    /// Tag for the request.
    pub request_tag: u64,
    /// Task attribute.
    pub request_attr: u32,
    /// Task priority.
    pub request_priority: u32,
    /// Extra request information.
    pub request_extra: u32,
    /// Capacity of the `response` buffer.
    pub max_response_len: u32,
    /// User address of the response (sense) buffer.
    pub response: u64,

    /// Zero, or the number of output iovecs.
    pub dout_iovec_count: u32,
    /// Bytes to transfer to the device.
    pub dout_xfer_len: u32,
    /// Zero, or the number of input iovecs.
    pub din_iovec_count: u32,
    /// Bytes to transfer from the device.
    pub din_xfer_len: u32,
    /// User address of the output data.
    pub dout_xferp: u64,
    /// User address of the input data.
    pub din_xferp: u64,

    /// Timeout in milliseconds.
    pub timeout: u32,
    /// `BSG_FLAG_*` bits.
    pub flags: u32,
    /// Opaque user pointer.
    pub usr_ptr: u64,
    /// Unused input.
    pub spare_in: u32,

    /// Driver status on completion.
    pub driver_status: u32,
    /// Transport status on completion.
    pub transport_status: u32,
    /// Device status on completion.
    pub device_status: u32,
    /// Retry delay requested by the device.
    pub retry_delay: u32,
    /// Auxiliary information.
    pub info: u32,
    /// Command duration in milliseconds.
    pub duration: u32,
    /// Bytes written to `response`.
    pub response_len: u32,
    /// Residual of `din_xfer_len`.
    pub din_resid: i32,
    /// Residual of `dout_xfer_len`.
    pub dout_resid: i32,
    /// Tag generated by the kernel.
    pub generated_tag: u64,
    /// Unused output.
    pub spare_out: u32,

    /// Explicit tail padding.
    pub padding: u32,
}

const_assert_eq!(size_of::<SgIoV4>(), 160);

impl SgIoV4 {
    /// The header for an SMP exchange, with no buffers attached.
    pub fn smp(timeout_ms: u32) -> Self {
        Self {
            guard: SG_IO_V4_GUARD,
            protocol: BSG_PROTOCOL_SCSI,
            subprotocol: BSG_SUB_PROTOCOL_SCSI_TRANSPORT,
            timeout: timeout_ms,
            ..Self::new_zeroed()
        }
    }

    /// Bytes actually received: `din_xfer_len - din_resid`.
    pub fn din_actual(&self) -> usize {
        (i64::from(self.din_xfer_len) - i64::from(self.din_resid)).max(0) as usize
    }

    /// The first non-zero of driver, transport and device status.
    pub fn completion_status(&self) -> u32 {
        [self.driver_status, self.transport_status, self.device_status]
            .into_iter()
            .find(|&status| status != 0)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smp_header() {
        let hdr = SgIoV4::smp(DEFAULT_TIMEOUT_MS);
        assert_eq!(&hdr.as_bytes()[..12], &[b'Q', 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(hdr.timeout, 20000);
        assert_eq!(hdr.request, 0);
    }

    #[test]
    fn completion() {
        let mut hdr = SgIoV4::smp(DEFAULT_TIMEOUT_MS);
        hdr.din_xfer_len = 124;
        hdr.din_resid = 4;
        assert_eq!(hdr.din_actual(), 120);
        assert_eq!(hdr.completion_status(), 0);
        hdr.device_status = 2;
        assert_eq!(hdr.completion_status(), 2);
        hdr.transport_status = 7;
        assert_eq!(hdr.completion_status(), 7);
        hdr.driver_status = 1;
        assert_eq!(hdr.completion_status(), 1);
        hdr.din_resid = 200;
        assert_eq!(hdr.din_actual(), 0);
    }
}
