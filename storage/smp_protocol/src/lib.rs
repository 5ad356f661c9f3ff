// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! SAS Management Protocol requests and response decoding.
//!
//! The functions here build request frames, run them through any
//! [`SmpTransport`], validate the response header and decode the fields the
//! topology code needs. The mpi3mr controller management commands live in
//! [`vendor`].

#![forbid(unsafe_code)]

mod discover;
mod phy_control;
mod report;
pub mod vendor;

pub use discover::AttachedPhy;
pub use discover::PhyDiscoveryRecord;
pub use discover::RoutingAttribute;
pub use discover::discover;
pub use phy_control::phy_control;
pub use report::ReportGeneral;
pub use report::ReportManufacturer;
pub use report::report_general;
pub use report::report_manufacturer;

use smp_defs::FrameHeader;
use smp_defs::FunctionResult;
use smp_defs::SMP_FRAME_TYPE_RESPONSE;
use smp_defs::SMP_HEADER_LEN;
use smp_defs::SmpFunction;
use smp_defs::default_response_len;
use smp_transport::SmpExchange;
use smp_transport::SmpTransport;
use smp_transport::TransportError;
use thiserror::Error;

/// Errors from an SMP or controller management request.
#[derive(Debug, Error)]
pub enum SmpError {
    /// The transport could not carry the request.
    #[error("transport failure")]
    Transport(#[from] TransportError),
    /// The kernel reported a driver, transport or device failure.
    #[error("transport reported status {0:#x}")]
    TransportStatus(u32),
    /// The response is not a valid frame for the request.
    #[error("malformed response: {0}")]
    Malformed(&'static str),
    /// The target answered with a non-zero function result.
    #[error("{0}")]
    FunctionResult(FunctionResult),
    /// A management response does not have the size of its structure.
    #[error("response length {actual} does not match the expected {expected}")]
    LengthMismatch {
        /// The structure size.
        expected: usize,
        /// The length the transport reported.
        actual: usize,
    },
    /// A response buffer could not be allocated.
    #[error("failed to allocate a {0} byte response buffer")]
    Resource(usize),
}

impl SmpError {
    /// True when the phy does not exist; discovery loops stop here.
    pub fn is_no_phy(&self) -> bool {
        matches!(self, SmpError::FunctionResult(FunctionResult::NO_PHY))
    }

    /// True when the phy exists but is vacant; discovery loops skip it.
    pub fn is_phy_vacant(&self) -> bool {
        matches!(self, SmpError::FunctionResult(FunctionResult::PHY_VACANT))
    }
}

/// Allocates a zeroed response buffer without aborting on exhaustion.
pub(crate) fn allocate_response(len: usize) -> Result<Vec<u8>, SmpError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| SmpError::Resource(len))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Checks a response frame against the request's `function` and returns the
/// number of valid bytes, CRC excluded.
///
/// `actual` is the length the transport reports receiving, if it knows. A
/// target that leaves both the length and result bytes zero is a SAS-1.1
/// target; its length comes from the default table.
pub fn validate_response(
    function: SmpFunction,
    response: &[u8],
    actual: Option<usize>,
) -> Result<usize, SmpError> {
    if actual.is_some_and(|actual| actual < SMP_HEADER_LEN) {
        return Err(SmpError::Malformed("response shorter than the frame header"));
    }
    let header = FrameHeader::parse(response)
        .ok_or(SmpError::Malformed("response buffer shorter than the frame header"))?;

    let dwords = if header.length == 0 && header.result == 0 {
        let dwords = default_response_len(header.function).and_then(|len| len.dwords());
        if dwords.is_none() {
            tracing::debug!(
                function = header.function.0,
                "unable to determine the response length"
            );
        }
        dwords.unwrap_or(0)
    } else {
        header.length
    };

    let mut len = SMP_HEADER_LEN + usize::from(dwords) * 4;
    if let Some(actual) = actual {
        if len > actual {
            tracing::debug!(actual, deduced = len, "response shorter than its length field");
            len = actual;
        }
    }
    len = len.min(response.len());

    if header.frame_type != SMP_FRAME_TYPE_RESPONSE {
        return Err(SmpError::Malformed("not an SMP response frame"));
    }
    if header.function != function {
        return Err(SmpError::Malformed("response function does not match the request"));
    }
    if header.result != 0 {
        return Err(SmpError::FunctionResult(FunctionResult(header.result)));
    }
    Ok(len)
}

/// Runs one exchange and returns the validated response, truncated to its
/// valid length.
pub(crate) fn exchange<T: SmpTransport + ?Sized>(
    transport: &mut T,
    function: SmpFunction,
    request: &[u8],
    response_len: usize,
) -> Result<Vec<u8>, SmpError> {
    let mut response = allocate_response(response_len)?;
    trace_frame("smp request", request);

    let mut exchange = SmpExchange::new(request, &mut response);
    transport.send(&mut exchange)?;
    let actual = exchange.actual_response_len;
    let status = exchange.transport_status;
    if status != 0 {
        return Err(SmpError::TransportStatus(status));
    }

    let received = actual.unwrap_or(response.len()).min(response.len());
    trace_frame("smp response", &response[..received]);

    let len = validate_response(function, &response, actual)?;
    response.truncate(len);
    Ok(response)
}

/// Logs `data` as a hex dump at trace level.
pub(crate) fn trace_frame(label: &str, data: &[u8]) {
    if tracing::enabled!(tracing::Level::TRACE) {
        for line in hex_lines(data) {
            tracing::trace!("{label}: {line}");
        }
    }
}

/// Formats `data` as hex dump lines of 16 bytes with an ASCII column.
pub fn hex_lines(data: &[u8]) -> Vec<String> {
    data.chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let ascii: String = chunk
                .iter()
                .map(|&byte| {
                    if (0x20..=0x7e).contains(&byte) {
                        byte as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!("{:04x}: {:<32}  |{ascii}|", row * 16, hex::encode(chunk))
        })
        .collect()
}

/// Reads a byte of a truncated frame, zero past its end.
pub(crate) fn byte_at(frame: &[u8], offset: usize) -> u8 {
    frame.get(offset).copied().unwrap_or(0)
}

/// Reads a big-endian u64 of a truncated frame, zero filled past its end.
pub(crate) fn be64_at(frame: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = byte_at(frame, offset + i);
    }
    u64::from_be_bytes(bytes)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Reply;
    use crate::testing::ScriptedTransport;

    #[test]
    fn malformed_short_actual() {
        let response = [0x41, 0x00, 0x00, 0x06, 0, 0, 0, 0];
        let err = validate_response(SmpFunction::REPORT_GENERAL, &response, Some(2)).unwrap_err();
        assert!(matches!(err, SmpError::Malformed(_)));
    }

    #[test]
    fn default_length_for_sas11_targets() {
        let mut response = vec![0u8; 76];
        response[0] = 0x41;
        let len = validate_response(SmpFunction::REPORT_GENERAL, &response, Some(76)).unwrap();
        assert_eq!(len, 4 + 6 * 4);

        // no default: header only
        let mut response = vec![0u8; 16];
        response[0] = 0x41;
        response[1] = SmpFunction::REPORT_SELF_CONFIG.0;
        let len =
            validate_response(SmpFunction::REPORT_SELF_CONFIG, &response, Some(16)).unwrap();
        assert_eq!(len, 4);
    }

    #[test]
    fn length_truncated_to_actual() {
        let mut response = vec![0u8; 124];
        response[..4].copy_from_slice(&[0x41, 0x10, 0x00, 0x18]);
        assert_eq!(
            validate_response(SmpFunction::DISCOVER, &response, Some(60)).unwrap(),
            60
        );
        assert_eq!(
            validate_response(SmpFunction::DISCOVER, &response, None).unwrap(),
            100
        );
    }

    #[test]
    fn header_checks() {
        let response = [0x40, 0x00, 0x00, 0x06];
        assert!(matches!(
            validate_response(SmpFunction::REPORT_GENERAL, &response, None),
            Err(SmpError::Malformed(_))
        ));
        let response = [0x41, 0x01, 0x00, 0x06];
        assert!(matches!(
            validate_response(SmpFunction::REPORT_GENERAL, &response, None),
            Err(SmpError::Malformed(_))
        ));
        let response = [0x41, 0x10, 0x10, 0x00];
        let err = validate_response(SmpFunction::DISCOVER, &response, None).unwrap_err();
        assert!(err.is_no_phy());
        assert_eq!(err.to_string(), "Phy does not exist");
        let response = [0x41, 0x10, 0x16, 0x00];
        assert!(validate_response(SmpFunction::DISCOVER, &response, None)
            .unwrap_err()
            .is_phy_vacant());
        let response = [0x41, 0x10, 0x07, 0x00];
        assert_eq!(
            validate_response(SmpFunction::DISCOVER, &response, None)
                .unwrap_err()
                .to_string(),
            "unknown function result code=0x07"
        );
    }

    #[test]
    fn transport_status_fails_the_exchange() {
        let mut transport = ScriptedTransport::default();
        transport.replies.push_back(Ok(Reply {
            frame: vec![0x41, 0, 0, 6],
            actual: Some(4),
            status: 3,
        }));
        let err = exchange(&mut transport, SmpFunction::REPORT_GENERAL, &[0x40, 0, 0, 0], 76)
            .unwrap_err();
        assert!(matches!(err, SmpError::TransportStatus(3)));
    }

    #[test]
    fn hex_dump_lines() {
        let lines = hex_lines(b"\x41\x00\x00\x06SAS");
        assert_eq!(lines, ["0000: 41000006534153                    |A...SAS|"]);
        let lines = hex_lines(&[0; 17]);
        assert_eq!(
            lines,
            [
                "0000: 00000000000000000000000000000000  |................|",
                "0010: 00                                |.|",
            ]
        );
    }

    #[test]
    fn truncated_reads() {
        let frame = [1, 2, 3];
        assert_eq!(byte_at(&frame, 2), 3);
        assert_eq!(byte_at(&frame, 3), 0);
        assert_eq!(be64_at(&frame, 1), 0x0203_0000_0000_0000);
    }
}
