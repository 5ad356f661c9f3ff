// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! REPORT GENERAL and REPORT MANUFACTURER INFORMATION.

use crate::SmpError;
use crate::be64_at;
use crate::byte_at;
use crate::exchange;
use smp_defs::REPORT_GENERAL_RESPONSE_LEN;
use smp_defs::REPORT_MANUFACTURER_RESPONSE_LEN;
use smp_defs::SMP_FRAME_TYPE_REQUEST;
use smp_defs::SmpFunction;
use smp_transport::SmpTransport;

/// The fields of a REPORT GENERAL response used by discovery.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReportGeneral {
    /// Number of phys on the expander.
    pub phy_count: u8,
    /// Table-to-table routing supported; universal routing is shown as `U`.
    pub table_to_table: bool,
    /// The enclosure logical identifier.
    pub enclosure_logical_id: u64,
    /// Valid bytes of the response, CRC excluded.
    pub response_len: usize,
}

/// Sends REPORT GENERAL to the current target.
pub fn report_general<T: SmpTransport + ?Sized>(
    transport: &mut T,
) -> Result<ReportGeneral, SmpError> {
    let request = [
        SMP_FRAME_TYPE_REQUEST,
        SmpFunction::REPORT_GENERAL.0,
        0,
        0,
        0,
        0,
        0,
        0,
    ];
    let rp = exchange(
        transport,
        SmpFunction::REPORT_GENERAL,
        &request,
        REPORT_GENERAL_RESPONSE_LEN,
    )?;
    let len = rp.len();
    Ok(ReportGeneral {
        phy_count: if len > 9 { rp[9] } else { 0 },
        table_to_table: len > 10 && rp[10] & 0x80 != 0,
        enclosure_logical_id: be64_at(&rp, 12),
        response_len: len,
    })
}

/// A decoded REPORT MANUFACTURER INFORMATION response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportManufacturer {
    /// T10 vendor identification.
    pub vendor: String,
    /// Product identification.
    pub product: String,
    /// Product revision level.
    pub revision: String,
    /// The raw revision bytes; expander firmware reports one digit per byte.
    pub firmware: [u8; 4],
}

impl ReportManufacturer {
    /// The firmware version as `0a.0b.0c.0d`.
    pub fn firmware_version(&self) -> String {
        let [a, b, c, d] = self.firmware.map(char::from);
        format!("0{a}.0{b}.0{c}.0{d}")
    }
}

fn ascii_field(frame: &[u8], range: std::ops::Range<usize>) -> String {
    let bytes: Vec<u8> = range.map(|i| byte_at(frame, i)).collect();
    String::from_utf8_lossy(&bytes)
        .trim_matches(|c: char| c == ' ' || c == '\0')
        .to_owned()
}

/// Sends REPORT MANUFACTURER INFORMATION to the current target.
pub fn report_manufacturer<T: SmpTransport + ?Sized>(
    transport: &mut T,
) -> Result<ReportManufacturer, SmpError> {
    let request = [
        SMP_FRAME_TYPE_REQUEST,
        SmpFunction::REPORT_MANUFACTURER.0,
        0,
        0,
    ];
    let rp = exchange(
        transport,
        SmpFunction::REPORT_MANUFACTURER,
        &request,
        REPORT_MANUFACTURER_RESPONSE_LEN,
    )?;
    let report = ReportManufacturer {
        vendor: ascii_field(&rp, 12..20),
        product: ascii_field(&rp, 20..36),
        revision: ascii_field(&rp, 36..40),
        firmware: [
            byte_at(&rp, 36),
            byte_at(&rp, 37),
            byte_at(&rp, 38),
            byte_at(&rp, 39),
        ],
    };
    tracing::debug!(
        vendor = %report.vendor,
        product = %report.product,
        firmware = %report.firmware_version(),
        "report manufacturer"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Reply;
    use crate::testing::ScriptedTransport;

    fn general_frame() -> Vec<u8> {
        let mut rp = vec![0u8; 32];
        rp[..4].copy_from_slice(&[0x41, 0x00, 0x00, 0x07]);
        rp[9] = 36;
        rp[10] = 0x80;
        rp[12..20].copy_from_slice(&0x500a_0b1c_0000_0001u64.to_be_bytes());
        rp
    }

    #[test]
    fn general() {
        let mut transport = ScriptedTransport::default();
        transport.replies.push_back(Ok(Reply::frame(general_frame())));
        let report = report_general(&mut transport).unwrap();
        assert_eq!(
            report,
            ReportGeneral {
                phy_count: 36,
                table_to_table: true,
                enclosure_logical_id: 0x500a_0b1c_0000_0001,
                response_len: 32,
            }
        );
        assert_eq!(transport.requests, [vec![0x40, 0, 0, 0, 0, 0, 0, 0]]);
    }

    #[test]
    fn general_sas11_default_length() {
        let mut rp = general_frame();
        rp[3] = 0;
        let mut transport = ScriptedTransport::default();
        transport.replies.push_back(Ok(Reply {
            frame: rp,
            actual: None,
            status: 0,
        }));
        let report = report_general(&mut transport).unwrap();
        assert_eq!(report.response_len, 28);
        assert_eq!(report.phy_count, 36);
    }

    #[test]
    fn general_short_response() {
        let mut transport = ScriptedTransport::default();
        transport.replies.push_back(Ok(Reply {
            frame: vec![0x41, 0x00],
            actual: Some(2),
            status: 0,
        }));
        assert!(matches!(
            report_general(&mut transport),
            Err(SmpError::Malformed(_))
        ));
    }

    #[test]
    fn manufacturer() {
        let mut rp = vec![0u8; 60];
        rp[..4].copy_from_slice(&[0x41, 0x01, 0x00, 0x0e]);
        rp[12..20].copy_from_slice(b"LSI     ");
        rp[20..36].copy_from_slice(b"SAS40xx         ");
        rp[36..40].copy_from_slice(b"1234");
        let mut transport = ScriptedTransport::default();
        transport.replies.push_back(Ok(Reply::frame(rp)));
        let report = report_manufacturer(&mut transport).unwrap();
        assert_eq!(report.vendor, "LSI");
        assert_eq!(report.product, "SAS40xx");
        assert_eq!(report.revision, "1234");
        assert_eq!(report.firmware_version(), "01.02.03.04");
        assert_eq!(transport.requests, [vec![0x40, 0x01, 0, 0]]);
    }
}
