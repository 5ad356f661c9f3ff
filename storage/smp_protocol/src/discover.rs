// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! DISCOVER and the per-phy summary line.

use crate::SmpError;
use crate::be64_at;
use crate::byte_at;
use crate::exchange;
use smp_defs::AttachedDeviceType;
use smp_defs::DISCOVER_RESPONSE_LEN;
use smp_defs::LinkRate;
use smp_defs::SMP_FRAME_TYPE_REQUEST;
use smp_defs::SmpFunction;
use smp_defs::initiator;
use smp_defs::target;
use smp_transport::SmpTransport;
use std::fmt::Write;

/// The routing attribute of an expander phy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RoutingAttribute {
    /// Direct routing.
    Direct,
    /// Subtractive routing.
    Subtractive,
    /// Table routing.
    Table,
    /// Table routing on an expander that supports table-to-table routing.
    Universal,
    /// A reserved code.
    Reserved(u8),
}

impl RoutingAttribute {
    fn decode(code: u8, table_to_table: bool) -> Self {
        match code & 0xf {
            0 => Self::Direct,
            1 => Self::Subtractive,
            2 if table_to_table => Self::Universal,
            2 => Self::Table,
            n => Self::Reserved(n),
        }
    }

    /// The one-letter code used in phy summaries.
    pub fn code(self) -> char {
        match self {
            Self::Direct => 'D',
            Self::Subtractive => 'S',
            Self::Table => 'T',
            Self::Universal => 'U',
            Self::Reserved(_) => 'R',
        }
    }
}

/// What is attached to an active phy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AttachedPhy {
    /// SAS address of the attached port.
    pub sas_address: u64,
    /// Phy identifier on the attached device.
    pub phy_id: u8,
    /// Attached device name, when the response is long enough to carry it.
    pub device_name: Option<u64>,
    /// The phy is a virtual phy.
    pub virtual_phy: bool,
    /// Attached initiator protocol bits, see [`smp_defs::initiator`].
    pub initiator_protocols: u8,
    /// Attached target protocol bits, see [`smp_defs::target`].
    pub target_protocols: u8,
}

impl AttachedPhy {
    /// True when the attached device is an initiator, i.e. the HBA link.
    pub fn is_initiator(&self) -> bool {
        self.initiator_protocols & 0xf != 0
    }
}

/// One decoded DISCOVER response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhyDiscoveryRecord {
    /// The phy the request asked for.
    pub requested_phy: u8,
    /// The phy identifier in the response.
    pub phy_id: u8,
    /// SAS address of the expander answering.
    pub expander_sas_address: u64,
    /// Routing attribute of the phy.
    pub routing_attribute: RoutingAttribute,
    /// Negotiated logical link rate.
    pub negotiated_link_rate: LinkRate,
    /// Attached SAS device type.
    pub attached_device_type: AttachedDeviceType,
    /// The enclosure bay number, when the expander reports one.
    pub device_slot_number: Option<u8>,
    /// Details of the attached device; `None` when the phy is inactive or
    /// nothing usable is attached.
    pub attached: Option<AttachedPhy>,
    /// Valid bytes of the response, CRC excluded.
    pub response_len: usize,
}

impl PhyDiscoveryRecord {
    /// Decodes a validated DISCOVER response.
    pub fn decode(requested_phy: u8, rp: &[u8], table_to_table: bool) -> Self {
        let len = rp.len();
        let negotiated_link_rate = LinkRate(byte_at(rp, 13) & 0xf);
        let attached_device_type = AttachedDeviceType((byte_at(rp, 12) & 0x70) >> 4);
        let active = negotiated_link_rate.inactive_state().is_none()
            && attached_device_type != AttachedDeviceType::NONE
            && !attached_device_type.is_reserved();

        let attached = active.then(|| AttachedPhy {
            sas_address: be64_at(rp, 24),
            phy_id: byte_at(rp, 32),
            device_name: (len > 59).then(|| be64_at(rp, 52)),
            virtual_phy: byte_at(rp, 43) & 0x80 != 0,
            initiator_protocols: byte_at(rp, 14),
            target_protocols: byte_at(rp, 15),
        });

        Self {
            requested_phy,
            phy_id: byte_at(rp, 9),
            expander_sas_address: be64_at(rp, 16),
            routing_attribute: RoutingAttribute::decode(byte_at(rp, 44), table_to_table),
            negotiated_link_rate,
            attached_device_type,
            device_slot_number: (len > 108 && rp[108] != 0xff).then(|| rp[108]),
            attached,
            response_len: len,
        }
    }

    fn dsn(&self) -> i32 {
        self.device_slot_number.map_or(-1, i32::from)
    }

    /// The one-line summary of this phy, or `None` when nothing is
    /// attached.
    pub fn summary(&self) -> Option<String> {
        let routing = self.routing_attribute.code();
        if let Some(state) = self.negotiated_link_rate.inactive_state() {
            return Some(format!(
                "  phy {:3}:{routing}:{state}  dsn={}",
                self.phy_id,
                self.dsn()
            ));
        }

        let phy = self.requested_phy;
        if self.attached_device_type == AttachedDeviceType::NONE {
            return None;
        }
        let Some(attached) = &self.attached else {
            // reserved device type
            let line = format!("  phy {phy:3}:{routing}:attached:[0000000000000000:00]");
            if self.response_len < 64 {
                return Some(line);
            }
            return self
                .device_slot_number
                .map(|dsn| format!("{line}  dsn={dsn}"));
        };

        let mut line = format!(
            "  phy {phy:3}:{routing}:attached:[{:016x}:{:02} ",
            attached.sas_address, attached.phy_id
        );
        if let Some(name) = attached.device_name {
            let _ = write!(line, "{name:016x} ");
        }
        line.push_str(self.attached_device_type.short_name());
        if attached.virtual_phy {
            line.push_str(" V");
        }
        if attached.initiator_protocols & 0xf != 0 {
            line.push_str(" i(");
            line.push_str(&protocol_list(
                attached.initiator_protocols,
                &[
                    (initiator::SSP, "SSP"),
                    (initiator::STP, "STP"),
                    (initiator::SMP, "SMP"),
                    (initiator::SATA, "SATA"),
                ],
            ));
            line.push(')');
        }
        if attached.target_protocols & 0xf != 0 {
            line.push_str(" t(");
            line.push_str(&protocol_list(
                attached.target_protocols,
                &[
                    (target::PORT_SELECTOR, "PORT_SEL"),
                    (target::SSP, "SSP"),
                    (target::STP, "STP"),
                    (target::SMP, "SMP"),
                    (target::SATA, "SATA"),
                ],
            ));
            line.push(')');
        }
        line.push(']');
        if let Some(speed) = self.negotiated_link_rate.speed() {
            let _ = write!(line, "  {speed}");
        }
        if let Some(dsn) = self.device_slot_number {
            let _ = write!(line, "  dsn={dsn}");
        }
        Some(line)
    }

    /// The summary line for a phy reported vacant.
    pub fn vacant_summary(phy: u8) -> String {
        format!("  phy {phy:3}: inaccessible (phy vacant)")
    }
}

fn protocol_list(bits: u8, names: &[(u8, &str)]) -> String {
    names
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join("+")
}

/// Sends DISCOVER for `phy` to the current target.
///
/// `table_to_table` comes from REPORT GENERAL and turns table routing into
/// universal routing.
pub fn discover<T: SmpTransport + ?Sized>(
    transport: &mut T,
    phy: u8,
    table_to_table: bool,
) -> Result<PhyDiscoveryRecord, SmpError> {
    let allocated = ((DISCOVER_RESPONSE_LEN - 8) / 4).min(0xff) as u8;
    let mut request = [0u8; 16];
    request[0] = SMP_FRAME_TYPE_REQUEST;
    request[1] = SmpFunction::DISCOVER.0;
    request[2] = allocated;
    request[3] = 2;
    request[9] = phy;

    let rp = exchange(
        transport,
        SmpFunction::DISCOVER,
        &request,
        DISCOVER_RESPONSE_LEN,
    )?;
    let record = PhyDiscoveryRecord::decode(phy, &rp, table_to_table);
    if rp.len() > 9 && record.phy_id != phy {
        tracing::warn!(
            requested = phy,
            responded = record.phy_id,
            "discover response is for a different phy"
        );
    }
    Ok(record)
}
