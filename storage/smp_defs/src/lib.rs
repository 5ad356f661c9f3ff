// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wire definitions for the SAS Management Protocol.
//!
//! Every SMP frame starts with a four byte header: frame type, function,
//! function result (responses only) and a length in dwords. Request and
//! response buffers are sized to include the trailing four byte CRC, which the
//! pass-through drivers compute.

#![forbid(unsafe_code)]

mod codes;

pub use codes::AttachedDeviceType;
pub use codes::FunctionResult;
pub use codes::LinkRate;
pub use codes::PhyOperation;
pub use codes::SmpFunction;

use std::fmt;
use std::fmt::Display;

/// Frame type of an SMP request.
pub const SMP_FRAME_TYPE_REQUEST: u8 = 0x40;
/// Frame type of an SMP response.
pub const SMP_FRAME_TYPE_RESPONSE: u8 = 0x41;

/// Size of the frame header.
pub const SMP_HEADER_LEN: usize = 4;
/// Size of the CRC that closes every frame.
pub const SMP_CRC_LEN: usize = 4;

/// DISCOVER response buffer size, CRC included.
pub const DISCOVER_RESPONSE_LEN: usize = 124;
/// REPORT GENERAL response buffer size, CRC included.
pub const REPORT_GENERAL_RESPONSE_LEN: usize = 76;
/// REPORT MANUFACTURER INFORMATION response buffer size, CRC included.
pub const REPORT_MANUFACTURER_RESPONSE_LEN: usize = 60;
/// PHY CONTROL request size, CRC included.
pub const PHY_CONTROL_REQUEST_LEN: usize = 44;
/// PHY CONTROL response buffer size, CRC included.
pub const PHY_CONTROL_RESPONSE_LEN: usize = 8;

const FUNCTION_RESULT_NAMES: &[(FunctionResult, &str)] = &[
    (FunctionResult::ACCEPTED, "SMP function accepted"),
    (FunctionResult::UNKNOWN_FUNCTION, "Unknown SMP function"),
    (FunctionResult::FUNCTION_FAILED, "SMP function failed"),
    (
        FunctionResult::INVALID_REQUEST_LEN,
        "Invalid request frame length",
    ),
    (
        FunctionResult::INVALID_EXPANDER_CHANGE_COUNT,
        "Invalid expander change count",
    ),
    (FunctionResult::BUSY, "Busy"),
    (
        FunctionResult::INCOMPLETE_DESCRIPTOR_LIST,
        "Incomplete descriptor list",
    ),
    (FunctionResult::NO_PHY, "Phy does not exist"),
    (FunctionResult::NO_INDEX, "Index does not exist"),
    (FunctionResult::NO_SATA_SUPPORT, "Phy does not support SATA"),
    (FunctionResult::UNKNOWN_PHY_OPERATION, "Unknown phy operation"),
    (
        FunctionResult::UNKNOWN_PHY_TEST_FUNCTION,
        "Unknown phy test function",
    ),
    (
        FunctionResult::PHY_TEST_IN_PROGRESS,
        "Phy test function in progress",
    ),
    (FunctionResult::PHY_VACANT, "Phy vacant"),
    (
        FunctionResult::UNKNOWN_PHY_EVENT_SOURCE,
        "Unknown phy event source",
    ),
    (
        FunctionResult::UNKNOWN_DESCRIPTOR_TYPE,
        "Unknown descriptor type",
    ),
    (FunctionResult::UNKNOWN_PHY_FILTER, "Unknown phy filter"),
    (FunctionResult::AFFILIATION_VIOLATION, "Affiliation violation"),
    (FunctionResult::SMP_ZONE_VIOLATION, "SMP zone violation"),
    (
        FunctionResult::NO_MANAGEMENT_ACCESS,
        "No management access rights",
    ),
    (
        FunctionResult::UNKNOWN_ENABLE_DISABLE_ZONING_VALUE,
        "Unknown enable disable zoning value",
    ),
    (FunctionResult::ZONE_LOCK_VIOLATION, "Zone lock violation"),
    (FunctionResult::NOT_ACTIVATED, "Not activated"),
    (
        FunctionResult::ZONE_GROUP_OUT_OF_RANGE,
        "Zone group out of range",
    ),
    (FunctionResult::NO_PHYSICAL_PRESENCE, "No physical presence"),
    (FunctionResult::SAVING_NOT_SUPPORTED, "Saving not supported"),
    (
        FunctionResult::SOURCE_ZONE_GROUP,
        "Source zone group does not exist",
    ),
    (
        FunctionResult::DISABLED_PASSWORD_NOT_SUPPORTED,
        "Disabled password not supported",
    ),
    (
        FunctionResult::INVALID_FIELD_IN_REQUEST,
        "Invalid field in SMP request",
    ),
];

impl FunctionResult {
    /// The standard description of this result, if the code is known.
    pub fn description(self) -> Option<&'static str> {
        FUNCTION_RESULT_NAMES
            .iter()
            .find(|(code, _)| *code == self)
            .map(|(_, name)| *name)
    }
}

impl Display for FunctionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(name) => f.write_str(name),
            None => write!(f, "unknown function result code={:#04x}", self.0),
        }
    }
}

/// A default frame length, for SAS-1.1 targets that leave the length byte
/// zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DefaultLength {
    /// Length in dwords, excluding the header and CRC.
    Dwords(u8),
    /// The function has no default length.
    NoDefault,
    /// The function uses a different frame format.
    DifferentFormat,
}

impl DefaultLength {
    /// The dword count, if there is one.
    pub fn dwords(self) -> Option<u8> {
        match self {
            DefaultLength::Dwords(n) => Some(n),
            DefaultLength::NoDefault | DefaultLength::DifferentFormat => None,
        }
    }
}

struct DefaultLengths {
    function: SmpFunction,
    request: DefaultLength,
    response: DefaultLength,
}

const fn lengths(
    function: SmpFunction,
    request: DefaultLength,
    response: DefaultLength,
) -> DefaultLengths {
    DefaultLengths {
        function,
        request,
        response,
    }
}

use DefaultLength::DifferentFormat as DIFF;
use DefaultLength::Dwords as D;
use DefaultLength::NoDefault as NONE;

/// Positive lengths match SAS-1.1.
const DEFAULT_LENGTHS: &[DefaultLengths] = &[
    lengths(SmpFunction::REPORT_GENERAL, D(0), D(6)),
    lengths(SmpFunction::REPORT_MANUFACTURER, D(0), D(14)),
    lengths(SmpFunction::READ_GPIO_REG, DIFF, DIFF),
    lengths(SmpFunction::REPORT_SELF_CONFIG, NONE, NONE),
    lengths(SmpFunction::REPORT_ZONE_PERMISSION_TABLE, NONE, NONE),
    lengths(SmpFunction::REPORT_ZONE_MANAGER_PASSWORD, NONE, NONE),
    lengths(SmpFunction::REPORT_BROADCAST, NONE, NONE),
    lengths(SmpFunction::READ_GPIO_REG_ENHANCED, NONE, NONE),
    lengths(SmpFunction::DISCOVER, D(2), D(0xc)),
    lengths(SmpFunction::REPORT_PHY_ERROR_LOG, D(2), D(6)),
    lengths(SmpFunction::REPORT_PHY_SATA, D(2), D(13)),
    lengths(SmpFunction::REPORT_ROUTE_INFO, D(2), D(9)),
    lengths(SmpFunction::REPORT_PHY_EVENT, NONE, NONE),
    lengths(SmpFunction::DISCOVER_LIST, NONE, NONE),
    lengths(SmpFunction::REPORT_PHY_EVENT_LIST, NONE, NONE),
    lengths(SmpFunction::REPORT_EXPANDER_ROUTE_TABLE_LIST, NONE, NONE),
    lengths(SmpFunction::CONFIG_GENERAL, D(3), D(0)),
    lengths(SmpFunction::ENABLE_DISABLE_ZONING, NONE, D(0)),
    lengths(SmpFunction::WRITE_GPIO_REG, DIFF, DIFF),
    lengths(SmpFunction::WRITE_GPIO_REG_ENHANCED, NONE, NONE),
    lengths(SmpFunction::ZONED_BROADCAST, NONE, D(0)),
    lengths(SmpFunction::ZONE_LOCK, NONE, NONE),
    lengths(SmpFunction::ZONE_ACTIVATE, NONE, D(0)),
    lengths(SmpFunction::ZONE_UNLOCK, NONE, D(0)),
    lengths(SmpFunction::CONFIG_ZONE_MANAGER_PASSWORD, NONE, D(0)),
    lengths(SmpFunction::CONFIG_ZONE_PHY_INFO, NONE, D(0)),
    lengths(SmpFunction::CONFIG_ZONE_PERMISSION_TABLE, NONE, D(0)),
    lengths(SmpFunction::CONFIG_ROUTE_INFO, D(9), D(0)),
    lengths(SmpFunction::PHY_CONTROL, D(9), D(0)),
    lengths(SmpFunction::PHY_TEST_FUNCTION, D(9), D(0)),
    lengths(SmpFunction::CONFIG_PHY_EVENT, NONE, D(0)),
];

fn find_lengths(function: SmpFunction) -> Option<&'static DefaultLengths> {
    DEFAULT_LENGTHS.iter().find(|e| e.function == function)
}

/// The default response length of `function`, or `None` for a function
/// outside the table.
pub fn default_response_len(function: SmpFunction) -> Option<DefaultLength> {
    find_lengths(function).map(|e| e.response)
}

/// The default request length of `function`, or `None` for a function
/// outside the table.
pub fn default_request_len(function: SmpFunction) -> Option<DefaultLength> {
    find_lengths(function).map(|e| e.request)
}

/// The decoded four byte frame header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Request or response frame type.
    pub frame_type: u8,
    /// The function code.
    pub function: SmpFunction,
    /// Function result for responses, allocated response length for requests.
    pub result: u8,
    /// Frame length in dwords, excluding header and CRC.
    pub length: u8,
}

impl FrameHeader {
    /// Decodes the header from the start of `frame`.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        match *frame {
            [frame_type, function, result, length, ..] => Some(Self {
                frame_type,
                function: SmpFunction(function),
                result,
                length,
            }),
            _ => None,
        }
    }
}

impl LinkRate {
    /// The phy state for rates that mean nothing usable is attached.
    pub fn inactive_state(self) -> Option<&'static str> {
        Some(match self {
            Self::DISABLED => "disabled",
            Self::RESET_PROBLEM => "reset problem",
            Self::SPINUP_HOLD => "spinup hold",
            Self::PORT_SELECTOR => "port selector",
            Self::RESET_IN_PROGRESS => "reset in progress",
            Self::UNSUPPORTED_PHY_ATTACHED => "unsupported phy attached",
            _ => return None,
        })
    }

    /// The line rate, for the rates that carry data.
    pub fn speed(self) -> Option<&'static str> {
        Some(match self {
            Self::RATE_1_5 => "1.5 Gbps",
            Self::RATE_3 => "3 Gbps",
            Self::RATE_6 => "6 Gbps",
            Self::RATE_12 => "12 Gbps",
            Self::RATE_22_5 => "22.5 Gbps",
            _ => return None,
        })
    }
}

impl AttachedDeviceType {
    /// True for the reserved codes 4 through 7.
    pub fn is_reserved(self) -> bool {
        self.0 > 3
    }

    /// The abbreviation used in phy summaries. End devices have none.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::NONE | Self::END_DEVICE => "",
            Self::EXPANDER => "exp",
            Self::FANOUT_EXPANDER => "fex",
            _ => "res",
        }
    }
}

/// Attached initiator protocol bits, DISCOVER byte 14.
pub mod initiator {
    /// SSP initiator.
    pub const SSP: u8 = 0x8;
    /// STP initiator.
    pub const STP: u8 = 0x4;
    /// SMP initiator.
    pub const SMP: u8 = 0x2;
    /// SATA host.
    pub const SATA: u8 = 0x1;
}

/// Attached target protocol bits, DISCOVER byte 15.
pub mod target {
    /// SATA port selector.
    pub const PORT_SELECTOR: u8 = 0x80;
    /// SSP target.
    pub const SSP: u8 = 0x8;
    /// STP target.
    pub const STP: u8 = 0x4;
    /// SMP target.
    pub const SMP: u8 = 0x2;
    /// SATA device.
    pub const SATA: u8 = 0x1;
}
