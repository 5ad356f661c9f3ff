// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! SMP code points.

#![allow(missing_docs)] // self-explanatory constants

use open_enum::open_enum;

/// An SMP function code.
#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum SmpFunction {
    REPORT_GENERAL = 0x00,
    REPORT_MANUFACTURER = 0x01,
    READ_GPIO_REG = 0x02,
    REPORT_SELF_CONFIG = 0x03,
    REPORT_ZONE_PERMISSION_TABLE = 0x04,
    REPORT_ZONE_MANAGER_PASSWORD = 0x05,
    REPORT_BROADCAST = 0x06,
    READ_GPIO_REG_ENHANCED = 0x07,
    DISCOVER = 0x10,
    REPORT_PHY_ERROR_LOG = 0x11,
    REPORT_PHY_SATA = 0x12,
    REPORT_ROUTE_INFO = 0x13,
    REPORT_PHY_EVENT = 0x14,
    DISCOVER_LIST = 0x20,
    REPORT_PHY_EVENT_LIST = 0x21,
    REPORT_EXPANDER_ROUTE_TABLE_LIST = 0x22,
    CONFIG_GENERAL = 0x80,
    ENABLE_DISABLE_ZONING = 0x81,
    WRITE_GPIO_REG = 0x82,
    WRITE_GPIO_REG_ENHANCED = 0x83,
    ZONED_BROADCAST = 0x85,
    ZONE_LOCK = 0x86,
    ZONE_ACTIVATE = 0x87,
    ZONE_UNLOCK = 0x88,
    CONFIG_ZONE_MANAGER_PASSWORD = 0x89,
    CONFIG_ZONE_PHY_INFO = 0x8a,
    CONFIG_ZONE_PERMISSION_TABLE = 0x8b,
    CONFIG_ROUTE_INFO = 0x90,
    PHY_CONTROL = 0x91,
    PHY_TEST_FUNCTION = 0x92,
    CONFIG_PHY_EVENT = 0x93,
}

/// The function result byte of an SMP response.
#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum FunctionResult {
    ACCEPTED = 0x00,
    UNKNOWN_FUNCTION = 0x01,
    FUNCTION_FAILED = 0x02,
    INVALID_REQUEST_LEN = 0x03,
    INVALID_EXPANDER_CHANGE_COUNT = 0x04,
    BUSY = 0x05,
    INCOMPLETE_DESCRIPTOR_LIST = 0x06,
    NO_PHY = 0x10,
    NO_INDEX = 0x11,
    NO_SATA_SUPPORT = 0x12,
    UNKNOWN_PHY_OPERATION = 0x13,
    UNKNOWN_PHY_TEST_FUNCTION = 0x14,
    PHY_TEST_IN_PROGRESS = 0x15,
    PHY_VACANT = 0x16,
    UNKNOWN_PHY_EVENT_SOURCE = 0x17,
    UNKNOWN_DESCRIPTOR_TYPE = 0x18,
    UNKNOWN_PHY_FILTER = 0x19,
    AFFILIATION_VIOLATION = 0x1a,
    SMP_ZONE_VIOLATION = 0x20,
    NO_MANAGEMENT_ACCESS = 0x21,
    UNKNOWN_ENABLE_DISABLE_ZONING_VALUE = 0x22,
    ZONE_LOCK_VIOLATION = 0x23,
    NOT_ACTIVATED = 0x24,
    ZONE_GROUP_OUT_OF_RANGE = 0x25,
    NO_PHYSICAL_PRESENCE = 0x26,
    SAVING_NOT_SUPPORTED = 0x27,
    SOURCE_ZONE_GROUP = 0x28,
    DISABLED_PASSWORD_NOT_SUPPORTED = 0x29,
    INVALID_FIELD_IN_REQUEST = 0x2a,
}

/// The negotiated logical link rate nibble of a DISCOVER response.
#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum LinkRate {
    UNKNOWN = 0,
    DISABLED = 1,
    RESET_PROBLEM = 2,
    SPINUP_HOLD = 3,
    PORT_SELECTOR = 4,
    RESET_IN_PROGRESS = 5,
    UNSUPPORTED_PHY_ATTACHED = 6,
    RATE_1_5 = 8,
    RATE_3 = 9,
    RATE_6 = 0xa,
    RATE_12 = 0xb,
    RATE_22_5 = 0xc,
}

/// The attached SAS device type of a DISCOVER response.
#[open_enum]
#[derive(Debug, Copy, Clone, Hash)]
#[repr(u8)]
pub enum AttachedDeviceType {
    NONE = 0,
    END_DEVICE = 1,
    EXPANDER = 2,
    FANOUT_EXPANDER = 3,
}

/// PHY CONTROL phy operation codes.
#[open_enum]
#[derive(Debug, Copy, Clone)]
#[repr(u8)]
pub enum PhyOperation {
    NOP = 0,
    LINK_RESET = 1,
    HARD_RESET = 2,
    DISABLE = 3,
}
