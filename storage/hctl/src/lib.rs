// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Host:channel:target:lun addressing for SCSI mid-layer devices.
//!
//! sysfs names every SCSI device (and every NVMe namespace exposed through
//! the SCSI emulation) as `h:c:t:l`. The ordering defined here is the
//! canonical device enumeration order used for slot assignment.

#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::fmt::Display;
use std::num::ParseIntError;
use std::str::FromStr;
use thiserror::Error;

/// Host number used for NVMe pseudo-hosts. Displayed as `N`.
pub const NVME_HOST_NUM: i32 = 0x7fff;

/// A parsed `host:channel:target:lun` tuple.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HctlAddress {
    /// Adapter ordinal, or [`NVME_HOST_NUM`].
    pub host: i32,
    /// Channel (bus) number. For NVMe, the controller number.
    pub channel: i32,
    /// Target id. For NVMe, the controller id.
    pub target: i32,
    /// Linux LUN value. For NVMe, the namespace id.
    pub lun: u64,
    lun_bytes: [u8; 8],
}

/// The field of an HCTL string that failed to parse.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HctlField {
    /// The host field.
    Host,
    /// The channel field.
    Channel,
    /// The target field.
    Target,
    /// The lun field.
    Lun,
}

impl Display for HctlField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            HctlField::Host => "host",
            HctlField::Channel => "channel",
            HctlField::Target => "target",
            HctlField::Lun => "lun",
        })
    }
}

/// Error returned when parsing an HCTL string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseHctlError {
    /// Fewer than four colon-separated fields.
    #[error("missing {0} field")]
    MissingField(HctlField),
    /// A field is not a valid integer.
    #[error("invalid {field} field {text:?}")]
    InvalidField {
        /// The offending field.
        field: HctlField,
        /// The offending text.
        text: String,
        /// The integer parse failure.
        #[source]
        source: ParseIntError,
    },
}

impl HctlAddress {
    /// Builds an address, computing the 8-byte LUN representation.
    pub fn new(host: i32, channel: i32, target: i32, lun: u64) -> Self {
        let mut lun_bytes = [0; 8];
        if host == NVME_HOST_NUM {
            // Namespace ids are 32 bits, little endian, remaining bytes zero.
            lun_bytes[..4].copy_from_slice(&(lun as u32).to_le_bytes());
        } else {
            // Linux flips the T10 LUN word order: the low word is level one.
            let mut z = lun;
            for word in lun_bytes.chunks_exact_mut(2) {
                word.copy_from_slice(&(z as u16).to_be_bytes());
                z >>= 16;
            }
        }
        Self {
            host,
            channel,
            target,
            lun,
            lun_bytes,
        }
    }

    /// Parses `h:c:t:l`.
    pub fn parse(text: &str) -> Result<Self, ParseHctlError> {
        text.parse()
    }

    /// The LUN in T10 (SAM-5) byte order, or the NVMe namespace id as a
    /// little-endian 32-bit value followed by zeros.
    pub fn lun_bytes(&self) -> [u8; 8] {
        self.lun_bytes
    }

    /// Returns true for the NVMe pseudo-host.
    pub fn is_nvme(&self) -> bool {
        self.host == NVME_HOST_NUM
    }

    /// Returns true if both addresses share host and channel.
    pub fn same_bus(&self, other: &Self) -> bool {
        self.host == other.host && self.channel == other.channel
    }
}

/// Compares two addresses by host, channel, target, then lun.
pub fn compare(a: &HctlAddress, b: &HctlAddress) -> Ordering {
    a.cmp(b)
}

impl Ord for HctlAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.host, self.channel, self.target, self.lun).cmp(&(
            other.host,
            other.channel,
            other.target,
            other.lun,
        ))
    }
}

impl PartialOrd for HctlAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn parse_field<T: FromStr<Err = ParseIntError>>(
    field: HctlField,
    text: Option<&str>,
) -> Result<T, ParseHctlError> {
    let text = text.ok_or(ParseHctlError::MissingField(field))?;
    text.parse().map_err(|source| ParseHctlError::InvalidField {
        field,
        text: text.to_owned(),
        source,
    })
}

impl FromStr for HctlAddress {
    type Err = ParseHctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(':');
        let host = match fields.next() {
            Some("N") => NVME_HOST_NUM,
            host => parse_field(HctlField::Host, host)?,
        };
        let channel = parse_field(HctlField::Channel, fields.next())?;
        let target = parse_field(HctlField::Target, fields.next())?;
        // Joining the remainder makes a fifth field fail the lun parse.
        let rest = fields.collect::<Vec<_>>();
        let lun = if rest.is_empty() {
            return Err(ParseHctlError::MissingField(HctlField::Lun));
        } else {
            parse_field(HctlField::Lun, Some(&rest.join(":")))?
        };
        Ok(Self::new(host, channel, target, lun))
    }
}

impl Display for HctlAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nvme() {
            write!(f, "N:{}:{}:{}", self.channel, self.target, self.lun)
        } else {
            write!(
                f,
                "{}:{}:{}:{}",
                self.host, self.channel, self.target, self.lun
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic() {
        let a = HctlAddress::parse("1:2:3:4").unwrap();
        assert_eq!((a.host, a.channel, a.target, a.lun), (1, 2, 3, 4));
        assert!(!a.is_nvme());
    }

    #[test]
    fn parse_rejects_short_and_garbage() {
        assert_eq!(
            HctlAddress::parse("0:0:1").unwrap_err(),
            ParseHctlError::MissingField(HctlField::Lun)
        );
        assert_eq!(
            HctlAddress::parse("").unwrap_err(),
            ParseHctlError::InvalidField {
                field: HctlField::Host,
                text: String::new(),
                source: "".parse::<i32>().unwrap_err(),
            }
        );
        assert!(matches!(
            HctlAddress::parse("host0:0:0:0"),
            Err(ParseHctlError::InvalidField {
                field: HctlField::Host,
                ..
            })
        ));
        assert!(matches!(
            HctlAddress::parse("0:0:0:0:0"),
            Err(ParseHctlError::InvalidField {
                field: HctlField::Lun,
                ..
            })
        ));
        assert!(HctlAddress::parse("0:x:0:0").is_err());
        assert!(HctlAddress::parse("0:0:0:-1").is_err());
    }

    #[test]
    fn round_trip() {
        for text in ["0:0:0:0", "3:0:17:0", "10:2:300:65536", "N:1:2:5"] {
            let a = HctlAddress::parse(text).unwrap();
            assert_eq!(a.to_string(), text);
            assert_eq!(HctlAddress::parse(&a.to_string()).unwrap(), a);
        }
        // Non-canonical spellings still round trip through the parsed value.
        let a = HctlAddress::parse("+1:02:3:4").unwrap();
        assert_eq!(HctlAddress::parse(&a.to_string()).unwrap(), a);
    }

    #[test]
    fn ordering() {
        let a = HctlAddress::parse("0:0:1:0").unwrap();
        let b = HctlAddress::parse("0:0:2:0").unwrap();
        let c = HctlAddress::parse("0:1:0:0").unwrap();
        let d = HctlAddress::parse("1:0:0:0").unwrap();
        assert!(a < b && b < c && c < d);
        assert_eq!(compare(&a, &a), Ordering::Equal);
        assert_eq!(compare(&b, &a), Ordering::Greater);
    }

    #[test]
    fn ordering_matches_tuple_order() {
        let mut all = Vec::new();
        for h in 0..3 {
            for c in 0..2 {
                for t in 0..3 {
                    for l in [0, 1, 0x10000] {
                        all.push(HctlAddress::new(h, c, t, l));
                    }
                }
            }
        }
        for x in &all {
            for y in &all {
                let expected = (x.host, x.channel, x.target, x.lun).cmp(&(
                    y.host, y.channel, y.target, y.lun,
                ));
                assert_eq!(compare(x, y), expected);
                assert_eq!(compare(y, x), expected.reverse());
            }
        }
    }

    #[test]
    fn lun_bytes_scsi() {
        let a = HctlAddress::new(0, 0, 0, 0x0001_0002_0003_4005);
        assert_eq!(
            a.lun_bytes(),
            [0x40, 0x05, 0x00, 0x03, 0x00, 0x02, 0x00, 0x01]
        );
        assert_eq!(HctlAddress::new(0, 0, 0, 1).lun_bytes(), [0, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn lun_bytes_nvme() {
        let a = HctlAddress::parse("N:0:1:2").unwrap();
        assert!(a.is_nvme());
        assert_eq!(a.lun_bytes(), [2, 0, 0, 0, 0, 0, 0, 0]);
    }
}
