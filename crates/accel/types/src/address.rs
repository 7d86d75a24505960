//! PCI addresses used as device keys
//!
//! Devices are keyed by their PCI address in the extended
//! `domain:bus:device.function` notation, e.g. `0000:01:00.1`.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PCI_DEVICES_PER_BUS: u8 = 32;
const PCI_FUNCTIONS_PER_DEVICE: u8 = 8;

/// Errors produced while parsing a PCI address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("Malformed PCI address {0:?}: expected DDDD:BB:DD.F")]
    Malformed(String),

    #[error("Invalid {field} in PCI address {input:?}")]
    InvalidField { field: &'static str, input: String },

    #[error("PCI device {0:#x} outside range of 0-0x1f")]
    DeviceOutOfRange(u8),

    #[error("PCI function {0} outside range of 0-7")]
    FunctionOutOfRange(u8),
}

/// A PCI domain/bus/device/function tuple
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PciAddress {
    domain: u16,
    bus: u8,
    device: u8,
    function: u8,
}

impl PciAddress {
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> Result<Self, AddressParseError> {
        if device >= PCI_DEVICES_PER_BUS {
            return Err(AddressParseError::DeviceOutOfRange(device));
        }
        if function >= PCI_FUNCTIONS_PER_DEVICE {
            return Err(AddressParseError::FunctionOutOfRange(function));
        }
        Ok(Self {
            domain,
            bus,
            device,
            function,
        })
    }

    #[inline]
    pub fn domain(&self) -> u16 {
        self.domain
    }

    #[inline]
    pub fn bus(&self) -> u8 {
        self.bus
    }

    #[inline]
    pub fn device(&self) -> u8 {
        self.device
    }

    #[inline]
    pub fn function(&self) -> u8 {
        self.function
    }
}

fn parse_hex(
    field: &'static str,
    raw: &str,
    input: &str,
    width: usize,
) -> Result<u32, AddressParseError> {
    let invalid = || AddressParseError::InvalidField {
        field,
        input: input.to_string(),
    };
    if raw.is_empty() || raw.len() > width {
        return Err(invalid());
    }
    u32::from_str_radix(raw, 16).map_err(|_| invalid())
}

impl FromStr for PciAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let parts: Vec<&str> = input.split(':').collect();

        // The domain may be omitted, in which case it is 0000.
        let (domain, bus, slot) = match parts.as_slice() {
            [domain, bus, slot] => (parse_hex("domain", domain, input, 4)?, *bus, *slot),
            [bus, slot] => (0, *bus, *slot),
            _ => return Err(AddressParseError::Malformed(input.to_string())),
        };

        let (device, function) = slot
            .split_once('.')
            .ok_or_else(|| AddressParseError::Malformed(input.to_string()))?;

        // Field widths bound every value to its integer type.
        Self::new(
            domain as u16,
            parse_hex("bus", bus, input, 2)? as u8,
            parse_hex("device", device, input, 2)? as u8,
            parse_hex("function", function, input, 1)? as u8,
        )
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl Serialize for PciAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'d> Deserialize<'d> for PciAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}
