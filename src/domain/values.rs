// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Value object validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("VLAN ID must be between {} and {}", VlanId::MIN, VlanId::MAX)]
    InvalidVlanId(u32),

    #[error("MTU must be between {min} and {max}")]
    MtuOutOfRange { value: u32, min: u32, max: u32 },

    #[error("nic tag name must be 1-{} characters of [a-zA-Z0-9_]", NicTagName::MAX_LEN)]
    InvalidNicTagName(String),
}

/// MAC Address value object
///
/// Invariants:
/// - 6 octets (48 bits)
/// - Canonical representation (lowercase, colon-separated)
///
/// # Examples
///
/// ```rust
/// use cim_network_ipam::domain::MacAddress;
///
/// let mac = MacAddress::new("00-11-22-AA-BB-CC").unwrap();
/// assert_eq!(mac.as_str(), "00:11:22:aa:bb:cc");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Accepts colon- or dash-separated octets, or 12 bare hex digits
    pub fn new(mac: impl AsRef<str>) -> Result<Self, ValueError> {
        let mac = mac.as_ref();
        let mac_clean = mac.replace([':', '-'], "");

        if mac_clean.len() != 12 || !mac_clean.is_ascii() {
            return Err(ValueError::InvalidMacAddress(mac.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, chunk) in mac_clean.as_bytes().chunks(2).enumerate() {
            let hex_str = std::str::from_utf8(chunk)
                .map_err(|_| ValueError::InvalidMacAddress(mac.to_string()))?;
            octets[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|_| ValueError::InvalidMacAddress(mac.to_string()))?;
        }

        Ok(Self(octets))
    }

    pub fn from_octets(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn as_str(&self) -> String {
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }

    /// Store key form: 12 bare hex digits
    pub fn key(&self) -> String {
        self.0.iter().map(|o| format!("{:02x}", o)).collect()
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MacAddress {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.as_str()
    }
}

/// VLAN ID value object
///
/// IEEE 802.1Q tag. 0 means untagged; 4095 is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct VlanId(u16);

impl VlanId {
    pub const MIN: u16 = 0;
    pub const MAX: u16 = 4094;

    pub fn new(id: u32) -> Result<Self, ValueError> {
        u16::try_from(id)
            .ok()
            .filter(|id| *id <= Self::MAX)
            .map(Self)
            .ok_or(ValueError::InvalidVlanId(id))
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn is_untagged(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for VlanId {
    type Error = ValueError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VlanId> for u32 {
    fn from(id: VlanId) -> Self {
        u32::from(id.0)
    }
}

/// Inclusive MTU limits, plus the value used when none is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MtuBounds {
    pub default: u32,
    pub min: u32,
    pub max: u32,
}

impl MtuBounds {
    /// Standard Ethernet MTU
    pub const STANDARD_ETHERNET: u32 = 1500;

    /// Jumbo frame MTU
    pub const JUMBO: u32 = 9000;

    /// Limits for networks
    pub fn network() -> Self {
        Self {
            default: Self::STANDARD_ETHERNET,
            min: 576,
            max: Self::JUMBO,
        }
    }

    /// Limits for nic tags
    pub fn nic_tag() -> Self {
        Self {
            default: Self::STANDARD_ETHERNET,
            min: Self::STANDARD_ETHERNET,
            max: Self::JUMBO,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.min <= self.default && self.default <= self.max
    }

    pub fn check(&self, value: u32) -> Result<Mtu, ValueError> {
        if value < self.min || value > self.max {
            return Err(ValueError::MtuOutOfRange {
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(Mtu(value))
    }

    pub fn default_mtu(&self) -> Mtu {
        Mtu(self.default)
    }
}

/// MTU (Maximum Transmission Unit) value object
///
/// Only constructed through [`MtuBounds::check`], so a held `Mtu` was within
/// the configured limits when it was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mtu(u32);

impl Mtu {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Mtu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a nic tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NicTagName(String);

impl NicTagName {
    pub const MAX_LEN: usize = 31;

    pub fn new(name: impl Into<String>) -> Result<Self, ValueError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= Self::MAX_LEN
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(ValueError::InvalidNicTagName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NicTagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NicTagName {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NicTagName> for String {
    fn from(name: NicTagName) -> Self {
        name.0
    }
}
