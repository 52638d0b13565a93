// Copyright (c) 2025 - Cowboy AI, Inc.
//! Address Arithmetic
//!
//! Pure functions over IPv4 and IPv6 addresses. Both families are handled
//! through one representation: the address's integer value in a `u128`,
//! tagged with its [`AddressFamily`]. Operations never mix families; doing so
//! fails with [`AddressError::InvalidFormat`].

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// Address arithmetic error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address format: {0}")]
    InvalidFormat(String),

    #[error("Address {0} cannot be incremented by {1} within its family")]
    Overflow(IpAddr, u128),
}

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    /// Address width in bits
    pub fn bits(&self) -> u32 {
        match self {
            AddressFamily::Ipv4 => 32,
            AddressFamily::Ipv6 => 128,
        }
    }

    /// Largest integer value an address of this family can hold
    pub fn max_value(&self) -> u128 {
        match self {
            AddressFamily::Ipv4 => u128::from(u32::MAX),
            AddressFamily::Ipv6 => u128::MAX,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => f.write_str("ipv4"),
            AddressFamily::Ipv6 => f.write_str("ipv6"),
        }
    }
}

/// Parse an address from its textual form
pub fn parse(text: &str) -> Result<IpAddr, AddressError> {
    IpAddr::from_str(text).map_err(|_| AddressError::InvalidFormat(text.to_string()))
}

/// Canonical textual form of an address
pub fn to_text(addr: IpAddr) -> String {
    addr.to_string()
}

/// Integer value of an address
pub fn to_u128(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Address of the given family with the given integer value
pub fn from_u128(family: AddressFamily, value: u128) -> Result<IpAddr, AddressError> {
    match family {
        AddressFamily::Ipv4 => u32::try_from(value)
            .map(|v| IpAddr::V4(Ipv4Addr::from(v)))
            .map_err(|_| AddressError::InvalidFormat(format!("{} is not an IPv4 value", value))),
        AddressFamily::Ipv6 => Ok(IpAddr::V6(Ipv6Addr::from(value))),
    }
}

fn same_family(a: IpAddr, b: IpAddr) -> Result<AddressFamily, AddressError> {
    let family = AddressFamily::of(&a);
    if family != AddressFamily::of(&b) {
        return Err(AddressError::InvalidFormat(format!(
            "cannot combine {} address {} with {} address {}",
            family,
            a,
            AddressFamily::of(&b),
            b
        )));
    }
    Ok(family)
}

/// Compare two addresses of the same family
pub fn compare(a: IpAddr, b: IpAddr) -> Result<Ordering, AddressError> {
    same_family(a, b)?;
    Ok(to_u128(a).cmp(&to_u128(b)))
}

/// The address `n` positions after `addr`
///
/// Going past the last address of the family is an error, never a rollover.
pub fn increment(addr: IpAddr, n: u128) -> Result<IpAddr, AddressError> {
    let family = AddressFamily::of(&addr);
    let value = to_u128(addr)
        .checked_add(n)
        .filter(|v| *v <= family.max_value())
        .ok_or(AddressError::Overflow(addr, n))?;
    from_u128(family, value)
}

/// Number of steps from `from` to `to` (`to` must not precede `from`)
pub fn distance(from: IpAddr, to: IpAddr) -> Result<u128, AddressError> {
    same_family(from, to)?;
    to_u128(to)
        .checked_sub(to_u128(from))
        .ok_or_else(|| AddressError::InvalidFormat(format!("{} precedes {}", to, from)))
}

/// CIDR subnet, always held in normalized form (host bits clear)
///
/// # Examples
///
/// ```rust
/// use cim_network_ipam::domain::Subnet;
///
/// let wide: Subnet = "10.0.0.0/23".parse().unwrap();
/// let narrow: Subnet = "10.0.1.0/24".parse().unwrap();
/// assert!(wide.overlaps(&narrow));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subnet {
    network: IpNetwork,
}

impl Subnet {
    /// Parse `address/prefix`. The address must be the network address.
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        if !text.contains('/') {
            return Err(AddressError::InvalidFormat(format!(
                "{} is missing a prefix length",
                text
            )));
        }
        let network = IpNetwork::from_str(text)
            .map_err(|_| AddressError::InvalidFormat(text.to_string()))?;
        if network.ip() != network.network() {
            return Err(AddressError::InvalidFormat(format!(
                "{} is not the network address of /{}",
                network.ip(),
                network.prefix()
            )));
        }
        Ok(Self { network })
    }

    /// Subnet of `prefix` bits containing `addr`
    pub fn containing(addr: IpAddr, prefix: u8) -> Result<Self, AddressError> {
        let network = IpNetwork::new(addr, prefix)
            .map_err(|e| AddressError::InvalidFormat(e.to_string()))?;
        let network = IpNetwork::new(network.network(), prefix)
            .map_err(|e| AddressError::InvalidFormat(e.to_string()))?;
        Ok(Self { network })
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.network.ip())
    }

    pub fn prefix(&self) -> u8 {
        self.network.prefix()
    }

    pub fn netmask(&self) -> IpAddr {
        self.network.mask()
    }

    /// First address of the subnet
    pub fn first(&self) -> IpAddr {
        self.network.network()
    }

    /// Last address of the subnet (the broadcast address for IPv4)
    pub fn last(&self) -> IpAddr {
        let value = to_u128(self.first()) | self.host_mask();
        // Host bits are within the family width, so this cannot fail
        from_u128(self.family(), value).unwrap_or(self.first())
    }

    fn host_mask(&self) -> u128 {
        let host_bits = self.family().bits() - u32::from(self.prefix());
        if host_bits >= 128 {
            u128::MAX
        } else {
            (1u128 << host_bits) - 1
        }
    }

    fn bounds(&self) -> (u128, u128) {
        let first = to_u128(self.first());
        (first, first | self.host_mask())
    }

    /// True iff `addr` is inside this subnet (never for another family)
    pub fn contains(&self, addr: IpAddr) -> bool {
        if AddressFamily::of(&addr) != self.family() {
            return false;
        }
        let (first, last) = self.bounds();
        let value = to_u128(addr);
        first <= value && value <= last
    }

    /// True iff the two subnets share at least one address
    pub fn overlaps(&self, other: &Subnet) -> bool {
        if self.family() != other.family() {
            return false;
        }
        let (a_first, a_last) = self.bounds();
        let (b_first, b_last) = other.bounds();
        a_first <= b_last && b_first <= a_last
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.first(), self.prefix())
    }
}

impl FromStr for Subnet {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Subnet {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Subnet> for String {
    fn from(subnet: Subnet) -> Self {
        subnet.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        parse(s).unwrap()
    }

    fn subnet(s: &str) -> Subnet {
        s.parse().unwrap()
    }

    #[test]
    fn test_increment_within_octet() {
        assert_eq!(increment(ip("10.0.2.254"), 1).unwrap(), ip("10.0.2.255"));
        assert_eq!(increment(ip("10.0.2.255"), 1).unwrap(), ip("10.0.3.0"));
        assert_eq!(increment(ip("fd00::ffff"), 1).unwrap(), ip("fd00::1:0"));
    }

    #[test]
    fn test_increment_past_family_max_is_error() {
        assert!(matches!(
            increment(ip("255.255.255.255"), 1),
            Err(AddressError::Overflow(_, 1))
        ));
        assert!(increment(ip("ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff"), 1).is_err());
    }

    #[test]
    fn test_compare_rejects_mixed_families() {
        assert_eq!(compare(ip("10.0.0.1"), ip("10.0.0.2")).unwrap(), Ordering::Less);
        assert!(matches!(
            compare(ip("10.0.0.1"), ip("::1")),
            Err(AddressError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_distance() {
        assert_eq!(distance(ip("10.0.0.1"), ip("10.0.1.0")).unwrap(), 255);
        assert!(distance(ip("10.0.0.2"), ip("10.0.0.1")).is_err());
    }

    #[test]
    fn test_subnet_rejects_host_bits_and_missing_prefix() {
        assert!(Subnet::parse("10.0.0.1/24").is_err());
        assert!(Subnet::parse("10.0.0.0").is_err());
        assert!(Subnet::parse("10.0.0.0/33").is_err());
        assert!(Subnet::parse("not-a-subnet/24").is_err());
    }

    #[test]
    fn test_subnet_bounds() {
        let s = subnet("192.168.4.0/22");
        assert_eq!(s.first(), ip("192.168.4.0"));
        assert_eq!(s.last(), ip("192.168.7.255"));
        assert_eq!(s.netmask(), ip("255.255.252.0"));

        let all = subnet("::/0");
        assert_eq!(all.last(), ip("ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff"));
    }

    #[test]
    fn test_contains() {
        let s = subnet("10.0.0.0/24");
        assert!(s.contains(ip("10.0.0.0")));
        assert!(s.contains(ip("10.0.0.255")));
        assert!(!s.contains(ip("10.0.1.0")));
        assert!(!s.contains(ip("::a00:1")));
    }

    #[test]
    fn test_overlaps() {
        assert!(!subnet("10.0.0.0/24").overlaps(&subnet("10.0.1.0/24")));
        assert!(subnet("10.0.0.0/23").overlaps(&subnet("10.0.1.0/24")));
        assert!(subnet("10.0.0.128/25").overlaps(&subnet("10.0.0.0/24")));
        assert!(!subnet("10.0.0.0/8").overlaps(&subnet("fd00::/8")));
    }

    #[test]
    fn test_subnet_serde_as_string() {
        let s = subnet("fd00:1::/64");
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"fd00:1::/64\"");
        let back: Subnet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
        assert!(serde_json::from_str::<Subnet>("\"10.0.0.7/24\"").is_err());
    }
}
