// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Range
//!
//! The inclusive `[start, end]` slice of a subnet that addresses are handed
//! out from.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;

use super::address::{self, AddressFamily, Subnet};

/// Provisioning range validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("provision_start_ip cannot be outside subnet")]
    StartOutsideSubnet,

    #[error("provision_end_ip cannot be outside subnet")]
    EndOutsideSubnet,

    #[error("provision_start_ip must be before provision_end_ip")]
    StartAfterEnd,
}

impl RangeError {
    /// Request field the error refers to
    pub fn field(&self) -> &'static str {
        match self {
            RangeError::StartOutsideSubnet | RangeError::StartAfterEnd => "provision_start_ip",
            RangeError::EndOutsideSubnet => "provision_end_ip",
        }
    }
}

/// Inclusive provisioning range within a subnet
///
/// Invariants:
/// - `start <= end`
/// - both ends inside the subnet, so both share the subnet's family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvisionRange {
    #[serde(rename = "provision_start_ip")]
    start: IpAddr,
    #[serde(rename = "provision_end_ip")]
    end: IpAddr,
}

impl ProvisionRange {
    /// Validate `[start, end]` against `subnet`, reporting every violation
    pub fn new(subnet: &Subnet, start: IpAddr, end: IpAddr) -> Result<Self, Vec<RangeError>> {
        let mut errors = Vec::new();
        if !subnet.contains(start) {
            errors.push(RangeError::StartOutsideSubnet);
        }
        if !subnet.contains(end) {
            errors.push(RangeError::EndOutsideSubnet);
        }
        if errors.is_empty() && address::to_u128(start) > address::to_u128(end) {
            errors.push(RangeError::StartAfterEnd);
        }

        if errors.is_empty() {
            Ok(Self { start, end })
        } else {
            Err(errors)
        }
    }

    /// Range used when a network is created without explicit bounds
    ///
    /// IPv4 skips the network and broadcast addresses unless the subnet is
    /// a /31 or /32. IPv6 skips only the first (subnet-router anycast)
    /// address.
    pub fn default_for(subnet: &Subnet) -> Self {
        let first = subnet.first();
        let last = subnet.last();
        let span = address::to_u128(last) - address::to_u128(first);

        let (start, end) = match subnet.family() {
            AddressFamily::Ipv4 if span >= 2 => (step(first, 1), step(last, -1)),
            AddressFamily::Ipv6 if span >= 1 => (step(first, 1), last),
            _ => (first, last),
        };
        Self { start, end }
    }

    pub fn start(&self) -> IpAddr {
        self.start
    }

    pub fn end(&self) -> IpAddr {
        self.end
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.start)
    }

    /// Number of addresses in the range (saturates for a full IPv6 space)
    pub fn len(&self) -> u128 {
        (address::to_u128(self.end) - address::to_u128(self.start)).saturating_add(1)
    }

    /// Always false: a range holds at least its start address
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        if AddressFamily::of(&addr) != self.family() {
            return false;
        }
        let value = address::to_u128(addr);
        address::to_u128(self.start) <= value && value <= address::to_u128(self.end)
    }

    /// The address `offset` positions after `start`, if still in range
    pub fn nth(&self, offset: u128) -> Option<IpAddr> {
        address::increment(self.start, offset)
            .ok()
            .filter(|addr| self.contains(*addr))
    }

    /// Position of `addr` relative to `start`
    pub fn offset_of(&self, addr: IpAddr) -> Option<u128> {
        if !self.contains(addr) {
            return None;
        }
        address::distance(self.start, addr).ok()
    }
}

fn step(addr: IpAddr, delta: i8) -> IpAddr {
    let family = AddressFamily::of(&addr);
    let value = address::to_u128(addr);
    let value = if delta >= 0 {
        value.saturating_add(delta as u128)
    } else {
        value.saturating_sub(delta.unsigned_abs() as u128)
    };
    address::from_u128(family, value).unwrap_or(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_default_ipv4_range_skips_network_and_broadcast() {
        let range = ProvisionRange::default_for(&"10.0.0.0/24".parse().unwrap());
        assert_eq!(range.start(), ip("10.0.0.1"));
        assert_eq!(range.end(), ip("10.0.0.254"));
        assert_eq!(range.len(), 254);
    }

    #[test]
    fn test_default_range_small_subnets() {
        let p2p = ProvisionRange::default_for(&"10.0.0.0/31".parse().unwrap());
        assert_eq!((p2p.start(), p2p.end()), (ip("10.0.0.0"), ip("10.0.0.1")));

        let host = ProvisionRange::default_for(&"10.0.0.9/32".parse().unwrap());
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn test_default_ipv6_range() {
        let range = ProvisionRange::default_for(&"fd00::/120".parse().unwrap());
        assert_eq!(range.start(), ip("fd00::1"));
        assert_eq!(range.end(), ip("fd00::ff"));
    }

    #[test]
    fn test_new_reports_every_violation() {
        let subnet: Subnet = "10.0.0.0/24".parse().unwrap();
        let errors = ProvisionRange::new(&subnet, ip("10.0.1.1"), ip("10.0.2.1")).unwrap_err();
        assert_eq!(
            errors,
            vec![RangeError::StartOutsideSubnet, RangeError::EndOutsideSubnet]
        );

        let errors = ProvisionRange::new(&subnet, ip("10.0.0.9"), ip("10.0.0.5")).unwrap_err();
        assert_eq!(errors, vec![RangeError::StartAfterEnd]);
        assert_eq!(errors[0].field(), "provision_start_ip");
    }

    #[test]
    fn test_nth_and_offset_of() {
        let subnet: Subnet = "10.0.0.0/24".parse().unwrap();
        let range = ProvisionRange::new(&subnet, ip("10.0.0.10"), ip("10.0.0.12")).unwrap();
        assert_eq!(range.nth(0), Some(ip("10.0.0.10")));
        assert_eq!(range.nth(2), Some(ip("10.0.0.12")));
        assert_eq!(range.nth(3), None);
        assert_eq!(range.offset_of(ip("10.0.0.11")), Some(1));
        assert_eq!(range.offset_of(ip("10.0.0.13")), None);
    }
}
