// Copyright (c) 2025 - Cowboy AI, Inc.
//! Properties of subnets and provisioning ranges
//!
//! ## Properties Tested
//!
//! 1. **Containment**: a subnet contains exactly the addresses between its
//!    first and last address
//! 2. **Overlap symmetry**: `a.overlaps(b) == b.overlaps(a)`, and nested
//!    subnets always overlap
//! 3. **Range indexing**: `nth` and `offset_of` are inverse over the range

use cim_network_ipam::domain::address;
use cim_network_ipam::domain::{ProvisionRange, Subnet};
use proptest::prelude::*;
use std::net::{IpAddr, Ipv4Addr};

fn v4_subnet() -> impl Strategy<Value = Subnet> {
    (any::<u32>(), 8u8..=32).prop_map(|(value, prefix)| {
        Subnet::containing(IpAddr::V4(Ipv4Addr::from(value)), prefix).unwrap()
    })
}

proptest! {
    #[test]
    fn prop_subnet_contains_its_bounds(subnet in v4_subnet(), raw in any::<u32>()) {
        prop_assert!(subnet.contains(subnet.first()));
        prop_assert!(subnet.contains(subnet.last()));

        let addr = IpAddr::V4(Ipv4Addr::from(raw));
        let value = address::to_u128(addr);
        let inside = address::to_u128(subnet.first()) <= value
            && value <= address::to_u128(subnet.last());
        prop_assert_eq!(subnet.contains(addr), inside);
    }

    #[test]
    fn prop_overlap_is_symmetric(a in v4_subnet(), b in v4_subnet()) {
        prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        prop_assert!(a.overlaps(&a));
    }

    #[test]
    fn prop_nested_subnets_overlap(outer in v4_subnet(), extra in 0u8..8) {
        let prefix = (outer.prefix() + extra).min(32);
        let inner = Subnet::containing(outer.last(), prefix).unwrap();
        prop_assert!(outer.overlaps(&inner));
        prop_assert!(inner.overlaps(&outer));
    }

    #[test]
    fn prop_range_offsets_are_inverse(subnet in v4_subnet(), a in any::<u32>(), b in any::<u32>()) {
        let span = address::to_u128(subnet.last()) - address::to_u128(subnet.first());
        let (lo, hi) = (u128::from(a.min(b)) % (span + 1), u128::from(a.max(b)) % (span + 1));
        let (lo, hi) = (lo.min(hi), lo.max(hi));
        let start = address::increment(subnet.first(), lo).unwrap();
        let end = address::increment(subnet.first(), hi).unwrap();
        let range = ProvisionRange::new(&subnet, start, end).unwrap();

        prop_assert_eq!(range.len(), hi - lo + 1);
        let last = range.len() - 1;
        prop_assert_eq!(range.nth(0), Some(start));
        prop_assert_eq!(range.nth(last), Some(end));
        prop_assert_eq!(range.nth(last + 1), None);
        prop_assert_eq!(range.offset_of(end), Some(last));
    }

    #[test]
    fn prop_default_range_stays_inside_subnet(subnet in v4_subnet()) {
        let range = ProvisionRange::default_for(&subnet);
        prop_assert!(subnet.contains(range.start()));
        prop_assert!(subnet.contains(range.end()));
        if subnet.prefix() <= 30 {
            prop_assert!(!range.contains(subnet.first()));
            prop_assert!(!range.contains(subnet.last()));
        }
    }
}
