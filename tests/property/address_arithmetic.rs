// Copyright (c) 2025 - Cowboy AI, Inc.
//! Properties of address arithmetic
//!
//! ## Properties Tested
//!
//! 1. **Integer round trip**: `from_u128(to_u128(a)) == a`
//! 2. **Increment/distance inverse**: `distance(a, a + n) == n`
//! 3. **Order agreement**: `compare` agrees with integer order
//! 4. **No rollover**: incrementing past the family's last address fails

use cim_network_ipam::domain::address::{self, AddressFamily};
use proptest::prelude::*;
use std::cmp::Ordering;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

fn any_v4() -> impl Strategy<Value = IpAddr> {
    any::<u32>().prop_map(|v| IpAddr::V4(Ipv4Addr::from(v)))
}

fn any_v6() -> impl Strategy<Value = IpAddr> {
    any::<u128>().prop_map(|v| IpAddr::V6(Ipv6Addr::from(v)))
}

fn any_addr() -> impl Strategy<Value = IpAddr> {
    prop_oneof![any_v4(), any_v6()]
}

proptest! {
    #[test]
    fn prop_integer_round_trip(addr in any_addr()) {
        let family = AddressFamily::of(&addr);
        prop_assert_eq!(address::from_u128(family, address::to_u128(addr)).unwrap(), addr);
        prop_assert_eq!(address::parse(&address::to_text(addr)).unwrap(), addr);
    }

    #[test]
    fn prop_increment_then_distance(base in any::<u32>(), n in any::<u32>()) {
        let addr = IpAddr::V4(Ipv4Addr::from(base));
        match address::increment(addr, u128::from(n)) {
            Ok(next) => prop_assert_eq!(address::distance(addr, next).unwrap(), u128::from(n)),
            Err(_) => prop_assert!(u64::from(base) + u64::from(n) > u64::from(u32::MAX)),
        }
    }

    #[test]
    fn prop_compare_agrees_with_integers(a in any_v6(), b in any_v6()) {
        let expected = address::to_u128(a).cmp(&address::to_u128(b));
        prop_assert_eq!(address::compare(a, b).unwrap(), expected);
        prop_assert_eq!(address::compare(b, a).unwrap(), expected.reverse());
    }

    #[test]
    fn prop_mixed_families_do_not_combine(a in any_v4(), b in any_v6()) {
        prop_assert!(address::compare(a, b).is_err());
        prop_assert!(address::distance(a, b).is_err());
    }

    #[test]
    fn prop_no_rollover_past_family_end(n in 1u128..1_000_000) {
        let last_v4 = IpAddr::V4(Ipv4Addr::BROADCAST);
        let last_v6 = IpAddr::V6(Ipv6Addr::from(u128::MAX));
        prop_assert!(address::increment(last_v4, n).is_err());
        prop_assert!(address::increment(last_v6, n).is_err());
        prop_assert_eq!(address::increment(last_v4, 0).unwrap(), last_v4);
    }
}

#[test]
fn test_distance_requires_order() {
    let low: IpAddr = "10.0.0.1".parse().unwrap();
    let high: IpAddr = "10.0.0.9".parse().unwrap();
    assert_eq!(address::distance(low, high).unwrap(), 8);
    assert!(address::distance(high, low).is_err());
    assert_eq!(address::compare(low, high).unwrap(), Ordering::Less);
}
