// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Validation Functions - Topology Invariants
//!
//! Cross-entity rules checked before a mutation is written. Each function
//! takes the candidate change and the entities it must be compared against,
//! and returns every violation found.
//!
//! # Invariant Categories
//!
//! 1. **Overlap**: a new subnet must not share addresses with any network
//!    in the same owner scope
//! 2. **Nic tag MTU**: a tag's MTU is never below the MTU of a network
//!    bound to it
//! 3. **Pool membership**: every member exists and all members share one
//!    address family
//!
//! Callers aggregate the returned errors into one `InvalidParameters`
//! response; nothing here touches the store.

use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::address::{AddressFamily, Subnet};
use super::network::Network;
use super::nic_tag::NicTag;
use super::values::{Mtu, NicTagName};
use crate::errors::{sort_field_errors, FieldError};

/// Validation result with every violation found
pub type ValidationResult = Result<(), Vec<FieldError>>;

fn finish(mut errors: Vec<FieldError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        sort_field_errors(&mut errors);
        Err(errors)
    }
}

/// True when two owner lists fall in the same visibility domain
///
/// An empty list is global and shares scope with everything.
pub fn scopes_intersect(a: &[Uuid], b: &[Uuid]) -> bool {
    a.is_empty() || b.is_empty() || a.iter().any(|owner| b.contains(owner))
}

/// Validate that `subnet` does not overlap an existing network
///
/// # Rules
/// - Only networks whose owner scope intersects `owner_uuids` are compared
/// - `updating`, when set, is the network being changed and is skipped
/// - One `InvalidParameter` on `subnet` per conflicting network, carrying
///   its `network_uuid`, sorted by that UUID
pub fn validate_subnet_overlap(
    subnet: &Subnet,
    owner_uuids: &[Uuid],
    existing: &[Network],
    updating: Option<Uuid>,
) -> ValidationResult {
    let errors = existing
        .iter()
        .filter(|network| Some(network.uuid) != updating)
        .filter(|network| scopes_intersect(owner_uuids, &network.owner_uuids))
        .filter(|network| network.subnet.overlaps(subnet))
        .map(|network| {
            FieldError::invalid(
                "subnet",
                format!(
                    "Subnet {} overlaps with network \"{}\" ({})",
                    subnet, network.uuid, network.subnet
                ),
            )
            .with("network_uuid", network.uuid.to_string())
        })
        .collect();
    finish(errors)
}

/// Validate a nic tag MTU change against the networks bound to the tag
///
/// `mtu` is the requested value, which may still be outside the configured
/// limits. Raising the MTU, or leaving it unchanged, always passes.
pub fn validate_nic_tag_mtu(tag: &NicTagName, mtu: u32, networks: &[Network]) -> ValidationResult {
    let errors = networks
        .iter()
        .filter(|network| &network.nic_tag == tag && network.mtu.value() > mtu)
        .map(|network| {
            FieldError::invalid(
                "mtu",
                format!(
                    "nic tag MTU {} is below the MTU {} of network \"{}\"",
                    mtu, network.mtu, network.uuid
                ),
            )
            .with("network_uuid", network.uuid.to_string())
        })
        .collect();
    finish(errors)
}

/// Validate a network MTU against the MTU of its nic tag
pub fn validate_network_mtu(mtu: Mtu, tag: &NicTag) -> ValidationResult {
    if mtu > tag.mtu {
        return finish(vec![FieldError::invalid(
            "mtu",
            format!(
                "network MTU {} must not exceed the MTU {} of nic tag \"{}\"",
                mtu, tag.mtu, tag.name
            ),
        )
        .with("nic_tag", tag.name.to_string())]);
    }
    Ok(())
}

/// Facts derived from a valid pool membership list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMembership {
    pub family: AddressFamily,
    pub nic_tags_present: Vec<NicTagName>,
}

/// Validate a pool membership list against the networks that were found
///
/// # Rules
/// - Every member UUID names an existing network
/// - Every member has the family of the first member
pub fn validate_pool_members(
    members: &[Uuid],
    found: &[Network],
) -> Result<PoolMembership, Vec<FieldError>> {
    let by_uuid: BTreeMap<Uuid, &Network> = found.iter().map(|n| (n.uuid, n)).collect();
    let mut errors = Vec::new();
    let mut family = None;
    let mut nic_tags = BTreeSet::new();

    for uuid in members {
        let Some(network) = by_uuid.get(uuid) else {
            errors.push(
                FieldError::invalid("networks", format!("unknown network \"{}\"", uuid))
                    .with("network_uuid", uuid.to_string()),
            );
            continue;
        };
        nic_tags.insert(network.nic_tag.clone());

        match family {
            None => family = Some(network.family),
            Some(expected) if expected != network.family => errors.push(
                FieldError::invalid(
                    "networks",
                    format!(
                        "network \"{}\" is {}, but the pool holds {} networks",
                        uuid, network.family, expected
                    ),
                )
                .with("network_uuid", uuid.to_string()),
            ),
            Some(_) => {}
        }
    }

    finish(errors)?;
    match family {
        Some(family) => Ok(PoolMembership {
            family,
            nic_tags_present: nic_tags.into_iter().collect(),
        }),
        None => Err(vec![FieldError::invalid(
            "networks",
            "must contain at least one network",
        )]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MtuBounds, NewNetwork, ProvisionRange, VlanId};
    use chrono::Utc;

    fn network(uuid: u128, subnet: &str, owners: Vec<Uuid>, mtu: u32) -> Network {
        let subnet: Subnet = subnet.parse().unwrap();
        Network::create(
            Uuid::from_u128(uuid),
            NewNetwork {
                name: format!("net{}", uuid),
                range: ProvisionRange::default_for(&subnet),
                subnet,
                gateway: None,
                vlan_id: VlanId::default(),
                mtu: MtuBounds::network().check(mtu).unwrap(),
                nic_tag: NicTagName::new("external").unwrap(),
                resolvers: vec![],
                owner_uuids: owners,
                description: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_overlap_reports_each_conflict_sorted() {
        let existing = vec![
            network(2, "10.0.0.0/25", vec![], 1500),
            network(1, "10.0.0.0/16", vec![], 1500),
            network(3, "192.168.0.0/24", vec![], 1500),
        ];
        let errors =
            validate_subnet_overlap(&"10.0.0.0/24".parse().unwrap(), &[], &existing, None)
                .unwrap_err();

        let ids: Vec<_> = errors.iter().map(|e| e.extra["network_uuid"].clone()).collect();
        assert_eq!(
            ids,
            vec![
                Uuid::from_u128(1).to_string(),
                Uuid::from_u128(2).to_string()
            ]
        );
        assert!(errors.iter().all(|e| e.field.as_deref() == Some("subnet")));
    }

    #[test]
    fn test_overlap_respects_owner_scope() {
        let alice = Uuid::from_u128(100);
        let bob = Uuid::from_u128(200);
        let existing = vec![network(1, "10.0.0.0/24", vec![alice], 1500)];
        let subnet = "10.0.0.0/24".parse().unwrap();

        assert!(validate_subnet_overlap(&subnet, &[bob], &existing, None).is_ok());
        assert!(validate_subnet_overlap(&subnet, &[alice, bob], &existing, None).is_err());
        assert!(validate_subnet_overlap(&subnet, &[], &existing, None).is_err());
        assert!(validate_subnet_overlap(&subnet, &[alice], &existing, Some(Uuid::from_u128(1))).is_ok());
    }

    #[test]
    fn test_nic_tag_mtu_lowering() {
        let tag = NicTagName::new("external").unwrap();
        let networks = vec![network(1, "10.0.0.0/24", vec![], 1500)];

        let errors = validate_nic_tag_mtu(&tag, 1400, &networks).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].extra["network_uuid"], Uuid::from_u128(1).to_string());

        assert!(validate_nic_tag_mtu(&tag, 1500, &networks).is_ok());
        assert!(validate_nic_tag_mtu(&tag, 9000, &networks).is_ok());
    }

    #[test]
    fn test_pool_members_family_mismatch() {
        let found = vec![
            network(1, "10.0.0.0/24", vec![], 1500),
            network(2, "fd00::/64", vec![], 1500),
        ];
        let errors =
            validate_pool_members(&[Uuid::from_u128(1), Uuid::from_u128(2)], &found).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].extra["network_uuid"], Uuid::from_u128(2).to_string());

        let membership = validate_pool_members(&[Uuid::from_u128(1)], &found).unwrap();
        assert_eq!(membership.family, AddressFamily::Ipv4);
        assert_eq!(membership.nic_tags_present.len(), 1);
    }

    #[test]
    fn test_pool_members_unknown() {
        let errors = validate_pool_members(&[Uuid::from_u128(9)], &[]).unwrap_err();
        assert_eq!(errors[0].field.as_deref(), Some("networks"));
    }
}
