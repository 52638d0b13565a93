// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Entity
//!
//! A network is a subnet with a provisioning range, bound to a nic tag and
//! optionally scoped to owners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use super::address::{AddressFamily, Subnet};
use super::range::ProvisionRange;
use super::values::{Mtu, NicTagName, VlanId};
use crate::errors::FieldError;

/// Network Entity
///
/// # Invariants
/// - `provision_start_ip <= provision_end_ip`, both inside `subnet`
/// - `gateway`, when set, is inside `subnet`
/// - `mtu` is within the configured network bounds and not above the MTU
///   of `nic_tag` (checked by the topology validator at mutation time)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub uuid: Uuid,
    pub name: String,
    pub subnet: Subnet,
    #[serde(flatten)]
    pub range: ProvisionRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
    pub vlan_id: VlanId,
    pub mtu: Mtu,
    pub nic_tag: NicTagName,
    #[serde(default)]
    pub resolvers: Vec<IpAddr>,
    #[serde(default)]
    pub owner_uuids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub family: AddressFamily,
    pub created_timestamp: DateTime<Utc>,
    pub modified_timestamp: DateTime<Utc>,
}

/// Validated request to create a network
#[derive(Debug, Clone, PartialEq)]
pub struct NewNetwork {
    pub name: String,
    pub subnet: Subnet,
    pub range: ProvisionRange,
    pub gateway: Option<IpAddr>,
    pub vlan_id: VlanId,
    pub mtu: Mtu,
    pub nic_tag: NicTagName,
    pub resolvers: Vec<IpAddr>,
    pub owner_uuids: Vec<Uuid>,
    pub description: Option<String>,
}

/// Requested changes to a network; `None` leaves a field as it is
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkUpdate {
    pub name: Option<String>,
    pub provision_start_ip: Option<IpAddr>,
    pub provision_end_ip: Option<IpAddr>,
    pub gateway: Option<IpAddr>,
    pub resolvers: Option<Vec<IpAddr>>,
    pub mtu: Option<Mtu>,
    pub nic_tag: Option<NicTagName>,
    pub owner_uuids: Option<Vec<Uuid>>,
    pub description: Option<String>,
}

impl Network {
    pub fn create(uuid: Uuid, new: NewNetwork, now: DateTime<Utc>) -> Self {
        Self {
            uuid,
            family: new.subnet.family(),
            name: new.name,
            subnet: new.subnet,
            range: new.range,
            gateway: new.gateway,
            vlan_id: new.vlan_id,
            mtu: new.mtu,
            nic_tag: new.nic_tag,
            resolvers: new.resolvers,
            owner_uuids: new.owner_uuids,
            description: new.description,
            created_timestamp: now,
            modified_timestamp: now,
        }
    }

    /// Apply an update, revalidating the range and gateway against the subnet
    pub fn apply(&self, update: NetworkUpdate, now: DateTime<Utc>) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut next = self.clone();

        let start = update.provision_start_ip.unwrap_or(self.range.start());
        let end = update.provision_end_ip.unwrap_or(self.range.end());
        match ProvisionRange::new(&self.subnet, start, end) {
            Ok(range) => next.range = range,
            Err(range_errors) => errors.extend(
                range_errors
                    .iter()
                    .map(|e| FieldError::invalid(e.field(), e.to_string())),
            ),
        }

        if let Some(gateway) = update.gateway {
            if self.subnet.contains(gateway) {
                next.gateway = Some(gateway);
            } else {
                errors.push(FieldError::invalid("gateway", "gateway cannot be outside subnet"));
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        if let Some(name) = update.name {
            next.name = name;
        }
        if let Some(resolvers) = update.resolvers {
            next.resolvers = resolvers;
        }
        if let Some(mtu) = update.mtu {
            next.mtu = mtu;
        }
        if let Some(nic_tag) = update.nic_tag {
            next.nic_tag = nic_tag;
        }
        if let Some(owner_uuids) = update.owner_uuids {
            next.owner_uuids = owner_uuids;
        }
        if let Some(description) = update.description {
            next.description = Some(description);
        }
        next.modified_timestamp = now;

        Ok(next)
    }

    pub fn key(&self) -> String {
        self.uuid.to_string()
    }

    pub fn netmask(&self) -> IpAddr {
        self.subnet.netmask()
    }

    /// A network with no owners is visible to everyone; `None` is an
    /// unscoped (operator) view
    pub fn is_visible_to(&self, owner: Option<Uuid>) -> bool {
        match owner {
            None => true,
            Some(owner) => self.owner_uuids.is_empty() || self.owner_uuids.contains(&owner),
        }
    }

    /// Addresses held as permanent reservations for the network's lifetime
    ///
    /// The gateway always; with `include_bounds`, the IPv4 network and
    /// broadcast addresses when they fall inside the provisioning range.
    pub fn reserved_addresses(&self, include_bounds: bool) -> Vec<IpAddr> {
        let mut reserved: Vec<IpAddr> = self.gateway.into_iter().collect();
        if include_bounds && self.family == AddressFamily::Ipv4 {
            for bound in [self.subnet.first(), self.subnet.last()] {
                if self.range.contains(bound) && !reserved.contains(&bound) {
                    reserved.push(bound);
                }
            }
        }
        reserved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MtuBounds;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn network(subnet: &str, start: &str, end: &str) -> Network {
        let subnet: Subnet = subnet.parse().unwrap();
        Network::create(
            Uuid::nil(),
            NewNetwork {
                name: "admin".to_string(),
                range: ProvisionRange::new(&subnet, ip(start), ip(end)).unwrap(),
                subnet,
                gateway: Some(ip(start)),
                vlan_id: VlanId::default(),
                mtu: MtuBounds::network().default_mtu(),
                nic_tag: NicTagName::new("admin").unwrap(),
                resolvers: vec![],
                owner_uuids: vec![],
                description: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_wire_fields_are_flat() {
        let net = network("10.0.0.0/24", "10.0.0.1", "10.0.0.250");
        let json = serde_json::to_value(&net).unwrap();
        assert_eq!(json["provision_start_ip"], "10.0.0.1");
        assert_eq!(json["provision_end_ip"], "10.0.0.250");
        assert_eq!(json["subnet"], "10.0.0.0/24");
        assert_eq!(json["family"], "ipv4");
        assert_eq!(json["mtu"], 1500);

        let back: Network = serde_json::from_value(json).unwrap();
        assert_eq!(back, net);
    }

    #[test]
    fn test_apply_revalidates_range() {
        let net = network("10.0.0.0/24", "10.0.0.1", "10.0.0.250");
        let update = NetworkUpdate {
            provision_end_ip: Some(ip("10.0.1.5")),
            ..Default::default()
        };
        let errors = net.apply(update, Utc::now()).unwrap_err();
        assert_eq!(errors[0].field.as_deref(), Some("provision_end_ip"));

        let update = NetworkUpdate {
            provision_start_ip: Some(ip("10.0.0.100")),
            name: Some("renamed".to_string()),
            ..Default::default()
        };
        let updated = net.apply(update, Utc::now()).unwrap();
        assert_eq!(updated.range.start(), ip("10.0.0.100"));
        assert_eq!(updated.name, "renamed");
    }

    #[test]
    fn test_visibility() {
        let mut net = network("10.0.0.0/24", "10.0.0.1", "10.0.0.250");
        let owner = Uuid::now_v7();
        assert!(net.is_visible_to(Some(owner)));

        net.owner_uuids = vec![Uuid::now_v7()];
        assert!(!net.is_visible_to(Some(owner)));
        assert!(net.is_visible_to(None));
    }

    #[test]
    fn test_reserved_addresses() {
        let net = network("10.0.0.0/24", "10.0.0.0", "10.0.0.255");
        assert_eq!(
            net.reserved_addresses(true),
            vec![ip("10.0.0.0"), ip("10.0.0.255")]
        );
        assert_eq!(net.reserved_addresses(false), vec![ip("10.0.0.0")]);
    }
}
