// Copyright (c) 2025 - Cowboy AI, Inc.
//! Request Parameter Validation
//!
//! Turns raw JSON request bodies into validated commands. Every problem with
//! every field is collected, and the whole request is rejected with one
//! `InvalidParameters` error before anything touches the store.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

use super::address::{self, Subnet};
use super::ip::{BelongsToType, IpClaim, IpState};
use super::network::{NetworkUpdate, NewNetwork};
use super::nic::{NewNic, NicAddressing, NicState};
use super::nic_tag::{NewNicTag, NicTagUpdate};
use super::pool::{NetworkPool, NetworkPoolUpdate, NewNetworkPool};
use super::range::ProvisionRange;
use super::values::{MacAddress, MtuBounds, NicTagName, VlanId};
use crate::errors::{FieldError, IpamError, IpamResult};

/// Field-by-field reader over a JSON object that accumulates errors
pub struct Params<'a> {
    raw: &'a Map<String, Value>,
    errors: Vec<FieldError>,
}

impl<'a> Params<'a> {
    /// Start reading `raw`; any key outside `allowed` is reported as unknown
    pub fn new(raw: &'a Map<String, Value>, allowed: &[&str]) -> Self {
        let allowed: BTreeSet<&str> = allowed.iter().copied().collect();
        let unknown: Vec<&String> = raw.keys().filter(|k| !allowed.contains(k.as_str())).collect();

        let mut errors = Vec::new();
        if !unknown.is_empty() {
            errors.push(FieldError::unknown(unknown.into_iter().cloned()));
        }
        Self { raw, errors }
    }

    fn value(&self, name: &str) -> Option<&'a Value> {
        self.raw.get(name).filter(|v| !v.is_null())
    }

    pub fn invalid(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::invalid(field, message));
    }

    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    /// Non-empty string parameter
    pub fn string(&mut self, name: &str, required: bool) -> Option<String> {
        match self.value(name) {
            None => {
                if required {
                    self.errors.push(FieldError::missing(name));
                }
                None
            }
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(_) => {
                self.invalid(name, "must be a non-empty string");
                None
            }
        }
    }

    /// String parameter converted with `parse`
    pub fn parsed<T, E, F>(&mut self, name: &str, required: bool, parse: F) -> Option<T>
    where
        F: FnOnce(&str) -> Result<T, E>,
        E: fmt::Display,
    {
        let text = self.string(name, required)?;
        match parse(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                self.invalid(name, e.to_string());
                None
            }
        }
    }

    pub fn uuid(&mut self, name: &str, required: bool) -> Option<Uuid> {
        self.parsed(name, required, |s| {
            Uuid::parse_str(s).map_err(|_| "invalid UUID".to_string())
        })
    }

    pub fn ip(&mut self, name: &str, required: bool) -> Option<IpAddr> {
        self.parsed(name, required, |s| {
            address::parse(s).map_err(|_| "invalid IP address".to_string())
        })
    }

    /// Unsigned integer; numeric strings are accepted
    pub fn u32(&mut self, name: &str, required: bool) -> Option<u32> {
        let value = match self.value(name) {
            None => {
                if required {
                    self.errors.push(FieldError::missing(name));
                }
                return None;
            }
            Some(value) => value,
        };
        let number = match value {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse::<u32>().ok(),
            _ => None,
        };
        if number.is_none() {
            self.invalid(name, "must be a positive integer");
        }
        number
    }

    /// Boolean; "true" and "false" strings are accepted
    pub fn bool(&mut self, name: &str) -> Option<bool> {
        match self.value(name)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s == "true" => Some(true),
            Value::String(s) if s == "false" => Some(false),
            _ => {
                self.invalid(name, "must be a boolean value");
                None
            }
        }
    }

    /// Array of strings, or one comma-separated string, each converted
    /// with `parse`. Reports the first bad element.
    pub fn list<T, E, F>(&mut self, name: &str, required: bool, parse: F) -> Option<Vec<T>>
    where
        F: Fn(&str) -> Result<T, E>,
        E: fmt::Display,
    {
        let items: Vec<&str> = match self.value(name) {
            None => {
                if required {
                    self.errors.push(FieldError::missing(name));
                }
                return None;
            }
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::Array(values)) => {
                let strings: Option<Vec<&str>> = values.iter().map(Value::as_str).collect();
                match strings {
                    Some(strings) => strings,
                    None => {
                        self.invalid(name, "must be an array of strings");
                        return None;
                    }
                }
            }
            Some(_) => {
                self.invalid(name, "must be an array of strings");
                return None;
            }
        };

        let mut parsed = Vec::with_capacity(items.len());
        for item in items {
            match parse(item) {
                Ok(value) => parsed.push(value),
                Err(e) => {
                    self.invalid(name, format!("invalid element \"{}\": {}", item, e));
                    return None;
                }
            }
        }
        Some(parsed)
    }

    pub fn uuid_list(&mut self, name: &str, required: bool) -> Option<Vec<Uuid>> {
        self.list(name, required, |s| {
            Uuid::parse_str(s).map_err(|_| "invalid UUID".to_string())
        })
    }

    pub fn ip_list(&mut self, name: &str) -> Option<Vec<IpAddr>> {
        self.list(name, false, |s| {
            address::parse(s).map_err(|_| "invalid IP address".to_string())
        })
    }

    /// `Ok(())` when nothing was wrong, otherwise every error at once
    pub fn finish(self) -> IpamResult<()> {
        IpamError::check(self.errors)
    }
}

/// Unwrap a parameter that `Params::finish` has already proven present
fn present<T>(value: Option<T>, field: &str) -> IpamResult<T> {
    value.ok_or_else(|| IpamError::invalid_params(vec![FieldError::missing(field)]))
}

fn mtu_param(
    params: &mut Params<'_>,
    bounds: &MtuBounds,
    required: bool,
) -> Option<super::values::Mtu> {
    let value = params.u32("mtu", required)?;
    match bounds.check(value) {
        Ok(mtu) => Some(mtu),
        Err(e) => {
            params.invalid("mtu", e.to_string());
            None
        }
    }
}

pub fn new_nic_tag(raw: &Map<String, Value>, bounds: &MtuBounds) -> IpamResult<NewNicTag> {
    let mut params = Params::new(raw, &["name", "mtu"]);
    let name = params.parsed("name", true, |s| NicTagName::new(s));
    let mtu = mtu_param(&mut params, bounds, false);
    params.finish()?;

    Ok(NewNicTag {
        name: present(name, "name")?,
        mtu: mtu.unwrap_or_else(|| bounds.default_mtu()),
    })
}

pub fn nic_tag_update(raw: &Map<String, Value>) -> IpamResult<NicTagUpdate> {
    let mut params = Params::new(raw, &["mtu"]);
    let mtu = params.u32("mtu", false);
    params.finish()?;
    Ok(NicTagUpdate { mtu })
}

const NETWORK_CREATE_PARAMS: &[&str] = &[
    "name",
    "subnet",
    "provision_start_ip",
    "provision_end_ip",
    "gateway",
    "vlan_id",
    "mtu",
    "nic_tag",
    "resolvers",
    "owner_uuids",
    "description",
];

pub fn new_network(raw: &Map<String, Value>, bounds: &MtuBounds) -> IpamResult<NewNetwork> {
    let mut params = Params::new(raw, NETWORK_CREATE_PARAMS);

    let name = params.string("name", true);
    let subnet = params.parsed("subnet", true, Subnet::parse);
    let start = params.ip("provision_start_ip", false);
    let end = params.ip("provision_end_ip", false);
    let gateway = params.ip("gateway", false);
    let vlan_id = params.u32("vlan_id", true).and_then(|id| match VlanId::new(id) {
        Ok(id) => Some(id),
        Err(e) => {
            params.invalid("vlan_id", e.to_string());
            None
        }
    });
    let mtu = mtu_param(&mut params, bounds, false);
    let nic_tag = params.parsed("nic_tag", true, |s| NicTagName::new(s));
    let resolvers = params.ip_list("resolvers").unwrap_or_default();
    let owner_uuids = params.uuid_list("owner_uuids", false).unwrap_or_default();
    let description = params.string("description", false);

    let mut range = None;
    if let Some(subnet) = &subnet {
        range = check_range(&mut params, subnet, start, end);
        if let Some(gateway) = gateway {
            if !subnet.contains(gateway) {
                params.invalid("gateway", "gateway cannot be outside subnet");
            }
        }
    }

    params.finish()?;

    Ok(NewNetwork {
        name: present(name, "name")?,
        subnet: present(subnet, "subnet")?,
        range: present(range, "provision_start_ip")?,
        gateway,
        vlan_id: present(vlan_id, "vlan_id")?,
        mtu: mtu.unwrap_or_else(|| bounds.default_mtu()),
        nic_tag: present(nic_tag, "nic_tag")?,
        resolvers,
        owner_uuids,
        description,
    })
}

/// Range from explicit bounds, defaulting whichever end is absent
fn check_range(
    params: &mut Params<'_>,
    subnet: &Subnet,
    start: Option<IpAddr>,
    end: Option<IpAddr>,
) -> Option<ProvisionRange> {
    let default = ProvisionRange::default_for(subnet);
    let start = start.unwrap_or(default.start());
    let end = end.unwrap_or(default.end());
    match ProvisionRange::new(subnet, start, end) {
        Ok(range) => Some(range),
        Err(errors) => {
            for e in errors {
                params.invalid(e.field(), e.to_string());
            }
            None
        }
    }
}

pub fn network_update(raw: &Map<String, Value>, bounds: &MtuBounds) -> IpamResult<NetworkUpdate> {
    let mut params = Params::new(
        raw,
        &[
            "name",
            "provision_start_ip",
            "provision_end_ip",
            "gateway",
            "resolvers",
            "mtu",
            "nic_tag",
            "owner_uuids",
            "description",
        ],
    );

    let update = NetworkUpdate {
        name: params.string("name", false),
        provision_start_ip: params.ip("provision_start_ip", false),
        provision_end_ip: params.ip("provision_end_ip", false),
        gateway: params.ip("gateway", false),
        resolvers: params.ip_list("resolvers"),
        mtu: mtu_param(&mut params, bounds, false),
        nic_tag: params.parsed("nic_tag", false, |s| NicTagName::new(s)),
        owner_uuids: params.uuid_list("owner_uuids", false),
        description: params.string("description", false),
    };
    params.finish()?;
    Ok(update)
}

fn check_members(params: &mut Params<'_>, networks: &[Uuid]) {
    if networks.is_empty() {
        params.invalid("networks", "must contain at least one network");
    } else if networks.len() > NetworkPool::MAX_NETWORKS {
        params.invalid(
            "networks",
            format!("maximum {} networks per network pool", NetworkPool::MAX_NETWORKS),
        );
    } else {
        let unique: BTreeSet<&Uuid> = networks.iter().collect();
        if unique.len() != networks.len() {
            params.invalid("networks", "networks must be unique");
        }
    }
}

pub fn new_pool(raw: &Map<String, Value>) -> IpamResult<NewNetworkPool> {
    let mut params = Params::new(raw, &["name", "networks", "owner_uuids", "description"]);
    let name = params.string("name", true);
    let networks = params.uuid_list("networks", true);
    if let Some(networks) = &networks {
        check_members(&mut params, networks);
    }
    let owner_uuids = params.uuid_list("owner_uuids", false).unwrap_or_default();
    let description = params.string("description", false);
    params.finish()?;

    Ok(NewNetworkPool {
        name: present(name, "name")?,
        networks: present(networks, "networks")?,
        owner_uuids,
        description,
    })
}

pub fn pool_update(raw: &Map<String, Value>) -> IpamResult<NetworkPoolUpdate> {
    let mut params = Params::new(raw, &["name", "networks", "owner_uuids", "description"]);
    let name = params.string("name", false);
    let networks = params.uuid_list("networks", false);
    if let Some(networks) = &networks {
        check_members(&mut params, networks);
    }
    let update = NetworkPoolUpdate {
        name,
        networks,
        owner_uuids: params.uuid_list("owner_uuids", false),
        description: params.string("description", false),
    };
    params.finish()?;
    Ok(update)
}

/// Changes requested for one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpUpdate {
    /// Return the address to the free state
    Free,
    /// Hold the address for a consumer, or as a bare reservation
    Claim(IpClaim),
}

pub fn ip_update(raw: &Map<String, Value>) -> IpamResult<IpUpdate> {
    let mut params = Params::new(
        raw,
        &["free", "reserved", "belongs_to_type", "belongs_to_uuid", "owner_uuid"],
    );
    let free = params.bool("free").unwrap_or(false);
    let reserved = params.bool("reserved").unwrap_or(false);
    let belongs_to_type = params.parsed("belongs_to_type", false, BelongsToType::from_str);
    let belongs_to_uuid = params.uuid("belongs_to_uuid", false);
    let owner_uuid = params.uuid("owner_uuid", false);

    if belongs_to_type.is_some() != belongs_to_uuid.is_some() {
        let missing = if belongs_to_type.is_none() {
            "belongs_to_type"
        } else {
            "belongs_to_uuid"
        };
        params.push(FieldError::missing(missing));
    }
    if free && (reserved || belongs_to_uuid.is_some()) {
        params.invalid("free", "cannot free an address while also claiming it");
    }
    if !free && !reserved && belongs_to_uuid.is_none() {
        params.push(FieldError::missing("belongs_to_uuid"));
    }
    params.finish()?;

    if free {
        return Ok(IpUpdate::Free);
    }
    let state = if reserved && belongs_to_uuid.is_none() {
        IpState::Reserved
    } else {
        IpState::Provisioning
    };
    Ok(IpUpdate::Claim(IpClaim {
        belongs_to_type,
        belongs_to_uuid,
        owner_uuid,
        state,
        reserved,
    }))
}

/// Parameters of a provision request against a network, pool, or every
/// visible network
pub fn provision_claim(params: &mut Params<'_>) -> Option<IpClaim> {
    let belongs_to_type = params.parsed("belongs_to_type", true, BelongsToType::from_str);
    let belongs_to_uuid = params.uuid("belongs_to_uuid", true);
    let owner_uuid = params.uuid("owner_uuid", true);
    let reserved = params.bool("reserved").unwrap_or(false);

    Some(IpClaim {
        reserved,
        ..IpClaim::provisioning(belongs_to_type?, belongs_to_uuid?, owner_uuid?)
    })
}

pub fn new_nic(raw: &Map<String, Value>) -> IpamResult<NewNic> {
    let mut params = Params::new(
        raw,
        &[
            "mac",
            "belongs_to_type",
            "belongs_to_uuid",
            "owner_uuid",
            "primary",
            "state",
            "nic_tag",
            "network_uuid",
            "pool_uuid",
            "ip",
        ],
    );
    let mac = params.parsed("mac", true, |s| MacAddress::new(s));
    let belongs_to_type = params.parsed("belongs_to_type", true, BelongsToType::from_str);
    let belongs_to_uuid = params.uuid("belongs_to_uuid", true);
    let owner_uuid = params.uuid("owner_uuid", true);
    let primary = params.bool("primary").unwrap_or(false);
    let state = params
        .parsed("state", false, |s| {
            serde_json::from_value::<NicState>(Value::String(s.to_string()))
                .map_err(|_| format!("unknown nic state \"{}\"", s))
        })
        .unwrap_or_default();
    let nic_tag = params.parsed("nic_tag", false, |s| NicTagName::new(s));
    let network_uuid = params.uuid("network_uuid", false);
    let pool_uuid = params.uuid("pool_uuid", false);
    let ip = params.ip("ip", false);

    if let Some(mac) = &mac {
        if mac.is_multicast() {
            params.invalid("mac", "MAC address must be unicast");
        }
    }

    let addressing = match (network_uuid, pool_uuid, ip) {
        (Some(_), Some(_), _) => {
            params.invalid("pool_uuid", "cannot specify both network_uuid and pool_uuid");
            NicAddressing::Unaddressed
        }
        (None, Some(_), Some(_)) => {
            params.invalid("ip", "cannot request a specific IP from a network pool");
            NicAddressing::Unaddressed
        }
        (None, None, Some(_)) => {
            params.push(FieldError::missing("network_uuid"));
            NicAddressing::Unaddressed
        }
        (Some(network_uuid), None, Some(ip)) => NicAddressing::Specific { network_uuid, ip },
        (Some(network_uuid), None, None) => NicAddressing::Network(network_uuid),
        (None, Some(pool_uuid), None) => NicAddressing::Pool(pool_uuid),
        (None, None, None) => NicAddressing::Unaddressed,
    };
    params.finish()?;

    Ok(NewNic {
        mac: present(mac, "mac")?,
        belongs_to_type: present(belongs_to_type, "belongs_to_type")?,
        belongs_to_uuid: present(belongs_to_uuid, "belongs_to_uuid")?,
        owner_uuid: present(owner_uuid, "owner_uuid")?,
        primary,
        state,
        nic_tag,
        addressing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FieldErrorCode;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn codes(err: &IpamError) -> Vec<(FieldErrorCode, Option<String>)> {
        err.field_errors()
            .iter()
            .map(|e| (e.code, e.field.clone()))
            .collect()
    }

    #[test]
    fn test_new_network_defaults() {
        let raw = object(json!({
            "name": "admin",
            "subnet": "10.99.99.0/24",
            "vlan_id": 0,
            "nic_tag": "admin",
        }));
        let new = new_network(&raw, &MtuBounds::network()).unwrap();
        assert_eq!(new.range.start().to_string(), "10.99.99.1");
        assert_eq!(new.range.end().to_string(), "10.99.99.254");
        assert_eq!(new.mtu.value(), 1500);
        assert!(new.owner_uuids.is_empty());
    }

    #[test]
    fn test_new_network_aggregates_every_error() {
        let raw = object(json!({
            "subnet": "10.99.99.0/24",
            "provision_start_ip": "10.99.100.1",
            "vlan_id": 5000,
            "nic_tag": "admin",
            "mtu": 100,
            "colour": "blue",
        }));
        let err = new_network(&raw, &MtuBounds::network()).unwrap_err();
        assert_eq!(
            codes(&err),
            vec![
                (FieldErrorCode::UnknownParameters, None),
                (FieldErrorCode::InvalidParameter, Some("mtu".to_string())),
                (FieldErrorCode::MissingParameter, Some("name".to_string())),
                (
                    FieldErrorCode::InvalidParameter,
                    Some("provision_start_ip".to_string())
                ),
                (FieldErrorCode::InvalidParameter, Some("vlan_id".to_string())),
            ]
        );
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_gateway_outside_subnet() {
        let raw = object(json!({
            "name": "n",
            "subnet": "10.0.0.0/24",
            "gateway": "10.0.1.1",
            "vlan_id": "12",
            "nic_tag": "external",
        }));
        let err = new_network(&raw, &MtuBounds::network()).unwrap_err();
        assert_eq!(
            codes(&err),
            vec![(FieldErrorCode::InvalidParameter, Some("gateway".to_string()))]
        );
    }

    #[test]
    fn test_pool_members_must_be_unique() {
        let id = Uuid::now_v7().to_string();
        let raw = object(json!({ "name": "p", "networks": [id.clone(), id] }));
        assert!(new_pool(&raw).is_err());

        let raw = object(json!({ "name": "p", "networks": format!("{},{}", Uuid::now_v7(), Uuid::now_v7()) }));
        assert_eq!(new_pool(&raw).unwrap().networks.len(), 2);
    }

    #[test]
    fn test_ip_update_variants() {
        let free = ip_update(&object(json!({ "free": true }))).unwrap();
        assert_eq!(free, IpUpdate::Free);

        let reserve = ip_update(&object(json!({ "reserved": "true" }))).unwrap();
        match reserve {
            IpUpdate::Claim(claim) => {
                assert!(claim.reserved);
                assert_eq!(claim.state, IpState::Reserved);
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = ip_update(&object(json!({ "belongs_to_type": "zone" }))).unwrap_err();
        assert_eq!(
            codes(&err),
            vec![(FieldErrorCode::MissingParameter, Some("belongs_to_uuid".to_string()))]
        );
    }

    #[test]
    fn test_new_nic_addressing() {
        let network_uuid = Uuid::now_v7();
        let raw = object(json!({
            "mac": "90:b8:d0:12:34:56",
            "belongs_to_type": "zone",
            "belongs_to_uuid": Uuid::now_v7().to_string(),
            "owner_uuid": Uuid::now_v7().to_string(),
            "network_uuid": network_uuid.to_string(),
            "ip": "10.0.0.7",
        }));
        let nic = new_nic(&raw).unwrap();
        assert_eq!(
            nic.addressing,
            NicAddressing::Specific {
                network_uuid,
                ip: "10.0.0.7".parse().unwrap()
            }
        );
        assert_eq!(nic.state, NicState::Provisioning);
    }

    #[test]
    fn test_new_nic_rejects_multicast_mac() {
        let raw = object(json!({
            "mac": "01:00:5e:00:00:01",
            "belongs_to_type": "zone",
            "belongs_to_uuid": Uuid::now_v7().to_string(),
            "owner_uuid": Uuid::now_v7().to_string(),
        }));
        let err = new_nic(&raw).unwrap_err();
        assert_eq!(
            codes(&err),
            vec![(FieldErrorCode::InvalidParameter, Some("mac".to_string()))]
        );
    }
}
