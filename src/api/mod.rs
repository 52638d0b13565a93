// Copyright (c) 2025 - Cowboy AI, Inc.
//! Request/Reply Dispatch
//!
//! Maps an operation name (`<collection>.<action>`) and a JSON payload onto
//! [`InventoryService`] calls, and renders the outcome as a [`Reply`].
//!
//! # Operations
//!
//! | Operation | Identifier fields |
//! |-----------|-------------------|
//! | `nic_tags.{create,get,list,update,delete}` | `name` |
//! | `networks.{create,get,list,update,delete}` | `uuid` |
//! | `network_pools.{create,get,list,update,delete}` | `uuid` |
//! | `ips.{get,list,update,release}` | `network_uuid`, `ip` |
//! | `ips.provision` | `network_uuid` or `pool_uuid`, neither for any network |
//! | `nics.{create,get,list,delete}` | `mac` |
//!
//! Successful replies carry status 200 and the entity (or list of
//! entities); deletes reply 204 with a null body. Failures carry the
//! status of their error kind and an [`ErrorBody`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;
use tracing::{debug, error};

use crate::domain::params::{self, Params};
use crate::domain::{AddressFamily, IpRecord, MacAddress, Network, NicTagName};
use crate::errors::{ErrorBody, IpamError, IpamResult};
use crate::service::{InventoryService, NetworkListFilter, NicListFilter, ProvisionTarget};

/// Outcome of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: Value::Null,
        }
    }

    pub fn error(err: &IpamError) -> Self {
        Self {
            status: err.status_code(),
            body: body_of(&err.to_body()),
        }
    }

    fn unknown_operation(operation: &str) -> Self {
        let body = ErrorBody {
            code: "ResourceNotFound".to_string(),
            message: format!("Unknown operation \"{}\"", operation),
            errors: Vec::new(),
            extra: Default::default(),
        };
        Self {
            status: 404,
            body: body_of(&body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn body_of<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Get,
    List,
    Update,
    Delete,
    Provision,
    Release,
}

impl Action {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "create" => Action::Create,
            "get" => Action::Get,
            "list" => Action::List,
            "update" => Action::Update,
            "delete" => Action::Delete,
            "provision" => Action::Provision,
            "release" => Action::Release,
            _ => return None,
        })
    }
}

/// Decode a request payload; an empty payload is an empty object
pub fn decode_payload(payload: &[u8]) -> IpamResult<Map<String, Value>> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(IpamError::invalid_param("body", "must be a JSON object")),
        Err(e) => Err(IpamError::invalid_param("body", format!("malformed JSON: {}", e))),
    }
}

/// Handle one request
pub async fn dispatch(service: &InventoryService, operation: &str, payload: &[u8]) -> Reply {
    let Some((collection, action)) = operation
        .split_once('.')
        .and_then(|(c, a)| Action::parse(a).map(|a| (c, a)))
    else {
        return Reply::unknown_operation(operation);
    };

    let mut raw = match decode_payload(payload) {
        Ok(raw) => raw,
        Err(e) => return Reply::error(&e),
    };

    let result = match collection {
        "nic_tags" => nic_tags(service, action, &mut raw).await,
        "networks" => networks(service, action, &mut raw).await,
        "network_pools" => pools(service, action, &mut raw).await,
        "ips" => ips(service, action, &mut raw).await,
        "nics" => nics(service, action, &mut raw).await,
        _ => return Reply::unknown_operation(operation),
    };

    match result {
        Ok(Some(reply)) => reply,
        Ok(None) => Reply::unknown_operation(operation),
        Err(err) => {
            match &err {
                IpamError::Internal(cause) => {
                    error!(operation, error = %cause, "store failure")
                }
                other => debug!(operation, code = %other.code(), "request failed"),
            }
            Reply::error(&err)
        }
    }
}

/// Remove and validate the identifier fields of a request
fn take<T, F>(raw: &mut Map<String, Value>, names: &[&str], read: F) -> IpamResult<T>
where
    F: FnOnce(&mut Params<'_>) -> Option<T>,
{
    let mut ids = Map::new();
    for name in names {
        if let Some(value) = raw.remove(*name) {
            ids.insert(name.to_string(), value);
        }
    }
    let mut params = Params::new(&ids, names);
    let value = read(&mut params);
    params.finish()?;
    value.ok_or_else(|| IpamError::invalid_param(names.join(","), "Missing parameter"))
}

/// Reject any field of a request that has no meaning for it
fn no_more(raw: &Map<String, Value>, allowed: &[&str]) -> IpamResult<()> {
    Params::new(raw, allowed).finish()
}

fn ok<T: Serialize>(value: &T) -> IpamResult<Option<Reply>> {
    Ok(Some(Reply::ok(body_of(value))))
}

fn deleted() -> IpamResult<Option<Reply>> {
    Ok(Some(Reply::no_content()))
}

async fn nic_tags(
    service: &InventoryService,
    action: Action,
    raw: &mut Map<String, Value>,
) -> IpamResult<Option<Reply>> {
    let bounds = service.config().nic_tag_mtu;
    match action {
        Action::Create => ok(&service.create_nic_tag(params::new_nic_tag(raw, &bounds)?).await?),
        Action::List => {
            no_more(raw, &[])?;
            ok(&service.list_nic_tags().await?)
        }
        Action::Get | Action::Update | Action::Delete => {
            let name = take(raw, &["name"], |p| p.string("name", true))?;
            match action {
                Action::Get => {
                    no_more(raw, &[])?;
                    ok(&service.get_nic_tag(&name).await?)
                }
                Action::Update => {
                    let update = params::nic_tag_update(raw)?;
                    ok(&service.update_nic_tag(&name, update).await?)
                }
                _ => {
                    no_more(raw, &[])?;
                    service.delete_nic_tag(&name).await?;
                    deleted()
                }
            }
        }
        _ => Ok(None),
    }
}

async fn networks(
    service: &InventoryService,
    action: Action,
    raw: &mut Map<String, Value>,
) -> IpamResult<Option<Reply>> {
    let bounds = service.config().network_mtu;
    match action {
        Action::Create => ok(&service.create_network(params::new_network(raw, &bounds)?).await?),
        Action::List => {
            let mut p = Params::new(raw, &["owner_uuid", "nic_tag", "family", "name"]);
            let filter = NetworkListFilter {
                owner_uuid: p.uuid("owner_uuid", false),
                nic_tag: p.parsed("nic_tag", false, |s| NicTagName::new(s)),
                family: p.parsed("family", false, parse_family),
                name: p.string("name", false),
            };
            p.finish()?;
            ok(&service.list_networks(&filter).await?)
        }
        Action::Get | Action::Update | Action::Delete => {
            let uuid = take(raw, &["uuid"], |p| p.uuid("uuid", true))?;
            match action {
                Action::Get => {
                    no_more(raw, &[])?;
                    ok(&service.get_network(uuid).await?)
                }
                Action::Update => {
                    let update = params::network_update(raw, &bounds)?;
                    ok(&service.update_network(uuid, update).await?)
                }
                _ => {
                    no_more(raw, &[])?;
                    service.delete_network(uuid).await?;
                    deleted()
                }
            }
        }
        _ => Ok(None),
    }
}

fn parse_family(s: &str) -> Result<AddressFamily, String> {
    match s {
        "ipv4" => Ok(AddressFamily::Ipv4),
        "ipv6" => Ok(AddressFamily::Ipv6),
        other => Err(format!("unknown address family \"{}\"", other)),
    }
}

async fn pools(
    service: &InventoryService,
    action: Action,
    raw: &mut Map<String, Value>,
) -> IpamResult<Option<Reply>> {
    match action {
        Action::Create => ok(&service.create_pool(params::new_pool(raw)?).await?),
        Action::List => {
            let mut p = Params::new(raw, &["owner_uuid"]);
            let owner = p.uuid("owner_uuid", false);
            p.finish()?;
            ok(&service.list_pools(owner).await?)
        }
        Action::Get | Action::Update | Action::Delete => {
            let uuid = take(raw, &["uuid"], |p| p.uuid("uuid", true))?;
            match action {
                Action::Get => {
                    no_more(raw, &[])?;
                    ok(&service.get_pool(uuid).await?)
                }
                Action::Update => ok(&service.update_pool(uuid, params::pool_update(raw)?).await?),
                _ => {
                    no_more(raw, &[])?;
                    service.delete_pool(uuid).await?;
                    deleted()
                }
            }
        }
        _ => Ok(None),
    }
}

/// Provisioned address together with the network it came from
#[derive(Debug, Serialize)]
struct Provisioned<'a> {
    #[serde(flatten)]
    ip: &'a IpRecord,
    netmask: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    gateway: Option<IpAddr>,
    vlan_id: u32,
    nic_tag: &'a NicTagName,
    mtu: u32,
    resolvers: &'a [IpAddr],
}

impl<'a> Provisioned<'a> {
    fn new(network: &'a Network, ip: &'a IpRecord) -> Self {
        Self {
            ip,
            netmask: network.netmask(),
            gateway: network.gateway,
            vlan_id: u32::from(network.vlan_id),
            nic_tag: &network.nic_tag,
            mtu: network.mtu.value(),
            resolvers: &network.resolvers,
        }
    }
}

async fn ips(
    service: &InventoryService,
    action: Action,
    raw: &mut Map<String, Value>,
) -> IpamResult<Option<Reply>> {
    match action {
        Action::List => {
            let network_uuid = take(raw, &["network_uuid"], |p| p.uuid("network_uuid", true))?;
            no_more(raw, &[])?;
            ok(&service.list_ips(network_uuid).await?)
        }
        Action::Get | Action::Update | Action::Release => {
            let (network_uuid, ip) = take(raw, &["network_uuid", "ip"], |p| {
                let network_uuid = p.uuid("network_uuid", true);
                let ip = p.ip("ip", true);
                Some((network_uuid?, ip?))
            })?;
            match action {
                Action::Get => {
                    no_more(raw, &[])?;
                    ok(&service.get_ip(network_uuid, ip).await?)
                }
                Action::Update => {
                    let update = params::ip_update(raw)?;
                    ok(&service.update_ip(network_uuid, ip, update).await?)
                }
                _ => {
                    no_more(raw, &[])?;
                    ok(&service.release_ip(network_uuid, ip).await?)
                }
            }
        }
        Action::Provision => {
            let mut p = Params::new(
                raw,
                &[
                    "network_uuid",
                    "pool_uuid",
                    "nic_tag",
                    "family",
                    "belongs_to_type",
                    "belongs_to_uuid",
                    "owner_uuid",
                    "reserved",
                ],
            );
            let network_uuid = p.uuid("network_uuid", false);
            let pool_uuid = p.uuid("pool_uuid", false);
            let nic_tag = p.parsed("nic_tag", false, |s| NicTagName::new(s));
            let family = p.parsed("family", false, parse_family);
            let claim = params::provision_claim(&mut p);
            if network_uuid.is_some() && pool_uuid.is_some() {
                p.invalid("pool_uuid", "cannot specify both network_uuid and pool_uuid");
            }
            p.finish()?;

            let target = match (network_uuid, pool_uuid) {
                (Some(uuid), _) => ProvisionTarget::Network(uuid),
                (None, Some(pool_uuid)) => ProvisionTarget::Pool { pool_uuid, nic_tag },
                (None, None) => ProvisionTarget::Any { nic_tag, family },
            };
            let claim = claim
                .ok_or_else(|| IpamError::invalid_param("belongs_to_uuid", "Missing parameter"))?;
            let (network, record) = service.provision_ip(&target, &claim).await?;
            ok(&Provisioned::new(&network, &record))
        }
        _ => Ok(None),
    }
}

async fn nics(
    service: &InventoryService,
    action: Action,
    raw: &mut Map<String, Value>,
) -> IpamResult<Option<Reply>> {
    match action {
        Action::Create => ok(&service.create_nic(params::new_nic(raw)?).await?),
        Action::List => {
            let mut p = Params::new(raw, &["belongs_to_uuid", "owner_uuid", "network_uuid"]);
            let filter = NicListFilter {
                belongs_to_uuid: p.uuid("belongs_to_uuid", false),
                owner_uuid: p.uuid("owner_uuid", false),
                network_uuid: p.uuid("network_uuid", false),
            };
            p.finish()?;
            ok(&service.list_nics(&filter).await?)
        }
        Action::Get | Action::Delete => {
            let mac = take(raw, &["mac"], |p| p.parsed("mac", true, |s| MacAddress::new(s)))?;
            no_more(raw, &[])?;
            if action == Action::Get {
                ok(&service.get_nic(&mac).await?)
            } else {
                service.delete_nic(&mac).await?;
                deleted()
            }
        }
        _ => Ok(None),
    }
}
