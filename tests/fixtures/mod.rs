// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-network-ipam
//!
//! Builds services over an in-memory store and creates topology through the
//! same parameter validation requests go through.
//!
//! # Design Principles
//! - Owner and consumer UUIDs are fixed constants
//! - Scan starts are deterministic unless a test asks otherwise
//! - Topology is created through the service, never written to the store
//!   directly

#![allow(dead_code)]

use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use cim_network_ipam::allocation::{AllocationEngine, StartStrategy};
use cim_network_ipam::config::IpamConfig;
use cim_network_ipam::domain::{params, BelongsToType, IpClaim, Network, NetworkPool, NicTag};
use cim_network_ipam::service::InventoryService;
use cim_network_ipam::store::{InMemoryStore, Store};

pub const OWNER_1: &str = "01934f4a-2000-7000-8000-000000002000";
pub const OWNER_2: &str = "01934f4a-2001-7000-8000-000000002001";

pub const ZONE_1: &str = "01934f4a-1000-7000-8000-000000001000";

/// Parse a fixed UUID from a constant string
pub fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).expect("Invalid UUID in test fixture")
}

/// Distinct, deterministic consumer UUID for the `n`th allocation
pub fn consumer(n: u32) -> Uuid {
    Uuid::from_u128(0x01934f4a_3000_7000_8000_000000000000 | u128::from(n))
}

/// Claim for zone `n`, owned by `OWNER_1`
pub fn claim(n: u32) -> IpClaim {
    IpClaim::provisioning(BelongsToType::Zone, consumer(n), parse_uuid(OWNER_1))
}

/// Object body of a JSON literal
pub fn body(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture body must be an object, got {}", other),
    }
}

/// Service over a fresh in-memory store whose scans start at the first
/// address of each range
pub fn service() -> InventoryService {
    service_with(StartStrategy::First)
}

pub fn service_with(start: StartStrategy) -> InventoryService {
    service_with_config(
        start,
        IpamConfig {
            randomize_start: false,
            ..IpamConfig::default()
        },
    )
}

pub fn service_with_config(start: StartStrategy, config: IpamConfig) -> InventoryService {
    service_and_store(start, config).0
}

/// Service plus a handle on its store, for tests that take the store
/// offline
pub fn service_and_store(start: StartStrategy, config: IpamConfig) -> (InventoryService, Arc<InMemoryStore>) {
    let memory = Arc::new(InMemoryStore::new());
    let store: Arc<dyn Store> = memory.clone();
    let engine = AllocationEngine::new(store.clone(), start);
    (InventoryService::with_engine(store, engine, Arc::new(config)), memory)
}

/// Deterministic service whose store can be switched off
pub fn service_with_store() -> (InventoryService, Arc<InMemoryStore>) {
    service_and_store(
        StartStrategy::First,
        IpamConfig {
            randomize_start: false,
            ..IpamConfig::default()
        },
    )
}

pub async fn nic_tag(service: &InventoryService, name: &str, mtu: u32) -> NicTag {
    let new = params::new_nic_tag(
        &body(json!({ "name": name, "mtu": mtu })),
        &service.config().nic_tag_mtu,
    )
    .expect("valid nic tag fixture");
    service.create_nic_tag(new).await.expect("nic tag created")
}

/// Create a network on nic tag "external" from a JSON request body
pub async fn try_network(
    service: &InventoryService,
    request: Value,
) -> cim_network_ipam::IpamResult<Network> {
    let mut request = body(request);
    request.entry("vlan_id").or_insert(json!(0));
    request.entry("nic_tag").or_insert(json!("external"));
    let new = params::new_network(&request, &service.config().network_mtu)?;
    service.create_network(new).await
}

/// Network with an explicit provisioning range
pub async fn network(
    service: &InventoryService,
    name: &str,
    subnet: &str,
    start: &str,
    end: &str,
) -> Network {
    try_network(
        service,
        json!({
            "name": name,
            "subnet": subnet,
            "provision_start_ip": start,
            "provision_end_ip": end,
        }),
    )
    .await
    .expect("network created")
}

pub async fn pool(service: &InventoryService, name: &str, members: &[&Network]) -> NetworkPool {
    let networks: Vec<String> = members.iter().map(|n| n.uuid.to_string()).collect();
    let new = params::new_pool(&body(json!({ "name": name, "networks": networks })))
        .expect("valid pool fixture");
    service.create_pool(new).await.expect("pool created")
}
