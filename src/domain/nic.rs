// Copyright (c) 2025 - Cowboy AI, Inc.
//! NIC Records
//!
//! A nic is keyed by MAC address and holds at most one address through its
//! IP record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use super::ip::{BelongsToType, IpRecord};
use super::network::Network;
use super::values::{MacAddress, Mtu, NicTagName, VlanId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NicState {
    #[default]
    Provisioning,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicRecord {
    pub mac: MacAddress,
    pub belongs_to_type: BelongsToType,
    pub belongs_to_uuid: Uuid,
    pub owner_uuid: Uuid,
    #[serde(default)]
    pub primary: bool,
    pub state: NicState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<VlanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<Mtu>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nic_tag: Option<NicTagName>,
    #[serde(default)]
    pub resolvers: Vec<IpAddr>,
    pub created_timestamp: DateTime<Utc>,
    pub modified_timestamp: DateTime<Utc>,
}

/// Where a new nic's address comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicAddressing {
    /// No address: the nic only carries its nic tag
    Unaddressed,
    /// Next free address on a network
    Network(Uuid),
    /// Next free address on the first non-full member of a pool
    Pool(Uuid),
    /// A specific address on a network
    Specific { network_uuid: Uuid, ip: IpAddr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNic {
    pub mac: MacAddress,
    pub belongs_to_type: BelongsToType,
    pub belongs_to_uuid: Uuid,
    pub owner_uuid: Uuid,
    pub primary: bool,
    pub state: NicState,
    pub nic_tag: Option<NicTagName>,
    pub addressing: NicAddressing,
}

impl NicRecord {
    pub fn create(new: &NewNic, now: DateTime<Utc>) -> Self {
        Self {
            mac: new.mac,
            belongs_to_type: new.belongs_to_type,
            belongs_to_uuid: new.belongs_to_uuid,
            owner_uuid: new.owner_uuid,
            primary: new.primary,
            state: new.state,
            network_uuid: None,
            ip: None,
            netmask: None,
            gateway: None,
            vlan_id: None,
            mtu: None,
            nic_tag: new.nic_tag.clone(),
            resolvers: Vec::new(),
            created_timestamp: now,
            modified_timestamp: now,
        }
    }

    /// Copy the addressing parameters of `network` onto this nic
    pub fn attach(mut self, network: &Network, ip: &IpRecord) -> Self {
        self.network_uuid = Some(network.uuid);
        self.ip = Some(ip.ip);
        self.netmask = Some(network.netmask());
        self.gateway = network.gateway;
        self.vlan_id = Some(network.vlan_id);
        self.mtu = Some(network.mtu);
        self.nic_tag = Some(network.nic_tag.clone());
        self.resolvers = network.resolvers.clone();
        self
    }

    pub fn key(&self) -> String {
        self.mac.key()
    }
}
