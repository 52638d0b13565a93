// Copyright (c) 2025 - Cowboy AI, Inc.
//! IP Address Records
//!
//! One record per held address, keyed by `(network_uuid, ip)`. The store
//! never holds `free` records: an address with no record is free, and
//! lookups of such addresses synthesize a [`IpRecord::free`] value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// State of an address within its network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpState {
    Free,
    Reserved,
    Provisioning,
    Used,
}

/// Kind of resource an address or nic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BelongsToType {
    Zone,
    Server,
    Other,
}

impl fmt::Display for BelongsToType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BelongsToType::Zone => f.write_str("zone"),
            BelongsToType::Server => f.write_str("server"),
            BelongsToType::Other => f.write_str("other"),
        }
    }
}

impl std::str::FromStr for BelongsToType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zone" => Ok(BelongsToType::Zone),
            "server" => Ok(BelongsToType::Server),
            "other" => Ok(BelongsToType::Other),
            other => Err(format!("unknown belongs_to_type \"{}\"", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRecord {
    pub network_uuid: Uuid,
    pub ip: IpAddr,
    pub state: IpState,
    /// Permanent reservation: survives release with ownership stripped
    #[serde(default)]
    pub reserved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belongs_to_type: Option<BelongsToType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belongs_to_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_timestamp: Option<DateTime<Utc>>,
}

impl IpRecord {
    pub fn key_for(network_uuid: Uuid, ip: IpAddr) -> String {
        format!("{}/{}", network_uuid, ip)
    }

    pub fn key(&self) -> String {
        Self::key_for(self.network_uuid, self.ip)
    }

    /// View of an address nobody holds
    pub fn free(network_uuid: Uuid, ip: IpAddr) -> Self {
        Self {
            network_uuid,
            ip,
            state: IpState::Free,
            reserved: false,
            belongs_to_type: None,
            belongs_to_uuid: None,
            owner_uuid: None,
            modified_timestamp: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == IpState::Free
    }

    /// What remains after release: a stripped reservation, or nothing
    pub fn released(&self, now: DateTime<Utc>) -> Option<IpRecord> {
        if !self.reserved {
            return None;
        }
        Some(IpRecord {
            state: IpState::Reserved,
            belongs_to_type: None,
            belongs_to_uuid: None,
            owner_uuid: None,
            modified_timestamp: Some(now),
            ..self.clone()
        })
    }

    /// The holder of this address, for `UsedBy`-style error attributes
    pub fn holder(&self) -> Option<(BelongsToType, Uuid)> {
        self.belongs_to_type.zip(self.belongs_to_uuid)
    }
}

/// Who an allocated address is handed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpClaim {
    pub belongs_to_type: Option<BelongsToType>,
    pub belongs_to_uuid: Option<Uuid>,
    pub owner_uuid: Option<Uuid>,
    pub state: IpState,
    pub reserved: bool,
}

impl IpClaim {
    /// Claim on behalf of a resource that is being provisioned
    pub fn provisioning(belongs_to_type: BelongsToType, belongs_to_uuid: Uuid, owner_uuid: Uuid) -> Self {
        Self {
            belongs_to_type: Some(belongs_to_type),
            belongs_to_uuid: Some(belongs_to_uuid),
            owner_uuid: Some(owner_uuid),
            state: IpState::Provisioning,
            reserved: false,
        }
    }

    /// Permanent reservation with no consumer attached
    pub fn reservation(owner_uuid: Option<Uuid>) -> Self {
        Self {
            belongs_to_type: None,
            belongs_to_uuid: None,
            owner_uuid,
            state: IpState::Reserved,
            reserved: true,
        }
    }

    pub fn with_state(mut self, state: IpState) -> Self {
        self.state = state;
        self
    }

    pub fn to_record(&self, network_uuid: Uuid, ip: IpAddr, now: DateTime<Utc>) -> IpRecord {
        IpRecord {
            network_uuid,
            ip,
            state: self.state,
            reserved: self.reserved,
            belongs_to_type: self.belongs_to_type,
            belongs_to_uuid: self.belongs_to_uuid,
            owner_uuid: self.owner_uuid,
            modified_timestamp: Some(now),
        }
    }
}
