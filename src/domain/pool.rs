// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Pool Entity
//!
//! An ordered group of networks allocated from as one unit. Member order is
//! the fallback order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::address::AddressFamily;
use super::values::NicTagName;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkPool {
    pub uuid: Uuid,
    pub name: String,
    pub networks: Vec<Uuid>,
    pub family: AddressFamily,
    #[serde(default)]
    pub nic_tags_present: Vec<NicTagName>,
    #[serde(default)]
    pub owner_uuids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_timestamp: DateTime<Utc>,
    pub modified_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNetworkPool {
    pub name: String,
    pub networks: Vec<Uuid>,
    pub owner_uuids: Vec<Uuid>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkPoolUpdate {
    pub name: Option<String>,
    pub networks: Option<Vec<Uuid>>,
    pub owner_uuids: Option<Vec<Uuid>>,
    pub description: Option<String>,
}

impl NetworkPool {
    /// Upper bound on pool membership
    pub const MAX_NETWORKS: usize = 64;

    pub fn key(&self) -> String {
        self.uuid.to_string()
    }

    pub fn is_visible_to(&self, owner: Option<Uuid>) -> bool {
        match owner {
            None => true,
            Some(owner) => self.owner_uuids.is_empty() || self.owner_uuids.contains(&owner),
        }
    }
}
