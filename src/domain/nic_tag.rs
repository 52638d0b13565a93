// Copyright (c) 2025 - Cowboy AI, Inc.
//! Nic Tag Entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::values::{Mtu, NicTagName};

/// Binding point between host interfaces and networks, carrying the MTU
/// ceiling for every network bound to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicTag {
    pub uuid: Uuid,
    pub name: NicTagName,
    pub mtu: Mtu,
    pub created_timestamp: DateTime<Utc>,
    pub modified_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNicTag {
    pub name: NicTagName,
    pub mtu: Mtu,
}

/// Requested change to a tag
///
/// `mtu` is checked against the configured limits and the bound networks
/// when the update is applied, so both kinds of violation are reported
/// together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NicTagUpdate {
    pub mtu: Option<u32>,
}

impl NicTag {
    pub fn create(uuid: Uuid, new: NewNicTag, now: DateTime<Utc>) -> Self {
        Self {
            uuid,
            name: new.name,
            mtu: new.mtu,
            created_timestamp: now,
            modified_timestamp: now,
        }
    }

    pub fn key(&self) -> String {
        self.name.to_string()
    }
}
