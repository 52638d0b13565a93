// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service Layer for Network Inventory
//!
//! Orchestrates validated commands, the topology invariants and the
//! allocation engine over one shared backing store.
//!
//! # Architecture
//!
//! ```text
//! Client Request
//!     ↓
//! Parameter validation (domain::params)
//!     ↓
//! Service Layer (this module)
//!     ├─→ Topology invariants (pure)
//!     ├─→ Allocation engine
//!     ↓
//! Backing Store (in-memory or NATS KV)
//! ```
//!
//! # Transaction Semantics
//!
//! Each service method is one logical operation:
//! 1. Load the entities the operation depends on
//! 2. Check every invariant, collecting all violations
//! 3. Write, with conditional inserts where uniqueness matters
//!
//! Nothing is written before step 2 passes. A NIC whose insert loses a race
//! gives back the address allocated for it.
//!
//! # Example
//!
//! ```rust
//! use cim_network_ipam::config::IpamConfig;
//! use cim_network_ipam::service::InventoryService;
//! use cim_network_ipam::store::InMemoryStore;
//! use std::sync::Arc;
//!
//! let service = InventoryService::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(IpamConfig::default()),
//! );
//! assert!(service.config().randomize_start);
//! ```

use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

use crate::allocation::AllocationEngine;
use crate::config::IpamConfig;
use crate::domain::{AddressFamily, NicTagName};
use crate::errors::{IpamError, IpamResult, ResourceKind};
use crate::store::{self, Collection, Store};

mod ips;
mod networks;
mod nic_tags;
mod nics;
mod pools;

pub use ips::ProvisionTarget;

/// Narrowing applied when listing networks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkListFilter {
    /// Only networks visible to this owner
    pub owner_uuid: Option<Uuid>,
    pub nic_tag: Option<NicTagName>,
    pub family: Option<AddressFamily>,
    pub name: Option<String>,
}

/// Narrowing applied when listing nics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NicListFilter {
    pub belongs_to_uuid: Option<Uuid>,
    pub owner_uuid: Option<Uuid>,
    pub network_uuid: Option<Uuid>,
}

/// Inventory and allocation service
pub struct InventoryService {
    store: Arc<dyn Store>,
    engine: AllocationEngine,
    config: Arc<IpamConfig>,
}

impl InventoryService {
    /// Service whose engine picks scan starts as `config` asks
    pub fn new(store: Arc<dyn Store>, config: Arc<IpamConfig>) -> Self {
        let engine = AllocationEngine::new(store.clone(), config.start_strategy());
        Self::with_engine(store, engine, config)
    }

    pub fn with_engine(store: Arc<dyn Store>, engine: AllocationEngine, config: Arc<IpamConfig>) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    pub fn config(&self) -> &IpamConfig {
        &self.config
    }

    pub fn engine(&self) -> &AllocationEngine {
        &self.engine
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Load an entity, or fail with `ResourceNotFound`
    async fn require<T: DeserializeOwned>(
        &self,
        collection: Collection,
        kind: ResourceKind,
        key: &str,
    ) -> IpamResult<T> {
        store::load(self.store(), collection, key)
            .await?
            .ok_or_else(|| IpamError::not_found(kind, key))
    }
}
