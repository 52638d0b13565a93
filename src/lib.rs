// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network inventory and IP address allocation
//!
//! Tracks networks, nic tags, network pools, IP records and nics, and hands
//! out addresses from provisioning ranges so that concurrent callers, in
//! one process or many, never receive the same address.
//!
//! # Layers
//!
//! - [`domain`]: address arithmetic, value objects, entities, parameter
//!   validation and topology invariants (pure)
//! - [`allocation`]: range scanning over conditional inserts, pool fallback
//! - [`store`]: backing store contract, in-memory and NATS KV
//!   implementations
//! - [`service`]: inventory operations over all of the above
//! - [`api`] and [`nats`]: request/reply surface
//!
//! # Example
//!
//! ```rust
//! use cim_network_ipam::api;
//! use cim_network_ipam::config::IpamConfig;
//! use cim_network_ipam::service::InventoryService;
//! use cim_network_ipam::store::InMemoryStore;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let service = InventoryService::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(IpamConfig::default()),
//! );
//!
//! let reply = api::dispatch(&service, "nic_tags.create", br#"{"name":"external"}"#).await;
//! assert_eq!(reply.status, 200);
//! # });
//! ```

pub mod allocation;
pub mod api;
pub mod config;
pub mod domain;
pub mod errors;
pub mod nats;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use allocation::{AllocationEngine, StartStrategy};
pub use config::IpamConfig;
pub use errors::{ErrorBody, FieldError, IpamError, IpamResult, StoreError};
pub use service::InventoryService;
pub use store::{InMemoryStore, NatsKvStore, Store};
