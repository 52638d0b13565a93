// Copyright (c) 2025 - Cowboy AI, Inc.
//! Backing Store Abstraction
//!
//! The store of record for every entity. Records are JSON documents keyed
//! within a [`Collection`].
//!
//! # Store Requirements
//!
//! 1. **Conditional writes**: `put_if_absent` and `put_if_unchanged` are
//!    atomic; they are the only mechanism that keeps two concurrent callers
//!    from holding the same address, across tasks and across service
//!    instances
//! 2. **No in-process locking assumed**: callers never rely on holding a
//!    lock across a store round-trip
//! 3. **Transient failure**: every operation may fail with
//!    [`StoreError::Unavailable`], which callers surface as an internal error
//!
//! # Example
//!
//! ```rust
//! use cim_network_ipam::store::{Collection, Filter, InMemoryStore, PutOutcome, Store};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryStore::new();
//! let record = json!({ "network_uuid": "n1", "ip": "10.0.0.5" });
//!
//! let first = store.put_if_absent(Collection::Ips, "n1/10.0.0.5", record.clone()).await?;
//! let second = store.put_if_absent(Collection::Ips, "n1/10.0.0.5", record).await?;
//! assert_eq!(first, PutOutcome::Created);
//! assert_eq!(second, PutOutcome::Conflict);
//!
//! let held = store
//!     .query(Collection::Ips, &Filter::new().eq("network_uuid", "n1"))
//!     .await?;
//! assert_eq!(held.len(), 1);
//! # Ok::<(), cim_network_ipam::errors::StoreError>(())
//! # }).unwrap();
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::errors::{StoreError, StoreResult};

pub mod memory;
pub mod nats;

pub use memory::InMemoryStore;
pub use nats::NatsKvStore;

/// Named set of records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Networks,
    NicTags,
    NetworkPools,
    Ips,
    Nics,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Networks,
        Collection::NicTags,
        Collection::NetworkPools,
        Collection::Ips,
        Collection::Nics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Networks => "networks",
            Collection::NicTags => "nic_tags",
            Collection::NetworkPools => "network_pools",
            Collection::Ips => "ips",
            Collection::Nics => "nics",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a conditional insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    /// A record already exists under the key; nothing was written
    Conflict,
}

/// A record and the revision it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Revisioned {
    pub record: Value,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Eq(String, Value),
    Contains(String, Value),
}

/// Conjunction of field predicates over a record's top-level fields
///
/// An empty filter matches every record. A key prefix narrows the keys a
/// store has to read at all; the field predicates still apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
    key_prefix: Option<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only keys starting with `prefix`
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn key_prefix(&self) -> Option<&str> {
        self.key_prefix.as_deref()
    }

    pub fn matches_key(&self, key: &str) -> bool {
        self.key_prefix
            .as_deref()
            .map_or(true, |prefix| key.starts_with(prefix))
    }

    /// Field equals `value`
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(field.into(), value.into()));
        self
    }

    /// Field is an array holding `value`
    pub fn contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Contains(field.into(), value.into()));
        self
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Eq(field, value) => record.get(field) == Some(value),
            Clause::Contains(field, value) => record
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        })
    }
}

/// Backing store contract
///
/// Implementations must make `put_if_absent` atomic with respect to every
/// other writer of the same key.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read one record
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>>;

    /// Insert a record only if no record exists under `key`
    async fn put_if_absent(
        &self,
        collection: Collection,
        key: &str,
        record: Value,
    ) -> StoreResult<PutOutcome>;

    /// Read one record together with its current revision
    async fn entry(&self, collection: Collection, key: &str) -> StoreResult<Option<Revisioned>>;

    /// Replace a record only if it is still at `revision`
    ///
    /// `Conflict` when the record was changed or deleted since it was read.
    async fn put_if_unchanged(
        &self,
        collection: Collection,
        key: &str,
        record: Value,
        revision: u64,
    ) -> StoreResult<PutOutcome>;

    /// Insert or replace a record
    async fn put(&self, collection: Collection, key: &str, record: Value) -> StoreResult<()>;

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<DeleteOutcome>;

    /// Every record of `collection` matching `filter`, in key order
    async fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Value>>;
}

/// Encode an entity as a store record
pub fn to_record<T: Serialize>(entity: &T) -> StoreResult<Value> {
    serde_json::to_value(entity).map_err(StoreError::from)
}

/// Read and decode one entity
pub async fn load<T: DeserializeOwned>(
    store: &dyn Store,
    collection: Collection,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(collection, key).await? {
        Some(record) => Ok(Some(serde_json::from_value(record)?)),
        None => Ok(None),
    }
}

/// Read and decode one entity along with its revision
pub async fn load_revisioned<T: DeserializeOwned>(
    store: &dyn Store,
    collection: Collection,
    key: &str,
) -> StoreResult<Option<(T, u64)>> {
    match store.entry(collection, key).await? {
        Some(entry) => Ok(Some((serde_json::from_value(entry.record)?, entry.revision))),
        None => Ok(None),
    }
}

/// Read and decode every entity matching `filter`
pub async fn load_all<T: DeserializeOwned>(
    store: &dyn Store,
    collection: Collection,
    filter: &Filter,
) -> StoreResult<Vec<T>> {
    store
        .query(collection, filter)
        .await?
        .into_iter()
        .map(|record| serde_json::from_value(record).map_err(StoreError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_eq_and_contains() {
        let record = json!({
            "nic_tag": "external",
            "owner_uuids": ["a", "b"],
        });

        assert!(Filter::new().matches(&record));
        assert!(Filter::new().eq("nic_tag", "external").matches(&record));
        assert!(Filter::new().contains("owner_uuids", "b").matches(&record));
        assert!(!Filter::new()
            .eq("nic_tag", "external")
            .contains("owner_uuids", "c")
            .matches(&record));
        assert!(!Filter::new().eq("missing", "x").matches(&record));
        assert!(!Filter::new().contains("nic_tag", "external").matches(&record));
    }

    #[test]
    fn test_key_prefix_narrows_keys() {
        let filter = Filter::new().with_key_prefix("n1/");
        assert!(filter.matches_key("n1/10.0.0.5"));
        assert!(!filter.matches_key("n2/10.0.0.5"));
        assert!(Filter::new().matches_key("anything"));
    }
}
