// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS JetStream Key-Value Store Implementation
//!
//! Implements [`Store`] over JetStream key-value buckets:
//! - One bucket per collection, named `<bucket>_<collection>`
//! - Both conditional writes are the bucket's `update`, which the server
//!   rejects unless the key's last revision is the one expected. A key that
//!   never held a value is at revision 0; a deleted key sits at the revision
//!   of its delete marker.
//! - Queries list the collection's keys, narrowed by the filter's key
//!   prefix, and filter decoded records
//!
//! # Example
//!
//! ```rust,no_run
//! use cim_network_ipam::nats::NatsConfig;
//! use cim_network_ipam::store::NatsKvStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = NatsKvStore::connect(&NatsConfig::default(), "ipam").await?;
//!     // Use store...
//!     Ok(())
//! }
//! ```

use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use super::{Collection, DeleteOutcome, Filter, PutOutcome, Revisioned, Store};
use crate::errors::{StoreError, StoreResult};
use crate::nats::{self as nats_client, NatsConfig};

fn unavailable(err: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// NATS JetStream KV-backed store
pub struct NatsKvStore {
    buckets: HashMap<Collection, kv::Store>,
    bucket: String,
}

impl NatsKvStore {
    /// Connect to NATS and open (or create) the buckets named after `bucket`
    pub async fn connect(config: &NatsConfig, bucket: &str) -> StoreResult<Self> {
        let client = nats_client::connect(config).await.map_err(unavailable)?;
        Self::open(jetstream::new(client), bucket).await
    }

    /// Open one bucket per collection on an existing JetStream context,
    /// creating any that are missing
    pub async fn open(jetstream: jetstream::Context, bucket: &str) -> StoreResult<Self> {
        let mut buckets = HashMap::new();
        for collection in Collection::ALL {
            let name = Self::bucket_name(bucket, collection);
            buckets.insert(collection, Self::open_bucket(&jetstream, &name).await?);
        }

        Ok(Self {
            buckets,
            bucket: bucket.to_string(),
        })
    }

    async fn open_bucket(jetstream: &jetstream::Context, name: &str) -> StoreResult<kv::Store> {
        match jetstream.get_key_value(name).await {
            Ok(kv) => Ok(kv),
            Err(_) => {
                info!(bucket = name, "creating key-value bucket");
                jetstream
                    .create_key_value(kv::Config {
                        bucket: name.to_string(),
                        description: "network inventory and address allocations".to_string(),
                        history: 1,
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| StoreError::Configuration(e.to_string()))
            }
        }
    }

    /// Name shared by every bucket of this store
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn bucket_name(bucket: &str, collection: Collection) -> String {
        format!("{}_{}", bucket, collection.as_str())
    }

    fn kv(&self, collection: Collection) -> StoreResult<&kv::Store> {
        self.buckets.get(&collection).ok_or_else(|| {
            StoreError::Configuration(format!("no bucket open for collection {}", collection))
        })
    }

    /// Bucket key for a record
    ///
    /// KV keys may not contain ':', which IPv6 addresses do.
    fn bucket_key(key: &str) -> String {
        key.replace(':', "-")
    }

    fn encode(record: &Value) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(record)?)
    }

    fn is_tombstone(entry: &kv::Entry) -> bool {
        matches!(entry.operation, kv::Operation::Delete | kv::Operation::Purge)
    }

    /// Write `payload` only if the key's last revision is `expected`
    ///
    /// The server reports a wrong last revision as an opaque publish error,
    /// so a failed write is classified by reading the key back.
    async fn write_at(
        kv: &kv::Store,
        key: &str,
        payload: Vec<u8>,
        expected: u64,
    ) -> StoreResult<PutOutcome> {
        let err = match kv.update(key, payload.clone().into(), expected).await {
            Ok(_) => return Ok(PutOutcome::Created),
            Err(err) => err,
        };

        let current = kv.entry(key).await.map_err(unavailable)?;
        match current {
            // Acknowledgement lost after the write landed
            Some(entry) if !Self::is_tombstone(&entry) && entry.value[..] == payload[..] => {
                Ok(PutOutcome::Created)
            }
            Some(entry) if entry.revision != expected => {
                debug!(key, expected, found = entry.revision, "conditional write rejected");
                Ok(PutOutcome::Conflict)
            }
            None if expected != 0 => {
                debug!(key, expected, "conditional write rejected, key purged");
                Ok(PutOutcome::Conflict)
            }
            _ => Err(unavailable(err)),
        }
    }
}

#[async_trait]
impl Store for NatsKvStore {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entry(collection, key).await?.map(|entry| entry.record))
    }

    async fn entry(&self, collection: Collection, key: &str) -> StoreResult<Option<Revisioned>> {
        let entry = self
            .kv(collection)?
            .entry(Self::bucket_key(key))
            .await
            .map_err(unavailable)?;

        match entry {
            Some(entry) if !Self::is_tombstone(&entry) => Ok(Some(Revisioned {
                record: serde_json::from_slice(&entry.value)?,
                revision: entry.revision,
            })),
            _ => Ok(None),
        }
    }

    async fn put_if_absent(
        &self,
        collection: Collection,
        key: &str,
        record: Value,
    ) -> StoreResult<PutOutcome> {
        let kv = self.kv(collection)?;
        let bucket_key = Self::bucket_key(key);

        let expected = match kv.entry(bucket_key.clone()).await.map_err(unavailable)? {
            None => 0,
            Some(entry) if Self::is_tombstone(&entry) => entry.revision,
            Some(_) => {
                debug!(%collection, key = %bucket_key, "conditional insert rejected");
                return Ok(PutOutcome::Conflict);
            }
        };
        Self::write_at(kv, &bucket_key, Self::encode(&record)?, expected).await
    }

    async fn put_if_unchanged(
        &self,
        collection: Collection,
        key: &str,
        record: Value,
        revision: u64,
    ) -> StoreResult<PutOutcome> {
        let kv = self.kv(collection)?;
        Self::write_at(kv, &Self::bucket_key(key), Self::encode(&record)?, revision).await
    }

    async fn put(&self, collection: Collection, key: &str, record: Value) -> StoreResult<()> {
        self.kv(collection)?
            .put(Self::bucket_key(key), Self::encode(&record)?.into())
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<DeleteOutcome> {
        let kv = self.kv(collection)?;
        let bucket_key = Self::bucket_key(key);
        if kv.get(bucket_key.clone()).await.map_err(unavailable)?.is_none() {
            return Ok(DeleteOutcome::NotFound);
        }

        kv.delete(&bucket_key).await.map_err(unavailable)?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Value>> {
        let kv = self.kv(collection)?;
        let prefix = filter.key_prefix().map(Self::bucket_key);
        let mut keys = kv.keys().await.map_err(unavailable)?;

        let mut matching = Vec::new();
        while let Some(key) = keys.next().await {
            let key = key.map_err(unavailable)?;
            if prefix.as_deref().map_or(true, |prefix| key.starts_with(prefix)) {
                matching.push(key);
            }
        }
        matching.sort();

        let mut records = Vec::with_capacity(matching.len());
        for key in matching {
            // Deleted between listing and reading
            let Some(payload) = kv.get(key).await.map_err(unavailable)? else {
                continue;
            };
            let record: Value = serde_json::from_slice(&payload)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }
}
