// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-process store
//!
//! Used by tests and by single-instance deployments. Every operation yields
//! to the scheduler first, so concurrent callers interleave the way they do
//! against a remote store.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::trace;

use super::{Collection, DeleteOutcome, Filter, PutOutcome, Revisioned, Store};
use crate::errors::{StoreError, StoreResult};

type Records = HashMap<Collection, BTreeMap<String, Revisioned>>;

#[derive(Default)]
struct State {
    records: Records,
    /// Last revision handed out; shared by every key, like a stream sequence
    revision: u64,
}

impl State {
    fn insert(&mut self, collection: Collection, key: &str, record: Value) {
        self.revision += 1;
        let revision = self.revision;
        self.records
            .entry(collection)
            .or_default()
            .insert(key.to_string(), Revisioned { record, revision });
    }

    fn current(&self, collection: Collection, key: &str) -> Option<&Revisioned> {
        self.records.get(&collection).and_then(|c| c.get(key))
    }
}

pub struct InMemoryStore {
    state: RwLock<State>,
    available: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent operation fail with `Unavailable` until turned
    /// back on
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of records held in `collection`
    pub async fn len(&self, collection: Collection) -> usize {
        self.state
            .read()
            .await
            .records
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    async fn ready(&self) -> StoreResult<()> {
        tokio::task::yield_now().await;
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store is offline".to_string()))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entry(collection, key).await?.map(|entry| entry.record))
    }

    async fn entry(&self, collection: Collection, key: &str) -> StoreResult<Option<Revisioned>> {
        self.ready().await?;
        let state = self.state.read().await;
        Ok(state.current(collection, key).cloned())
    }

    async fn put_if_absent(
        &self,
        collection: Collection,
        key: &str,
        record: Value,
    ) -> StoreResult<PutOutcome> {
        self.ready().await?;
        let mut state = self.state.write().await;
        if state.current(collection, key).is_some() {
            trace!(%collection, key, "conditional insert rejected");
            return Ok(PutOutcome::Conflict);
        }
        state.insert(collection, key, record);
        Ok(PutOutcome::Created)
    }

    async fn put_if_unchanged(
        &self,
        collection: Collection,
        key: &str,
        record: Value,
        revision: u64,
    ) -> StoreResult<PutOutcome> {
        self.ready().await?;
        let mut state = self.state.write().await;
        let current = state.current(collection, key).map(|entry| entry.revision);
        if current != Some(revision) {
            trace!(%collection, key, expected = revision, ?current, "conditional update rejected");
            return Ok(PutOutcome::Conflict);
        }
        state.insert(collection, key, record);
        Ok(PutOutcome::Created)
    }

    async fn put(&self, collection: Collection, key: &str, record: Value) -> StoreResult<()> {
        self.ready().await?;
        self.state.write().await.insert(collection, key, record);
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<DeleteOutcome> {
        self.ready().await?;
        let mut state = self.state.write().await;
        let removed = state.records.get_mut(&collection).and_then(|c| c.remove(key));
        Ok(match removed {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Value>> {
        self.ready().await?;
        let state = self.state.read().await;
        Ok(state
            .records
            .get(&collection)
            .map(|c| {
                c.iter()
                    .filter(|(key, _)| filter.matches_key(key))
                    .map(|(_, entry)| &entry.record)
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_if_absent_single_winner() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put_if_absent(Collection::Ips, "n/10.0.0.1", json!({ "writer": i }))
                    .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == PutOutcome::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.len(Collection::Ips).await, 1);
    }

    #[tokio::test]
    async fn test_put_if_unchanged_rejects_stale_revision() {
        let store = InMemoryStore::new();
        store.put(Collection::Ips, "n/10.0.0.1", json!({ "v": 1 })).await.unwrap();
        let read = store.entry(Collection::Ips, "n/10.0.0.1").await.unwrap().unwrap();

        let first = store
            .put_if_unchanged(Collection::Ips, "n/10.0.0.1", json!({ "v": 2 }), read.revision)
            .await
            .unwrap();
        let stale = store
            .put_if_unchanged(Collection::Ips, "n/10.0.0.1", json!({ "v": 3 }), read.revision)
            .await
            .unwrap();
        assert_eq!(first, PutOutcome::Created);
        assert_eq!(stale, PutOutcome::Conflict);
        assert_eq!(
            store.get(Collection::Ips, "n/10.0.0.1").await.unwrap(),
            Some(json!({ "v": 2 }))
        );

        store.delete(Collection::Ips, "n/10.0.0.1").await.unwrap();
        let after_delete = store
            .put_if_unchanged(Collection::Ips, "n/10.0.0.1", json!({ "v": 4 }), read.revision + 1)
            .await
            .unwrap();
        assert_eq!(after_delete, PutOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_delete_reports_missing() {
        let store = InMemoryStore::new();
        store.put(Collection::Nics, "k", json!({})).await.unwrap();
        assert_eq!(store.delete(Collection::Nics, "k").await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.delete(Collection::Nics, "k").await.unwrap(), DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_operation() {
        let store = InMemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.get(Collection::Networks, "x").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.query(Collection::Networks, &Filter::new()).await.is_err());

        store.set_available(true);
        assert!(store.get(Collection::Networks, "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_is_key_ordered() {
        let store = InMemoryStore::new();
        for key in ["c", "a", "b"] {
            store
                .put(Collection::NicTags, key, json!({ "name": key }))
                .await
                .unwrap();
        }
        let names: Vec<_> = store
            .query(Collection::NicTags, &Filter::new())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("a"), json!("b"), json!("c")]);
    }
}
