// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network pool operations

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::InventoryService;
use crate::domain::invariants::{self, PoolMembership};
use crate::domain::{Network, NetworkPool, NetworkPoolUpdate, NewNetworkPool};
use crate::errors::{FieldError, IpamError, IpamResult, ResourceKind};
use crate::store::{self, Collection, Filter};

impl InventoryService {
    /// Check a membership list against the stored networks
    async fn pool_membership(&self, members: &[Uuid]) -> IpamResult<PoolMembership> {
        let mut found = Vec::with_capacity(members.len());
        for uuid in members {
            let network: Option<Network> =
                store::load(self.store(), Collection::Networks, &uuid.to_string()).await?;
            found.extend(network);
        }
        invariants::validate_pool_members(members, &found).map_err(IpamError::invalid_params)
    }

    /// Fail with `Duplicate` on `name` if another pool already uses it
    async fn check_pool_name(&self, name: &str, updating: Option<Uuid>) -> IpamResult<()> {
        let filter = Filter::new().eq("name", name);
        let pools: Vec<NetworkPool> =
            store::load_all(self.store(), Collection::NetworkPools, &filter).await?;
        if pools.iter().any(|p| Some(p.uuid) != updating) {
            return Err(IpamError::invalid_params(vec![FieldError::duplicate("name")]));
        }
        Ok(())
    }

    /// Create a pool whose members all exist and share one address family
    pub async fn create_pool(&self, new: NewNetworkPool) -> IpamResult<NetworkPool> {
        self.check_pool_name(&new.name, None).await?;
        let membership = self.pool_membership(&new.networks).await?;

        let now = Utc::now();
        let pool = NetworkPool {
            uuid: Uuid::now_v7(),
            name: new.name,
            networks: new.networks,
            family: membership.family,
            nic_tags_present: membership.nic_tags_present,
            owner_uuids: new.owner_uuids,
            description: new.description,
            created_timestamp: now,
            modified_timestamp: now,
        };
        self.store()
            .put(Collection::NetworkPools, &pool.key(), store::to_record(&pool)?)
            .await?;

        info!(pool_uuid = %pool.uuid, members = pool.networks.len(), "created network pool");
        Ok(pool)
    }

    pub async fn get_pool(&self, uuid: Uuid) -> IpamResult<NetworkPool> {
        self.require(Collection::NetworkPools, ResourceKind::NetworkPool, &uuid.to_string())
            .await
    }

    pub async fn list_pools(&self, owner_uuid: Option<Uuid>) -> IpamResult<Vec<NetworkPool>> {
        let mut pools: Vec<NetworkPool> =
            store::load_all(self.store(), Collection::NetworkPools, &Filter::new()).await?;
        pools.retain(|p| p.is_visible_to(owner_uuid));
        Ok(pools)
    }

    pub async fn update_pool(&self, uuid: Uuid, update: NetworkPoolUpdate) -> IpamResult<NetworkPool> {
        let mut pool = self.get_pool(uuid).await?;

        if let Some(name) = update.name {
            if name != pool.name {
                self.check_pool_name(&name, Some(uuid)).await?;
            }
            pool.name = name;
        }
        if let Some(networks) = update.networks {
            let membership = self.pool_membership(&networks).await?;
            pool.networks = networks;
            pool.family = membership.family;
            pool.nic_tags_present = membership.nic_tags_present;
        }
        if let Some(owner_uuids) = update.owner_uuids {
            pool.owner_uuids = owner_uuids;
        }
        if let Some(description) = update.description {
            pool.description = Some(description);
        }
        pool.modified_timestamp = Utc::now();

        self.store()
            .put(Collection::NetworkPools, &pool.key(), store::to_record(&pool)?)
            .await?;
        info!(pool_uuid = %uuid, "updated network pool");
        Ok(pool)
    }

    /// Recompute the nic tags of every pool `network_uuid` belongs to
    pub(super) async fn refresh_pools_with(&self, network_uuid: Uuid) -> IpamResult<()> {
        let filter = Filter::new().contains("networks", network_uuid.to_string());
        let pools: Vec<NetworkPool> =
            store::load_all(self.store(), Collection::NetworkPools, &filter).await?;

        for mut pool in pools {
            let membership = self.pool_membership(&pool.networks).await?;
            if membership.nic_tags_present == pool.nic_tags_present {
                continue;
            }
            pool.nic_tags_present = membership.nic_tags_present;
            pool.modified_timestamp = Utc::now();
            self.store()
                .put(Collection::NetworkPools, &pool.key(), store::to_record(&pool)?)
                .await?;
            debug!(pool_uuid = %pool.uuid, %network_uuid, "refreshed pool nic tags");
        }
        Ok(())
    }

    pub async fn delete_pool(&self, uuid: Uuid) -> IpamResult<()> {
        let pool = self.get_pool(uuid).await?;
        self.store().delete(Collection::NetworkPools, &pool.key()).await?;
        info!(pool_uuid = %uuid, "deleted network pool");
        Ok(())
    }
}
