// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network operations

use chrono::Utc;
use std::net::IpAddr;
use tracing::{debug, info};
use uuid::Uuid;

use super::{InventoryService, NetworkListFilter};
use crate::domain::invariants;
use crate::domain::{IpRecord, Network, NetworkPool, NetworkUpdate, NewNetwork, NicTag, NicTagName};
use crate::errors::{FieldError, IpamError, IpamResult, ResourceKind};
use crate::store::{self, Collection, Filter};

impl InventoryService {
    /// The tag a network binds to, or a field error on `nic_tag`
    async fn bound_tag(&self, name: &NicTagName) -> IpamResult<Result<NicTag, FieldError>> {
        let tag: Option<NicTag> = store::load(self.store(), Collection::NicTags, name.as_str()).await?;
        Ok(tag.ok_or_else(|| {
            FieldError::invalid("nic_tag", format!("nic tag \"{}\" does not exist", name))
        }))
    }

    async fn all_networks(&self) -> IpamResult<Vec<Network>> {
        Ok(store::load_all(self.store(), Collection::Networks, &Filter::new()).await?)
    }

    /// Create a network
    ///
    /// The nic tag must exist and allow the network's MTU, and the subnet
    /// must not overlap a network in the same owner scope. Every violation
    /// is reported at once. The gateway, and the IPv4 network and broadcast
    /// addresses when configured, become permanent reservations.
    pub async fn create_network(&self, new: NewNetwork) -> IpamResult<Network> {
        let mut errors = Vec::new();

        match self.bound_tag(&new.nic_tag).await? {
            Ok(tag) => {
                if let Err(mtu_errors) = invariants::validate_network_mtu(new.mtu, &tag) {
                    errors.extend(mtu_errors);
                }
            }
            Err(e) => errors.push(e),
        }

        let existing = self.all_networks().await?;
        if let Err(overlaps) =
            invariants::validate_subnet_overlap(&new.subnet, &new.owner_uuids, &existing, None)
        {
            errors.extend(overlaps);
        }
        IpamError::check(errors)?;

        let network = Network::create(Uuid::now_v7(), new, Utc::now());
        self.store()
            .put(Collection::Networks, &network.key(), store::to_record(&network)?)
            .await?;

        let reserved = network.reserved_addresses(self.config().reserve_subnet_bounds);
        self.engine().reserve_addresses(&network, &reserved).await?;

        info!(
            network_uuid = %network.uuid,
            subnet = %network.subnet,
            nic_tag = %network.nic_tag,
            "created network"
        );
        Ok(network)
    }

    pub async fn get_network(&self, uuid: Uuid) -> IpamResult<Network> {
        self.require(Collection::Networks, ResourceKind::Network, &uuid.to_string())
            .await
    }

    pub async fn list_networks(&self, filter: &NetworkListFilter) -> IpamResult<Vec<Network>> {
        let mut query = Filter::new();
        if let Some(tag) = &filter.nic_tag {
            query = query.eq("nic_tag", tag.to_string());
        }
        if let Some(name) = &filter.name {
            query = query.eq("name", name.clone());
        }
        let mut networks: Vec<Network> =
            store::load_all(self.store(), Collection::Networks, &query).await?;
        networks.retain(|n| {
            n.is_visible_to(filter.owner_uuid) && filter.family.map_or(true, |f| n.family == f)
        });
        Ok(networks)
    }

    /// Update a network
    ///
    /// The range and gateway are revalidated against the subnet. MTU and
    /// nic tag changes are checked against the (new) tag, and owner changes
    /// against the networks of the new scope. Reservations follow the new
    /// gateway and range, and pools holding the network pick up a new nic
    /// tag.
    pub async fn update_network(&self, uuid: Uuid, update: NetworkUpdate) -> IpamResult<Network> {
        let current = self.get_network(uuid).await?;
        let scope_changed = update.owner_uuids.is_some();
        let next = current
            .apply(update, Utc::now())
            .map_err(IpamError::invalid_params)?;

        let mut errors = Vec::new();
        if next.mtu != current.mtu || next.nic_tag != current.nic_tag {
            match self.bound_tag(&next.nic_tag).await? {
                Ok(tag) => {
                    if let Err(mtu_errors) = invariants::validate_network_mtu(next.mtu, &tag) {
                        errors.extend(mtu_errors);
                    }
                }
                Err(e) => errors.push(e),
            }
        }
        if scope_changed {
            let existing = self.all_networks().await?;
            if let Err(overlaps) = invariants::validate_subnet_overlap(
                &next.subnet,
                &next.owner_uuids,
                &existing,
                Some(uuid),
            ) {
                errors.extend(overlaps);
            }
        }
        IpamError::check(errors)?;

        self.store()
            .put(Collection::Networks, &next.key(), store::to_record(&next)?)
            .await?;

        let bounds = self.config().reserve_subnet_bounds;
        let was_reserved = current.reserved_addresses(bounds);
        let reserved = next.reserved_addresses(bounds);
        for old in was_reserved.iter().filter(|ip| !reserved.contains(ip)) {
            self.drop_reservation(uuid, *old).await?;
        }
        if reserved != was_reserved {
            self.engine().reserve_addresses(&next, &reserved).await?;
        }
        if next.nic_tag != current.nic_tag {
            self.refresh_pools_with(uuid).await?;
        }

        info!(network_uuid = %uuid, "updated network");
        Ok(next)
    }

    /// Delete a reservation record nobody holds
    async fn drop_reservation(&self, network_uuid: Uuid, ip: IpAddr) -> IpamResult<()> {
        let key = IpRecord::key_for(network_uuid, ip);
        let record: Option<IpRecord> = store::load(self.store(), Collection::Ips, &key).await?;
        if let Some(record) = record {
            if record.reserved && record.holder().is_none() {
                self.store().delete(Collection::Ips, &key).await?;
                debug!(%network_uuid, %ip, "dropped reservation");
            }
        }
        Ok(())
    }

    /// Delete a network nothing references
    ///
    /// Held addresses and pool memberships block deletion and are listed in
    /// the `InUse` error. Remaining reservations are removed with the
    /// network.
    pub async fn delete_network(&self, uuid: Uuid) -> IpamResult<()> {
        let network = self.get_network(uuid).await?;

        let ip_filter = Filter::new().eq("network_uuid", uuid.to_string());
        let records: Vec<IpRecord> =
            store::load_all(self.store(), Collection::Ips, &ip_filter).await?;
        let pool_filter = Filter::new().contains("networks", uuid.to_string());
        let pools: Vec<NetworkPool> =
            store::load_all(self.store(), Collection::NetworkPools, &pool_filter).await?;

        let mut errors: Vec<FieldError> = records
            .iter()
            .filter_map(IpRecord::holder)
            .map(|(kind, holder)| FieldError::used_by(kind, holder))
            .collect();
        errors.extend(
            pools
                .iter()
                .map(|p| FieldError::used_by(ResourceKind::NetworkPool, p.uuid)),
        );
        if !errors.is_empty() {
            return Err(IpamError::in_use("Network is in use", errors));
        }

        for record in &records {
            self.store().delete(Collection::Ips, &record.key()).await?;
        }
        self.store().delete(Collection::Networks, &network.key()).await?;

        info!(network_uuid = %uuid, reservations = records.len(), "deleted network");
        Ok(())
    }
}
