// Copyright (c) 2025 - Cowboy AI, Inc.
//! IP address operations

use std::collections::HashSet;
use std::net::IpAddr;
use uuid::Uuid;

use super::InventoryService;
use crate::domain::address;
use crate::domain::params::IpUpdate;
use crate::domain::{AddressFamily, IpClaim, IpRecord, Network, NetworkPool, NicTagName};
use crate::errors::{FieldError, IpamError, IpamResult, ResourceKind};
use crate::store::{self, Collection, Filter};

/// Where a provisioned address comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionTarget {
    Network(Uuid),
    Pool {
        pool_uuid: Uuid,
        nic_tag: Option<NicTagName>,
    },
    /// Any network visible to the claim's owner
    Any {
        nic_tag: Option<NicTagName>,
        family: Option<AddressFamily>,
    },
}

impl InventoryService {
    /// Look up one address of a network
    ///
    /// Addresses with no record are reported as free. Addresses outside the
    /// subnet do not exist.
    pub async fn get_ip(&self, network_uuid: Uuid, ip: IpAddr) -> IpamResult<IpRecord> {
        let network = self.get_network(network_uuid).await?;
        if !network.subnet.contains(ip) {
            return Err(IpamError::not_found(ResourceKind::Ip, ip));
        }

        let key = IpRecord::key_for(network_uuid, ip);
        let record: Option<IpRecord> = store::load(self.store(), Collection::Ips, &key).await?;
        Ok(record.unwrap_or_else(|| IpRecord::free(network_uuid, ip)))
    }

    /// Held addresses of a network, in address order
    pub async fn list_ips(&self, network_uuid: Uuid) -> IpamResult<Vec<IpRecord>> {
        self.get_network(network_uuid).await?;
        let filter = Filter::new()
            .with_key_prefix(format!("{}/", network_uuid))
            .eq("network_uuid", network_uuid.to_string());
        let mut records: Vec<IpRecord> =
            store::load_all(self.store(), Collection::Ips, &filter).await?;
        records.sort_by_key(|r| address::to_u128(r.ip));
        Ok(records)
    }

    /// Hold a specific address for `claim`
    ///
    /// A reservation nobody holds, or a record already held by the same
    /// consumer, is taken over. Any other holder makes the claim fail with
    /// an `InvalidParameter` on `ip` naming that holder.
    pub(super) async fn assign_ip(
        &self,
        network: &Network,
        ip: IpAddr,
        claim: &IpClaim,
    ) -> IpamResult<IpRecord> {
        self.engine().assign(network, ip, claim).await
    }

    /// Free, reserve or assign one address
    pub async fn update_ip(&self, network_uuid: Uuid, ip: IpAddr, update: IpUpdate) -> IpamResult<IpRecord> {
        let network = self.get_network(network_uuid).await?;
        if !network.subnet.contains(ip) {
            return Err(IpamError::not_found(ResourceKind::Ip, ip));
        }

        match update {
            IpUpdate::Free => self.engine().release(network_uuid, ip).await,
            IpUpdate::Claim(claim) => self.assign_ip(&network, ip, &claim).await,
        }
    }

    /// Allocate the next free address from a network, a pool, or any
    /// visible network
    pub async fn provision_ip(
        &self,
        target: &ProvisionTarget,
        claim: &IpClaim,
    ) -> IpamResult<(Network, IpRecord)> {
        match target {
            ProvisionTarget::Network(uuid) => {
                let network = self.get_network(*uuid).await?;
                if !network.is_visible_to(claim.owner_uuid) {
                    return Err(IpamError::invalid_params(vec![FieldError::invalid(
                        "network_uuid",
                        "network is not available to this owner",
                    )
                    .with("network_uuid", uuid.to_string())]));
                }
                let record = self.engine().allocate(&network, &HashSet::new(), claim).await?;
                Ok((network, record))
            }
            ProvisionTarget::Pool { pool_uuid, nic_tag } => {
                let pool: NetworkPool = self.get_pool(*pool_uuid).await?;
                if !pool.is_visible_to(claim.owner_uuid) {
                    return Err(IpamError::invalid_params(vec![FieldError::invalid(
                        "pool_uuid",
                        "network pool is not available to this owner",
                    )
                    .with("pool_uuid", pool_uuid.to_string())]));
                }
                self.engine()
                    .allocate_pool(&pool, nic_tag.as_ref(), claim)
                    .await
            }
            ProvisionTarget::Any { nic_tag, family } => {
                self.engine()
                    .allocate_any(claim.owner_uuid, nic_tag.as_ref(), *family, claim)
                    .await
            }
        }
    }

    /// Give an address back; a no-op for an address nobody holds
    pub async fn release_ip(&self, network_uuid: Uuid, ip: IpAddr) -> IpamResult<IpRecord> {
        self.engine().release(network_uuid, ip).await
    }
}
