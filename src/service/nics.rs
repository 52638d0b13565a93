// Copyright (c) 2025 - Cowboy AI, Inc.
//! Nic operations

use chrono::Utc;
use tracing::{info, warn};

use super::{InventoryService, NicListFilter, ProvisionTarget};
use crate::domain::{
    IpClaim, IpState, MacAddress, NewNic, NicAddressing, NicRecord, NicState, NicTagName,
};
use crate::errors::{FieldError, IpamError, IpamResult, ResourceKind};
use crate::store::{self, Collection, DeleteOutcome, Filter, PutOutcome};

impl InventoryService {
    /// Create a nic, provisioning its address first when one is asked for
    ///
    /// The nic is inserted only if its MAC address is unused. When that
    /// insert loses, the address just provisioned for it is given back.
    pub async fn create_nic(&self, new: NewNic) -> IpamResult<NicRecord> {
        let key = new.mac.key();
        if store::load::<NicRecord>(self.store(), Collection::Nics, &key)
            .await?
            .is_some()
        {
            return Err(IpamError::invalid_params(vec![FieldError::duplicate("mac")]));
        }

        let mut claim = IpClaim::provisioning(new.belongs_to_type, new.belongs_to_uuid, new.owner_uuid);
        if new.state == NicState::Running {
            claim = claim.with_state(IpState::Used);
        }

        let addressed = match &new.addressing {
            NicAddressing::Unaddressed => None,
            NicAddressing::Network(uuid) => {
                let network = self.get_network(*uuid).await?;
                self.check_nic_tag(&new, &network.nic_tag)?;
                Some(
                    self.provision_ip(&ProvisionTarget::Network(*uuid), &claim)
                        .await?,
                )
            }
            NicAddressing::Pool(pool_uuid) => {
                let target = ProvisionTarget::Pool {
                    pool_uuid: *pool_uuid,
                    nic_tag: new.nic_tag.clone(),
                };
                Some(self.provision_ip(&target, &claim).await?)
            }
            NicAddressing::Specific { network_uuid, ip } => {
                let network = self.get_network(*network_uuid).await?;
                self.check_nic_tag(&new, &network.nic_tag)?;
                let record = self.assign_ip(&network, *ip, &claim).await?;
                Some((network, record))
            }
        };

        let mut nic = NicRecord::create(&new, Utc::now());
        if let Some((network, record)) = &addressed {
            nic = nic.attach(network, record);
        }

        let outcome = self
            .store()
            .put_if_absent(Collection::Nics, &key, store::to_record(&nic)?)
            .await?;
        if outcome == PutOutcome::Conflict {
            if let Some((network, record)) = addressed {
                warn!(mac = %nic.mac, ip = %record.ip, "nic already exists, giving address back");
                self.engine().release(network.uuid, record.ip).await?;
            }
            return Err(IpamError::invalid_params(vec![FieldError::duplicate("mac")]));
        }

        info!(
            mac = %nic.mac,
            belongs_to_uuid = %nic.belongs_to_uuid,
            ip = ?nic.ip,
            "created nic"
        );
        Ok(nic)
    }

    fn check_nic_tag(&self, new: &NewNic, network_tag: &NicTagName) -> IpamResult<()> {
        match &new.nic_tag {
            Some(tag) if tag != network_tag => Err(IpamError::invalid_param(
                "nic_tag",
                format!("network is on nic tag \"{}\", not \"{}\"", network_tag, tag),
            )),
            _ => Ok(()),
        }
    }

    pub async fn get_nic(&self, mac: &MacAddress) -> IpamResult<NicRecord> {
        self.require(Collection::Nics, ResourceKind::Nic, &mac.key())
            .await
            .map_err(|e| match e {
                IpamError::ResourceNotFound { resource, .. } => IpamError::not_found(resource, mac),
                other => other,
            })
    }

    pub async fn list_nics(&self, filter: &NicListFilter) -> IpamResult<Vec<NicRecord>> {
        let mut query = Filter::new();
        if let Some(uuid) = filter.belongs_to_uuid {
            query = query.eq("belongs_to_uuid", uuid.to_string());
        }
        if let Some(uuid) = filter.owner_uuid {
            query = query.eq("owner_uuid", uuid.to_string());
        }
        if let Some(uuid) = filter.network_uuid {
            query = query.eq("network_uuid", uuid.to_string());
        }
        Ok(store::load_all(self.store(), Collection::Nics, &query).await?)
    }

    /// Delete a nic and give back the address it holds
    pub async fn delete_nic(&self, mac: &MacAddress) -> IpamResult<()> {
        let nic = self.get_nic(mac).await?;

        if let (Some(network_uuid), Some(ip)) = (nic.network_uuid, nic.ip) {
            let record = self.get_ip(network_uuid, ip).await;
            match record {
                Ok(record) if record.belongs_to_uuid == Some(nic.belongs_to_uuid) => {
                    self.engine().release(network_uuid, ip).await?;
                }
                Ok(_) => warn!(mac = %nic.mac, %ip, "address no longer held by nic, leaving it"),
                Err(IpamError::ResourceNotFound { .. }) => {
                    warn!(mac = %nic.mac, %network_uuid, "network of nic no longer exists")
                }
                Err(e) => return Err(e),
            }
        }

        if self.store().delete(Collection::Nics, &nic.key()).await? == DeleteOutcome::NotFound {
            return Err(IpamError::not_found(ResourceKind::Nic, mac));
        }
        info!(mac = %nic.mac, "deleted nic");
        Ok(())
    }
}
