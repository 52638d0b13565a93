// Copyright (c) 2025 - Cowboy AI, Inc.
//! Nic tag operations

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::InventoryService;
use crate::domain::invariants;
use crate::domain::{Network, NewNicTag, NicTag, NicTagName, NicTagUpdate};
use crate::errors::{FieldError, IpamError, IpamResult, ResourceKind};
use crate::store::{self, Collection, DeleteOutcome, Filter, PutOutcome};

impl InventoryService {
    /// Networks bound to `tag`
    async fn networks_on_tag(&self, tag: &NicTagName) -> IpamResult<Vec<Network>> {
        let filter = Filter::new().eq("nic_tag", tag.to_string());
        Ok(store::load_all(self.store(), Collection::Networks, &filter).await?)
    }

    pub async fn create_nic_tag(&self, new: NewNicTag) -> IpamResult<NicTag> {
        let tag = NicTag::create(Uuid::now_v7(), new, Utc::now());
        let outcome = self
            .store()
            .put_if_absent(Collection::NicTags, &tag.key(), store::to_record(&tag)?)
            .await?;
        if outcome == PutOutcome::Conflict {
            return Err(IpamError::invalid_params(vec![FieldError::duplicate("name")]));
        }

        info!(name = %tag.name, mtu = %tag.mtu, "created nic tag");
        Ok(tag)
    }

    pub async fn get_nic_tag(&self, name: &str) -> IpamResult<NicTag> {
        self.require(Collection::NicTags, ResourceKind::NicTag, name).await
    }

    pub async fn list_nic_tags(&self) -> IpamResult<Vec<NicTag>> {
        Ok(store::load_all(self.store(), Collection::NicTags, &Filter::new()).await?)
    }

    /// Change a tag's MTU
    ///
    /// Lowering it below the MTU of any bound network is rejected with one
    /// error per such network. A value outside the configured limits is
    /// reported in the same response.
    pub async fn update_nic_tag(&self, name: &str, update: NicTagUpdate) -> IpamResult<NicTag> {
        let mut tag = self.get_nic_tag(name).await?;
        let Some(requested) = update.mtu else {
            return Ok(tag);
        };

        let mut errors = Vec::new();
        let checked = self.config().nic_tag_mtu.check(requested);
        if let Err(e) = &checked {
            errors.push(FieldError::invalid("mtu", e.to_string()));
        }
        let networks = self.networks_on_tag(&tag.name).await?;
        if let Err(bound) = invariants::validate_nic_tag_mtu(&tag.name, requested, &networks) {
            errors.extend(bound);
        }
        let mtu = match checked {
            Ok(mtu) if errors.is_empty() => mtu,
            _ => return Err(IpamError::invalid_params(errors)),
        };

        tag.mtu = mtu;
        tag.modified_timestamp = Utc::now();
        self.store()
            .put(Collection::NicTags, &tag.key(), store::to_record(&tag)?)
            .await?;

        info!(name = %tag.name, mtu = %tag.mtu, "updated nic tag");
        Ok(tag)
    }

    /// Remove a tag no network is bound to
    pub async fn delete_nic_tag(&self, name: &str) -> IpamResult<()> {
        let tag = self.get_nic_tag(name).await?;

        let networks = self.networks_on_tag(&tag.name).await?;
        if !networks.is_empty() {
            let errors = networks
                .iter()
                .map(|n| FieldError::used_by(ResourceKind::Network, n.uuid))
                .collect();
            return Err(IpamError::in_use("Nic tag is in use", errors));
        }

        if self.store().delete(Collection::NicTags, &tag.key()).await? == DeleteOutcome::NotFound {
            return Err(IpamError::not_found(ResourceKind::NicTag, name));
        }
        info!(name = %tag.name, "deleted nic tag");
        Ok(())
    }
}
