// Copyright (c) 2025 - Cowboy AI, Inc.
//! Allocation engine

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{AddressFamily, IpClaim, IpRecord, Network, NetworkPool, NicTagName};
use crate::errors::{FieldError, IpamError, IpamResult, StoreError};
use crate::store::{self, Collection, DeleteOutcome, Filter, PutOutcome, Store};

/// Conditional writes tried on one record before giving up
const WRITE_ATTEMPTS: usize = 8;

/// Where a scan of the provisioning range begins
pub enum StartStrategy {
    /// Always `provision_start_ip`
    First,
    /// Uniformly random offset, so concurrent callers spread out
    Random,
    /// Reproducible offsets from a seeded generator
    Seeded(Mutex<StdRng>),
}

impl StartStrategy {
    pub fn seeded(seed: u64) -> Self {
        StartStrategy::Seeded(Mutex::new(StdRng::seed_from_u64(seed)))
    }

    fn offset(&self, len: u128) -> u128 {
        if len <= 1 {
            return 0;
        }
        match self {
            StartStrategy::First => 0,
            StartStrategy::Random => rand::thread_rng().gen_range(0..len),
            StartStrategy::Seeded(rng) => rng
                .lock()
                .map(|mut rng| rng.gen_range(0..len))
                .unwrap_or(0),
        }
    }
}

/// Result of trying one member of a pool
///
/// `Retryable` means the member was full and the next member should be
/// tried. The pool is only exhausted once every member returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOutcome {
    Allocated(IpRecord),
    Retryable(Uuid),
}

pub struct AllocationEngine {
    store: Arc<dyn Store>,
    start: StartStrategy,
}

impl AllocationEngine {
    pub fn new(store: Arc<dyn Store>, start: StartStrategy) -> Self {
        Self { store, start }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Every address of `network_uuid` that currently has a record
    async fn held_addresses(&self, network_uuid: Uuid) -> IpamResult<HashSet<IpAddr>> {
        let filter = Filter::new()
            .with_key_prefix(format!("{}/", network_uuid))
            .eq("network_uuid", network_uuid.to_string());
        let records: Vec<IpRecord> =
            store::load_all(self.store.as_ref(), Collection::Ips, &filter).await?;
        Ok(records.into_iter().map(|r| r.ip).collect())
    }

    /// Allocate one free address from `network`'s provisioning range
    ///
    /// Scans the range once from a start offset chosen by the engine's
    /// [`StartStrategy`], wrapping at the end. Addresses in `exclude` or
    /// already held are skipped. A lost conditional insert moves on to the
    /// next address without restarting the scan.
    ///
    /// # Errors
    ///
    /// - `SubnetFull` when the whole range was scanned without a win
    /// - `Internal` when the store fails
    pub async fn allocate(
        &self,
        network: &Network,
        exclude: &HashSet<IpAddr>,
        claim: &IpClaim,
    ) -> IpamResult<IpRecord> {
        let mut held = self.held_addresses(network.uuid).await?;
        let range = &network.range;
        let len = range.len();
        let start = self.start.offset(len);

        for scanned in 0..len {
            // (start + scanned) mod len, without overflowing near u128::MAX
            let offset = if start >= len - scanned {
                start - (len - scanned)
            } else {
                start + scanned
            };
            let Some(ip) = range.nth(offset) else {
                break;
            };
            if exclude.contains(&ip) || held.contains(&ip) {
                continue;
            }

            let record = claim.to_record(network.uuid, ip, Utc::now());
            let outcome = self
                .store
                .put_if_absent(Collection::Ips, &record.key(), store::to_record(&record)?)
                .await?;
            match outcome {
                PutOutcome::Created => {
                    info!(network_uuid = %network.uuid, %ip, "allocated address");
                    return Ok(record);
                }
                PutOutcome::Conflict => {
                    debug!(network_uuid = %network.uuid, %ip, "lost allocation race, moving on");
                    held.insert(ip);
                }
            }
        }

        warn!(network_uuid = %network.uuid, "no free address in provisioning range");
        Err(IpamError::SubnetFull {
            network_uuid: network.uuid,
        })
    }

    /// Claim one specific address of `network`
    ///
    /// The address may be anywhere in the subnet. When it is already held,
    /// the error names the current holder.
    pub async fn claim(&self, network: &Network, ip: IpAddr, claim: &IpClaim) -> IpamResult<IpRecord> {
        if !network.subnet.contains(ip) {
            return Err(IpamError::invalid_params(vec![FieldError::invalid(
                "ip",
                format!("IP address {} is not in subnet {}", ip, network.subnet),
            )
            .with("network_uuid", network.uuid.to_string())]));
        }

        let record = claim.to_record(network.uuid, ip, Utc::now());
        let outcome = self
            .store
            .put_if_absent(Collection::Ips, &record.key(), store::to_record(&record)?)
            .await?;
        if outcome == PutOutcome::Created {
            info!(network_uuid = %network.uuid, %ip, "claimed address");
            return Ok(record);
        }
        Err(self.taken(network, ip).await?)
    }

    /// `InvalidParameter` on `ip` naming whoever holds it now
    async fn taken(&self, network: &Network, ip: IpAddr) -> IpamResult<IpamError> {
        let key = IpRecord::key_for(network.uuid, ip);
        let existing: Option<IpRecord> = store::load(self.store.as_ref(), Collection::Ips, &key).await?;
        let mut error = FieldError::invalid("ip", format!("IP address {} is already taken", ip))
            .with("network_uuid", network.uuid.to_string());
        if let Some((kind, uuid)) = existing.as_ref().and_then(IpRecord::holder) {
            error = error
                .with("belongs_to_type", kind.to_string())
                .with("belongs_to_uuid", uuid.to_string());
        }
        Ok(IpamError::invalid_params(vec![error]))
    }

    /// Hold a specific address for `claim`, taking over a record nobody
    /// holds or one already held by the same consumer
    ///
    /// A takeover only lands if the record is unchanged since it was read.
    /// Losing that race re-reads the record, so a concurrent claimant that
    /// won is reported as the holder.
    pub async fn assign(&self, network: &Network, ip: IpAddr, claim: &IpClaim) -> IpamResult<IpRecord> {
        let key = IpRecord::key_for(network.uuid, ip);

        for _ in 0..WRITE_ATTEMPTS {
            let existing: Option<(IpRecord, u64)> =
                store::load_revisioned(self.store.as_ref(), Collection::Ips, &key).await?;
            let Some((existing, revision)) = existing else {
                return self.claim(network, ip, claim).await;
            };
            let same_holder = match existing.belongs_to_uuid {
                None => true,
                Some(holder) => claim.belongs_to_uuid == Some(holder),
            };
            if !same_holder {
                return Err(self.taken(network, ip).await?);
            }

            let mut record = claim.to_record(network.uuid, ip, Utc::now());
            record.reserved = claim.reserved || existing.reserved;
            if record.owner_uuid.is_none() {
                record.owner_uuid = existing.owner_uuid;
            }
            let outcome = self
                .store
                .put_if_unchanged(Collection::Ips, &key, store::to_record(&record)?, revision)
                .await?;
            if outcome == PutOutcome::Created {
                info!(network_uuid = %network.uuid, %ip, "assigned address");
                return Ok(record);
            }
            debug!(network_uuid = %network.uuid, %ip, "address changed while assigning, re-reading");
        }

        warn!(network_uuid = %network.uuid, %ip, "address kept changing while assigning");
        Err(self.taken(network, ip).await?)
    }

    /// Allocate from one pool member, turning a full member into a
    /// retryable outcome
    async fn allocate_member(&self, network: &Network, claim: &IpClaim) -> IpamResult<MemberOutcome> {
        match self.allocate(network, &HashSet::new(), claim).await {
            Ok(record) => Ok(MemberOutcome::Allocated(record)),
            Err(IpamError::SubnetFull { network_uuid }) => Ok(MemberOutcome::Retryable(network_uuid)),
            Err(e) => Err(e),
        }
    }

    /// Allocate from the first member of `pool` that has a free address
    ///
    /// Members are tried one at a time in pool order. Members missing from
    /// the store, or not on `nic_tag` when one is given, are skipped.
    ///
    /// # Errors
    ///
    /// - `PoolFull` once every eligible member was tried and found full
    /// - `SubnetsExhausted` when the pool had no eligible member at all
    pub async fn allocate_pool(
        &self,
        pool: &NetworkPool,
        nic_tag: Option<&NicTagName>,
        claim: &IpClaim,
    ) -> IpamResult<(Network, IpRecord)> {
        let mut tried = Vec::new();

        for network_uuid in &pool.networks {
            let member: Option<Network> = store::load(
                self.store.as_ref(),
                Collection::Networks,
                &network_uuid.to_string(),
            )
            .await?;
            let Some(network) = member else {
                warn!(pool_uuid = %pool.uuid, %network_uuid, "pool member not found, skipping");
                continue;
            };
            if nic_tag.is_some_and(|tag| &network.nic_tag != tag) {
                continue;
            }

            match self.allocate_member(&network, claim).await? {
                MemberOutcome::Allocated(record) => return Ok((network, record)),
                MemberOutcome::Retryable(network_uuid) => {
                    debug!(pool_uuid = %pool.uuid, %network_uuid, "pool member full, trying next");
                    tried.push(network_uuid);
                }
            }
        }

        if tried.is_empty() {
            warn!(pool_uuid = %pool.uuid, "pool has no eligible member networks");
            return Err(IpamError::SubnetsExhausted);
        }
        warn!(pool_uuid = %pool.uuid, tried = tried.len(), "every pool member is full");
        Err(IpamError::PoolFull {
            pool_uuid: pool.uuid,
            networks_tried: tried,
        })
    }

    /// Allocate from any network visible to `owner`
    ///
    /// Candidates are optionally limited to one nic tag and one family, and
    /// are tried in name order, then UUID order.
    pub async fn allocate_any(
        &self,
        owner: Option<Uuid>,
        nic_tag: Option<&NicTagName>,
        family: Option<AddressFamily>,
        claim: &IpClaim,
    ) -> IpamResult<(Network, IpRecord)> {
        let mut filter = Filter::new();
        if let Some(tag) = nic_tag {
            filter = filter.eq("nic_tag", tag.to_string());
        }
        let mut candidates: Vec<Network> =
            store::load_all(self.store.as_ref(), Collection::Networks, &filter).await?;
        candidates.retain(|n| n.is_visible_to(owner) && family.map_or(true, |f| n.family == f));
        candidates.sort_by(|a, b| a.name.cmp(&b.name).then(a.uuid.cmp(&b.uuid)));

        for network in candidates {
            if let MemberOutcome::Allocated(record) = self.allocate_member(&network, claim).await? {
                return Ok((network, record));
            }
        }

        warn!(owner_uuid = ?owner, "every visible network is full");
        Err(IpamError::SubnetsExhausted)
    }

    /// Give an address back
    ///
    /// Unreserved records are deleted; reserved ones keep their reservation
    /// with ownership stripped. Releasing an address that has no record is
    /// a no-op. Returns what the address looks like afterwards.
    ///
    /// Keeping a reservation is a write conditional on the record read, so
    /// a takeover that lands first is re-read rather than overwritten.
    pub async fn release(&self, network_uuid: Uuid, ip: IpAddr) -> IpamResult<IpRecord> {
        let key = IpRecord::key_for(network_uuid, ip);

        for _ in 0..WRITE_ATTEMPTS {
            let existing: Option<(IpRecord, u64)> =
                store::load_revisioned(self.store.as_ref(), Collection::Ips, &key).await?;
            let Some((existing, revision)) = existing else {
                debug!(%network_uuid, %ip, "release of free address");
                return Ok(IpRecord::free(network_uuid, ip));
            };

            let Some(kept) = existing.released(Utc::now()) else {
                if self.store.delete(Collection::Ips, &key).await? == DeleteOutcome::NotFound {
                    debug!(%network_uuid, %ip, "address released concurrently");
                }
                info!(%network_uuid, %ip, "released address");
                return Ok(IpRecord::free(network_uuid, ip));
            };

            let outcome = self
                .store
                .put_if_unchanged(Collection::Ips, &key, store::to_record(&kept)?, revision)
                .await?;
            if outcome == PutOutcome::Created {
                info!(%network_uuid, %ip, "released address, reservation kept");
                return Ok(kept);
            }
            debug!(%network_uuid, %ip, "address changed while releasing, re-reading");
        }

        warn!(%network_uuid, %ip, "address kept changing while releasing");
        Err(IpamError::Internal(StoreError::Unavailable(format!(
            "address {} of network {} kept changing during release",
            ip, network_uuid
        ))))
    }

    /// Write the permanent reservations `network` carries for its lifetime
    ///
    /// Addresses already holding a record are left as they are.
    pub async fn reserve_addresses(&self, network: &Network, addresses: &[IpAddr]) -> IpamResult<()> {
        let claim = IpClaim::reservation(None);
        for ip in addresses {
            let record = claim.to_record(network.uuid, *ip, Utc::now());
            let outcome = self
                .store
                .put_if_absent(Collection::Ips, &record.key(), store::to_record(&record)?)
                .await?;
            if outcome == PutOutcome::Created {
                debug!(network_uuid = %network.uuid, %ip, "reserved address");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BelongsToType, IpState, MtuBounds, NewNetwork, ProvisionRange, Subnet, VlanId};
    use crate::store::InMemoryStore;

    fn network(subnet: &str, start: &str, end: &str) -> Network {
        let subnet: Subnet = subnet.parse().unwrap();
        Network::create(
            Uuid::now_v7(),
            NewNetwork {
                name: "n".to_string(),
                range: ProvisionRange::new(&subnet, start.parse().unwrap(), end.parse().unwrap())
                    .unwrap(),
                subnet,
                gateway: None,
                vlan_id: VlanId::default(),
                mtu: MtuBounds::network().default_mtu(),
                nic_tag: NicTagName::new("external").unwrap(),
                resolvers: vec![],
                owner_uuids: vec![],
                description: None,
            },
            Utc::now(),
        )
    }

    fn zone() -> IpClaim {
        IpClaim::provisioning(BelongsToType::Zone, Uuid::now_v7(), Uuid::now_v7())
    }

    #[test]
    fn test_start_offsets_stay_in_range() {
        let strategy = StartStrategy::seeded(7);
        for _ in 0..100 {
            assert!(strategy.offset(10) < 10);
        }
        assert_eq!(StartStrategy::Random.offset(1), 0);
        assert_eq!(StartStrategy::First.offset(1000), 0);
    }

    #[tokio::test]
    async fn test_first_strategy_allocates_in_order() {
        let engine = AllocationEngine::new(Arc::new(InMemoryStore::new()), StartStrategy::First);
        let net = network("10.0.0.0/24", "10.0.0.10", "10.0.0.12");

        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(engine.allocate(&net, &HashSet::new(), &zone()).await.unwrap().ip);
        }
        let expected: Vec<IpAddr> = ["10.0.0.10", "10.0.0.11", "10.0.0.12"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(got, expected);

        let err = engine.allocate(&net, &HashSet::new(), &zone()).await.unwrap_err();
        assert!(matches!(err, IpamError::SubnetFull { network_uuid } if network_uuid == net.uuid));
    }

    #[tokio::test]
    async fn test_exclude_is_honoured() {
        let engine = AllocationEngine::new(Arc::new(InMemoryStore::new()), StartStrategy::First);
        let net = network("10.0.0.0/24", "10.0.0.10", "10.0.0.11");
        let exclude: HashSet<IpAddr> = ["10.0.0.10".parse().unwrap()].into_iter().collect();

        let record = engine.allocate(&net, &exclude, &zone()).await.unwrap();
        assert_eq!(record.ip.to_string(), "10.0.0.11");
        assert_eq!(record.state, IpState::Provisioning);
    }

    #[tokio::test]
    async fn test_claim_conflict_names_holder() {
        let engine = AllocationEngine::new(Arc::new(InMemoryStore::new()), StartStrategy::First);
        let net = network("10.0.0.0/24", "10.0.0.10", "10.0.0.20");
        let first = zone();
        let ip: IpAddr = "10.0.0.50".parse().unwrap();

        engine.claim(&net, ip, &first).await.unwrap();
        let err = engine.claim(&net, ip, &zone()).await.unwrap_err();
        let errors = err.field_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field.as_deref(), Some("ip"));
        assert_eq!(
            errors[0].extra["belongs_to_uuid"],
            first.belongs_to_uuid.unwrap().to_string()
        );

        let outside = engine.claim(&net, "10.0.1.1".parse().unwrap(), &zone()).await;
        assert!(outside.is_err());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let engine = AllocationEngine::new(store.clone(), StartStrategy::First);
        let net = network("10.0.0.0/24", "10.0.0.10", "10.0.0.10");

        let record = engine.allocate(&net, &HashSet::new(), &zone()).await.unwrap();
        assert!(engine.release(net.uuid, record.ip).await.unwrap().is_free());
        assert!(engine.release(net.uuid, record.ip).await.unwrap().is_free());
        assert_eq!(store.len(Collection::Ips).await, 0);

        let again = engine.allocate(&net, &HashSet::new(), &zone()).await.unwrap();
        assert_eq!(again.ip, record.ip);
    }

    #[tokio::test]
    async fn test_reserved_addresses_are_skipped() {
        let engine = AllocationEngine::new(Arc::new(InMemoryStore::new()), StartStrategy::First);
        let net = network("10.0.0.0/30", "10.0.0.0", "10.0.0.3");
        let reserved = net.reserved_addresses(true);
        engine.reserve_addresses(&net, &reserved).await.unwrap();

        let a = engine.allocate(&net, &HashSet::new(), &zone()).await.unwrap();
        let b = engine.allocate(&net, &HashSet::new(), &zone()).await.unwrap();
        assert_eq!(a.ip.to_string(), "10.0.0.1");
        assert_eq!(b.ip.to_string(), "10.0.0.2");
        assert!(engine.allocate(&net, &HashSet::new(), &zone()).await.is_err());
    }

    #[tokio::test]
    async fn test_assign_takes_over_unheld_reservation_once() {
        let engine = AllocationEngine::new(Arc::new(InMemoryStore::new()), StartStrategy::First);
        let net = network("10.0.0.0/24", "10.0.0.10", "10.0.0.20");
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        engine.reserve_addresses(&net, &[ip]).await.unwrap();

        let first = zone();
        let held = engine.assign(&net, ip, &first).await.unwrap();
        assert!(held.reserved);
        assert_eq!(held.belongs_to_uuid, first.belongs_to_uuid);

        // Same holder may update its own record
        let again = engine.assign(&net, ip, &first.clone().with_state(IpState::Used)).await.unwrap();
        assert_eq!(again.state, IpState::Used);

        let err = engine.assign(&net, ip, &zone()).await.unwrap_err();
        assert_eq!(
            err.field_errors()[0].extra["belongs_to_uuid"],
            first.belongs_to_uuid.unwrap().to_string()
        );
    }

    #[tokio::test]
    async fn test_release_keeps_reservation_without_holder() {
        let store = Arc::new(InMemoryStore::new());
        let engine = AllocationEngine::new(store.clone(), StartStrategy::First);
        let net = network("10.0.0.0/24", "10.0.0.10", "10.0.0.20");
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        engine.reserve_addresses(&net, &[ip]).await.unwrap();
        engine.assign(&net, ip, &zone()).await.unwrap();

        let kept = engine.release(net.uuid, ip).await.unwrap();
        assert_eq!(kept.state, IpState::Reserved);
        assert_eq!(kept.belongs_to_uuid, None);
        assert_eq!(store.len(Collection::Ips).await, 1);

        store.set_available(false);
        assert!(matches!(
            engine.release(net.uuid, ip).await,
            Err(IpamError::Internal(_))
        ));
    }
}
