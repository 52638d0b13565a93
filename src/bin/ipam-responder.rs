// Copyright (c) 2025 - Cowboy AI, Inc.
//! IPAM Responder Service
//!
//! Answers network inventory and address allocation requests over NATS
//! request/reply.
//!
//! Run with: cargo run --bin ipam-responder
//!
//! Prerequisites:
//! 1. NATS server running (default: localhost:4222, override with NATS_URL)
//! 2. JetStream enabled when IPAM_STORE=nats

use anyhow::{Context, Result};
use cim_network_ipam::config::{IpamConfig, StoreBackend};
use cim_network_ipam::nats;
use cim_network_ipam::service::InventoryService;
use cim_network_ipam::store::{InMemoryStore, NatsKvStore, Store};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting IPAM responder");

    let config = Arc::new(IpamConfig::from_env().context("Invalid configuration")?);
    info!("Configuration loaded:");
    info!("  - Network MTU: {:?}", config.network_mtu);
    info!("  - Nic tag MTU: {:?}", config.nic_tag_mtu);
    info!("  - Randomized scan start: {}", config.randomize_start);
    info!("  - Subject prefix: {}", config.responder.subject_prefix);

    let client = nats::connect(&config.nats)
        .await
        .context("Failed to connect to NATS")?;

    let store: Arc<dyn Store> = match &config.store {
        StoreBackend::Memory => {
            info!("  - Store: in-memory");
            Arc::new(InMemoryStore::new())
        }
        StoreBackend::Nats { bucket } => {
            info!("  - Store: NATS key-value buckets {}_*", bucket);
            let store = NatsKvStore::open(async_nats::jetstream::new(client.clone()), bucket)
                .await
                .context("Failed to open key-value buckets")?;
            Arc::new(store)
        }
    };

    let service = Arc::new(InventoryService::new(store, config.clone()));
    nats::serve(client, service, &config.responder)
        .await
        .context("Request loop failed")?;

    Ok(())
}
