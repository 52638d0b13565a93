// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS connection and request/reply serving
//!
//! Requests arrive on `<prefix>.<collection>.<action>` through a queue
//! group, so any number of responders can share the load. Each request is
//! handled on its own task and answered with a JSON [`Reply`].

use async_nats::{Client, ConnectOptions, Message};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::api::{self, Reply};
use crate::config::ResponderConfig;
use crate::service::InventoryService;

/// Configuration for NATS connection
#[derive(Debug, Clone, PartialEq)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// Client name
    pub name: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "ipam-client".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum NatsError {
    #[error("NATS connection error: {0}")]
    Connection(String),

    #[error("NATS subscribe error: {0}")]
    Subscribe(String),

    #[error("Malformed message: {0}")]
    Decode(String),
}

/// Connect with the given configuration
pub async fn connect(config: &NatsConfig) -> Result<Client, NatsError> {
    let options = ConnectOptions::new()
        .name(&config.name)
        .connection_timeout(config.connect_timeout)
        .request_timeout(Some(config.request_timeout));

    let client = async_nats::connect_with_options(config.servers.join(","), options)
        .await
        .map_err(|e| NatsError::Connection(e.to_string()))?;

    info!("Connected to NATS at {:?}", config.servers);
    Ok(client)
}

/// Operation named by `subject`, relative to `prefix`
pub fn operation_of<'a>(prefix: &str, subject: &'a str) -> Option<&'a str> {
    subject
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|op| !op.is_empty())
}

/// Answer requests until the subscription ends
pub async fn serve(
    client: Client,
    service: Arc<InventoryService>,
    responder: &ResponderConfig,
) -> Result<(), NatsError> {
    let subject = format!("{}.>", responder.subject_prefix);
    let mut requests = client
        .queue_subscribe(subject.clone(), responder.queue_group.clone())
        .await
        .map_err(|e| NatsError::Subscribe(e.to_string()))?;

    info!(%subject, queue_group = %responder.queue_group, "serving requests");

    while let Some(message) = requests.next().await {
        let client = client.clone();
        let service = service.clone();
        let prefix = responder.subject_prefix.clone();
        tokio::spawn(async move {
            handle(&client, &service, &prefix, message).await;
        });
    }

    warn!("request subscription ended");
    Ok(())
}

async fn handle(client: &Client, service: &InventoryService, prefix: &str, message: Message) {
    let Some(reply_to) = message.reply.clone() else {
        debug!(subject = %message.subject, "ignoring message without reply subject");
        return;
    };

    let operation = operation_of(prefix, message.subject.as_str()).unwrap_or_default();
    let reply = api::dispatch(service, operation, &message.payload).await;
    debug!(subject = %message.subject, status = reply.status, "handled request");

    let payload = match serde_json::to_vec(&reply) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to encode reply: {}", e);
            return;
        }
    };
    if let Err(e) = client.publish(reply_to, payload.into()).await {
        error!("Failed to publish reply: {}", e);
    }
}

/// Send one request to a responder and decode its reply
pub async fn request(
    client: &Client,
    prefix: &str,
    operation: &str,
    body: &serde_json::Value,
) -> Result<Reply, NatsError> {
    let payload = serde_json::to_vec(body).map_err(|e| NatsError::Decode(e.to_string()))?;
    let response = client
        .request(format!("{}.{}", prefix, operation), payload.into())
        .await
        .map_err(|e| NatsError::Connection(e.to_string()))?;
    serde_json::from_slice(&response.payload).map_err(|e| NatsError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_of_subject() {
        assert_eq!(operation_of("ipam", "ipam.networks.create"), Some("networks.create"));
        assert_eq!(operation_of("ipam", "ipam."), None);
        assert_eq!(operation_of("ipam", "other.networks.create"), None);
        assert_eq!(operation_of("ipam", "ipamx.networks.get"), None);
    }

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_round_trip_against_responder() {
        use crate::config::IpamConfig;
        use crate::store::InMemoryStore;

        let config = Arc::new(IpamConfig::default());
        let client = connect(&NatsConfig::default()).await.expect("Failed to connect to NATS");
        let service = Arc::new(InventoryService::new(Arc::new(InMemoryStore::new()), config.clone()));
        let responder = ResponderConfig {
            subject_prefix: format!("ipam-test-{}", uuid::Uuid::now_v7().simple()),
            queue_group: "ipam-test".to_string(),
        };

        let server = {
            let client = client.clone();
            let responder = responder.clone();
            tokio::spawn(async move { serve(client, service, &responder).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let reply = request(
            &client,
            &responder.subject_prefix,
            "nic_tags.create",
            &serde_json::json!({ "name": "external" }),
        )
        .await
        .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["name"], "external");

        server.abort();
    }
}
