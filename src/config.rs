// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service configuration
//!
//! Loaded once at start-up from environment variables and immutable after
//! that.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `IPAM_NETWORK_MTU_DEFAULT` / `_MIN` / `_MAX` | 1500 / 576 / 9000 |
//! | `IPAM_NIC_TAG_MTU_DEFAULT` / `_MIN` / `_MAX` | 1500 / 1500 / 9000 |
//! | `IPAM_RANDOMIZE_START` | `true` |
//! | `IPAM_RESERVE_SUBNET_BOUNDS` | `true` |
//! | `IPAM_STORE` | `memory` (or `nats`) |
//! | `NATS_URL` | `nats://localhost:4222` (comma-separated list) |
//! | `IPAM_KV_BUCKET` | `ipam` |
//! | `IPAM_SUBJECT_PREFIX` | `ipam` |
//! | `IPAM_QUEUE_GROUP` | `ipam-responders` |

use std::time::Duration;
use thiserror::Error;

use crate::allocation::StartStrategy;
use crate::domain::MtuBounds;
use crate::nats::NatsConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got \"{value}\"")]
    InvalidValue {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("{name} bounds are inconsistent: min {min} <= default {default} <= max {max} does not hold")]
    InconsistentMtu {
        name: &'static str,
        default: u32,
        min: u32,
        max: u32,
    },
}

/// Which backing store the service runs against
#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Memory,
    /// JetStream key-value buckets on the configured NATS servers, one per
    /// collection, named `<bucket>_<collection>`
    Nats { bucket: String },
}

/// Subjects the request/reply surface listens on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderConfig {
    pub subject_prefix: String,
    pub queue_group: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IpamConfig {
    pub network_mtu: MtuBounds,
    pub nic_tag_mtu: MtuBounds,
    pub randomize_start: bool,
    pub reserve_subnet_bounds: bool,
    pub store: StoreBackend,
    pub nats: NatsConfig,
    pub responder: ResponderConfig,
}

impl Default for IpamConfig {
    fn default() -> Self {
        Self {
            network_mtu: MtuBounds::network(),
            nic_tag_mtu: MtuBounds::nic_tag(),
            randomize_start: true,
            reserve_subnet_bounds: true,
            store: StoreBackend::Memory,
            nats: NatsConfig {
                name: "ipam-responder".to_string(),
                ..NatsConfig::default()
            },
            responder: ResponderConfig {
                subject_prefix: "ipam".to_string(),
                queue_group: "ipam-responders".to_string(),
            },
        }
    }
}

impl IpamConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// when it is set
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let network_mtu = mtu_bounds(&lookup, "IPAM_NETWORK_MTU", defaults.network_mtu)?;
        let nic_tag_mtu = mtu_bounds(&lookup, "IPAM_NIC_TAG_MTU", defaults.nic_tag_mtu)?;
        let randomize_start = flag(&lookup, "IPAM_RANDOMIZE_START", defaults.randomize_start)?;
        let reserve_subnet_bounds =
            flag(&lookup, "IPAM_RESERVE_SUBNET_BOUNDS", defaults.reserve_subnet_bounds)?;

        let mut nats = NatsConfig {
            name: "ipam-responder".to_string(),
            ..NatsConfig::default()
        };
        if let Some(url) = lookup("NATS_URL") {
            nats.servers = url.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Some(secs) = lookup("NATS_REQUEST_TIMEOUT_SECS") {
            let parsed = secs.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                name: "NATS_REQUEST_TIMEOUT_SECS".to_string(),
                value: secs.clone(),
                expected: "a whole number of seconds",
            })?;
            nats.request_timeout = Duration::from_secs(parsed);
        }

        let store = match lookup("IPAM_STORE").as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("nats") => StoreBackend::Nats {
                bucket: lookup("IPAM_KV_BUCKET").unwrap_or_else(|| "ipam".to_string()),
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "IPAM_STORE".to_string(),
                    value: other.to_string(),
                    expected: "\"memory\" or \"nats\"",
                })
            }
        };

        let responder = ResponderConfig {
            subject_prefix: lookup("IPAM_SUBJECT_PREFIX")
                .unwrap_or(defaults.responder.subject_prefix),
            queue_group: lookup("IPAM_QUEUE_GROUP").unwrap_or(defaults.responder.queue_group),
        };

        Ok(Self {
            network_mtu,
            nic_tag_mtu,
            randomize_start,
            reserve_subnet_bounds,
            store,
            nats,
            responder,
        })
    }

    /// Scan start strategy implied by `randomize_start`
    pub fn start_strategy(&self) -> StartStrategy {
        if self.randomize_start {
            StartStrategy::Random
        } else {
            StartStrategy::First
        }
    }
}

fn number<F>(lookup: &F, name: &str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value,
            expected: "a positive integer",
        }),
    }
}

fn flag<F>(lookup: &F, name: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).as_deref().map(str::trim) {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: other.to_string(),
            expected: "a boolean",
        }),
    }
}

fn mtu_bounds<F>(lookup: &F, prefix: &'static str, defaults: MtuBounds) -> Result<MtuBounds, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let bounds = MtuBounds {
        default: number(lookup, &format!("{}_DEFAULT", prefix), defaults.default)?,
        min: number(lookup, &format!("{}_MIN", prefix), defaults.min)?,
        max: number(lookup, &format!("{}_MAX", prefix), defaults.max)?,
    };
    if !bounds.is_consistent() {
        return Err(ConfigError::InconsistentMtu {
            name: prefix,
            default: bounds.default,
            min: bounds.min,
            max: bounds.max,
        });
    }
    Ok(bounds)
}
