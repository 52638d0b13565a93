// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Inventory Domain Models
//!
//! Address arithmetic, value objects with validation invariants, and the
//! resource entities the inventory service stores.
//!
//! # Value Objects with Invariants
//!
//! - [`Subnet`] - CIDR prefix whose address is the network address
//! - [`ProvisionRange`] - inclusive allocatable slice of a subnet
//! - [`MacAddress`] - 48-bit MAC address validation
//! - [`VlanId`] - IEEE 802.1Q VLAN ID (0 = untagged, up to 4094)
//! - [`Mtu`] - Maximum Transmission Unit within configured [`MtuBounds`]
//! - [`NicTagName`] - nic tag identifier
//!
//! # Entities
//!
//! - [`Network`] - subnet, provisioning range, nic tag binding, owners
//! - [`NicTag`] - MTU ceiling for the networks bound to it
//! - [`NetworkPool`] - ordered allocation fallback across networks
//! - [`IpRecord`] - one held address of one network
//! - [`NicRecord`] - interface keyed by MAC, holding at most one address
//!
//! # Relationships
//!
//! Networks reference nic tags by name. IP records reference their network
//! by UUID, and nics reference the IP record they hold through
//! `(network_uuid, ip)`. Pools reference member networks by UUID in
//! fallback order. None of these references imply ownership.

pub mod address;
pub mod invariants;
pub mod ip;
pub mod network;
pub mod nic;
pub mod nic_tag;
pub mod params;
pub mod pool;
pub mod range;
pub mod values;

pub use address::{AddressError, AddressFamily, Subnet};
pub use invariants::{PoolMembership, ValidationResult};
pub use ip::{BelongsToType, IpClaim, IpRecord, IpState};
pub use network::{Network, NetworkUpdate, NewNetwork};
pub use nic::{NewNic, NicAddressing, NicRecord, NicState};
pub use nic_tag::{NewNicTag, NicTag, NicTagUpdate};
pub use pool::{NetworkPool, NetworkPoolUpdate, NewNetworkPool};
pub use range::{ProvisionRange, RangeError};
pub use values::{MacAddress, Mtu, MtuBounds, NicTagName, ValueError, VlanId};
