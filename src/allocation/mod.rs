// Copyright (c) 2025 - Cowboy AI, Inc.
//! Address Allocation
//!
//! Hands out addresses from a network's provisioning range, from the
//! members of a network pool in order, or from every network visible to a
//! caller.
//!
//! # Allocation Flow
//!
//! ```text
//! query held records ─→ pick start offset ─→ scan once, wrapping
//!                                              │
//!                        conflict ←── put_if_absent(network, ip)
//!                        (next address)        │
//!                                           created ─→ IpRecord
//! ```
//!
//! The store's conditional insert is the only exclusion mechanism: nothing
//! here assumes a single process or a shared "next address" pointer.

pub mod engine;

pub use engine::{AllocationEngine, MemberOutcome, StartStrategy};
