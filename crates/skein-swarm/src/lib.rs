//! Swarm operations for the Skein client core.
//!
//! This crate sits between the typed request model in `skein-core` and the
//! onion transport in `skein-transport`:
//!
//! - [`batch`]: one `batch`/`sequence` RPC per target node, index-aligned results
//! - [`retrieve`]: namespace polling with an optional TTL bump
//! - [`expiry`]: expiry changes verified per node and merged into one map
//! - [`ons`]: name resolution requiring every validator to agree
//! - [`retry`] and [`health`]: bounded retries, node and path ejection
//! - [`pool`]: the interface to whatever manages paths and swarms
//! - [`client`]: the [`SwarmClient`] facade tying these together
//!
//! Every outbound call takes a `CancellationToken`; a cancelled call yields
//! [`SwarmError::Cancelled`] and applies none of its partial results.

#![warn(missing_docs)]

pub mod batch;
pub mod client;
pub mod error;
pub mod expiry;
pub mod health;
pub mod ons;
pub mod pool;
pub mod retrieve;
pub mod retry;

#[cfg(test)]
mod testing;

pub use batch::{BatchExecutor, BatchMode, BatchResult, ResponseInterpreter, SubResult};
pub use client::{DeleteOutcome, StoreOutcome, SwarmClient};
pub use error::{ErrorClass, SwarmError, SwarmResult};
pub use expiry::{ExpireChunk, plan_expire_chunks, reconcile_expire_response};
pub use health::NodeHealth;
pub use ons::decrypt_ons_value;
pub use pool::{SnodePool, StaticSnodePool};
pub use retrieve::{
    ConfigBump, NamespaceMessages, RetrieveCursor, RetrieveOutcome, RetrievedMessage,
    build_retrieve_requests,
};
pub use retry::{Attempt, RetryPolicy, run_with_retry};
