//! # Skein Core
//!
//! Data model and request construction for the Skein swarm client.
//!
//! This crate provides:
//! - Storage node identities (`Snode`) and onion paths
//! - Account ids and the namespace catalogue
//! - Actor resolution and per-actor authentication (`Auth`)
//! - Canonical signing strings for every authenticated operation
//! - The `SubRequest` tagged union and its JSON wire form
//! - Process-wide network time
//! - Client configuration
//!
//! ## Request construction
//!
//! ```text
//! Actor ──authenticator_for(namespace, op)──▶ Authenticator
//!                                                  │ sign(canonical string)
//!                                                  ▼
//!                     SubRequest::{retrieve, store, ...} ◀── Auth
//!                                  │ to_json()
//!                                  ▼
//!                         {"method": ..., "params": {...}}
//! ```
//!
//! Construction is pure: it never touches the network and fails with
//! [`RequestError::Precondition`] for caller errors.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod account;
pub mod auth;
pub mod config;
pub mod error;
pub mod namespace;
pub mod request;
pub mod signing;
pub mod snode;
pub mod time;

pub use account::{AccountId, AccountPrefix};
pub use auth::{Actor, Auth, Authenticator, GroupRecord, Operation, UserKeys};
pub use config::ClientConfig;
pub use error::RequestError;
pub use namespace::{Namespace, NamespaceSelector};
pub use request::{MAX_BATCH_SIZE, SubRequest};
pub use signing::ExpireMode;
pub use snode::{OnionPath, Snode};
pub use time::NetworkTime;
