//! # Skein Transport
//!
//! Onion transport framing for the Skein swarm client.
//!
//! This crate provides:
//! - The V4 length-prefixed request/response encoding
//! - Final-destination payload normalization (including file uploads)
//! - Multi-layer onion wrapping for storage-node and HTTP(S) server destinations
//! - Guard reply processing with hop/path failure classification
//! - The [`OnionTransport`](transport::OnionTransport) trait and a
//!   reqwest-backed guard link
//!
//! ## Request flow
//!
//! ```text
//!   {method, params} / HttpPayload
//!              │ V4 encode
//!              ▼
//!   seal for destination ──▶ seal for last relay ──▶ ... ──▶ seal for guard
//!                                                                │ POST /onion_req/v2
//!                                                                ▼
//!   DestinationResponse ◀── V4 decode ◀── open with destination key ◀── guard reply
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod onion;
pub mod payload;
pub mod response;
pub mod transport;
pub mod v4;

pub use error::{TransportError, TransportResult};
pub use onion::{Destination, ServerTarget};
pub use payload::{HttpPayload, RequestBody};
pub use response::DestinationResponse;
pub use transport::{GuardLink, GuardReply, OnionRequest, OnionRouter, OnionTransport, ReqwestGuardLink, TransportStats};
pub use v4::{DecodedV4, V4Body};
