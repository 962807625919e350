//! Onion transport abstraction.
//!
//! [`OnionTransport`] is the seam the swarm layer talks to: it sends one
//! request over one path and returns the destination's decoded reply.
//! [`OnionRouter`] is the real implementation; it wraps the request, hands the
//! packet to a [`GuardLink`] and processes the reply. Tests substitute either
//! trait.

use crate::error::{TransportError, TransportResult};
use crate::onion::{Destination, ServerTarget, wrap_onion};
use crate::payload::HttpPayload;
use crate::response::{DestinationResponse, process_guard_reply};
use async_trait::async_trait;
use serde_json::Value;
use skein_core::snode::{OnionPath, Snode};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Path on the guard that accepts onion requests.
pub const ONION_ENDPOINT: &str = "/onion_req/v2";

/// A request for the final destination.
#[derive(Debug, Clone)]
pub enum OnionRequest {
    /// Storage RPC (`{method, params}`) to a node
    Snode {
        /// Destination node
        target: Snode,
        /// The RPC object
        rpc: Value,
    },
    /// HTTP request to a server
    Server {
        /// Destination server
        target: ServerTarget,
        /// Normalized request
        payload: HttpPayload,
    },
}

impl OnionRequest {
    fn into_parts(self) -> (Destination, Vec<u8>) {
        match self {
            Self::Snode { target, rpc } => (
                Destination::Snode(target),
                HttpPayload::storage_rpc(&rpc).to_v4(),
            ),
            Self::Server { target, payload } => (Destination::Server(target), payload.to_v4()),
        }
    }
}

/// Async transport for onion-routed requests.
#[async_trait]
pub trait OnionTransport: Send + Sync {
    /// Send `request` over `path`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` classified for retry and ejection decisions.
    async fn send(
        &self,
        path: &OnionPath,
        request: OnionRequest,
        timeout: Duration,
    ) -> TransportResult<DestinationResponse>;

    /// Transport statistics.
    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

/// Raw reply from a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardReply {
    /// HTTP status
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
}

/// Delivers sealed packets to a guard node.
#[async_trait]
pub trait GuardLink: Send + Sync {
    /// POST `body` to the guard's onion endpoint.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` when the guard cannot be reached.
    async fn post(&self, guard: &Snode, body: Vec<u8>, timeout: Duration) -> TransportResult<GuardReply>;
}

/// Guard link over HTTPS.
///
/// Storage nodes serve self-signed certificates; identity comes from the
/// onion layer keys, not from TLS.
#[derive(Debug, Clone)]
pub struct ReqwestGuardLink {
    client: reqwest::Client,
}

impl ReqwestGuardLink {
    /// Build the link.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unreachable`] if the TLS backend fails to
    /// initialize.
    pub fn new() -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| TransportError::Unreachable(format!("client init: {e}")))?;
        Ok(Self { client })
    }
}

fn classify_reqwest(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.to_string().contains("dns error") {
        TransportError::NotFound(err.to_string())
    } else {
        TransportError::Unreachable(err.to_string())
    }
}

#[async_trait]
impl GuardLink for ReqwestGuardLink {
    async fn post(&self, guard: &Snode, body: Vec<u8>, timeout: Duration) -> TransportResult<GuardReply> {
        let url = format!("https://{}{ONION_ENDPOINT}", guard.socket_addr());
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| classify_reqwest(&e))?;
        Ok(GuardReply {
            status,
            body: body.to_vec(),
        })
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Requests handed to a guard
    pub requests_sent: u64,
    /// Sealed bytes sent
    pub bytes_sent: u64,
    /// Sealed bytes received
    pub bytes_received: u64,
    /// Requests that ended in a transport error
    pub failures: u64,
    /// Failures that named a specific hop
    pub hop_failures: u64,
}

impl TransportStats {
    /// Create new empty statistics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request handed to a guard
    pub fn record_send(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.requests_sent += 1;
    }

    /// Record a guard reply
    pub fn record_recv(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }

    /// Record a failed request
    pub fn record_failure(&mut self, err: &TransportError) {
        self.failures += 1;
        if err.implicated_node().is_some() {
            self.hop_failures += 1;
        }
    }
}

/// Onion transport over a guard link.
#[derive(Debug)]
pub struct OnionRouter<L: GuardLink> {
    link: L,
    stats: Mutex<TransportStats>,
}

impl<L: GuardLink> OnionRouter<L> {
    /// Create a router over `link`.
    pub fn new(link: L) -> Self {
        Self {
            link,
            stats: Mutex::new(TransportStats::new()),
        }
    }

    fn with_stats(&self, f: impl FnOnce(&mut TransportStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    async fn send_inner(
        &self,
        path: &OnionPath,
        request: OnionRequest,
        timeout: Duration,
    ) -> TransportResult<DestinationResponse> {
        let (destination, payload) = request.into_parts();
        let packet = wrap_onion(path, &destination, &payload)?;
        self.with_stats(|s| s.record_send(packet.guard_payload.len()));
        debug!(path = ?path, size = packet.guard_payload.len(), "sending onion request");

        let reply = tokio::time::timeout(timeout, self.link.post(path.guard(), packet.guard_payload, timeout))
            .await
            .map_err(|_| TransportError::Timeout)??;
        self.with_stats(|s| s.record_recv(reply.body.len()));

        process_guard_reply(reply.status, &reply.body, path, &packet.destination_key)
    }
}

#[async_trait]
impl<L: GuardLink> OnionTransport for OnionRouter<L> {
    async fn send(
        &self,
        path: &OnionPath,
        request: OnionRequest,
        timeout: Duration,
    ) -> TransportResult<DestinationResponse> {
        let result = self.send_inner(path, request, timeout).await;
        if let Err(err) = &result {
            self.with_stats(|s| s.record_failure(err));
        }
        result
    }

    fn stats(&self) -> TransportStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}
