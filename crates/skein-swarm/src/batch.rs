//! Batch executor.
//!
//! Bundles up to [`MAX_BATCH_SIZE`] sub-requests into one `batch` or
//! `sequence` RPC against a target node. Results are tagged with the index of
//! the request they answer; alignment is asserted, never assumed.
//!
//! - The cap is checked before any network activity.
//! - A result count that differs from the request count is a
//!   [`SwarmError::ResultCountMismatch`] (a `sequence` may stop early, but only
//!   at a failing entry).
//! - The first result's code is the liveness signal for the target.
//! - Every result passes through the [`ResponseInterpreter`] before the caller
//!   sees it.

use crate::error::{SwarmError, SwarmResult};
use crate::health::NodeHealth;
use crate::pool::SnodePool;
use async_trait::async_trait;
use serde_json::{Value, json};
use skein_core::{MAX_BATCH_SIZE, OnionPath, Snode, SubRequest};
use skein_transport::{OnionRequest, OnionTransport, TransportError, V4Body};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How the node runs the bundled requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Independently; every request gets its own code
    Batch,
    /// In order, stopping at the first failure
    Sequence,
}

impl BatchMode {
    /// RPC method name
    #[must_use]
    pub fn method(self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Sequence => "sequence",
        }
    }
}

/// Result of one sub-request.
#[derive(Debug, Clone, PartialEq)]
pub struct SubResult {
    /// Index of the request this answers
    pub index: usize,
    /// Method of that request
    pub method: &'static str,
    /// Per-request status code
    pub code: u16,
    /// Per-request body
    pub body: Value,
}

impl SubResult {
    /// Whether the node accepted the request
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// The result, or [`SwarmError::Status`] for a non-2xx code.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::Status`] carrying the code and body text.
    pub fn into_success(self) -> SwarmResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let message = match &self.body {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Err(SwarmError::Status {
            code: self.code,
            message,
        })
    }
}

/// Ordered results of one batch call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    /// Node that answered
    pub target: Snode,
    /// Results, `results[i].index == i`
    pub results: Vec<SubResult>,
}

impl BatchResult {
    /// Code of the first result
    #[must_use]
    pub fn first_code(&self) -> Option<u16> {
        self.results.first().map(|result| result.code)
    }

    /// Whether the target looked alive (first result is 200)
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.first_code() == Some(200)
    }

    /// Result for request `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SubResult> {
        self.results.get(index)
    }
}

/// Hook that sees every sub-result before the caller does.
///
/// Used for per-destination conditions handled outside the operation, such as
/// a node reporting that the account's data has moved.
#[async_trait]
pub trait ResponseInterpreter: Send + Sync {
    /// Inspect `result`, the answer `target` gave to `request`.
    async fn interpret(&self, target: &Snode, request: &SubRequest, result: &SubResult);
}

/// Interpreter that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInterpreter;

#[async_trait]
impl ResponseInterpreter for NoopInterpreter {
    async fn interpret(&self, _target: &Snode, _request: &SubRequest, _result: &SubResult) {}
}

/// Runs batch calls over onion paths.
pub struct BatchExecutor {
    transport: Arc<dyn OnionTransport>,
    pool: Arc<dyn SnodePool>,
    health: Arc<NodeHealth>,
    interpreter: Arc<dyn ResponseInterpreter>,
    max_requests: usize,
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("max_requests", &self.max_requests)
            .field("health", &self.health.metrics())
            .finish_non_exhaustive()
    }
}

impl BatchExecutor {
    /// Create an executor. `max_requests` is clamped to [`MAX_BATCH_SIZE`].
    pub fn new(
        transport: Arc<dyn OnionTransport>,
        pool: Arc<dyn SnodePool>,
        health: Arc<NodeHealth>,
        max_requests: usize,
    ) -> Self {
        Self {
            transport,
            pool,
            health,
            interpreter: Arc::new(NoopInterpreter),
            max_requests: max_requests.clamp(1, MAX_BATCH_SIZE),
        }
    }

    /// Install the per-result hook.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: Arc<dyn ResponseInterpreter>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Sub-requests allowed per call
    #[must_use]
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Health tracker shared with callers
    #[must_use]
    pub fn health(&self) -> &Arc<NodeHealth> {
        &self.health
    }

    /// Pool used for paths and ejections
    #[must_use]
    pub fn pool(&self) -> &Arc<dyn SnodePool> {
        &self.pool
    }

    /// Send `requests` to `target` as one call.
    ///
    /// # Errors
    ///
    /// - [`SwarmError::Precondition`] for an empty or over-cap batch, before
    ///   any network activity
    /// - [`SwarmError::Request`] if a request fails validation
    /// - [`SwarmError::Transport`] for onion failures (after health reporting)
    /// - [`SwarmError::Status`] if the node rejects the whole call
    /// - [`SwarmError::ProtocolMismatch`] / [`SwarmError::ResultCountMismatch`]
    ///   for malformed or misaligned results
    /// - [`SwarmError::Cancelled`] if `cancel` fires first
    pub async fn execute(
        &self,
        target: &Snode,
        requests: &[SubRequest],
        mode: BatchMode,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> SwarmResult<BatchResult> {
        if requests.is_empty() {
            return Err(SwarmError::precondition("batch has no requests"));
        }
        if requests.len() > self.max_requests {
            return Err(SwarmError::precondition(format!(
                "batch of {} exceeds the cap of {}",
                requests.len(),
                self.max_requests
            )));
        }
        for request in requests {
            request.validate()?;
        }
        if cancel.is_cancelled() {
            return Err(SwarmError::Cancelled);
        }

        let rpc = json!({
            "method": mode.method(),
            "params": { "requests": requests.iter().map(SubRequest::to_json).collect::<Vec<_>>() },
        });
        let path = self.pool.onion_path(Some(target)).await?;
        debug!(?target, count = requests.len(), method = mode.method(), "dispatching batch");

        let send = self.transport.send(
            &path,
            OnionRequest::Snode {
                target: target.clone(),
                rpc,
            },
            timeout,
        );
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SwarmError::Cancelled),
            response = send => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                self.report_failure(&path, &err).await;
                return Err(err.into());
            }
        };
        self.health.record_delivery(&path);

        if !response.is_success() {
            let message = match &response.body {
                V4Body::PlainText(text) => text.clone(),
                V4Body::Json(value) => value.to_string(),
                V4Body::Binary(_) | V4Body::Empty => String::new(),
            };
            return Err(SwarmError::Status {
                code: response.status,
                message,
            });
        }
        let raw = response
            .json()
            .and_then(|body| body.get("results"))
            .and_then(Value::as_array)
            .ok_or_else(|| SwarmError::protocol("batch response has no results array"))?;

        let results = align_results(requests, raw, mode)?;
        let result = BatchResult {
            target: target.clone(),
            results,
        };
        self.record_liveness(&path, &result).await;
        for (request, sub) in requests.iter().zip(&result.results) {
            self.interpreter.interpret(target, request, sub).await;
        }
        if cancel.is_cancelled() {
            return Err(SwarmError::Cancelled);
        }
        Ok(result)
    }

    /// A 200 first result clears the target; a server error counts against it.
    async fn record_liveness(&self, path: &OnionPath, result: &BatchResult) {
        let target = &result.target;
        match result.first_code() {
            Some(200) => self.health.record_success(path, target),
            code => {
                warn!(?target, ?code, "first sub-result is not 200");
                if matches!(code, Some(500..=599))
                    && self.health.record_node_failure(&target.pubkey_ed25519)
                {
                    warn!(?target, "destination failure threshold reached");
                    self.pool.eject_node(&target.pubkey_ed25519).await;
                }
            }
        }
    }

    async fn report_failure(&self, path: &OnionPath, err: &TransportError) {
        if let Some(key) = err.implicated_node() {
            warn!(node = %hex::encode(&key[..4]), error = %err, "hop failed");
            self.pool.eject_node(&key).await;
            return;
        }
        if !err.is_path_failure() {
            return;
        }
        if self.health.record_path_failure(path) {
            warn!(path = %path.id(), "path failure threshold reached");
            self.pool.eject_path(path).await;
        }
        if matches!(err, TransportError::Unreachable(_) | TransportError::Timeout) {
            let guard = path.guard().pubkey_ed25519;
            if self.health.record_node_failure(&guard) {
                self.pool.eject_node(&guard).await;
            }
        }
    }
}

/// Pair raw results with their requests by index.
fn align_results(requests: &[SubRequest], raw: &[Value], mode: BatchMode) -> SwarmResult<Vec<SubResult>> {
    let mut results = Vec::with_capacity(raw.len());
    for (index, (entry, request)) in raw.iter().zip(requests).enumerate() {
        let code = entry
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .ok_or_else(|| SwarmError::protocol(format!("result {index} has no status code")))?;
        results.push(SubResult {
            index,
            method: request.method(),
            code,
            body: entry.get("body").cloned().unwrap_or(Value::Null),
        });
    }

    let stopped_early = mode == BatchMode::Sequence
        && raw.len() < requests.len()
        && results.last().is_some_and(|last| !last.is_success());
    if raw.len() != requests.len() && !stopped_early {
        warn!(expected = requests.len(), actual = raw.len(), "result count mismatch");
        return Err(SwarmError::ResultCountMismatch {
            expected: requests.len(),
            actual: raw.len(),
        });
    }
    Ok(results)
}
