//! Error types for swarm operations
//!
//! Errors are categorized so the retry driver can decide without inspecting
//! messages.
//!
//! # Error Categories
//!
//! - **Precondition**: bad caller input; surfaced immediately
//! - **Crypto**: signing or decryption failed; permanent for this attempt
//! - **Transport**: unreachable node, decode failure, failed hop; retried
//! - **ProtocolMismatch**: the node answered in an unexpected shape; permanent
//! - **NotFound**: address resolution failed; retried a bounded number of times
//! - **Aborted**: cancellation or an explicit abort from a deeper layer
//!
//! # Example
//!
//! ```no_run
//! use skein_swarm::SwarmError;
//!
//! fn handle_error(err: SwarmError) {
//!     if err.is_retryable() {
//!         // The retry driver will back off and try another path
//!     } else {
//!         // Surface to the messaging pipeline
//!         println!("Permanent error: {}", err);
//!     }
//! }
//! ```

use skein_core::RequestError;
use skein_transport::TransportError;
use std::borrow::Cow;
use thiserror::Error;

/// Taxonomy used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller error
    Precondition,
    /// Cryptographic failure
    Crypto,
    /// Network or onion failure
    Transport,
    /// Unexpected response shape
    ProtocolMismatch,
    /// Address resolution failure
    NotFound,
    /// Cancelled or aborted
    Aborted,
}

/// Errors that can occur in swarm operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SwarmError {
    /// Bad caller input
    #[error("Precondition failed: {0}")]
    Precondition(Cow<'static, str>),

    /// Request construction failed
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Onion transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Result count differs from the request count
    #[error("Expected {expected} results, got {actual}")]
    ResultCountMismatch {
        /// Sub-requests sent
        expected: usize,
        /// Results received
        actual: usize,
    },

    /// Response did not have the expected shape
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(Cow<'static, str>),

    /// Destination answered with an error status
    #[error("Node returned status {code}: {message}")]
    Status {
        /// Status code
        code: u16,
        /// Body text, if any
        message: String,
    },

    /// Name resolution did not produce a trustworthy answer
    #[error("Name resolution failed: {0}")]
    OnsResolution(Cow<'static, str>),

    /// A deeper layer asked us to stop
    #[error("Aborted: {0}")]
    Aborted(Cow<'static, str>),

    /// Cancelled by the caller
    #[error("Cancelled")]
    Cancelled,

    /// No usable nodes
    #[error("No nodes available: {0}")]
    NoNodes(Cow<'static, str>),

    /// Attempt budget spent
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last: Box<SwarmError>,
    },
}

/// Statuses that are worth another attempt.
fn status_is_retryable(code: u16) -> bool {
    matches!(code, 421 | 429 | 500..=599)
}

impl SwarmError {
    /// Classify this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Precondition(_) | Self::NoNodes(_) => ErrorClass::Precondition,
            Self::Request(RequestError::Crypto(_)) => ErrorClass::Crypto,
            Self::Request(_) => ErrorClass::Precondition,
            Self::Transport(err) => match err {
                TransportError::NotFound(_) => ErrorClass::NotFound,
                TransportError::Crypto(_) => ErrorClass::Crypto,
                TransportError::Aborted | TransportError::ClockOutOfSync => ErrorClass::Aborted,
                TransportError::InvalidPath(_) => ErrorClass::Precondition,
                _ => ErrorClass::Transport,
            },
            Self::ResultCountMismatch { .. } | Self::Status { .. } => ErrorClass::Transport,
            Self::ProtocolMismatch(_) => ErrorClass::ProtocolMismatch,
            Self::OnsResolution(_) => ErrorClass::Crypto,
            Self::Aborted(_) | Self::Cancelled => ErrorClass::Aborted,
            Self::RetriesExhausted { last, .. } => last.class(),
        }
    }

    /// Returns true if another attempt may succeed
    ///
    /// Retryable errors include:
    /// - Transport failures other than clock skew
    /// - Result count mismatches
    /// - 421 (swarm moved), 429 and 5xx statuses
    /// - Address resolution failures
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_retryable(),
            Self::ResultCountMismatch { .. } => true,
            Self::Status { code, .. } => status_is_retryable(*code),
            _ => false,
        }
    }

    /// Returns true if retrying cannot help
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Create a precondition error
    pub fn precondition(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a protocol mismatch error
    pub fn protocol(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::ProtocolMismatch(msg.into())
    }
}

/// Result type for swarm operations
pub type SwarmResult<T> = Result<T, SwarmError>;
