//! Transport error types.

use skein_crypto::CryptoError;
use thiserror::Error;

/// Onion transport errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Guard could not be reached
    #[error("Node unreachable: {0}")]
    Unreachable(String),

    /// No reply within the call timeout
    #[error("Request timed out")]
    Timeout,

    /// Address resolution failed
    #[error("Address not found: {0}")]
    NotFound(String),

    /// A specific hop failed and should be ejected
    #[error("Hop {} failed: {reason}", hex::encode(&.ed25519[..4]))]
    HopFailure {
        /// Ed25519 key of the failing node
        ed25519: [u8; 32],
        /// Reason reported by the path
        reason: String,
    },

    /// The path as a whole failed
    #[error("Path failure: {0}")]
    PathFailure(String),

    /// Reply could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Destination rejected our clock
    #[error("Clock out of sync with the network")]
    ClockOutOfSync,

    /// Layer sealing failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Call cancelled by the caller
    #[error("Request aborted")]
    Aborted,

    /// Path unusable for this request
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl TransportError {
    /// Whether another attempt (possibly on another path) may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_)
                | Self::Timeout
                | Self::NotFound(_)
                | Self::HopFailure { .. }
                | Self::PathFailure(_)
                | Self::Decode(_)
        )
    }

    /// Ed25519 key of a node this error implicates.
    #[must_use]
    pub fn implicated_node(&self) -> Option<[u8; 32]> {
        match self {
            Self::HopFailure { ed25519, .. } => Some(*ed25519),
            _ => None,
        }
    }

    /// Whether this error counts against the path.
    #[must_use]
    pub fn is_path_failure(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Timeout | Self::PathFailure(_) | Self::Decode(_)
        )
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
