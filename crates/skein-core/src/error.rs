//! Request construction errors.
//!
//! Everything here is a caller or configuration error: none of it is retried.

use skein_crypto::CryptoError;
use std::borrow::Cow;
use thiserror::Error;

/// Errors raised while building or validating requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Bad caller input: missing keys, wrong namespace, empty hash list, cap exceeded
    #[error("Precondition failed: {0}")]
    Precondition(Cow<'static, str>),

    /// Signing or key handling failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Malformed account id
    #[error("Invalid account id: {0}")]
    InvalidAccountId(Cow<'static, str>),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),
}

impl RequestError {
    /// Create a precondition error
    pub fn precondition(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result alias for request construction
pub type Result<T> = std::result::Result<T, RequestError>;
