//! Client configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use crate::error::{RequestError, Result};
use crate::request::MAX_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Swarm client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Network selection and path shape
    pub network: NetworkConfig,
    /// Per-call timeouts
    pub timeouts: TimeoutConfig,
    /// Retry policy
    pub retry: RetryConfig,
    /// Batch limits
    pub batch: BatchConfig,
    /// Name resolution
    pub ons: OnsConfig,
    /// Node and path failure thresholds
    pub health: HealthConfig,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Talk to the test network (disables name resolution)
    pub testnet: bool,
    /// Number of onion hops
    pub path_length: usize,
}

/// Per-call timeouts, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Routine polling
    pub retrieve_ms: u64,
    /// Generic batch calls
    pub batch_ms: u64,
    /// Message stores
    pub store_ms: u64,
    /// Expiry updates
    pub expire_ms: u64,
    /// Each name-resolution query
    pub ons_ms: u64,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per operation, including the first
    pub max_attempts: u32,
    /// First backoff delay
    pub initial_backoff_ms: u64,
    /// Backoff ceiling
    pub max_backoff_ms: u64,
    /// Backoff growth factor
    pub multiplier: f64,
    /// Randomize delays by up to ±25%
    pub jitter: bool,
}

/// Batch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// Sub-requests per call; never above 20
    pub max_requests: usize,
}

/// Name resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OnsConfig {
    /// Independent nodes that must agree
    pub validators: usize,
}

/// Health thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures before a node is ejected
    pub node_failure_threshold: u32,
    /// Consecutive failures before a path is ejected
    pub path_failure_threshold: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            testnet: false,
            path_length: 3,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            retrieve_ms: 4_000,
            batch_ms: 10_000,
            store_ms: 10_000,
            expire_ms: 30_000,
            ons_ms: 10_000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_requests: MAX_BATCH_SIZE,
        }
    }
}

impl Default for OnsConfig {
    fn default() -> Self {
        Self { validators: 3 }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            node_failure_threshold: 3,
            path_failure_threshold: 3,
        }
    }
}

impl TimeoutConfig {
    /// Retrieve timeout
    #[must_use]
    pub fn retrieve(&self) -> Duration {
        Duration::from_millis(self.retrieve_ms)
    }

    /// Batch timeout
    #[must_use]
    pub fn batch(&self) -> Duration {
        Duration::from_millis(self.batch_ms)
    }

    /// Store timeout
    #[must_use]
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    /// Expire timeout
    #[must_use]
    pub fn expire(&self) -> Duration {
        Duration::from_millis(self.expire_ms)
    }

    /// Name resolution timeout
    #[must_use]
    pub fn ons(&self) -> Duration {
        Duration::from_millis(self.ons_ms)
    }
}

impl ClientConfig {
    /// Parse from TOML and validate.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidConfig`] for parse or validation failures.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| RequestError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidConfig`] if any limit is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.network.path_length == 0 {
            return Err(RequestError::invalid_config("path length must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(RequestError::invalid_config("retry attempts must be at least 1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(RequestError::invalid_config("backoff multiplier must be at least 1.0"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(RequestError::invalid_config("initial backoff exceeds the backoff cap"));
        }
        if self.batch.max_requests == 0 || self.batch.max_requests > MAX_BATCH_SIZE {
            return Err(RequestError::invalid_config(format!(
                "batch size must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }
        if self.ons.validators == 0 {
            return Err(RequestError::invalid_config("name resolution needs at least one validator"));
        }
        if self.health.node_failure_threshold == 0 || self.health.path_failure_threshold == 0 {
            return Err(RequestError::invalid_config("failure thresholds must be at least 1"));
        }
        Ok(())
    }
}
