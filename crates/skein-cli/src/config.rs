//! Configuration file for the Skein CLI.
//!
//! The client sections (`network`, `timeouts`, `retry`, `batch`, `ons`,
//! `health`) sit at the top level next to the seed list and logging settings.

use serde::{Deserialize, Serialize};
use skein_core::{ClientConfig, Snode};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Swarm client settings
    #[serde(flatten)]
    pub client: ClientConfig,
    /// Storage nodes used to bootstrap paths and lookups
    #[serde(default)]
    pub seeds: Vec<SeedNode>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A storage node known ahead of time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedNode {
    /// Node address
    pub ip: IpAddr,
    /// HTTPS port
    pub port: u16,
    /// X25519 transport key (hex)
    pub pubkey_x25519: String,
    /// Ed25519 identity key (hex)
    pub pubkey_ed25519: String,
}

impl SeedNode {
    /// Convert into a node identity.
    ///
    /// # Errors
    ///
    /// Returns an error if either key is not 32 bytes of hex.
    pub fn to_snode(&self) -> anyhow::Result<Snode> {
        Ok(Snode::new(
            self.ip,
            self.port,
            parse_key(&self.pubkey_x25519, "pubkey_x25519")?,
            parse_key(&self.pubkey_ed25519, "pubkey_ed25519")?,
        ))
    }
}

fn parse_key(hex_key: &str, field: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(hex_key).map_err(|e| anyhow::anyhow!("{field}: {e}"))?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("{field} must be 32 bytes"))
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("skein/config.toml")
    }

    /// Seed nodes as identities
    ///
    /// # Errors
    ///
    /// Returns an error for the first malformed seed.
    pub fn snodes(&self) -> anyhow::Result<Vec<Snode>> {
        self.seeds.iter().map(SeedNode::to_snode).collect()
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.client.validate()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        self.snodes()?;
        Ok(())
    }
}
