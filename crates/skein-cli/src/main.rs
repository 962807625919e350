//! Skein CLI
//!
//! Exercises the swarm client against the seed nodes in the configuration
//! file: name lookups, swarm lookups, clock checks and polling.

mod config;

use clap::{Parser, Subcommand};
use skein_core::{AccountId, Actor, Namespace, UserKeys};
use skein_swarm::{RetrieveCursor, StaticSnodePool, SwarmClient};
use skein_transport::{OnionRouter, ReqwestGuardLink, V4Body, v4};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use config::Config;

/// Skein - onion-routed swarm client
#[derive(Parser)]
#[command(name = "skein")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a registered name to an account id
    Resolve {
        /// Name to look up
        name: String,
    },

    /// Show the swarm holding an account
    Swarm {
        /// Account id (66 hex characters)
        pubkey: String,
    },

    /// Query a node's clock and show our offset
    Time,

    /// Poll our swarm for messages
    Retrieve {
        /// File holding the 32-byte identity seed
        #[arg(short, long)]
        key_file: PathBuf,

        /// Namespaces to poll
        #[arg(short, long = "namespace", default_value = "0", allow_negative_numbers = true)]
        namespaces: Vec<i16>,

        /// Resume after this hash
        #[arg(long, default_value = "")]
        last_hash: String,
    },

    /// Decode a V4-encoded response file
    DecodeV4 {
        /// File to decode
        file: PathBuf,
    },

    /// Generate a new identity seed
    Keygen {
        /// Output file for the seed
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = if config_path.exists() {
        Config::load(&config_path)?
    } else if cli.config.is_some() {
        anyhow::bail!("Config file not found: {}", config_path.display());
    } else {
        Config::default()
    };
    config.validate()?;

    let level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Resolve { name } => resolve(&name, &config, &cancel).await?,
        Commands::Swarm { pubkey } => show_swarm(&pubkey, &config, &cancel).await?,
        Commands::Time => show_time(&config, &cancel).await?,
        Commands::Retrieve {
            key_file,
            namespaces,
            last_hash,
        } => retrieve(&key_file, &namespaces, &last_hash, &config, &cancel).await?,
        Commands::DecodeV4 { file } => decode_file(&file)?,
        Commands::Keygen { output } => generate_seed(output)?,
    }

    Ok(())
}

fn build_client(config: &Config) -> anyhow::Result<SwarmClient> {
    let seeds = config.snodes()?;
    if seeds.is_empty() {
        anyhow::bail!("No seed nodes configured; add [[seeds]] entries to the config file");
    }
    let pool = Arc::new(StaticSnodePool::new(seeds, config.client.network.path_length));
    let transport = Arc::new(OnionRouter::new(ReqwestGuardLink::new()?));
    Ok(SwarmClient::new(config.client.clone(), transport, pool)?)
}

/// Resolve a name
async fn resolve(name: &str, config: &Config, cancel: &CancellationToken) -> anyhow::Result<()> {
    let client = build_client(config)?;
    let id = client.resolve_ons(name, cancel).await?;
    println!("{name}: {id}");
    Ok(())
}

/// Print the members of a swarm
async fn show_swarm(pubkey: &str, config: &Config, cancel: &CancellationToken) -> anyhow::Result<()> {
    let client = build_client(config)?;
    let id = AccountId::parse(pubkey)?;
    let swarm = client.get_swarm(&id, cancel).await?;

    println!("Swarm of {id} ({} nodes):", swarm.len());
    for node in &swarm {
        println!("  {}:{}  {}", node.ip, node.port, node.ed25519_hex());
    }
    Ok(())
}

/// Print a node's clock and our offset from it
async fn show_time(config: &Config, cancel: &CancellationToken) -> anyhow::Result<()> {
    let client = build_client(config)?;
    let server_ms = client.refresh_network_time(cancel).await?;

    println!("Server time: {server_ms}");
    if let Some(offset) = client.network_time().offset_ms() {
        println!("Local offset: {offset} ms");
    }
    Ok(())
}

fn load_keys(path: &Path) -> anyhow::Result<UserKeys> {
    let bytes = Zeroizing::new(std::fs::read(path)?);
    let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("{} does not hold a 32-byte seed", path.display()))?,
    );
    Ok(UserKeys::from_seed(&seed)?)
}

/// Poll namespaces of our own swarm
async fn retrieve(
    key_file: &Path,
    namespaces: &[i16],
    last_hash: &str,
    config: &Config,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let keys = load_keys(key_file)?;
    let client = build_client(config)?;
    let cursors: Vec<_> = namespaces
        .iter()
        .map(|ns| RetrieveCursor::new(Namespace::new(*ns), last_hash))
        .collect();

    let outcome = client.retrieve(&Actor::User(&keys), &cursors, None, cancel).await?;
    println!("Account: {}", keys.account_id());
    println!("Node: {}:{} (online: {})", outcome.target.ip, outcome.target.port, outcome.online);
    for ns in &outcome.namespaces {
        println!();
        println!(
            "Namespace {} [{}]: {} message(s){}",
            ns.namespace,
            ns.code,
            ns.messages.len(),
            if ns.more { ", more waiting" } else { "" }
        );
        for message in &ns.messages {
            println!(
                "  {}  {} bytes  stored {}  expires {}",
                message.hash,
                message.data.len(),
                message.stored_at,
                message.expiration
            );
        }
    }
    Ok(())
}

/// Decode and print a V4 response
fn decode_file(file: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)?;
    let decoded = v4::decode_v4(&bytes).ok_or_else(|| anyhow::anyhow!("{} is not V4-encoded", file.display()))?;

    println!("Status: {}", decoded.code);
    for (name, value) in &decoded.headers {
        println!("{name}: {value}");
    }
    println!();
    match decoded.body {
        V4Body::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        V4Body::PlainText(text) => println!("{text}"),
        V4Body::Binary(data) => println!("<{} bytes> {}", data.len(), hex::encode(&data)),
        V4Body::Empty => println!("<no body>"),
    }
    Ok(())
}

/// Generate a new identity seed
fn generate_seed(output: Option<PathBuf>) -> anyhow::Result<()> {
    use skein_crypto::signatures::SigningKey;

    let signing_key = SigningKey::generate(&mut rand_core::OsRng);
    let seed = Zeroizing::new(signing_key.to_seed());
    let keys = UserKeys::from_seed(&seed)?;

    println!("Account id: {}", keys.account_id());
    println!("Ed25519 key: {}", hex::encode(signing_key.verifying_key().to_bytes()));

    if let Some(output_path) = output {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&output_path, seed.as_slice())?;
        println!("Seed saved to: {}", output_path.display());
        println!("\nKeep this file secure! It contains your private key.");
    } else {
        println!("\nSeed not saved (use --output to save)");
    }

    Ok(())
}
