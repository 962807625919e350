//! The interface to path and swarm management.
//!
//! Path building, swarm caching and node ejection belong to whatever owns the
//! node list; swarm operations only ask for paths and targets and report
//! failures back. [`StaticSnodePool`] is a self-contained implementation over
//! a fixed seed list.

use crate::error::{SwarmError, SwarmResult};
use async_trait::async_trait;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use skein_core::{AccountId, OnionPath, Snode};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Source of onion paths and swarms, and sink for ejections.
#[async_trait]
pub trait SnodePool: Send + Sync {
    /// An onion path that does not contain `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::NoNodes`] if no path can be built.
    async fn onion_path(&self, destination: Option<&Snode>) -> SwarmResult<OnionPath>;

    /// Cached swarm for `pubkey`; empty when unknown.
    async fn swarm_for(&self, pubkey: &AccountId) -> SwarmResult<Vec<Snode>>;

    /// `count` distinct random nodes.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::NoNodes`] if fewer than `count` are known.
    async fn random_snodes(&self, count: usize) -> SwarmResult<Vec<Snode>>;

    /// Drop a node everywhere.
    async fn eject_node(&self, ed25519: &[u8; 32]);

    /// Stop using a path.
    async fn eject_path(&self, path: &OnionPath);

    /// Install a freshly fetched swarm.
    async fn replace_swarm(&self, pubkey: &AccountId, swarm: Vec<Snode>);

    /// Remove one node from a cached swarm (it claims not to hold the account).
    async fn remove_from_swarm(&self, pubkey: &AccountId, node: &Snode);
}

/// In-memory pool over a seed list.
#[derive(Debug)]
pub struct StaticSnodePool {
    nodes: RwLock<Vec<Snode>>,
    swarms: DashMap<AccountId, Vec<Snode>>,
    path_length: usize,
}

impl StaticSnodePool {
    /// Create a pool from seed nodes, building paths of `path_length` hops.
    #[must_use]
    pub fn new(nodes: Vec<Snode>, path_length: usize) -> Self {
        Self {
            nodes: RwLock::new(nodes),
            swarms: DashMap::new(),
            path_length,
        }
    }

    /// Number of usable nodes.
    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// Whether every node has been ejected.
    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    /// Whether a node is still usable.
    pub async fn contains(&self, ed25519: &[u8; 32]) -> bool {
        self.nodes
            .read()
            .await
            .iter()
            .any(|node| &node.pubkey_ed25519 == ed25519)
    }
}

#[async_trait]
impl SnodePool for StaticSnodePool {
    async fn onion_path(&self, destination: Option<&Snode>) -> SwarmResult<OnionPath> {
        let hops: Vec<Snode> = {
            let nodes = self.nodes.read().await;
            let candidates: Vec<&Snode> = nodes.iter().filter(|node| Some(*node) != destination).collect();
            if candidates.len() < self.path_length {
                return Err(SwarmError::NoNodes(
                    format!(
                        "{} nodes available for a {}-hop path",
                        candidates.len(),
                        self.path_length
                    )
                    .into(),
                ));
            }
            candidates
                .choose_multiple(&mut rand::thread_rng(), self.path_length)
                .map(|node| (*node).clone())
                .collect()
        };
        OnionPath::new(hops).map_err(SwarmError::from)
    }

    async fn swarm_for(&self, pubkey: &AccountId) -> SwarmResult<Vec<Snode>> {
        Ok(self.swarms.get(pubkey).map(|swarm| swarm.clone()).unwrap_or_default())
    }

    async fn random_snodes(&self, count: usize) -> SwarmResult<Vec<Snode>> {
        let nodes = self.nodes.read().await;
        if nodes.len() < count {
            return Err(SwarmError::NoNodes(
                format!("{} nodes known, {count} needed", nodes.len()).into(),
            ));
        }
        Ok(nodes
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect())
    }

    async fn eject_node(&self, ed25519: &[u8; 32]) {
        self.nodes.write().await.retain(|node| &node.pubkey_ed25519 != ed25519);
        for mut swarm in self.swarms.iter_mut() {
            swarm.retain(|node| &node.pubkey_ed25519 != ed25519);
        }
        warn!(node = %hex::encode(&ed25519[..4]), "ejected node");
    }

    async fn eject_path(&self, path: &OnionPath) {
        // Paths are rebuilt per request; only the guard is known-bad enough to drop.
        warn!(path = %path.id(), "ejected path");
        self.eject_node(&path.guard().pubkey_ed25519).await;
    }

    async fn replace_swarm(&self, pubkey: &AccountId, swarm: Vec<Snode>) {
        info!(%pubkey, size = swarm.len(), "swarm replaced");
        self.swarms.insert(*pubkey, swarm);
    }

    async fn remove_from_swarm(&self, pubkey: &AccountId, node: &Snode) {
        if let Some(mut swarm) = self.swarms.get_mut(pubkey) {
            swarm.retain(|member| member != node);
        }
    }
}
