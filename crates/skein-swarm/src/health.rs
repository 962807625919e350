//! Node and path health tracking
//!
//! Counts consecutive failures per node and per onion path. When a counter
//! reaches its threshold the caller is told to eject; the counter then starts
//! over so a node that comes back is judged afresh. Any success through a
//! path resets the path and every node on it.

use dashmap::DashMap;
use skein_core::config::HealthConfig;
use skein_core::{OnionPath, Snode};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Health counters for nodes and paths
#[derive(Debug)]
pub struct NodeHealth {
    node_threshold: u32,
    path_threshold: u32,

    /// Consecutive failures per node Ed25519 key
    nodes: DashMap<[u8; 32], u32>,

    /// Consecutive failures per path id
    paths: DashMap<String, u32>,

    nodes_ejected: AtomicU64,
    paths_ejected: AtomicU64,
}

/// Health counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthMetrics {
    /// Nodes currently carrying failures
    pub failing_nodes: usize,
    /// Paths currently carrying failures
    pub failing_paths: usize,
    /// Nodes reported for ejection
    pub nodes_ejected: u64,
    /// Paths reported for ejection
    pub paths_ejected: u64,
}

impl NodeHealth {
    /// Create a tracker with thresholds from `config`.
    #[must_use]
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            node_threshold: config.node_failure_threshold.max(1),
            path_threshold: config.path_failure_threshold.max(1),
            nodes: DashMap::new(),
            paths: DashMap::new(),
            nodes_ejected: AtomicU64::new(0),
            paths_ejected: AtomicU64::new(0),
        }
    }

    /// Record a failure attributed to one node. Returns true when the node
    /// should be ejected.
    pub fn record_node_failure(&self, ed25519: &[u8; 32]) -> bool {
        let mut count = self.nodes.entry(*ed25519).or_insert(0);
        *count += 1;
        debug!(node = %hex::encode(&ed25519[..4]), failures = *count, "node failure");
        if *count >= self.node_threshold {
            drop(count);
            self.nodes.remove(ed25519);
            self.nodes_ejected.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Record a failure attributed to a whole path. Returns true when the
    /// path should be ejected.
    pub fn record_path_failure(&self, path: &OnionPath) -> bool {
        let id = path.id();
        let mut count = self.paths.entry(id.clone()).or_insert(0);
        *count += 1;
        debug!(path = %id, failures = *count, "path failure");
        if *count >= self.path_threshold {
            drop(count);
            self.paths.remove(&id);
            self.paths_ejected.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Record a reply that made it back through `path`: resets the path and
    /// its hops. The destination is judged separately by its answer.
    pub fn record_delivery(&self, path: &OnionPath) {
        self.paths.remove(&path.id());
        for hop in path.hops() {
            self.nodes.remove(&hop.pubkey_ed25519);
        }
    }

    /// Record a healthy answer: resets the path, its hops and the target.
    pub fn record_success(&self, path: &OnionPath, target: &Snode) {
        self.record_delivery(path);
        self.nodes.remove(&target.pubkey_ed25519);
    }

    /// Consecutive failures recorded for a node
    #[must_use]
    pub fn node_failures(&self, ed25519: &[u8; 32]) -> u32 {
        self.nodes.get(ed25519).map_or(0, |count| *count)
    }

    /// Consecutive failures recorded for a path
    #[must_use]
    pub fn path_failures(&self, path: &OnionPath) -> u32 {
        self.paths.get(&path.id()).map_or(0, |count| *count)
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn metrics(&self) -> HealthMetrics {
        HealthMetrics {
            failing_nodes: self.nodes.len(),
            failing_paths: self.paths.len(),
            nodes_ejected: self.nodes_ejected.load(Ordering::Relaxed),
            paths_ejected: self.paths_ejected.load(Ordering::Relaxed),
        }
    }
}
