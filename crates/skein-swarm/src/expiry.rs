//! Expiry set/get reconciliation.
//!
//! A `set` groups the requested hashes by target expiry, splits them into
//! chunks that fit one batch and sends the chunks concurrently. Every swarm
//! member's answer inside a result is checked against that member's own
//! Ed25519 key before any of its hashes are accepted.
//!
//! A requested hash that no verified member reports is taken to be expired
//! already and is mapped to the current network time.

use crate::batch::BatchMode;
use crate::client::SwarmClient;
use crate::error::{SwarmError, SwarmResult};
use crate::retry::{Attempt, run_with_retry};
use base64::{Engine, engine::general_purpose::STANDARD};
use futures::future::join_all;
use serde_json::Value;
use skein_core::signing::expire_response_message;
use skein_core::{Actor, ExpireMode, Snode, SubRequest};
use skein_crypto::signatures::verify_raw;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Hashes sent together in one batch, one `expire` per distinct expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpireChunk {
    /// `(expiry_ms, hashes)` per sub-request
    pub requests: Vec<(u64, Vec<String>)>,
}

impl ExpireChunk {
    /// Number of hashes in the chunk
    #[must_use]
    pub fn hash_count(&self) -> usize {
        self.requests.iter().map(|(_, hashes)| hashes.len()).sum()
    }
}

/// Split `targets` (hash → wanted expiry) into chunks of at most `max` hashes.
///
/// Hashes are ordered by expiry first so each chunk carries as few distinct
/// expiries (and therefore sub-requests) as possible.
#[must_use]
pub fn plan_expire_chunks(targets: &BTreeMap<String, u64>, max: usize) -> Vec<ExpireChunk> {
    let max = max.max(1);
    let mut ordered: Vec<(u64, &String)> = targets.iter().map(|(hash, expiry)| (*expiry, hash)).collect();
    ordered.sort();

    ordered
        .chunks(max)
        .map(|slice| {
            let mut chunk = ExpireChunk::default();
            for (expiry, hash) in slice {
                match chunk.requests.last_mut() {
                    Some((last, hashes)) if last == expiry => hashes.push((*hash).clone()),
                    _ => chunk.requests.push((*expiry, vec![(*hash).clone()])),
                }
            }
            chunk
        })
        .collect()
}

/// Merge one `expire` result into `merged`.
///
/// Only members listed in `members` are considered. Entries marked `failed`
/// are skipped; entries whose signature does not verify are rejected and their
/// keys returned so the caller can eject them. Signed hashes outside
/// `requested` are dropped. A hash already in `merged` keeps its first value. Requested hashes that no verified member reported
/// are set to `now_ms`.
pub fn reconcile_expire_response(
    pubkey_hex: &str,
    requested: &[String],
    body: &Value,
    members: &[Snode],
    merged: &mut BTreeMap<String, u64>,
    now_ms: u64,
) -> Vec<[u8; 32]> {
    let mut rejected = Vec::new();
    let entries = body.get("swarm").and_then(Value::as_object);
    for (key_hex, entry) in entries.into_iter().flatten() {
        let Some(member) = members.iter().find(|node| node.ed25519_hex() == *key_hex) else {
            debug!(node = %key_hex, "ignoring expire entry from outside the swarm");
            continue;
        };
        if entry.get("failed").and_then(Value::as_bool).unwrap_or(false) {
            debug!(node = %key_hex, reason = ?entry.get("reason"), "swarm member failed expire");
            continue;
        }
        let Some(verified) = verify_entry(pubkey_hex, requested, entry, &member.pubkey_ed25519) else {
            warn!(node = %key_hex, "rejecting expire entry with a bad signature");
            rejected.push(member.pubkey_ed25519);
            continue;
        };
        for (hash, expiry) in verified {
            if !requested.contains(&hash) {
                debug!(node = %key_hex, hash, "ignoring unrequested hash in expire entry");
                continue;
            }
            merged.entry(hash).or_insert(expiry);
        }
    }
    for hash in requested {
        merged.entry(hash.clone()).or_insert(now_ms);
    }
    rejected
}

/// Accepted `(hash, expiry)` pairs from one member, or `None` if the entry
/// is malformed or its signature fails.
fn verify_entry(
    pubkey_hex: &str,
    requested: &[String],
    entry: &Value,
    key: &[u8; 32],
) -> Option<Vec<(String, u64)>> {
    let expiry = entry.get("expiry")?.as_u64()?;
    let updated: Vec<String> = entry
        .get("updated")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let unchanged: BTreeMap<String, u64> = entry
        .get("unchanged")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(hash, value)| Some((hash.clone(), value.as_u64()?)))
                .collect()
        })
        .unwrap_or_default();
    let signature = STANDARD.decode(entry.get("signature")?.as_str()?).ok()?;
    let message = expire_response_message(pubkey_hex, expiry, requested, &updated, &unchanged);
    verify_raw(key, &message, &signature).ok()?;

    Some(
        updated
            .into_iter()
            .map(|hash| (hash, expiry))
            .chain(unchanged)
            .collect(),
    )
}

impl SwarmClient {
    /// Set new expiries (`targets`: hash → expiry) and return the verified
    /// expiry of every requested hash.
    ///
    /// Chunks run concurrently; if `cancel` fires, nothing is returned even
    /// for chunks that completed.
    ///
    /// # Errors
    ///
    /// - [`SwarmError::Precondition`] for an empty target map
    /// - [`SwarmError::Cancelled`] when cancelled
    /// - the first chunk's error once its retries are spent
    pub async fn set_expiry(
        &self,
        actor: &Actor<'_>,
        targets: &BTreeMap<String, u64>,
        mode: ExpireMode,
        cancel: &CancellationToken,
    ) -> SwarmResult<BTreeMap<String, u64>> {
        if targets.is_empty() {
            return Err(SwarmError::precondition("no hashes to expire"));
        }
        let chunks = plan_expire_chunks(targets, self.executor().max_requests());
        debug!(hashes = targets.len(), chunks = chunks.len(), ?mode, "setting expiries");

        let results = join_all(
            chunks
                .iter()
                .map(|chunk| self.expire_chunk(actor, chunk, mode, cancel)),
        )
        .await;
        if cancel.is_cancelled() {
            return Err(SwarmError::Cancelled);
        }

        let mut merged = BTreeMap::new();
        for result in results {
            for (hash, expiry) in result? {
                merged.entry(hash).or_insert(expiry);
            }
        }
        Ok(merged)
    }

    async fn expire_chunk(
        &self,
        actor: &Actor<'_>,
        chunk: &ExpireChunk,
        mode: ExpireMode,
        cancel: &CancellationToken,
    ) -> SwarmResult<BTreeMap<String, u64>> {
        let pubkey = actor.pubkey();
        let pubkey_hex = pubkey.to_string();
        let pubkey_hex = pubkey_hex.as_str();
        run_with_retry(self.retry_policy(), cancel, move |_| async move {
            let outcome = async {
                let requests = chunk
                    .requests
                    .iter()
                    .map(|(expiry, hashes)| SubRequest::expire(actor, hashes.clone(), *expiry, mode))
                    .collect::<Result<Vec<_>, _>>()?;
                let target = self.swarm_node(&pubkey, cancel).await?;
                let batch = self
                    .executor()
                    .execute(
                        &target,
                        &requests,
                        BatchMode::Batch,
                        self.config().timeouts.expire(),
                        cancel,
                    )
                    .await?;
                let members = self.pool().swarm_for(&pubkey).await?;
                let now_ms = self.network_time().now_ms();

                let mut merged = BTreeMap::new();
                let mut rejected = Vec::new();
                for ((_, hashes), result) in chunk.requests.iter().zip(batch.results) {
                    let result = result.into_success()?;
                    rejected.extend(reconcile_expire_response(
                        pubkey_hex,
                        hashes,
                        &result.body,
                        &members,
                        &mut merged,
                        now_ms,
                    ));
                }
                for key in &rejected {
                    self.pool().eject_node(key).await;
                }
                Ok::<_, SwarmError>(merged)
            };
            Attempt::from(outcome.await)
        })
        .await
    }

    /// Current expiries of `hashes`; hashes the node does not report map to
    /// the current network time.
    ///
    /// # Errors
    ///
    /// Precondition failures (including an empty hash list) or the last
    /// transport or status error once retries are spent.
    pub async fn get_expiries(
        &self,
        actor: &Actor<'_>,
        hashes: &[String],
        cancel: &CancellationToken,
    ) -> SwarmResult<BTreeMap<String, u64>> {
        let pubkey = actor.pubkey();
        run_with_retry(self.retry_policy(), cancel, move |_| async move {
            let outcome = async {
                let now_ms = self.network_time().now_ms();
                let request = SubRequest::get_expiries(actor, hashes.to_vec(), now_ms)?;
                let target = self.swarm_node(&pubkey, cancel).await?;
                let result = self
                    .single(&target, request, self.config().timeouts.batch(), cancel)
                    .await?;
                let reported = result.body.get("expiries").and_then(Value::as_object);
                let expiries = hashes
                    .iter()
                    .map(|hash| {
                        let expiry = reported
                            .and_then(|map| map.get(hash))
                            .and_then(Value::as_u64)
                            .unwrap_or(now_ms);
                        (hash.clone(), expiry)
                    })
                    .collect();
                Ok::<_, SwarmError>(expiries)
            };
            Attempt::from(outcome.await)
        })
        .await
    }
}
