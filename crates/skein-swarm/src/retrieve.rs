//! Swarm retrieval.
//!
//! One `retrieve` sub-request per (namespace, last hash) cursor, each built
//! independently under its own actor rule, plus an optional `expire` that
//! extends the TTL of config messages we already hold. Results are matched to
//! cursors by index.

use crate::batch::{BatchMode, BatchResult};
use crate::client::SwarmClient;
use crate::error::{SwarmError, SwarmResult};
use crate::retry::{Attempt, run_with_retry};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::Value;
use skein_core::{Actor, ExpireMode, MAX_BATCH_SIZE, Namespace, Snode, SubRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Where to resume polling one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveCursor {
    /// Namespace polled
    pub namespace: Namespace,
    /// Last hash seen; empty means from the beginning
    pub last_hash: String,
    /// Response size hint, passed through as-is
    pub max_size: Option<i64>,
}

impl RetrieveCursor {
    /// Cursor without a size hint.
    pub fn new(namespace: Namespace, last_hash: impl Into<String>) -> Self {
        Self {
            namespace,
            last_hash: last_hash.into(),
            max_size: None,
        }
    }

    /// Attach a size hint.
    #[must_use]
    pub fn with_max_size(mut self, max_size: i64) -> Self {
        self.max_size = Some(max_size);
        self
    }
}

/// TTL extension for already-known config messages, sent alongside a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBump {
    /// Hashes to extend
    pub hashes: Vec<String>,
    /// New expiry, milliseconds since epoch
    pub expiry_ms: u64,
}

/// One stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedMessage {
    /// Message hash
    pub hash: String,
    /// Decoded payload
    pub data: Vec<u8>,
    /// When the swarm stored it
    pub stored_at: u64,
    /// When it expires
    pub expiration: u64,
}

/// Messages from one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMessages {
    /// Namespace polled
    pub namespace: Namespace,
    /// Status of this namespace's retrieve
    pub code: u16,
    /// Messages, in the order the node returned them
    pub messages: Vec<RetrievedMessage>,
    /// Whether more messages are waiting
    pub more: bool,
}

/// Result of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveOutcome {
    /// Node polled
    pub target: Snode,
    /// First result was a 200
    pub online: bool,
    /// Per-cursor results, in cursor order
    pub namespaces: Vec<NamespaceMessages>,
    /// Status of the TTL bump, if one was sent
    pub bump_code: Option<u16>,
}

/// Build the sub-requests for one poll.
///
/// # Errors
///
/// - [`SwarmError::Precondition`] for no cursors or more requests than fit
///   in one batch
/// - [`SwarmError::Request`] for actor/namespace violations
pub fn build_retrieve_requests(
    actor: &Actor<'_>,
    cursors: &[RetrieveCursor],
    bump: Option<&ConfigBump>,
    now_ms: u64,
) -> SwarmResult<Vec<SubRequest>> {
    if cursors.is_empty() {
        return Err(SwarmError::precondition("no namespaces to retrieve"));
    }
    let bump = bump.filter(|bump| !bump.hashes.is_empty());
    let total = cursors.len() + usize::from(bump.is_some());
    if total > MAX_BATCH_SIZE {
        return Err(SwarmError::precondition(format!(
            "{total} retrieve requests exceed the batch cap of {MAX_BATCH_SIZE}"
        )));
    }

    let mut requests = Vec::with_capacity(total);
    for cursor in cursors {
        requests.push(SubRequest::retrieve(
            actor,
            cursor.namespace,
            cursor.last_hash.clone(),
            cursor.max_size,
            now_ms,
        )?);
    }
    if let Some(bump) = bump {
        requests.push(SubRequest::expire(
            actor,
            bump.hashes.clone(),
            bump.expiry_ms,
            ExpireMode::Extend,
        )?);
    }
    Ok(requests)
}

fn parse_messages(body: &Value) -> Vec<RetrievedMessage> {
    let Some(entries) = body.get("messages").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let hash = entry.get("hash")?.as_str()?.to_string();
            let data = match STANDARD.decode(entry.get("data")?.as_str()?) {
                Ok(data) => data,
                Err(_) => {
                    warn!(%hash, "dropping message with undecodable data");
                    return None;
                }
            };
            Some(RetrievedMessage {
                hash,
                data,
                stored_at: entry.get("timestamp").and_then(Value::as_u64).unwrap_or(0),
                expiration: entry.get("expiration").and_then(Value::as_u64).unwrap_or(0),
            })
        })
        .collect()
}

fn assemble(cursors: &[RetrieveCursor], bumped: bool, batch: BatchResult) -> SwarmResult<RetrieveOutcome> {
    let expected = cursors.len() + usize::from(bumped);
    if batch.results.len() != expected {
        return Err(SwarmError::ResultCountMismatch {
            expected,
            actual: batch.results.len(),
        });
    }
    let online = batch.is_online();
    let namespaces = cursors
        .iter()
        .zip(&batch.results)
        .map(|(cursor, result)| NamespaceMessages {
            namespace: cursor.namespace,
            code: result.code,
            messages: if result.is_success() {
                parse_messages(&result.body)
            } else {
                Vec::new()
            },
            more: result.body.get("more").and_then(Value::as_bool).unwrap_or(false),
        })
        .collect();
    let bump_code = bumped.then(|| batch.results[cursors.len()].code);
    Ok(RetrieveOutcome {
        target: batch.target,
        online,
        namespaces,
        bump_code,
    })
}

impl SwarmClient {
    /// Poll `actor`'s swarm for new messages.
    ///
    /// # Errors
    ///
    /// Construction preconditions, or the last transport error once retries
    /// are spent. Per-namespace failures are reported in
    /// [`NamespaceMessages::code`], not as errors.
    pub async fn retrieve(
        &self,
        actor: &Actor<'_>,
        cursors: &[RetrieveCursor],
        bump: Option<&ConfigBump>,
        cancel: &CancellationToken,
    ) -> SwarmResult<RetrieveOutcome> {
        let pubkey = actor.pubkey();
        let bumped = bump.is_some_and(|bump| !bump.hashes.is_empty());
        run_with_retry(self.retry_policy(), cancel, move |_| async move {
            let outcome = async {
                let requests = build_retrieve_requests(actor, cursors, bump, self.network_time().now_ms())?;
                let target = self.swarm_node(&pubkey, cancel).await?;
                let batch = self
                    .executor()
                    .execute(
                        &target,
                        &requests,
                        BatchMode::Batch,
                        self.config().timeouts.retrieve(),
                        cancel,
                    )
                    .await?;
                if let Some(server_ms) = batch.get(0).and_then(|first| first.body.get("t")).and_then(Value::as_u64) {
                    self.network_time().observe_server_time(server_ms);
                }
                let outcome = assemble(cursors, bumped, batch)?;
                debug!(
                    %pubkey,
                    online = outcome.online,
                    messages = outcome.namespaces.iter().map(|ns| ns.messages.len()).sum::<usize>(),
                    "retrieved"
                );
                Ok::<_, SwarmError>(outcome)
            };
            Attempt::from(outcome.await)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::SubResult;
    use crate::testing::node;
    use serde_json::json;
    use skein_core::UserKeys;

    const NOW: u64 = 1_700_000_000_000;

    fn keys() -> UserKeys {
        UserKeys::from_seed(&[11u8; 32]).unwrap()
    }

    #[test]
    fn test_one_request_per_cursor() {
        let keys = keys();
        let cursors = [
            RetrieveCursor::new(Namespace::DEFAULT, "h1"),
            RetrieveCursor::new(Namespace::USER_CONTACTS, "h2"),
        ];
        let requests = build_retrieve_requests(&Actor::User(&keys), &cursors, None, NOW).unwrap();
        assert_eq!(requests.len(), 2);

        let verifying = keys.signing_key().verifying_key();
        for (request, expected) in requests.iter().zip([format!("retrieve{NOW}"), format!("retrieve3{NOW}")]) {
            let json = request.to_json();
            assert_eq!(json["method"], "retrieve");
            let signature = STANDARD.decode(json["params"]["signature"].as_str().unwrap()).unwrap();
            let signature = skein_crypto::signatures::Signature::from_slice(&signature).unwrap();
            assert!(verifying.verify(expected.as_bytes(), &signature).is_ok());
        }
    }

    #[test]
    fn test_bump_appends_extend() {
        let keys = keys();
        let cursors = [RetrieveCursor::new(Namespace::USER_PROFILE, "")];
        let bump = ConfigBump {
            hashes: vec!["c1".into(), "c2".into()],
            expiry_ms: NOW + 1_000,
        };
        let requests = build_retrieve_requests(&Actor::User(&keys), &cursors, Some(&bump), NOW).unwrap();
        assert_eq!(requests.len(), 2);
        let params = requests[1].params();
        assert_eq!(requests[1].method(), "expire");
        assert_eq!(params["extend"], true);
        assert_eq!(params["expiry"], NOW + 1_000);
    }

    #[test]
    fn test_empty_bump_is_ignored() {
        let keys = keys();
        let cursors = [RetrieveCursor::new(Namespace::DEFAULT, "")];
        let bump = ConfigBump {
            hashes: vec![],
            expiry_ms: NOW,
        };
        let requests = build_retrieve_requests(&Actor::User(&keys), &cursors, Some(&bump), NOW).unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn test_too_many_cursors_rejected() {
        let keys = keys();
        let cursors: Vec<_> = (0..21).map(|_| RetrieveCursor::new(Namespace::DEFAULT, "")).collect();
        assert!(matches!(
            build_retrieve_requests(&Actor::User(&keys), &cursors, None, NOW),
            Err(SwarmError::Precondition(_))
        ));
    }

    #[test]
    fn test_group_namespace_rejected_for_user() {
        let keys = keys();
        let cursors = [RetrieveCursor::new(Namespace::GROUP_MESSAGES, "")];
        assert!(matches!(
            build_retrieve_requests(&Actor::User(&keys), &cursors, None, NOW),
            Err(SwarmError::Request(_))
        ));
    }

    #[test]
    fn test_legacy_cursor_has_no_timestamp() {
        let keys = keys();
        let cursors = [RetrieveCursor::new(Namespace::LEGACY_CLOSED_GROUP, "").with_max_size(-1)];
        let requests =
            build_retrieve_requests(&Actor::LegacyGroup(*keys.account_id()), &cursors, None, NOW).unwrap();
        let params = requests[0].params();
        assert!(params.get("timestamp").is_none());
        assert!(params.get("signature").is_none());
        assert_eq!(params["max_size"], -1);
    }

    fn result(index: usize, code: u16, body: Value) -> SubResult {
        SubResult {
            index,
            method: "retrieve",
            code,
            body,
        }
    }

    #[test]
    fn test_assemble_by_index() {
        let cursors = [
            RetrieveCursor::new(Namespace::DEFAULT, "h1"),
            RetrieveCursor::new(Namespace::USER_CONTACTS, "h2"),
        ];
        let batch = BatchResult {
            target: node(1),
            results: vec![
                result(
                    0,
                    200,
                    json!({ "messages": [
                        { "hash": "m1", "data": STANDARD.encode(b"one"), "timestamp": 5, "expiration": 9 },
                        { "hash": "bad", "data": "***" }
                    ], "more": true }),
                ),
                result(1, 401, json!("unauthorized")),
            ],
        };
        let outcome = assemble(&cursors, false, batch).unwrap();
        assert!(outcome.online);
        assert_eq!(outcome.namespaces[0].messages.len(), 1);
        assert_eq!(outcome.namespaces[0].messages[0].data, b"one");
        assert_eq!(outcome.namespaces[0].messages[0].expiration, 9);
        assert!(outcome.namespaces[0].more);
        assert_eq!(outcome.namespaces[1].namespace, Namespace::USER_CONTACTS);
        assert_eq!(outcome.namespaces[1].code, 401);
        assert_eq!(outcome.bump_code, None);
    }

    #[test]
    fn test_assemble_counts_bump() {
        let cursors = [RetrieveCursor::new(Namespace::DEFAULT, "")];
        let batch = BatchResult {
            target: node(1),
            results: vec![result(0, 200, json!({ "messages": [] })), result(1, 200, json!({}))],
        };
        assert_eq!(assemble(&cursors, true, batch.clone()).unwrap().bump_code, Some(200));
        assert!(matches!(
            assemble(&cursors, false, batch),
            Err(SwarmError::ResultCountMismatch { expected: 1, actual: 2 })
        ));
    }
}
