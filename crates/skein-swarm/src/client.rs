//! The swarm client facade.
//!
//! [`SwarmClient`] owns a [`BatchExecutor`], the retry policy and the network
//! clock, and exposes one method per application intent. Retrieval, expiry and
//! name resolution live in their own modules as further `impl SwarmClient`
//! blocks; the store, delete, revocation, swarm lookup and clock operations are
//! here.

use crate::batch::{BatchExecutor, BatchMode, BatchResult, ResponseInterpreter, SubResult};
use crate::error::{SwarmError, SwarmResult};
use crate::health::NodeHealth;
use crate::pool::SnodePool;
use crate::retry::{Attempt, RetryPolicy, run_with_retry};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::Value;
use skein_core::snode::parse_snodes;
use skein_core::{
    AccountId, Actor, ClientConfig, GroupRecord, Namespace, NamespaceSelector, NetworkTime, Snode,
    SubRequest,
};
use skein_crypto::subaccount::SubaccountToken;
use skein_transport::OnionTransport;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Accepted store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    /// Hash the swarm assigned to the message
    pub hash: String,
    /// Node that accepted it
    pub target: Snode,
}

/// Result of a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Ed25519 keys (hex) of swarm members that reported the deletion
    pub deleted_by: BTreeSet<String>,
}

/// Client for swarm operations.
pub struct SwarmClient {
    config: ClientConfig,
    executor: BatchExecutor,
    pool: Arc<dyn SnodePool>,
    time: Arc<NetworkTime>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SwarmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmClient")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl SwarmClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::Request`] if `config` fails validation.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn OnionTransport>,
        pool: Arc<dyn SnodePool>,
    ) -> SwarmResult<Self> {
        config.validate()?;
        let health = Arc::new(NodeHealth::new(&config.health));
        let executor = BatchExecutor::new(transport, Arc::clone(&pool), health, config.batch.max_requests)
            .with_interpreter(Arc::new(SwarmInterpreter {
                pool: Arc::clone(&pool),
            }));
        Ok(Self {
            retry: RetryPolicy::from(&config.retry),
            config,
            executor,
            pool,
            time: NetworkTime::shared(),
        })
    }

    /// Use `time` instead of the process-wide clock estimate.
    #[must_use]
    pub fn with_network_time(mut self, time: Arc<NetworkTime>) -> Self {
        self.time = time;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The batch executor
    #[must_use]
    pub fn executor(&self) -> &BatchExecutor {
        &self.executor
    }

    /// The node pool
    #[must_use]
    pub fn pool(&self) -> &Arc<dyn SnodePool> {
        &self.pool
    }

    /// The clock estimate used for signatures
    #[must_use]
    pub fn network_time(&self) -> &Arc<NetworkTime> {
        &self.time
    }

    /// The retry policy
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// A random member of `pubkey`'s swarm, fetching the swarm if unknown.
    ///
    /// The fetch is a single attempt; callers run inside their own retry
    /// loop and spend one attempt of their budget on it.
    pub(crate) async fn swarm_node(&self, pubkey: &AccountId, cancel: &CancellationToken) -> SwarmResult<Snode> {
        let mut swarm = self.pool.swarm_for(pubkey).await?;
        if swarm.is_empty() {
            swarm = self.fetch_swarm(pubkey, &SubRequest::get_swarm(pubkey)?, cancel).await?;
        }
        swarm
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| SwarmError::NoNodes(format!("swarm of {pubkey} is empty").into()))
    }

    /// A random node from the pool.
    pub(crate) async fn any_node(&self) -> SwarmResult<Snode> {
        self.pool
            .random_snodes(1)
            .await?
            .pop()
            .ok_or_else(|| SwarmError::NoNodes("pool is empty".into()))
    }

    /// Execute one request against `target` and require a 2xx result.
    pub(crate) async fn single(
        &self,
        target: &Snode,
        request: SubRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> SwarmResult<SubResult> {
        let BatchResult { mut results, .. } = self
            .executor
            .execute(target, std::slice::from_ref(&request), BatchMode::Batch, timeout, cancel)
            .await?;
        results
            .pop()
            .ok_or_else(|| SwarmError::protocol("empty batch result"))?
            .into_success()
    }

    /// Store a message in `actor`'s swarm.
    ///
    /// The signature covers the current network time; `timestamp_ms` is the
    /// message's own timestamp.
    ///
    /// # Errors
    ///
    /// Precondition failures from request construction, or the last transport
    /// or status error once retries are spent.
    pub async fn store(
        &self,
        actor: &Actor<'_>,
        namespace: Namespace,
        data: &[u8],
        ttl_ms: u64,
        timestamp_ms: u64,
        cancel: &CancellationToken,
    ) -> SwarmResult<StoreOutcome> {
        let pubkey = actor.pubkey();
        run_with_retry(&self.retry, cancel, move |_| async move {
            let outcome = async {
                let request = SubRequest::store(
                    actor,
                    namespace,
                    data.to_vec(),
                    ttl_ms,
                    timestamp_ms,
                    self.time.now_ms(),
                )?;
                let target = self.swarm_node(&pubkey, cancel).await?;
                let result = self.single(&target, request, self.config.timeouts.store(), cancel).await?;
                let hash = result
                    .body
                    .get("hash")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SwarmError::protocol("store result has no hash"))?;
                debug!(%pubkey, %namespace, hash, "stored");
                Ok::<_, SwarmError>(StoreOutcome {
                    hash: hash.to_string(),
                    target,
                })
            };
            Attempt::from(outcome.await)
        })
        .await
    }

    /// Delete messages by hash.
    ///
    /// # Errors
    ///
    /// Precondition failures (including an empty hash list) or the last
    /// transport or status error once retries are spent.
    pub async fn delete(
        &self,
        actor: &Actor<'_>,
        hashes: &[String],
        cancel: &CancellationToken,
    ) -> SwarmResult<DeleteOutcome> {
        let request = SubRequest::delete(actor, hashes.to_vec())?;
        self.run_delete(&actor.pubkey(), request, cancel).await
    }

    /// Delete one namespace, or every namespace.
    ///
    /// # Errors
    ///
    /// Precondition failures or the last transport or status error once
    /// retries are spent.
    pub async fn delete_all(
        &self,
        actor: &Actor<'_>,
        namespace: NamespaceSelector,
        cancel: &CancellationToken,
    ) -> SwarmResult<DeleteOutcome> {
        let request = SubRequest::delete_all(actor, namespace, self.time.now_ms())?;
        self.run_delete(&actor.pubkey(), request, cancel).await
    }

    async fn run_delete(
        &self,
        pubkey: &AccountId,
        request: SubRequest,
        cancel: &CancellationToken,
    ) -> SwarmResult<DeleteOutcome> {
        let request = &request;
        run_with_retry(&self.retry, cancel, move |_| async move {
            let outcome = async {
                let target = self.swarm_node(pubkey, cancel).await?;
                let result = self
                    .single(&target, request.clone(), self.config.timeouts.batch(), cancel)
                    .await?;
                Ok::<_, SwarmError>(DeleteOutcome {
                    deleted_by: reporting_members(&result.body),
                })
            };
            Attempt::from(outcome.await)
        })
        .await
    }

    /// Revoke subaccount tokens for a group we administer.
    ///
    /// # Errors
    ///
    /// Precondition failure without the admin key or with no tokens.
    pub async fn revoke_subaccounts(
        &self,
        group: &GroupRecord,
        tokens: &[SubaccountToken],
        cancel: &CancellationToken,
    ) -> SwarmResult<()> {
        let request = SubRequest::revoke_subaccount(group, tokens.to_vec(), self.time.now_ms())?;
        self.run_admin(&group.pubkey, request, cancel).await
    }

    /// Lift revocations for a group we administer.
    ///
    /// # Errors
    ///
    /// Precondition failure without the admin key or with no tokens.
    pub async fn unrevoke_subaccounts(
        &self,
        group: &GroupRecord,
        tokens: &[SubaccountToken],
        cancel: &CancellationToken,
    ) -> SwarmResult<()> {
        let request = SubRequest::unrevoke_subaccount(group, tokens.to_vec(), self.time.now_ms())?;
        self.run_admin(&group.pubkey, request, cancel).await
    }

    async fn run_admin(&self, pubkey: &AccountId, request: SubRequest, cancel: &CancellationToken) -> SwarmResult<()> {
        let request = &request;
        run_with_retry(&self.retry, cancel, move |_| async move {
            let outcome = async {
                let target = self.swarm_node(pubkey, cancel).await?;
                self.single(&target, request.clone(), self.config.timeouts.batch(), cancel)
                    .await?;
                info!(%pubkey, method = request.method(), "subaccount revocations updated");
                Ok::<_, SwarmError>(())
            };
            Attempt::from(outcome.await)
        })
        .await
    }

    /// Fetch the swarm of `pubkey` from a random node and hand it to the pool.
    ///
    /// # Errors
    ///
    /// [`SwarmError::ProtocolMismatch`] if the node lists no usable members,
    /// or the last transport error once retries are spent.
    pub async fn get_swarm(&self, pubkey: &AccountId, cancel: &CancellationToken) -> SwarmResult<Vec<Snode>> {
        let request = SubRequest::get_swarm(pubkey)?;
        let request = &request;
        run_with_retry(&self.retry, cancel, move |_| async move {
            Attempt::from(self.fetch_swarm(pubkey, request, cancel).await)
        })
        .await
    }

    /// One `get_swarm` round trip through a random node.
    async fn fetch_swarm(
        &self,
        pubkey: &AccountId,
        request: &SubRequest,
        cancel: &CancellationToken,
    ) -> SwarmResult<Vec<Snode>> {
        let node = self.any_node().await?;
        let result = self
            .single(&node, request.clone(), self.config.timeouts.batch(), cancel)
            .await?;
        let swarm = parse_snodes(&result.body);
        if swarm.is_empty() {
            return Err(SwarmError::protocol("get_swarm returned no usable nodes"));
        }
        self.pool.replace_swarm(pubkey, swarm.clone()).await;
        Ok(swarm)
    }

    /// Ask a random node for its clock and recalibrate.
    ///
    /// # Errors
    ///
    /// [`SwarmError::ProtocolMismatch`] if the reply has no timestamp, or the
    /// last transport error once retries are spent.
    pub async fn refresh_network_time(&self, cancel: &CancellationToken) -> SwarmResult<u64> {
        run_with_retry(&self.retry, cancel, move |_| async move {
            let outcome = async {
                let node = self.any_node().await?;
                let result = self
                    .single(&node, SubRequest::network_time(), self.config.timeouts.batch(), cancel)
                    .await?;
                let server_ms = result
                    .body
                    .get("timestamp")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| SwarmError::protocol("info result has no timestamp"))?;
                self.time.observe_server_time(server_ms);
                Ok::<_, SwarmError>(server_ms)
            };
            Attempt::from(outcome.await)
        })
        .await
    }
}

/// Swarm members (hex keys) that answered without `failed`.
fn reporting_members(body: &Value) -> BTreeSet<String> {
    body.get("swarm")
        .and_then(Value::as_object)
        .map(|swarm| {
            swarm
                .iter()
                .filter(|(_, entry)| !entry.get("failed").and_then(Value::as_bool).unwrap_or(false))
                .map(|(key, _)| key.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Account a sub-request addresses.
fn request_account(request: &SubRequest) -> Option<AccountId> {
    match request {
        SubRequest::Retrieve(r) => Some(r.pubkey),
        SubRequest::Store(r) => Some(r.pubkey),
        SubRequest::Delete(r) => Some(r.pubkey),
        SubRequest::DeleteAll(r) => Some(r.pubkey),
        SubRequest::Expire(r) => Some(r.pubkey),
        SubRequest::GetExpiries(r) => Some(r.pubkey),
        SubRequest::RevokeSubaccount(r) | SubRequest::UnrevokeSubaccount(r) => Some(r.group),
        SubRequest::GetSwarm { .. } | SubRequest::OnsResolve { .. } | SubRequest::NetworkTime => None,
    }
}

/// Status a node returns for an account it does not hold.
const WRONG_SWARM: u16 = 421;

/// Reacts to wrong-swarm answers by updating the pool.
struct SwarmInterpreter {
    pool: Arc<dyn SnodePool>,
}

#[async_trait]
impl ResponseInterpreter for SwarmInterpreter {
    async fn interpret(&self, target: &Snode, request: &SubRequest, result: &SubResult) {
        if result.code != WRONG_SWARM {
            return;
        }
        let Some(pubkey) = request_account(request) else {
            return;
        };
        let swarm = parse_snodes(&result.body);
        if swarm.is_empty() {
            warn!(%pubkey, ?target, "node no longer holds this swarm");
            self.pool.remove_from_swarm(&pubkey, target).await;
        } else {
            self.pool.replace_swarm(&pubkey, swarm).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::StaticSnodePool;
    use crate::testing::{ScriptedTransport, nodes};
    use serde_json::json;
    use skein_core::{AccountPrefix, UserKeys};
    use skein_crypto::signatures::SigningKey;
    use skein_crypto::subaccount::{SubaccountAuthData, SubaccountFlags};

    fn snode_json(n: u8) -> Value {
        json!({
            "ip": format!("10.0.1.{n}"),
            "port_https": 22021,
            "pubkey_ed25519": hex::encode([n; 32]),
            "pubkey_x25519": hex::encode([n; 32])
        })
    }

    fn client(transport: ScriptedTransport) -> (SwarmClient, Arc<StaticSnodePool>) {
        let pool = Arc::new(StaticSnodePool::new(nodes(6), 3));
        let client = SwarmClient::new(ClientConfig::default(), Arc::new(transport), pool.clone())
            .unwrap()
            .with_network_time(Arc::new(NetworkTime::new()))
            .with_retry_policy(RetryPolicy::once());
        (client, pool)
    }

    async fn seed_swarm(pool: &StaticSnodePool, pubkey: &AccountId) {
        pool.replace_swarm(pubkey, nodes(3)).await;
    }

    #[tokio::test]
    async fn test_store_returns_hash() {
        let (client, pool) = client(ScriptedTransport::per_request(|request| {
            assert_eq!(request["method"], "store");
            (200, json!({ "hash": "abc123" }))
        }));
        let keys = UserKeys::from_seed(&[1; 32]).unwrap();
        seed_swarm(&pool, keys.account_id()).await;

        let outcome = client
            .store(
                &Actor::User(&keys),
                Namespace::DEFAULT,
                b"ciphertext",
                86_400_000,
                1,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.hash, "abc123");
    }

    #[tokio::test]
    async fn test_unknown_swarm_is_fetched() {
        let transport = ScriptedTransport::per_request(|request| match request["method"].as_str() {
            Some("get_swarm") => (200, json!({ "snodes": [snode_json(21), snode_json(22), { "ip": "0.0.0.0", "port_https": 1, "pubkey_ed25519": "", "pubkey_x25519": "" }] })),
            _ => (200, json!({ "hash": "h" })),
        });
        let (client, pool) = client(transport);
        let keys = UserKeys::from_seed(&[2; 32]).unwrap();

        client
            .store(&Actor::User(&keys), Namespace::DEFAULT, b"x", 1_000, 1, &CancellationToken::new())
            .await
            .unwrap();
        let swarm = pool.swarm_for(keys.account_id()).await.unwrap();
        assert_eq!(swarm.len(), 2);
    }

    #[tokio::test]
    async fn test_swarm_lookup_shares_caller_budget() {
        let transport = Arc::new(ScriptedTransport::per_request(|request| match request["method"].as_str() {
            Some("get_swarm") => (503, json!("busy")),
            _ => (200, json!({ "hash": "h" })),
        }));
        let pool = Arc::new(StaticSnodePool::new(nodes(6), 3));
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2.0,
            jitter: false,
        };
        let client = SwarmClient::new(ClientConfig::default(), transport.clone(), pool)
            .unwrap()
            .with_retry_policy(policy);
        let keys = UserKeys::from_seed(&[4; 32]).unwrap();

        let err = client
            .store(&Actor::User(&keys), Namespace::DEFAULT, b"x", 1_000, 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::RetriesExhausted { attempts: 3, .. }), "{err:?}");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_delete_collects_reporting_members() {
        let (client, pool) = client(ScriptedTransport::per_request(|request| {
            assert_eq!(request["method"], "delete");
            (
                200,
                json!({ "swarm": {
                    "aa": { "deleted": ["h1"], "signature": "sig" },
                    "bb": { "failed": true, "code": 503 },
                    "cc": { "deleted": ["h1"], "signature": "sig" }
                }}),
            )
        }));
        let keys = UserKeys::from_seed(&[3; 32]).unwrap();
        seed_swarm(&pool, keys.account_id()).await;

        let outcome = client
            .delete(&Actor::User(&keys), &["h1".to_string()], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            outcome.deleted_by.into_iter().collect::<Vec<_>>(),
            vec!["aa".to_string(), "cc".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_with_no_hashes_is_precondition() {
        let (client, _) = client(ScriptedTransport::per_request(|_| (200, json!({}))));
        let keys = UserKeys::from_seed(&[3; 32]).unwrap();
        let err = client
            .delete(&Actor::User(&keys), &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_delete_all_namespaces() {
        let (client, pool) = client(ScriptedTransport::per_request(|request| {
            assert_eq!(request["params"]["namespace"], "all");
            (200, json!({ "swarm": { "aa": { "deleted": [] } } }))
        }));
        let keys = UserKeys::from_seed(&[4; 32]).unwrap();
        seed_swarm(&pool, keys.account_id()).await;

        let outcome = client
            .delete_all(&Actor::User(&keys), NamespaceSelector::All, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.deleted_by.len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_requires_admin() {
        let (client, pool) = client(ScriptedTransport::per_request(|request| {
            assert_eq!(request["method"], "revoke_subaccount");
            assert_eq!(request["params"]["revoke"].as_array().unwrap().len(), 1);
            (200, json!({}))
        }));
        let admin = SigningKey::from_seed(&[5; 32]);
        let member = SigningKey::from_seed(&[6; 32]);
        let auth = SubaccountAuthData::issue(&admin, &member.verifying_key(), SubaccountFlags::WRITE).unwrap();
        let token = *auth.token();

        let admin_record = GroupRecord::with_admin(admin);
        seed_swarm(&pool, &admin_record.pubkey).await;
        client
            .revoke_subaccounts(&admin_record, &[token], &CancellationToken::new())
            .await
            .unwrap();

        let mut member_record = GroupRecord::new(admin_record.pubkey).unwrap();
        member_record.subaccount = Some(auth);
        let err = client
            .revoke_subaccounts(&member_record, &[token], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::Request(_)));
    }

    #[tokio::test]
    async fn test_wrong_swarm_replaces_swarm() {
        let (client, pool) = client(ScriptedTransport::per_request(|_| {
            (421, json!({ "snodes": [snode_json(31), snode_json(32)] }))
        }));
        let keys = UserKeys::from_seed(&[7; 32]).unwrap();
        seed_swarm(&pool, keys.account_id()).await;

        let err = client
            .store(&Actor::User(&keys), Namespace::DEFAULT, b"x", 1_000, 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::RetriesExhausted { .. }));

        let swarm = pool.swarm_for(keys.account_id()).await.unwrap();
        let ips: Vec<String> = swarm.iter().map(|node| node.ip.to_string()).collect();
        assert_eq!(ips, vec!["10.0.1.31", "10.0.1.32"]);
    }

    #[tokio::test]
    async fn test_wrong_swarm_without_list_drops_target() {
        let (client, pool) = client(ScriptedTransport::per_request(|_| (421, json!({}))));
        let keys = UserKeys::from_seed(&[8; 32]).unwrap();
        seed_swarm(&pool, keys.account_id()).await;

        let _ = client
            .store(&Actor::User(&keys), Namespace::DEFAULT, b"x", 1_000, 1, &CancellationToken::new())
            .await;
        assert_eq!(pool.swarm_for(keys.account_id()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_network_time() {
        let (client, _) = client(ScriptedTransport::per_request(|request| {
            assert_eq!(request["method"], "info");
            (200, json!({ "timestamp": 4_000_000_000_000u64 }))
        }));
        let server = client.refresh_network_time(&CancellationToken::new()).await.unwrap();
        assert_eq!(server, 4_000_000_000_000);
        assert!(client.network_time().offset_ms().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_blinded_target_rejected() {
        let (client, _) = client(ScriptedTransport::per_request(|_| (200, json!({}))));
        let blinded = AccountId::new(AccountPrefix::Blinded15, [1; 32]);
        let err = client.get_swarm(&blinded, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SwarmError::Request(_)));
    }
}
