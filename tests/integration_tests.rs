//! End-to-end tests: swarm client → onion router → simulated network.
//!
//! Every request here is really wrapped in onion layers, peeled hop by hop
//! with each node's X25519 secret, answered by the simulated storage node and
//! sealed back under the destination key.

use skein_core::{
    Actor, ClientConfig, ExpireMode, GroupRecord, Namespace, NamespaceSelector, NetworkTime, UserKeys,
};
use skein_crypto::signatures::SigningKey;
use skein_crypto::subaccount::{SubaccountAuthData, SubaccountFlags};
use skein_integration_tests::{FORGED_EXPIRY, Fault, SimLink, SimNetwork, account, now_ms};
use skein_swarm::{ConfigBump, RetrieveCursor, RetryPolicy, SnodePool, StaticSnodePool, SwarmClient, SwarmError};
use skein_transport::OnionRouter;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TTL: u64 = 14 * 24 * 60 * 60 * 1000;
const DAY: u64 = 24 * 60 * 60 * 1000;

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        multiplier: 2.0,
        jitter: false,
    }
}

fn client(net: &Arc<SimNetwork>, path_length: usize) -> (SwarmClient, Arc<StaticSnodePool>) {
    let pool = Arc::new(StaticSnodePool::new(net.snodes(), path_length));
    let transport = Arc::new(OnionRouter::new(SimLink(Arc::clone(net))));
    let mut config = ClientConfig::default();
    config.network.path_length = path_length;
    let client = SwarmClient::new(config, transport, pool.clone())
        .unwrap()
        .with_network_time(Arc::new(NetworkTime::new()))
        .with_retry_policy(fast_retry(5));
    (client, pool)
}

fn user(n: u8) -> UserKeys {
    UserKeys::from_seed(&[n; 32]).unwrap()
}

async fn store(client: &SwarmClient, actor: &Actor<'_>, namespace: Namespace, data: &[u8]) -> String {
    client
        .store(actor, namespace, data, TTL, now_ms(), &CancellationToken::new())
        .await
        .unwrap()
        .hash
}

// ============================================================================
// Store and retrieve
// ============================================================================

#[tokio::test]
async fn test_store_then_retrieve_across_namespaces() {
    let net = SimNetwork::new(8, 3);
    let (client, pool) = client(&net, 3);
    let keys = user(1);
    let actor = Actor::User(&keys);

    let first = store(&client, &actor, Namespace::DEFAULT, b"hello").await;
    store(&client, &actor, Namespace::DEFAULT, b"world").await;
    store(&client, &actor, Namespace::USER_CONTACTS, b"contacts config").await;
    assert_eq!(net.stored(keys.account_id()), 3);
    assert_eq!(pool.swarm_for(keys.account_id()).await.unwrap().len(), 3);

    let cursors = [
        RetrieveCursor::new(Namespace::DEFAULT, ""),
        RetrieveCursor::new(Namespace::USER_CONTACTS, ""),
    ];
    let outcome = client
        .retrieve(&actor, &cursors, None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.online);
    assert_eq!(outcome.namespaces.len(), 2);
    assert_eq!(outcome.namespaces[0].namespace, Namespace::DEFAULT);
    assert_eq!(outcome.namespaces[0].messages.len(), 2);
    assert_eq!(outcome.namespaces[0].messages[0].data, b"hello");
    assert_eq!(outcome.namespaces[1].messages.len(), 1);
    assert_eq!(outcome.namespaces[1].messages[0].data, b"contacts config");
    assert!(client.network_time().offset_ms().is_some(), "clock recalibrated from the first result");

    let resumed = client
        .retrieve(
            &actor,
            &[RetrieveCursor::new(Namespace::DEFAULT, first)],
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(resumed.namespaces[0].messages.len(), 1);
    assert_eq!(resumed.namespaces[0].messages[0].data, b"world");
}

#[tokio::test]
async fn test_retrieve_with_config_bump() {
    let net = SimNetwork::new(8, 3);
    let (client, _) = client(&net, 3);
    let keys = user(2);
    let actor = Actor::User(&keys);

    let config_hash = store(&client, &actor, Namespace::USER_PROFILE, b"profile").await;
    let bumped_to = now_ms() + 30 * DAY;
    let bump = ConfigBump {
        hashes: vec![config_hash.clone()],
        expiry_ms: bumped_to,
    };
    let outcome = client
        .retrieve(
            &actor,
            &[RetrieveCursor::new(Namespace::USER_PROFILE, "")],
            Some(&bump),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.bump_code, Some(200));
    assert_eq!(outcome.namespaces.len(), 1);

    let expiries = client
        .get_expiries(&actor, &[config_hash.clone()], &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(expiries[&config_hash], bumped_to);
}

#[tokio::test]
async fn test_group_admin_and_subaccount_store() {
    let net = SimNetwork::new(8, 3);
    let (client, _) = client(&net, 3);

    let admin = GroupRecord::with_admin(SigningKey::from_seed(&[30; 32]));
    let admin_actor = Actor::Group {
        record: &admin,
        member: None,
    };
    store(&client, &admin_actor, Namespace::GROUP_INFO, b"group info").await;

    let member_key = SigningKey::from_seed(&[31; 32]);
    let mut member_record = GroupRecord::new(admin.pubkey).unwrap();
    member_record.subaccount = Some(
        SubaccountAuthData::issue(
            &SigningKey::from_seed(&[30; 32]),
            &member_key.verifying_key(),
            SubaccountFlags::WRITE,
        )
        .unwrap(),
    );
    let member_actor = Actor::Group {
        record: &member_record,
        member: Some(&member_key),
    };
    store(&client, &member_actor, Namespace::GROUP_MESSAGES, b"hi group").await;

    let outcome = client
        .retrieve(
            &member_actor,
            &[
                RetrieveCursor::new(Namespace::GROUP_INFO, ""),
                RetrieveCursor::new(Namespace::GROUP_MESSAGES, ""),
            ],
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.namespaces[0].messages.len(), 1);
    assert_eq!(outcome.namespaces[1].messages[0].data, b"hi group");

    // Subaccounts cannot revoke; the admin can.
    let token = *member_record.subaccount.as_ref().unwrap().token();
    assert!(matches!(
        client
            .revoke_subaccounts(&member_record, &[token], &CancellationToken::new())
            .await,
        Err(SwarmError::Request(_))
    ));
    client
        .revoke_subaccounts(&admin, &[token], &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_legacy_group_roundtrip() {
    let net = SimNetwork::new(8, 3);
    let (client, _) = client(&net, 3);
    let legacy = Actor::LegacyGroup(account(40));

    store(&client, &legacy, Namespace::LEGACY_CLOSED_GROUP, b"old style").await;
    let outcome = client
        .retrieve(
            &legacy,
            &[RetrieveCursor::new(Namespace::LEGACY_CLOSED_GROUP, "")],
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.namespaces[0].messages[0].data, b"old style");
}

// ============================================================================
// Expiry
// ============================================================================

#[tokio::test]
async fn test_shorten_and_unknown_hash_forced_to_now() {
    let net = SimNetwork::new(8, 3);
    let (client, _) = client(&net, 3);
    let keys = user(3);
    let actor = Actor::User(&keys);
    let hash = store(&client, &actor, Namespace::DEFAULT, b"short lived").await;

    let target = now_ms() + 60_000;
    let targets: BTreeMap<String, u64> = [(hash.clone(), target), ("never-stored".to_string(), target)].into();
    let before = now_ms();
    let merged = client
        .set_expiry(&actor, &targets, ExpireMode::Shorten, &CancellationToken::new())
        .await
        .unwrap();
    let after = now_ms();

    assert_eq!(merged[&hash], target);
    let forced = merged["never-stored"];
    assert!(forced >= before.saturating_sub(1_000) && forced <= after + 1_000, "{forced}");
}

#[tokio::test]
async fn test_45_hashes_use_three_expire_batches() {
    let net = SimNetwork::new(8, 3);
    let (client, _) = client(&net, 3);
    let keys = user(4);
    let actor = Actor::User(&keys);

    let mut targets = BTreeMap::new();
    let expiry = now_ms() + 20 * DAY;
    for i in 0..45u32 {
        let hash = store(&client, &actor, Namespace::DEFAULT, &i.to_le_bytes()).await;
        targets.insert(hash, expiry);
    }

    let merged = client
        .set_expiry(&actor, &targets, ExpireMode::Extend, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(merged, targets);

    let expire_calls = net.requests().iter().filter(|(_, method)| method == "expire").count();
    assert_eq!(expire_calls, 3);
}

#[tokio::test]
async fn test_forged_expiry_rejected_and_node_ejected() {
    let net = SimNetwork::new(8, 3);
    net.set_fault(0, Fault::ForgeExpiry);
    let (client, pool) = client(&net, 3);
    let keys = user(5);
    let actor = Actor::User(&keys);
    let hash = store(&client, &actor, Namespace::DEFAULT, b"target").await;

    let target = now_ms() + 40 * DAY;
    let merged = client
        .set_expiry(&actor, &[(hash.clone(), target)].into(), ExpireMode::Extend, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(merged[&hash], target);
    assert_ne!(merged[&hash], FORGED_EXPIRY);

    let forger = net.snode(0);
    let swarm = pool.swarm_for(keys.account_id()).await.unwrap();
    assert!(!swarm.contains(&forger));
    assert!(!pool.contains(&forger.pubkey_ed25519).await);
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_and_delete_all() {
    let net = SimNetwork::new(8, 3);
    let (client, _) = client(&net, 3);
    let keys = user(6);
    let actor = Actor::User(&keys);
    let expected: std::collections::BTreeSet<String> = net.swarm().iter().map(|n| n.ed25519_hex()).collect();

    let hash = store(&client, &actor, Namespace::DEFAULT, b"delete me").await;
    store(&client, &actor, Namespace::DEFAULT, b"keep me").await;
    store(&client, &actor, Namespace::USER_CONTACTS, b"contacts").await;

    let outcome = client
        .delete(&actor, &[hash], &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.deleted_by, expected);
    assert_eq!(net.stored(keys.account_id()), 2);

    assert!(matches!(
        client.delete(&actor, &[], &CancellationToken::new()).await,
        Err(SwarmError::Request(_))
    ));

    let outcome = client
        .delete_all(
            &actor,
            NamespaceSelector::One(Namespace::USER_CONTACTS),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.deleted_by, expected);
    assert_eq!(net.stored(keys.account_id()), 1);

    let outcome = client
        .delete_all(&actor, NamespaceSelector::All, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.deleted_by, expected);
    assert_eq!(net.stored(keys.account_id()), 0);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_wrong_swarm_member_dropped_then_retried() {
    let net = SimNetwork::new(8, 3);
    net.set_fault(0, Fault::WrongSwarm);
    let (client, pool) = client(&net, 3);
    let keys = user(7);
    let actor = Actor::User(&keys);

    for i in 0..8u8 {
        store(&client, &actor, Namespace::DEFAULT, &[i]).await;
    }
    assert_eq!(net.stored(keys.account_id()), 8);

    let moved = net.snode(0);
    let hit = net.requests().iter().any(|(node, _)| *node == moved.pubkey_ed25519);
    if hit {
        let swarm = pool.swarm_for(keys.account_id()).await.unwrap();
        assert!(!swarm.contains(&moved));
    }
}

#[tokio::test]
async fn test_offline_node_reported_by_hop_is_ejected() {
    let net = SimNetwork::new(8, 2);
    net.set_fault(0, Fault::Offline);
    let (client, pool) = client(&net, 1);
    let client = client.with_retry_policy(fast_retry(8));
    let keys = user(8);
    let actor = Actor::User(&keys);
    let offline = net.snode(0).pubkey_ed25519;

    let mut stored = 0;
    for i in 0..50u8 {
        let result = client
            .store(&actor, Namespace::DEFAULT, &[i], TTL, now_ms(), &CancellationToken::new())
            .await;
        stored += usize::from(result.is_ok());
        if !pool.contains(&offline).await {
            break;
        }
    }
    assert!(!pool.contains(&offline).await, "offline node still in pool");
    assert!(stored > 0);
    assert!(net.reported_missing().iter().all(|key| *key == offline));
    assert!(net.stored(keys.account_id()) >= stored);
}

#[tokio::test]
async fn test_cancelled_call_sends_nothing() {
    let net = SimNetwork::new(8, 3);
    let (client, _) = client(&net, 3);
    let keys = user(9);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = client
        .retrieve(
            &Actor::User(&keys),
            &[RetrieveCursor::new(Namespace::DEFAULT, "")],
            None,
            &cancel,
        )
        .await;
    assert_eq!(result, Err(SwarmError::Cancelled));
    assert!(net.requests().is_empty());
}

// ============================================================================
// Name resolution and clock
// ============================================================================

#[tokio::test]
async fn test_name_resolves_with_three_validators() {
    let net = SimNetwork::new(8, 3);
    net.register_name("Alice", &account(77));
    let (client, _) = client(&net, 3);

    let id = client.resolve_ons("alice", &CancellationToken::new()).await.unwrap();
    assert_eq!(id, account(77));

    let validators: std::collections::HashSet<[u8; 32]> = net
        .requests()
        .into_iter()
        .filter(|(_, method)| method == "oxend_request")
        .map(|(node, _)| node)
        .collect();
    assert_eq!(validators.len(), 3);
}

#[tokio::test]
async fn test_unknown_name_fails() {
    let net = SimNetwork::new(8, 3);
    let (client, _) = client(&net, 3);
    assert!(matches!(
        client.resolve_ons("nobody", &CancellationToken::new()).await,
        Err(SwarmError::OnsResolution(_))
    ));
}

#[tokio::test]
async fn test_refresh_network_time() {
    let net = SimNetwork::new(8, 3);
    let (client, _) = client(&net, 3);
    let server = client.refresh_network_time(&CancellationToken::new()).await.unwrap();
    assert!(server > 0);
    let offset = client.network_time().offset_ms().unwrap();
    assert!(offset.abs() < 5_000, "{offset}");
}
