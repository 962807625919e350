//! The typed sub-request model.
//!
//! Every storage RPC the client issues is a [`SubRequest`]. Builders are pure:
//! they resolve the actor's authenticator, sign the canonical string and
//! return the finished request, or a [`RequestError::Precondition`] for
//! caller errors. [`SubRequest::to_json`] produces the `{method, params}`
//! object placed inside a `batch`/`sequence` call.

use crate::account::AccountId;
use crate::auth::{Actor, Auth, GroupRecord, Operation};
use crate::error::{RequestError, Result};
use crate::namespace::{Namespace, NamespaceSelector};
use crate::signing::{self, ExpireMode};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Map, Value, json};
use skein_crypto::hash::ons_name_hash;
use skein_crypto::signatures::Signature;
use skein_crypto::subaccount::SubaccountToken;
use tracing::debug;

/// Maximum sub-requests in one batch call.
pub const MAX_BATCH_SIZE: usize = 20;

/// `retrieve` parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrieveRequest {
    /// Swarm owner
    pub pubkey: AccountId,
    /// Namespace polled
    pub namespace: Namespace,
    /// Cursor; empty means from the beginning
    pub last_hash: String,
    /// Signature timestamp; absent for unauthenticated requests
    pub timestamp: Option<u64>,
    /// Response size hint
    pub max_size: Option<i64>,
    /// Authentication
    pub auth: Auth,
}

/// `store` parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreRequest {
    /// Swarm owner
    pub pubkey: AccountId,
    /// Target namespace
    pub namespace: Namespace,
    /// Time to live in milliseconds
    pub ttl: u64,
    /// The message's own timestamp
    pub timestamp: u64,
    /// Timestamp covered by the signature
    pub sig_timestamp: u64,
    /// Opaque ciphertext
    pub data: Vec<u8>,
    /// Authentication
    pub auth: Auth,
}

/// `delete` parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteRequest {
    /// Swarm owner
    pub pubkey: AccountId,
    /// Hashes to delete
    pub message_hashes: Vec<String>,
    /// Authentication
    pub auth: Auth,
}

/// `delete_all` parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteAllRequest {
    /// Swarm owner
    pub pubkey: AccountId,
    /// One namespace or all
    pub namespace: NamespaceSelector,
    /// Signature timestamp
    pub timestamp: u64,
    /// Authentication
    pub auth: Auth,
}

/// `expire` parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpireRequest {
    /// Swarm owner
    pub pubkey: AccountId,
    /// Hashes whose expiry changes
    pub message_hashes: Vec<String>,
    /// New expiry, milliseconds since epoch
    pub expiry: u64,
    /// Direction constraint
    pub mode: ExpireMode,
    /// Authentication
    pub auth: Auth,
}

/// `get_expiries` parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetExpiriesRequest {
    /// Swarm owner
    pub pubkey: AccountId,
    /// Hashes queried
    pub message_hashes: Vec<String>,
    /// Signature timestamp
    pub timestamp: u64,
    /// Authentication
    pub auth: Auth,
}

/// `revoke_subaccount` / `unrevoke_subaccount` parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevokeRequest {
    /// Group id
    pub group: AccountId,
    /// Tokens to (un)revoke
    pub tokens: Vec<SubaccountToken>,
    /// Signature timestamp
    pub timestamp: u64,
    /// Admin signature
    pub admin_signature: Signature,
}

/// One storage RPC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubRequest {
    /// Poll a namespace
    Retrieve(RetrieveRequest),
    /// Write a message
    Store(StoreRequest),
    /// Delete by hash
    Delete(DeleteRequest),
    /// Delete a namespace or everything
    DeleteAll(DeleteAllRequest),
    /// Change expiries
    Expire(ExpireRequest),
    /// Read expiries
    GetExpiries(GetExpiriesRequest),
    /// Revoke subaccount tokens
    RevokeSubaccount(RevokeRequest),
    /// Lift subaccount revocations
    UnrevokeSubaccount(RevokeRequest),
    /// Look up the swarm of an account
    GetSwarm {
        /// Account whose swarm is wanted
        pubkey: AccountId,
    },
    /// Resolve a name hash
    OnsResolve {
        /// Base64 BLAKE2b-256 of the lowercased name
        name_hash_b64: String,
    },
    /// Ask a node for its clock
    NetworkTime,
}

fn require_hashes(hashes: &[String]) -> Result<()> {
    if hashes.is_empty() {
        return Err(RequestError::precondition("message hash list is empty"));
    }
    Ok(())
}

impl SubRequest {
    /// Build a `retrieve`.
    ///
    /// Unauthenticated (legacy group) retrieves omit the timestamp entirely.
    ///
    /// # Errors
    ///
    /// Precondition failures from actor resolution.
    pub fn retrieve(
        actor: &Actor<'_>,
        namespace: Namespace,
        last_hash: impl Into<String>,
        max_size: Option<i64>,
        now_ms: u64,
    ) -> Result<Self> {
        let pubkey = actor.pubkey();
        pubkey.ensure_swarm_target()?;
        let authenticator = actor.authenticator_for(Some(namespace), Operation::Retrieve)?;
        let (timestamp, auth) = if authenticator.is_authenticated() {
            let auth = authenticator.sign(&signing::retrieve_message(namespace, now_ms))?;
            (Some(now_ms), auth)
        } else {
            (None, Auth::Unauthenticated)
        };
        debug!(%pubkey, %namespace, "built retrieve");
        Ok(Self::Retrieve(RetrieveRequest {
            pubkey,
            namespace,
            last_hash: last_hash.into(),
            timestamp,
            max_size,
            auth,
        }))
    }

    /// Build a `store`. The signature covers `sig_timestamp_ms`; `timestamp_ms`
    /// is the message's own timestamp.
    ///
    /// # Errors
    ///
    /// Precondition failures from actor resolution or empty data.
    pub fn store(
        actor: &Actor<'_>,
        namespace: Namespace,
        data: Vec<u8>,
        ttl_ms: u64,
        timestamp_ms: u64,
        sig_timestamp_ms: u64,
    ) -> Result<Self> {
        if data.is_empty() {
            return Err(RequestError::precondition("store data is empty"));
        }
        let pubkey = actor.pubkey();
        pubkey.ensure_swarm_target()?;
        let authenticator = actor.authenticator_for(Some(namespace), Operation::Store)?;
        let auth = authenticator.sign(&signing::store_message(namespace, sig_timestamp_ms))?;
        Ok(Self::Store(StoreRequest {
            pubkey,
            namespace,
            ttl: ttl_ms,
            timestamp: timestamp_ms,
            sig_timestamp: sig_timestamp_ms,
            data,
            auth,
        }))
    }

    /// Build a `delete` by hashes.
    ///
    /// # Errors
    ///
    /// Precondition failures, including an empty hash list.
    pub fn delete(actor: &Actor<'_>, message_hashes: Vec<String>) -> Result<Self> {
        require_hashes(&message_hashes)?;
        let pubkey = actor.pubkey();
        pubkey.ensure_swarm_target()?;
        let authenticator = actor.authenticator_for(None, Operation::Delete)?;
        let auth = authenticator.sign(&signing::delete_message(&message_hashes))?;
        Ok(Self::Delete(DeleteRequest {
            pubkey,
            message_hashes,
            auth,
        }))
    }

    /// Build a `delete_all` for one namespace or all of them.
    ///
    /// # Errors
    ///
    /// Precondition failures from actor resolution.
    pub fn delete_all(actor: &Actor<'_>, namespace: NamespaceSelector, now_ms: u64) -> Result<Self> {
        let pubkey = actor.pubkey();
        pubkey.ensure_swarm_target()?;
        let scope = match namespace {
            NamespaceSelector::One(ns) => Some(ns),
            NamespaceSelector::All => None,
        };
        let authenticator = actor.authenticator_for(scope, Operation::DeleteAll)?;
        let auth = authenticator.sign(&signing::delete_all_message(namespace, now_ms))?;
        Ok(Self::DeleteAll(DeleteAllRequest {
            pubkey,
            namespace,
            timestamp: now_ms,
            auth,
        }))
    }

    /// Build an `expire`.
    ///
    /// # Errors
    ///
    /// Precondition failures, including an empty hash list.
    pub fn expire(
        actor: &Actor<'_>,
        message_hashes: Vec<String>,
        expiry_ms: u64,
        mode: ExpireMode,
    ) -> Result<Self> {
        require_hashes(&message_hashes)?;
        let pubkey = actor.pubkey();
        pubkey.ensure_swarm_target()?;
        let authenticator = actor.authenticator_for(None, Operation::Expire(mode))?;
        let auth = authenticator.sign(&signing::expire_message(mode, expiry_ms, &message_hashes))?;
        Ok(Self::Expire(ExpireRequest {
            pubkey,
            message_hashes,
            expiry: expiry_ms,
            mode,
            auth,
        }))
    }

    /// Build a `get_expiries`.
    ///
    /// # Errors
    ///
    /// Precondition failures, including an empty hash list.
    pub fn get_expiries(actor: &Actor<'_>, message_hashes: Vec<String>, now_ms: u64) -> Result<Self> {
        require_hashes(&message_hashes)?;
        let pubkey = actor.pubkey();
        pubkey.ensure_swarm_target()?;
        let authenticator = actor.authenticator_for(None, Operation::GetExpiries)?;
        let auth = authenticator.sign(&signing::get_expiries_message(now_ms, &message_hashes))?;
        Ok(Self::GetExpiries(GetExpiriesRequest {
            pubkey,
            message_hashes,
            timestamp: now_ms,
            auth,
        }))
    }

    fn revocation(
        method: &str,
        group: &GroupRecord,
        tokens: Vec<SubaccountToken>,
        now_ms: u64,
    ) -> Result<RevokeRequest> {
        if tokens.is_empty() {
            return Err(RequestError::precondition("subaccount token list is empty"));
        }
        let message = signing::revoke_subaccount_message(method, now_ms, &tokens);
        Ok(RevokeRequest {
            group: group.pubkey,
            admin_signature: group.sign_admin_message(&message)?,
            tokens,
            timestamp: now_ms,
        })
    }

    /// Build a `revoke_subaccount` (admin only).
    ///
    /// # Errors
    ///
    /// Precondition failure without the admin key or with no tokens.
    pub fn revoke_subaccount(group: &GroupRecord, tokens: Vec<SubaccountToken>, now_ms: u64) -> Result<Self> {
        Self::revocation("revoke_subaccount", group, tokens, now_ms).map(Self::RevokeSubaccount)
    }

    /// Build an `unrevoke_subaccount` (admin only).
    ///
    /// # Errors
    ///
    /// Precondition failure without the admin key or with no tokens.
    pub fn unrevoke_subaccount(group: &GroupRecord, tokens: Vec<SubaccountToken>, now_ms: u64) -> Result<Self> {
        Self::revocation("unrevoke_subaccount", group, tokens, now_ms).map(Self::UnrevokeSubaccount)
    }

    /// Build a `get_swarm`.
    ///
    /// # Errors
    ///
    /// Precondition failure for blinded ids.
    pub fn get_swarm(pubkey: &AccountId) -> Result<Self> {
        pubkey.ensure_swarm_target()?;
        Ok(Self::GetSwarm { pubkey: *pubkey })
    }

    /// Build a name lookup for `name`.
    ///
    /// # Errors
    ///
    /// Precondition failure for an empty name.
    pub fn ons_resolve(name: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(RequestError::precondition("name is empty"));
        }
        Ok(Self::OnsResolve {
            name_hash_b64: STANDARD.encode(ons_name_hash(name)),
        })
    }

    /// Build an `info` clock query.
    #[must_use]
    pub fn network_time() -> Self {
        Self::NetworkTime
    }

    /// RPC method name.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Retrieve(_) => "retrieve",
            Self::Store(_) => "store",
            Self::Delete(_) => "delete",
            Self::DeleteAll(_) => "delete_all",
            Self::Expire(_) => "expire",
            Self::GetExpiries(_) => "get_expiries",
            Self::RevokeSubaccount(_) => "revoke_subaccount",
            Self::UnrevokeSubaccount(_) => "unrevoke_subaccount",
            Self::GetSwarm { .. } => "get_swarm",
            Self::OnsResolve { .. } => "oxend_request",
            Self::NetworkTime => "info",
        }
    }

    /// The request's auth payload, for variants that carry one.
    #[must_use]
    pub fn auth(&self) -> Option<&Auth> {
        match self {
            Self::Retrieve(r) => Some(&r.auth),
            Self::Store(r) => Some(&r.auth),
            Self::Delete(r) => Some(&r.auth),
            Self::DeleteAll(r) => Some(&r.auth),
            Self::Expire(r) => Some(&r.auth),
            Self::GetExpiries(r) => Some(&r.auth),
            Self::RevokeSubaccount(_)
            | Self::UnrevokeSubaccount(_)
            | Self::GetSwarm { .. }
            | Self::OnsResolve { .. }
            | Self::NetworkTime => None,
        }
    }

    /// Check the auth invariant: every variant except `get_swarm`, name
    /// lookups, `info` and legacy-group retrieve/store carries exactly one
    /// signature, and unauthenticated retrieves carry no timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Precondition`] on violation.
    pub fn validate(&self) -> Result<()> {
        let legacy_namespace = match self {
            Self::Retrieve(r) => Some(r.namespace.is_legacy_group()),
            Self::Store(r) => Some(r.namespace.is_legacy_group()),
            _ => None,
        };
        if let Some(auth) = self.auth() {
            let may_be_unauthenticated = legacy_namespace == Some(true);
            if auth.is_authenticated() == may_be_unauthenticated {
                return Err(RequestError::precondition(format!(
                    "{} auth does not match its namespace class",
                    self.method()
                )));
            }
        }
        match self {
            Self::Retrieve(r) if r.timestamp.is_some() != r.auth.is_authenticated() => Err(
                RequestError::precondition("retrieve timestamp present without signature"),
            ),
            Self::Delete(DeleteRequest { message_hashes, .. })
            | Self::Expire(ExpireRequest { message_hashes, .. })
            | Self::GetExpiries(GetExpiriesRequest { message_hashes, .. }) => {
                require_hashes(message_hashes)
            }
            Self::RevokeSubaccount(r) | Self::UnrevokeSubaccount(r) if r.tokens.is_empty() => {
                Err(RequestError::precondition("subaccount token list is empty"))
            }
            _ => Ok(()),
        }
    }

    /// `params` object for this request.
    #[must_use]
    pub fn params(&self) -> Value {
        let mut params = Map::new();
        match self {
            Self::Retrieve(r) => {
                params.insert("pubkey".into(), r.pubkey.to_string().into());
                params.insert("namespace".into(), r.namespace.value().into());
                params.insert("last_hash".into(), r.last_hash.clone().into());
                if let Some(timestamp) = r.timestamp {
                    params.insert("timestamp".into(), timestamp.into());
                }
                if let Some(max_size) = r.max_size {
                    params.insert("max_size".into(), max_size.into());
                }
                r.auth.write_params(&mut params);
            }
            Self::Store(r) => {
                params.insert("pubkey".into(), r.pubkey.to_string().into());
                params.insert("namespace".into(), r.namespace.value().into());
                params.insert("ttl".into(), r.ttl.into());
                params.insert("timestamp".into(), r.timestamp.into());
                if r.auth.is_authenticated() {
                    params.insert("sig_timestamp".into(), r.sig_timestamp.into());
                }
                params.insert("data".into(), STANDARD.encode(&r.data).into());
                r.auth.write_params(&mut params);
            }
            Self::Delete(r) => {
                params.insert("pubkey".into(), r.pubkey.to_string().into());
                params.insert("messages".into(), r.message_hashes.clone().into());
                r.auth.write_params(&mut params);
            }
            Self::DeleteAll(r) => {
                params.insert("pubkey".into(), r.pubkey.to_string().into());
                params.insert("namespace".into(), r.namespace.to_json());
                params.insert("timestamp".into(), r.timestamp.into());
                r.auth.write_params(&mut params);
            }
            Self::Expire(r) => {
                params.insert("pubkey".into(), r.pubkey.to_string().into());
                params.insert("messages".into(), r.message_hashes.clone().into());
                params.insert("expiry".into(), r.expiry.into());
                match r.mode {
                    ExpireMode::Shorten => {
                        params.insert("shorten".into(), true.into());
                    }
                    ExpireMode::Extend => {
                        params.insert("extend".into(), true.into());
                    }
                    ExpireMode::Force => {}
                }
                r.auth.write_params(&mut params);
            }
            Self::GetExpiries(r) => {
                params.insert("pubkey".into(), r.pubkey.to_string().into());
                params.insert("messages".into(), r.message_hashes.clone().into());
                params.insert("timestamp".into(), r.timestamp.into());
                r.auth.write_params(&mut params);
            }
            Self::RevokeSubaccount(r) | Self::UnrevokeSubaccount(r) => {
                let key = if matches!(self, Self::RevokeSubaccount(_)) {
                    "revoke"
                } else {
                    "unrevoke"
                };
                params.insert("pubkey".into(), r.group.to_string().into());
                params.insert(
                    key.into(),
                    r.tokens.iter().map(SubaccountToken::to_hex).collect::<Vec<_>>().into(),
                );
                params.insert("timestamp".into(), r.timestamp.into());
                params.insert(
                    "signature".into(),
                    STANDARD.encode(r.admin_signature.as_bytes()).into(),
                );
            }
            Self::GetSwarm { pubkey } => {
                params.insert("pubkey".into(), pubkey.to_string().into());
            }
            Self::OnsResolve { name_hash_b64 } => {
                params.insert("endpoint".into(), "ons_resolve".into());
                params.insert("params".into(), json!({ "type": 0, "name_hash": name_hash_b64 }));
            }
            Self::NetworkTime => {}
        }
        Value::Object(params)
    }

    /// The `{method, params}` object sent inside a batch.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({ "method": self.method(), "params": self.params() })
    }
}
