//! Actors and per-actor authentication.
//!
//! An [`Actor`] is whoever owns the swarm being addressed: a standard user, a
//! closed group (which we either administer or hold a subaccount for) or a
//! legacy closed group. [`Actor::authenticator_for`] applies the namespace and
//! permission rules and returns the [`Authenticator`] that will sign the
//! request; signing produces an [`Auth`] that knows how to serialize itself.
//!
//! Resolution rules:
//! - user: always the user's own Ed25519 key, user namespaces only
//! - legacy group: no signature at all, legacy namespace only
//! - closed group: admin key if we hold it, else subaccount credentials,
//!   else a precondition failure (never a silent downgrade)

use crate::account::{AccountId, AccountPrefix};
use crate::error::{RequestError, Result};
use crate::namespace::Namespace;
use crate::signing::ExpireMode;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Map, Value};
use skein_crypto::signatures::{Signature, SigningKey};
use skein_crypto::subaccount::{SubaccountAuthData, SubaccountFlags, SubaccountToken};

/// The local user's identity.
#[derive(Clone, Debug)]
pub struct UserKeys {
    account: AccountId,
    ed25519: SigningKey,
}

impl UserKeys {
    /// Derive the `05` account id from an Ed25519 key.
    ///
    /// # Errors
    ///
    /// Fails only if the public key cannot be mapped to X25519.
    pub fn from_signing_key(ed25519: SigningKey) -> Result<Self> {
        let x25519 = ed25519.verifying_key().to_x25519()?;
        Ok(Self {
            account: AccountId::new(AccountPrefix::Standard, x25519),
            ed25519,
        })
    }

    /// Build from a 32-byte Ed25519 seed.
    ///
    /// # Errors
    ///
    /// See [`UserKeys::from_signing_key`].
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        Self::from_signing_key(SigningKey::from_seed(seed))
    }

    /// The user's `05` account id.
    #[must_use]
    pub fn account_id(&self) -> &AccountId {
        &self.account
    }

    /// The user's Ed25519 key.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.ed25519
    }
}

/// Local state for a closed group.
#[derive(Clone, Debug)]
pub struct GroupRecord {
    /// The group's `03` id
    pub pubkey: AccountId,
    /// Group secret key, present when we are an admin
    pub admin: Option<SigningKey>,
    /// Delegated credentials, present when we are a member
    pub subaccount: Option<SubaccountAuthData>,
    /// Current key generation
    pub key_generation: u64,
}

impl GroupRecord {
    /// Record for a group we are a plain member of.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Precondition`] unless `pubkey` is a group id.
    pub fn new(pubkey: AccountId) -> Result<Self> {
        if !pubkey.is_group() {
            return Err(RequestError::precondition("group records need an 03-prefixed id"));
        }
        Ok(Self {
            pubkey,
            admin: None,
            subaccount: None,
            key_generation: 0,
        })
    }

    /// Record for a group we administer.
    #[must_use]
    pub fn with_admin(admin: SigningKey) -> Self {
        Self {
            pubkey: AccountId::new(AccountPrefix::Group, admin.verifying_key().to_bytes()),
            admin: Some(admin),
            subaccount: None,
            key_generation: 0,
        }
    }

    /// Whether we hold the group secret key.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin.is_some()
    }

    /// Whether a kick/removal message at `generation` is still current.
    ///
    /// Messages from older key generations are stale and must be ignored.
    #[must_use]
    pub fn accepts_generation(&self, generation: u64) -> bool {
        generation >= self.key_generation
    }

    /// The admin key.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Precondition`] when we are not an admin.
    pub fn admin_key(&self) -> Result<&SigningKey> {
        self.admin
            .as_ref()
            .ok_or_else(|| RequestError::precondition("missing group admin secret key"))
    }

    /// Sign an `INVITE` / `INFO_CHANGE` / `MEMBER_CHANGE` string with the admin key.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Precondition`] when we are not an admin.
    pub fn sign_admin_message(&self, message: &[u8]) -> Result<Signature> {
        Ok(self.admin_key()?.sign(message))
    }
}

/// Authenticated operation kinds, for permission checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Read messages
    Retrieve,
    /// Write a message
    Store,
    /// Delete by hash
    Delete,
    /// Delete a namespace or everything
    DeleteAll,
    /// Change expiries
    Expire(ExpireMode),
    /// Read expiries
    GetExpiries,
    /// Revoke or unrevoke subaccounts
    RevokeSubaccount,
}

impl Operation {
    /// Flags a subaccount needs for this operation; `None` means admin only.
    fn subaccount_flags(self) -> Option<SubaccountFlags> {
        match self {
            Self::Retrieve | Self::GetExpiries | Self::Expire(ExpireMode::Extend) => {
                Some(SubaccountFlags::NONE)
            }
            Self::Store => Some(SubaccountFlags::WRITE),
            Self::Delete | Self::DeleteAll | Self::Expire(_) => Some(SubaccountFlags::DELETE),
            Self::RevokeSubaccount => None,
        }
    }
}

/// Owner of the swarm a request addresses.
#[derive(Clone, Copy, Debug)]
pub enum Actor<'a> {
    /// A standard user account
    User(&'a UserKeys),
    /// A closed group; `member` is our own key when acting via a subaccount
    Group {
        /// Local group state
        record: &'a GroupRecord,
        /// Our Ed25519 key, for subaccount signing
        member: Option<&'a SigningKey>,
    },
    /// A legacy closed group, addressed by its id only
    LegacyGroup(AccountId),
}

impl<'a> Actor<'a> {
    /// The swarm owner's id.
    #[must_use]
    pub fn pubkey(&self) -> AccountId {
        match self {
            Self::User(keys) => *keys.account_id(),
            Self::Group { record, .. } => record.pubkey,
            Self::LegacyGroup(id) => *id,
        }
    }

    /// Resolve who signs `op` against `namespace`.
    ///
    /// `namespace` is `None` for operations not scoped to one namespace.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Precondition`] when the namespace does not
    /// belong to this actor class, or when the keys needed are missing.
    pub fn authenticator_for(&self, namespace: Option<Namespace>, op: Operation) -> Result<Authenticator<'a>> {
        match *self {
            Self::User(keys) => {
                if let Some(ns) = namespace.filter(|ns| !ns.is_user_namespace()) {
                    return Err(RequestError::precondition(format!(
                        "namespace {ns} is not accessible with user auth"
                    )));
                }
                if op == Operation::RevokeSubaccount {
                    return Err(RequestError::precondition("users have no subaccounts to revoke"));
                }
                Ok(Authenticator::User(keys))
            }
            Self::LegacyGroup(_) => {
                if namespace != Some(Namespace::LEGACY_CLOSED_GROUP) {
                    return Err(RequestError::precondition(
                        "legacy groups only address the legacy closed group namespace",
                    ));
                }
                if !matches!(op, Operation::Retrieve | Operation::Store) {
                    return Err(RequestError::precondition(
                        "legacy groups only support retrieve and store",
                    ));
                }
                Ok(Authenticator::Unauthenticated)
            }
            Self::Group { record, member } => {
                if let Some(ns) = namespace.filter(|ns| !ns.is_group_namespace()) {
                    return Err(RequestError::precondition(format!(
                        "namespace {ns} is not a group namespace"
                    )));
                }
                if let Some(admin) = record.admin.as_ref() {
                    return Ok(Authenticator::GroupAdmin(admin));
                }
                let Some(required) = op.subaccount_flags() else {
                    return Err(RequestError::precondition(
                        "missing group admin secret key for an admin-only operation",
                    ));
                };
                match (record.subaccount.as_ref(), member) {
                    (Some(auth), Some(member)) => {
                        if !auth.flags().contains(required) {
                            return Err(RequestError::precondition(format!(
                                "subaccount lacks permission for {op:?}"
                            )));
                        }
                        Ok(Authenticator::GroupSubaccount { auth, member })
                    }
                    (Some(_), None) => Err(RequestError::precondition(
                        "subaccount signing needs the member's Ed25519 key",
                    )),
                    (None, _) => Err(RequestError::precondition(
                        "missing group admin secret key and subaccount auth data",
                    )),
                }
            }
        }
    }
}

/// A resolved signer.
#[derive(Debug)]
pub enum Authenticator<'a> {
    /// The user's own key
    User(&'a UserKeys),
    /// The group's secret key
    GroupAdmin(&'a SigningKey),
    /// Delegated subaccount signing
    GroupSubaccount {
        /// Subaccount credentials
        auth: &'a SubaccountAuthData,
        /// Our Ed25519 key
        member: &'a SigningKey,
    },
    /// No signature (legacy groups)
    Unauthenticated,
}

impl Authenticator<'_> {
    /// Whether requests signed by this authenticator carry a signature.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Unauthenticated)
    }

    /// Sign a canonical string.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if subaccount signing fails.
    pub fn sign(&self, message: &[u8]) -> Result<Auth> {
        Ok(match self {
            Self::User(keys) => Auth::User {
                pubkey_ed25519: keys.signing_key().verifying_key().to_bytes(),
                signature: keys.signing_key().sign(message),
            },
            Self::GroupAdmin(key) => Auth::GroupAdmin {
                signature: key.sign(message),
            },
            Self::GroupSubaccount { auth, member } => Auth::GroupSubaccount {
                token: *auth.token(),
                token_signature: *auth.admin_signature(),
                signature: auth.sign(member, message)?,
            },
            Self::Unauthenticated => Auth::Unauthenticated,
        })
    }
}

/// Authentication payload attached to a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Auth {
    /// User signature plus the user's Ed25519 key
    User {
        /// Ed25519 key the `05` id was derived from
        pubkey_ed25519: [u8; 32],
        /// Signature over the canonical string
        signature: Signature,
    },
    /// Signature by the group key itself
    GroupAdmin {
        /// Signature over the canonical string
        signature: Signature,
    },
    /// Subaccount token, the admin's token signature and the member signature
    GroupSubaccount {
        /// Subaccount token
        token: SubaccountToken,
        /// Group signature over the token
        token_signature: Signature,
        /// Signature under the token's blinded key
        signature: Signature,
    },
    /// Legacy group requests
    Unauthenticated,
}

impl Auth {
    /// Whether a signature is attached.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Unauthenticated)
    }

    /// The request signature, if any.
    #[must_use]
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Self::User { signature, .. }
            | Self::GroupAdmin { signature }
            | Self::GroupSubaccount { signature, .. } => Some(signature),
            Self::Unauthenticated => None,
        }
    }

    /// Add the auth fields to a request's `params` object.
    pub fn write_params(&self, params: &mut Map<String, Value>) {
        match self {
            Self::User {
                pubkey_ed25519,
                signature,
            } => {
                params.insert("pubkey_ed25519".into(), hex::encode(pubkey_ed25519).into());
                params.insert("signature".into(), STANDARD.encode(signature.as_bytes()).into());
            }
            Self::GroupAdmin { signature } => {
                params.insert("signature".into(), STANDARD.encode(signature.as_bytes()).into());
            }
            Self::GroupSubaccount {
                token,
                token_signature,
                signature,
            } => {
                params.insert("subaccount".into(), token.to_hex().into());
                params.insert(
                    "subaccount_sig".into(),
                    STANDARD.encode(token_signature.as_bytes()).into(),
                );
                params.insert("signature".into(), STANDARD.encode(signature.as_bytes()).into());
            }
            Self::Unauthenticated => {}
        }
    }
}
