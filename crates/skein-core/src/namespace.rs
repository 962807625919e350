//! Storage namespaces.
//!
//! A namespace is a signed integer partitioning an account's messages. The
//! namespace decides which actor may authenticate against it: user namespaces
//! take the user's own key, group namespaces take the group admin key or a
//! subaccount, and the legacy closed-group namespace is unauthenticated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A storage namespace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(i16);

impl Namespace {
    /// One-to-one messages
    pub const DEFAULT: Self = Self(0);
    /// User profile config
    pub const USER_PROFILE: Self = Self(2);
    /// Contacts config
    pub const USER_CONTACTS: Self = Self(3);
    /// Conversation volatile info config
    pub const CONVO_INFO_VOLATILE: Self = Self(4);
    /// Joined groups config
    pub const USER_GROUPS: Self = Self(5);
    /// Group messages
    pub const GROUP_MESSAGES: Self = Self(11);
    /// Group encryption keys
    pub const GROUP_KEYS: Self = Self(12);
    /// Group info config
    pub const GROUP_INFO: Self = Self(13);
    /// Group members config
    pub const GROUP_MEMBERS: Self = Self(14);
    /// Revoked-member notices, readable by revoked subaccounts
    pub const REVOKED_RETRIEVABLE_GROUP_MESSAGES: Self = Self(-11);
    /// Legacy closed groups (unauthenticated)
    pub const LEGACY_CLOSED_GROUP: Self = Self(-10);

    /// Wrap a raw namespace value.
    #[must_use]
    pub const fn new(value: i16) -> Self {
        Self(value)
    }

    /// Raw value.
    #[must_use]
    pub const fn value(self) -> i16 {
        self.0
    }

    /// Namespaces owned by a standard user account.
    #[must_use]
    pub fn is_user_namespace(self) -> bool {
        matches!(
            self,
            Self::DEFAULT
                | Self::USER_PROFILE
                | Self::USER_CONTACTS
                | Self::CONVO_INFO_VOLATILE
                | Self::USER_GROUPS
        )
    }

    /// Namespaces owned by a closed group.
    #[must_use]
    pub fn is_group_namespace(self) -> bool {
        matches!(
            self,
            Self::GROUP_MESSAGES
                | Self::GROUP_KEYS
                | Self::GROUP_INFO
                | Self::GROUP_MEMBERS
                | Self::REVOKED_RETRIEVABLE_GROUP_MESSAGES
        )
    }

    /// The unauthenticated legacy group namespace.
    #[must_use]
    pub fn is_legacy_group(self) -> bool {
        self == Self::LEGACY_CLOSED_GROUP
    }

    /// Config namespaces hold state dumps whose expiry is bumped while polled.
    #[must_use]
    pub fn is_config(self) -> bool {
        matches!(
            self,
            Self::USER_PROFILE
                | Self::USER_CONTACTS
                | Self::CONVO_INFO_VOLATILE
                | Self::USER_GROUPS
                | Self::GROUP_KEYS
                | Self::GROUP_INFO
                | Self::GROUP_MEMBERS
        )
    }

    /// The namespace as it appears inside a signed string: empty for 0.
    #[must_use]
    pub fn signing_component(self) -> String {
        if self.0 == 0 {
            String::new()
        } else {
            self.0.to_string()
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({})", self.0)
    }
}

/// One namespace or every namespace (for `delete_all`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NamespaceSelector {
    /// A single namespace
    One(Namespace),
    /// All namespaces of the account
    All,
}

impl NamespaceSelector {
    /// Signed-string component: `"all"` or the namespace component.
    #[must_use]
    pub fn signing_component(self) -> String {
        match self {
            Self::One(ns) => ns.signing_component(),
            Self::All => "all".to_string(),
        }
    }

    /// JSON parameter value: the integer, or the string `"all"`.
    #[must_use]
    pub fn to_json(self) -> Value {
        match self {
            Self::One(ns) => Value::from(ns.value()),
            Self::All => Value::from("all"),
        }
    }
}

impl From<Namespace> for NamespaceSelector {
    fn from(ns: Namespace) -> Self {
        Self::One(ns)
    }
}
