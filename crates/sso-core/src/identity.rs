//! Identity, realm, and access-control domain types.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Prefix reserved for owner access-control tokens.
///
/// Strings beginning with this literal prefix are synthesized by the
/// Credentials Store on insert and are rejected when a client attempts to
/// set them directly through the Identity API.
pub const OWNER_TOKEN_PREFIX: &str = "AID::";

static OWNER_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^AID::.*").expect("static regex is valid"));

/// Returns whether `token` matches the reserved owner-token pattern.
#[must_use]
pub fn is_owner_token(token: &str) -> bool {
    OWNER_TOKEN_RE.is_match(token)
}

/// An identity id: either `New` (unsaved, the wire value `0`) or
/// `Persisted` (a stable, strictly positive row id).
///
/// Modeled as an explicit sum type rather than leaking the `0 = new`
/// sentinel into every API that touches an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityId {
    /// Transient identity, not yet persisted.
    New,
    /// A persisted identity's stable row id.
    Persisted(u32),
}

impl IdentityId {
    /// Construct from the wire representation (`0` means [`IdentityId::New`]).
    #[must_use]
    pub fn from_wire(id: u32) -> Self {
        if id == 0 {
            Self::New
        } else {
            Self::Persisted(id)
        }
    }

    /// Convert back to the wire representation.
    #[must_use]
    pub fn to_wire(self) -> u32 {
        match self {
            Self::New => 0,
            Self::Persisted(id) => id,
        }
    }

    /// Whether this id has been assigned by the store.
    #[must_use]
    pub fn is_persisted(self) -> bool {
        matches!(self, Self::Persisted(_))
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

impl Serialize for IdentityId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for IdentityId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = u32::deserialize(deserializer)?;
        Ok(Self::from_wire(wire))
    }
}

/// A `(realm, hostname)` scoping pair, per the original schema's
/// `REALMS(identity_id, realm, hostname)` composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Realm {
    /// The realm name.
    pub realm: String,
    /// The hostname the realm applies to.
    pub hostname: String,
}

/// One ACL grant: a token's permission to use a (method, mechanism) — or
/// the entire method, when `mechanism` is `None` — on one identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AclEntry {
    /// The method the grant applies to.
    pub method: String,
    /// The specific mechanism, or `None` for "the whole method".
    pub mechanism: Option<String>,
    /// The token this grant is issued to.
    pub token: String,
}

/// A full identity record, as assembled by a Credentials Store join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// The identity's id.
    pub id: IdentityId,
    /// Display caption.
    pub caption: String,
    /// Username.
    pub username: String,
    /// Password, present only when `store_password` is true and the
    /// caller requested it (see `Credentials::credentials`).
    pub password: Option<String>,
    /// Whether the password should be persisted.
    pub store_password: bool,
    /// Small integer identity type.
    pub identity_type: i32,
    /// Realms this identity is scoped to.
    pub realms: HashSet<Realm>,
    /// Access-control tokens granted on this identity.
    pub access_control_list: HashSet<String>,
    /// Mapping from method name to the set of mechanisms enabled for it.
    pub methods: HashMap<String, HashSet<String>>,
}

impl Identity {
    /// A transient, empty identity (the "new/unsaved" sentinel).
    #[must_use]
    pub fn new_unsaved() -> Self {
        Self {
            id: IdentityId::New,
            caption: String::new(),
            username: String::new(),
            password: None,
            store_password: false,
            identity_type: 0,
            realms: HashSet::new(),
            access_control_list: HashSet::new(),
            methods: HashMap::new(),
        }
    }

    /// Strip any `AID::`-prefixed tokens a client attempted to set
    /// directly; these are synthesized by the store alone.
    pub fn strip_owner_tokens(&mut self) {
        self.access_control_list
            .retain(|token| !is_owner_token(token));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_id_wire_roundtrip() {
        assert_eq!(IdentityId::from_wire(0), IdentityId::New);
        assert_eq!(IdentityId::from_wire(42), IdentityId::Persisted(42));
        assert_eq!(IdentityId::New.to_wire(), 0);
        assert_eq!(IdentityId::Persisted(42).to_wire(), 42);
    }

    #[test]
    fn owner_token_detection() {
        assert!(is_owner_token("AID::com.example.app"));
        assert!(!is_owner_token("some-other-token"));
        assert!(!is_owner_token("notAID::fake"));
    }

    #[test]
    fn strip_owner_tokens_removes_only_reserved_prefix() {
        let mut id = Identity::new_unsaved();
        id.access_control_list.insert("AID::owner".to_string());
        id.access_control_list.insert("*".to_string());
        id.strip_owner_tokens();
        assert_eq!(id.access_control_list.len(), 1);
        assert!(id.access_control_list.contains("*"));
    }
}
