//! The session registry key: `"<identity-id>+<method>"`.

use std::fmt;

use crate::identity::IdentityId;

/// Key under which a persisted-identity [`Session`](crate) is registered.
///
/// Transient (`IdentityId::New`) sessions are never looked up by this key —
/// they're addressed by object identity and held in a separate list, per
/// the Design Note on "object identity vs value identity for Session".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    identity_id: u32,
    method: String,
}

impl SessionKey {
    /// Build a key for a persisted identity and a method name.
    ///
    /// # Panics
    ///
    /// Panics if `identity_id` is [`IdentityId::New`] — transient sessions
    /// have no stable key.
    #[must_use]
    pub fn new(identity_id: IdentityId, method: impl Into<String>) -> Self {
        let IdentityId::Persisted(id) = identity_id else {
            panic!("SessionKey requires a persisted identity id");
        };
        Self {
            identity_id: id,
            method: method.into(),
        }
    }

    /// The method name component.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.identity_id, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_concatenation_format() {
        let key = SessionKey::new(IdentityId::Persisted(7), "ssotest");
        assert_eq!(key.to_string(), "7+ssotest");
    }

    #[test]
    #[should_panic(expected = "persisted identity id")]
    fn new_panics_on_transient_id() {
        let _ = SessionKey::new(IdentityId::New, "ssotest");
    }
}
