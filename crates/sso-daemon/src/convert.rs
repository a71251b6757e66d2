//! Conversions between the internal `sso-core` types and the JSON/
//! session-data shapes carried over the local RPC transport, §6.
//!
//! Two distinct conversions live here:
//!
//! - `SessionData` (session-data maps, UI parameters, `process()`
//!   arguments/results) already matches its own wire keys one-to-one,
//!   so it goes through generic `serde_json::to_value`/`from_value`.
//! - The Identity object's "identity map" (§6's `UserName`/`Secret`/
//!   `StoreSecret`/`Caption`/`Realms`/`AccessControlList`/`Type`/
//!   `Methods`/`Id`/`RefCount` keys) does NOT line up with
//!   `sso_core::Identity`'s field names, so it gets an explicit,
//!   named mapping in both directions.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde::de::DeserializeOwned;
use sso_core::{ErrorKind, Identity, Realm, SessionData, SsoError, Value};

/// Serialize an internal type to its JSON wire form.
#[must_use]
pub fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Deserialize an RPC argument into an internal type.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidQuery`] if `json` doesn't match `T`'s shape.
pub fn from_json<T: DeserializeOwned>(json: &serde_json::Value) -> Result<T, SsoError> {
    serde_json::from_value(json.clone()).map_err(|e| SsoError::new(ErrorKind::InvalidQuery, e.to_string()))
}

/// Deserialize an RPC argument into a [`SessionData`] map, defaulting to
/// an empty map when the argument is absent (`null`).
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidQuery`] if a present argument isn't a map.
pub fn session_data_arg(json: &serde_json::Value) -> Result<SessionData, SsoError> {
    if json.is_null() {
        return Ok(SessionData::new());
    }
    from_json(json)
}

/// A realm packed into the identity map's `Realms` string list as
/// `"<realm>@<hostname>"`, or bare `"<realm>"` when there's no hostname.
#[must_use]
pub fn realm_to_wire(realm: &Realm) -> String {
    if realm.hostname.is_empty() {
        realm.realm.clone()
    } else {
        format!("{}@{}", realm.realm, realm.hostname)
    }
}

/// Inverse of [`realm_to_wire`].
#[must_use]
pub fn realm_from_wire(s: &str) -> Realm {
    match s.split_once('@') {
        Some((realm, hostname)) => Realm {
            realm: realm.to_owned(),
            hostname: hostname.to_owned(),
        },
        None => Realm {
            realm: s.to_owned(),
            hostname: String::new(),
        },
    }
}

/// Project an [`Identity`] onto the wire identity map, §6's "Identity
/// map fields".
#[must_use]
pub fn identity_to_map(identity: &Identity, ref_count: u32) -> SessionData {
    let mut map = SessionData::new();
    map.0.insert("Id".to_owned(), Value::UInt(u64::from(identity.id.to_wire())));
    map.set("UserName", identity.username.clone());
    if let Some(secret) = &identity.password {
        map.set("Secret", secret.clone());
    }
    map.set("StoreSecret", identity.store_password);
    map.set("Caption", identity.caption.clone());
    map.0.insert("Type".to_owned(), Value::Int(i64::from(identity.identity_type)));
    map.set(
        "Realms",
        identity.realms.iter().map(realm_to_wire).collect::<Vec<_>>(),
    );
    map.set(
        "AccessControlList",
        identity.access_control_list.iter().cloned().collect::<Vec<_>>(),
    );
    let methods: HashMap<String, Value> = identity
        .methods
        .iter()
        .map(|(method, mechanisms)| (method.clone(), Value::StringList(mechanisms.iter().cloned().collect())))
        .collect();
    map.0.insert("Methods".to_owned(), Value::Map(methods));
    map.0.insert("RefCount".to_owned(), Value::UInt(u64::from(ref_count)));
    map
}

/// Apply the client-supplied subset of an identity map onto `identity`,
/// in place — only keys present in `map` are touched, so every other
/// field of `identity` retains its previously-persisted value. This is
/// what gives `store()` its superset property (§8): the caller only
/// needs to name the fields it wants to change.
///
/// `Id` and `RefCount` are read-only projections and are never applied
/// back onto `identity`.
pub fn apply_identity_map(identity: &mut Identity, map: &SessionData) {
    if let Some(v) = map.get("UserName").and_then(Value::as_str) {
        identity.username = v.to_owned();
    }
    if let Some(v) = map.get("Secret").and_then(Value::as_str) {
        identity.password = Some(v.to_owned());
    }
    if let Some(v) = map.get("StoreSecret").and_then(Value::as_bool) {
        identity.store_password = v;
    }
    if let Some(v) = map.get("Caption").and_then(Value::as_str) {
        identity.caption = v.to_owned();
    }
    if let Some(v) = map.get("Type").and_then(Value::as_i32) {
        identity.identity_type = v;
    }
    if let Some(v) = map.get("Realms").and_then(Value::as_string_list) {
        identity.realms = v.iter().map(|s| realm_from_wire(s)).collect();
    }
    if let Some(v) = map.get("AccessControlList").and_then(Value::as_string_list) {
        identity.access_control_list = v.iter().cloned().collect::<HashSet<_>>();
    }
    if let Some(Value::Map(methods)) = map.get("Methods") {
        identity.methods = methods
            .iter()
            .filter_map(|(method, mechanisms)| {
                mechanisms
                    .as_string_list()
                    .map(|list| (method.clone(), list.iter().cloned().collect::<HashSet<_>>()))
            })
            .collect();
    }
    // `AID::`-prefixed tokens are synthesized by the store alone (§9).
    identity.strip_owner_tokens();
}

#[cfg(test)]
mod tests {
    use super::*;
    use sso_core::IdentityId;

    #[test]
    fn identity_map_round_trips_named_fields() {
        let mut identity = Identity::new_unsaved();
        identity.id = IdentityId::Persisted(7);
        identity.username = "john".to_owned();
        identity.caption = "John's account".to_owned();
        identity.access_control_list.insert("*".to_owned());

        let map = identity_to_map(&identity, 2);
        assert_eq!(map.get("Id").and_then(Value::as_i32), Some(7));
        assert_eq!(map.get("UserName").and_then(Value::as_str), Some("john"));
        assert_eq!(map.get("Caption").and_then(Value::as_str), Some("John's account"));
        assert_eq!(map.get("RefCount").and_then(Value::as_i32), Some(2));
    }

    #[test]
    fn apply_identity_map_only_touches_supplied_keys() {
        let mut identity = Identity::new_unsaved();
        identity.username = "alice".to_owned();
        identity.caption = "Alice's original caption".to_owned();

        let patch = SessionData::new().with("UserName", "alice2");
        apply_identity_map(&mut identity, &patch);

        assert_eq!(identity.username, "alice2");
        assert_eq!(identity.caption, "Alice's original caption");
    }

    #[test]
    fn apply_identity_map_strips_owner_tokens() {
        let mut identity = Identity::new_unsaved();
        let patch = SessionData::new().with(
            "AccessControlList",
            vec!["AID::owner".to_owned(), "*".to_owned()],
        );
        apply_identity_map(&mut identity, &patch);
        assert_eq!(identity.access_control_list.len(), 1);
        assert!(identity.access_control_list.contains("*"));
    }

    #[test]
    fn realm_wire_roundtrip() {
        let realm = Realm {
            realm: "testRealm".to_owned(),
            hostname: "example.com".to_owned(),
        };
        assert_eq!(realm_from_wire(&realm_to_wire(&realm)), realm);

        let bare = Realm {
            realm: "testRealm".to_owned(),
            hostname: String::new(),
        };
        assert_eq!(realm_from_wire(&realm_to_wire(&bare)), bare);
    }

    #[test]
    fn malformed_argument_reports_invalid_query() {
        let err = session_data_arg(&serde_json::json!([1, 2, 3])).expect_err("not a map");
        assert_eq!(err.kind, ErrorKind::InvalidQuery);
    }
}
