//! The free-form `string -> tagged value` map exchanged across every layer:
//! identity maps, session-data maps, UI request/reply parameters.
//!
//! This is the in-memory representation of the blob payload described in
//! Plugin Host §4.2 — `sso-plugin-host` serializes/deserializes it to the
//! `[u32 size][size bytes]` wire frame; everyone above that layer just
//! works with [`SessionData`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One value in a [`SessionData`] map.
///
/// Plugins may carry arbitrary additional keys, so this has to cover the
/// shapes a plugin's serialization library can hand back: scalars, byte
/// blobs (the `mech1`/`BLOB` mechanism test fixture round-trips raw
/// bytes), and nested maps/lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// A UTF-8 string.
    Str(String),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer.
    UInt(u64),
    /// A boolean.
    Bool(bool),
    /// Raw bytes (used by the `BLOB` mechanism fixture).
    Bytes(Vec<u8>),
    /// A list of strings (`Realms`, `AccessControlList`, …).
    StringList(Vec<String>),
    /// A nested map (`Methods`: method name -> list of mechanisms).
    Map(HashMap<String, Value>),
}

impl Value {
    /// Borrow as a string, if this value is [`Value::Str`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow as a string list, if this value is [`Value::StringList`].
    #[must_use]
    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            Self::StringList(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Read as a bool, if this value is [`Value::Bool`].
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Read as an i32, if this value is an integer variant that fits.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(n) => i32::try_from(*n).ok(),
            Self::UInt(n) => i32::try_from(*n).ok(),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::StringList(v)
    }
}

/// A `string -> Value` map: the universal payload shape for identity maps,
/// session-data maps, and UI request/reply parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData(pub HashMap<String, Value>);

impl SessionData {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove and return a key.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Merge `other` into `self`; keys already present in `self` win
    /// ("later keys in the request's own map take precedence", §4.3).
    pub fn merge_under(&mut self, other: &SessionData) {
        for (k, v) in &other.0 {
            self.0.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    /// Overlay `other` on top of `self`, overwriting any shared keys.
    pub fn overlay(&mut self, other: SessionData) {
        for (k, v) in other.0 {
            self.0.insert(k, v);
        }
    }

    /// The recognized `Secret` key.
    pub const SECRET_KEY: &'static str = "Secret";

    /// Strip the `Secret` field, unless `method` is the literal `"password"`.
    #[must_use]
    pub fn strip_secret_unless_password_method(mut self, method: &str) -> Self {
        if method != "password" {
            self.0.remove(Self::SECRET_KEY);
        }
        self
    }
}

impl FromIterator<(String, Value)> for SessionData {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_under_keeps_existing_keys() {
        let mut base = SessionData::new().with("UserName", "alice");
        let extra = SessionData::new()
            .with("UserName", "bob")
            .with("Realm", "testRealm");
        base.merge_under(&extra);
        assert_eq!(base.get("UserName").and_then(Value::as_str), Some("alice"));
        assert_eq!(base.get("Realm").and_then(Value::as_str), Some("testRealm"));
    }

    #[test]
    fn strip_secret_keeps_it_for_password_method() {
        let data = SessionData::new()
            .with("UserName", "alice")
            .with("Secret", "s3cret");
        let stripped = data.clone().strip_secret_unless_password_method("ssotest");
        assert!(stripped.get("Secret").is_none());
        let kept = data.strip_secret_unless_password_method("password");
        assert!(kept.get("Secret").is_some());
    }

    #[test]
    fn overlay_overwrites_shared_keys() {
        let mut base = SessionData::new().with("a", "1");
        base.overlay(SessionData::new().with("a", "2").with("b", "3"));
        assert_eq!(base.get("a").and_then(Value::as_str), Some("2"));
        assert_eq!(base.get("b").and_then(Value::as_str), Some("3"));
    }
}
