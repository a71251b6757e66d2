//! Object-path bookkeeping for Session (`AuthSession`) objects, §6.
//!
//! Unlike an Identity object's path, a Session object's path can't be
//! derived deterministically from its key: a transient (`identity-id =
//! 0`) session has no stable key at all, and the daemon's §6 surface
//! lets a client ask for the same `(identity-id, method)` pair's
//! session object repeatedly and get the same path back, per SC's "at
//! most one Session per key" invariant. So this is a real table, keyed
//! by the object path, with a reverse index from key to path for the
//! non-transient case.
//!
//! It also remembers each session's current outstanding request's
//! cancel-key, since the Session object's `cancel()` call (§6) takes no
//! arguments — it cancels "whatever this session is currently doing" —
//! and the reverse direction (cancel-key -> path) is what lets the
//! `stateChanged` signal bridge ([`crate::signals`]) tag a plugin-layer
//! notification with the object path a connected client expects.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use sso_core::IdentityId;

const PATH_PREFIX: &str = "/SingleSignOn/AuthSession_";

struct Entry {
    identity_id: IdentityId,
    method: String,
    current_cancel_key: Option<String>,
}

/// Tracks live Session object paths and their current in-flight request.
pub struct SessionPaths {
    next: AtomicU64,
    entries: Mutex<HashMap<String, Entry>>,
    by_key: Mutex<HashMap<(u32, String), String>>,
    by_cancel_key: Mutex<HashMap<String, String>>,
}

impl SessionPaths {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
            by_key: Mutex::new(HashMap::new()),
            by_cancel_key: Mutex::new(HashMap::new()),
        }
    }

    /// `getAuthSessionObjectPath(identity_id, method)`: return the
    /// existing path for `(identity_id, method)` when `identity_id` is
    /// persisted, or mint a fresh one — always fresh for a transient
    /// identity, matching `SessionRegistry::session_for`'s own rule
    /// that transient ids never share a session.
    pub fn register(&self, identity_id: IdentityId, method: &str) -> String {
        if let IdentityId::Persisted(id) = identity_id {
            let mut by_key = self.by_key.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(path) = by_key.get(&(id, method.to_owned())) {
                return path.clone();
            }
            let path = self.mint(identity_id, method);
            by_key.insert((id, method.to_owned()), path.clone());
            return path;
        }
        self.mint(identity_id, method)
    }

    fn mint(&self, identity_id: IdentityId, method: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let path = format!("{PATH_PREFIX}{n}");
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                path.clone(),
                Entry {
                    identity_id,
                    method: method.to_owned(),
                    current_cancel_key: None,
                },
            );
        path
    }

    /// Resolve an object path back to its `(identity_id, method)` key.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<(IdentityId, String)> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .map(|e| (e.identity_id, e.method.clone()))
    }

    /// Record that `path`'s session just dispatched a request tagged
    /// `cancel_key`.
    pub fn begin_request(&self, path: &str, cancel_key: &str) {
        if let Some(entry) = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(path)
        {
            entry.current_cancel_key = Some(cancel_key.to_owned());
        }
        self.by_cancel_key
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(cancel_key.to_owned(), path.to_owned());
    }

    /// Record that `path`'s outstanding request has finished.
    pub fn end_request(&self, path: &str) {
        let cancel_key = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(path)
            .and_then(|e| e.current_cancel_key.take());
        if let Some(key) = cancel_key {
            self.by_cancel_key
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(&key);
        }
    }

    /// `cancel()`'s target: the cancel-key of whatever `path` is
    /// currently processing, if anything.
    #[must_use]
    pub fn current_cancel_key(&self, path: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .and_then(|e| e.current_cancel_key.clone())
    }

    /// Reverse lookup used by the `stateChanged` signal bridge.
    #[must_use]
    pub fn path_for_cancel_key(&self, cancel_key: &str) -> Option<String> {
        self.by_cancel_key
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(cancel_key)
            .cloned()
    }

    /// Forget a session object entirely.
    pub fn forget(&self, path: &str) {
        let entry = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(path);
        if let Some(entry) = entry {
            if let IdentityId::Persisted(id) = entry.identity_id {
                self.by_key
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .remove(&(id, entry.method));
            }
        }
    }
}

impl Default for SessionPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_identity_reuses_the_same_path_for_the_same_key() {
        let paths = SessionPaths::new();
        let a = paths.register(IdentityId::Persisted(1), "ssotest");
        let b = paths.register(IdentityId::Persisted(1), "ssotest");
        assert_eq!(a, b);
        let c = paths.register(IdentityId::Persisted(1), "ssotest2");
        assert_ne!(a, c);
    }

    #[test]
    fn transient_identity_always_gets_a_fresh_path() {
        let paths = SessionPaths::new();
        let a = paths.register(IdentityId::New, "ssotest");
        let b = paths.register(IdentityId::New, "ssotest");
        assert_ne!(a, b);
    }

    #[test]
    fn cancel_key_round_trips_to_the_owning_path() {
        let paths = SessionPaths::new();
        let path = paths.register(IdentityId::Persisted(2), "ssotest");
        paths.begin_request(&path, "key-1");
        assert_eq!(paths.current_cancel_key(&path).as_deref(), Some("key-1"));
        assert_eq!(paths.path_for_cancel_key("key-1").as_deref(), Some(path.as_str()));

        paths.end_request(&path);
        assert_eq!(paths.current_cancel_key(&path), None);
        assert_eq!(paths.path_for_cancel_key("key-1"), None);
    }
}
