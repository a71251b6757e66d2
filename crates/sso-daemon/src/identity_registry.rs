//! Object-path bookkeeping for Identity objects, §6.
//!
//! A persisted identity's path is a deterministic function of its id
//! (`/SingleSignOn/Identity_<id>`) — no table lookup is needed to
//! resolve it. A transient identity (created by `registerNewIdentity`
//! before `store()` assigns it an id) has no id yet, so it gets a
//! counter-assigned path that is remembered in `transient` until
//! `store()` calls [`IdentityRegistry::rebind`]; the path itself never
//! changes, only the `IdentityId` it resolves to (object identity is
//! stable across the New -> Persisted transition).
//!
//! Reference counts (`addReference`/`removeReference`, §9's "Reference
//! counting" resolution) are tracked per path regardless of which kind
//! it is.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use sso_core::IdentityId;

const PATH_PREFIX: &str = "/SingleSignOn/Identity_";

/// The deterministic object path for a persisted identity id.
#[must_use]
pub fn path_for(id: u32) -> String {
    format!("{PATH_PREFIX}{id}")
}

/// Tracks transient identity object paths and every identity object's
/// reference count.
pub struct IdentityRegistry {
    next_transient: AtomicU64,
    transient: Mutex<HashMap<String, IdentityId>>,
    refcounts: Mutex<HashMap<String, u32>>,
}

impl IdentityRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_transient: AtomicU64::new(1),
            transient: Mutex::new(HashMap::new()),
            refcounts: Mutex::new(HashMap::new()),
        }
    }

    /// `registerNewIdentity()`: mint a fresh transient identity path.
    pub fn register_new(&self) -> String {
        let n = self.next_transient.fetch_add(1, Ordering::Relaxed);
        let path = format!("{PATH_PREFIX}new_{n}");
        self.transient
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(path.clone(), IdentityId::New);
        path
    }

    /// The stable path for a persisted identity.
    #[must_use]
    pub fn path_for(&self, id: u32) -> String {
        path_for(id)
    }

    /// Resolve an object path back to the `IdentityId` it currently
    /// addresses, or `None` if `path` is neither a known transient path
    /// nor a well-formed persisted path.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<IdentityId> {
        if let Some(id) = self
            .transient
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
        {
            return Some(*id);
        }
        path.strip_prefix(PATH_PREFIX)
            .and_then(|rest| rest.parse::<u32>().ok())
            .map(IdentityId::Persisted)
    }

    /// `store()` on a transient identity assigned a new persisted id:
    /// rebind the path in place, so the object's identity stays stable
    /// across the New -> Persisted transition.
    pub fn rebind(&self, path: &str, new_id: u32) {
        let mut transient = self.transient.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(slot) = transient.get_mut(path) {
            *slot = IdentityId::Persisted(new_id);
        }
    }

    /// `addReference(name)`.
    pub fn add_reference(&self, path: &str) -> u32 {
        let mut counts = self.refcounts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let count = counts.entry(path.to_owned()).or_insert(0);
        *count += 1;
        *count
    }

    /// `removeReference(name)`.
    pub fn remove_reference(&self, path: &str) -> u32 {
        let mut counts = self.refcounts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let count = counts.entry(path.to_owned()).or_insert(0);
        *count = count.saturating_sub(1);
        *count
    }

    /// Current reference count for `path` (0 if never referenced).
    #[must_use]
    pub fn ref_count(&self, path: &str) -> u32 {
        self.refcounts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// `remove()`: forget everything this registry knows about `path`.
    pub fn forget(&self, path: &str) {
        self.transient
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(path);
        self.refcounts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(path);
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_path_is_canonical_and_needs_no_registration() {
        let registry = IdentityRegistry::new();
        assert_eq!(registry.path_for(42), "/SingleSignOn/Identity_42");
        assert_eq!(registry.resolve("/SingleSignOn/Identity_42"), Some(IdentityId::Persisted(42)));
    }

    #[test]
    fn register_then_rebind_keeps_the_same_path() {
        let registry = IdentityRegistry::new();
        let path = registry.register_new();
        assert_eq!(registry.resolve(&path), Some(IdentityId::New));

        registry.rebind(&path, 9);
        assert_eq!(registry.resolve(&path), Some(IdentityId::Persisted(9)));
    }

    #[test]
    fn reference_counting_tracks_add_and_remove() {
        let registry = IdentityRegistry::new();
        let path = registry.register_new();
        assert_eq!(registry.ref_count(&path), 0);
        registry.add_reference(&path);
        registry.add_reference(&path);
        assert_eq!(registry.ref_count(&path), 2);
        registry.remove_reference(&path);
        assert_eq!(registry.ref_count(&path), 1);
    }

    #[test]
    fn remove_reference_saturates_at_zero() {
        let registry = IdentityRegistry::new();
        let path = registry.register_new();
        registry.remove_reference(&path);
        assert_eq!(registry.ref_count(&path), 0);
    }

    #[test]
    fn unknown_path_does_not_resolve() {
        let registry = IdentityRegistry::new();
        assert_eq!(registry.resolve("/SingleSignOn/bogus"), None);
    }
}
