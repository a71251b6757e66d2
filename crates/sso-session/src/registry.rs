//! The session table and the `DaemonContext` dependency-injection
//! struct, resolving the "Global mutable registries" design note.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use sso_core::{IdentityId, SessionKey};
use sso_storage::Credentials;
use tokio::sync::mpsc;

use crate::error::{SessionError, SessionResult};
use crate::session::{spawn_session, SessionHandle, StateChange};
use crate::ui::SignOnUi;

/// Holds every live session, keyed by `"<id>+<method>"` for persisted
/// identities; transient (`id = 0`) sessions live in a side list and
/// are addressed by object identity only, per §4.3.
pub struct SessionRegistry {
    persisted: Mutex<HashMap<String, SessionHandle>>,
    transient: Mutex<Vec<SessionHandle>>,
    plugins_dir: PathBuf,
    ui: Arc<dyn SignOnUi>,
    signals: mpsc::UnboundedSender<StateChange>,
    credentials: Option<Arc<Credentials>>,
}

impl SessionRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new(
        plugins_dir: impl Into<PathBuf>,
        ui: Arc<dyn SignOnUi>,
        signals: mpsc::UnboundedSender<StateChange>,
        credentials: Arc<Credentials>,
    ) -> Self {
        Self {
            persisted: Mutex::new(HashMap::new()),
            transient: Mutex::new(Vec::new()),
            plugins_dir: plugins_dir.into(),
            ui,
            signals,
            credentials: Some(credentials),
        }
    }

    /// Get or spawn the session for `(identity_id, method)`.
    ///
    /// A transient (`IdentityId::New`) request always spawns a fresh
    /// session — "at most one Session exists per key while
    /// `identity-id != 0`" does not apply to transient ids.
    pub fn session_for(&self, identity_id: IdentityId, method: &str) -> SessionHandle {
        match identity_id {
            IdentityId::New => {
                let handle = spawn_session(
                    0,
                    method,
                    self.plugins_dir.clone(),
                    Arc::clone(&self.ui),
                    self.signals.clone(),
                    self.credentials.clone(),
                );
                self.transient
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(handle.clone());
                handle
            }
            IdentityId::Persisted(id) => {
                let key = SessionKey::new(identity_id, method).to_string();
                let mut persisted = self.persisted.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                persisted
                    .entry(key)
                    .or_insert_with(|| {
                        spawn_session(
                            id,
                            method,
                            self.plugins_dir.clone(),
                            Arc::clone(&self.ui),
                            self.signals.clone(),
                            self.credentials.clone(),
                        )
                    })
                    .clone()
            }
        }
    }

    /// `set_id(session, new_id)`: rebind a transient session's key.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::KeyInUse`] if `(new_id, method)` already
    /// has a live persisted session.
    pub async fn rebind(&self, handle: &SessionHandle, new_id: u32) -> SessionResult<()> {
        let key = SessionKey::new(IdentityId::Persisted(new_id), handle.method().to_owned()).to_string();
        {
            let persisted = self.persisted.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if persisted.contains_key(&key) {
                return Err(SessionError::KeyInUse);
            }
        }
        handle.set_id(new_id).await?;
        self.persisted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, handle.clone());
        self.transient
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|h| !h.is_same(handle));
        Ok(())
    }

    /// Tear down every live persisted session bound to `id`, across
    /// every method — the effect of `Identity.signOut()` and
    /// `Identity.remove()` (§9's open-question resolutions).
    ///
    /// Dropping a session's table entry doesn't forcibly kill its actor
    /// task if some other handle (e.g. a daemon RPC object still
    /// referencing it) is alive; it just stops `session_for` from
    /// handing that session out again. The actor itself winds down once
    /// every handle is dropped, same as idle eviction.
    pub fn evict_identity(&self, id: u32) {
        let prefix = format!("{id}+");
        self.persisted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|key, _| !key.starts_with(&prefix));
    }

    /// Sweep every session and drop handles that are both unreferenced
    /// and idle past `max_idle_secs`, per the idle-eviction watchdog.
    pub fn evict_idle(&self, max_idle_secs: i64) {
        self.persisted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|_, handle| handle.is_referenced() || handle.idle_seconds() < max_idle_secs);
        self.transient
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|handle| handle.is_referenced() || handle.idle_seconds() < max_idle_secs);
    }

    /// Number of live sessions (persisted + transient), for diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.persisted.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
            + self.transient.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Whether the registry holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Configurable object timeouts, §6's "three independently configurable
/// timeouts".
#[derive(Debug, Clone, Copy)]
pub struct ObjectTimeouts {
    /// Daemon-wide idle shutdown timeout, seconds. `0` disables.
    pub daemon_timeout_secs: i64,
    /// Identity object idle timeout, seconds.
    pub identity_timeout_secs: i64,
    /// Auth session idle timeout, seconds.
    pub authsession_timeout_secs: i64,
}

impl Default for ObjectTimeouts {
    fn default() -> Self {
        // Matches `signond`'s historical defaults (`signondaemon.cpp`).
        Self {
            daemon_timeout_secs: 300,
            identity_timeout_secs: 300,
            authsession_timeout_secs: 300,
        }
    }
}

/// Everything Session Core needs, constructed once by the daemon binary
/// and threaded through by `Arc` reference — no module-level statics.
pub struct DaemonContext {
    /// The Credentials Store handle.
    pub credentials: Arc<Credentials>,
    /// The live session table.
    pub sessions: Arc<SessionRegistry>,
    /// Object idle timeouts.
    pub timeouts: ObjectTimeouts,
}

impl DaemonContext {
    /// Build a context around an already-open `Credentials` store.
    #[must_use]
    pub fn new(
        credentials: Arc<Credentials>,
        plugins_dir: impl Into<PathBuf>,
        ui: Arc<dyn SignOnUi>,
        signals: mpsc::UnboundedSender<StateChange>,
        timeouts: ObjectTimeouts,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new(plugins_dir, ui, signals, Arc::clone(&credentials))),
            credentials,
            timeouts,
        }
    }

    /// Spawn the idle-eviction watchdog: a tick every half of the
    /// auth-session timeout, sweeping unreferenced idle sessions.
    pub fn spawn_idle_watchdog(self: &Arc<Self>) {
        let ctx = Arc::clone(self);
        let interval_secs = (ctx.timeouts.authsession_timeout_secs / 2).max(1) as u64;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                ctx.sessions.evict_idle(ctx.timeouts.authsession_timeout_secs);
            }
        });
    }
}
