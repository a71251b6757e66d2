//! The per-`(identity-id, method)` request queue and its dispatch loop,
//! §4.3.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sso_core::{ErrorKind, IdentityId, SessionData, Value};
use sso_plugin_host::{PluginEventKind, PluginHost};
use sso_storage::Credentials;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::request::{Request, RequestOutcome};
use crate::ui::SignOnUi;

/// A state-change (or signal) notification emitted for a cancel-key,
/// forwarded by the daemon as the `stateChanged` RPC signal.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// The request this notification concerns.
    pub cancel_key: String,
    /// The new state.
    pub state: u32,
    /// A human-readable message.
    pub message: String,
}

/// Synthetic state emitted when a request is dispatched to the plugin.
pub const STATE_SESSION_STARTED: u32 = 0;

/// Commands a [`SessionHandle`] sends into the session's dispatch loop.
enum Command {
    QueryMechanisms {
        wanted: Vec<String>,
        reply: oneshot::Sender<SessionResult<Vec<String>>>,
    },
    Process(Request),
    Cancel {
        cancel_key: String,
    },
    SetId {
        new_id: u32,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    AttachReference,
    DetachReference,
}

/// A cloneable, cheaply-shared reference to a running session.
///
/// This is what Session Core's registry and the daemon's RPC layer
/// hold; the actual queue and Plugin Host live in the task spawned by
/// [`Session::spawn`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    identity_id: Arc<AtomicU32>,
    method: Arc<str>,
    last_activity: Arc<std::sync::Mutex<DateTime<Utc>>>,
    ref_count: Arc<AtomicU32>,
}

impl SessionHandle {
    /// The method this session was opened against.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The identity id this session is bound to. `0` means transient.
    #[must_use]
    pub fn identity_id(&self) -> u32 {
        self.identity_id.load(Ordering::Acquire)
    }

    /// Seconds since the last request was dispatched or completed.
    #[must_use]
    pub fn idle_seconds(&self) -> i64 {
        let last = *self.last_activity.lock().unwrap_or_else(|e| e.into_inner());
        (Utc::now() - last).num_seconds().max(0)
    }

    /// Whether any client handle still references this session.
    #[must_use]
    pub fn is_referenced(&self) -> bool {
        self.ref_count.load(Ordering::Acquire) > 0
    }

    /// Whether `self` and `other` address the same underlying session
    /// actor.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        self.commands.same_channel(&other.commands)
    }

    /// Register a new client handle against this session.
    pub fn attach_reference(&self) {
        let _ = self.commands.send(Command::AttachReference);
    }

    /// Release a client handle's reference to this session.
    pub fn detach_reference(&self) {
        let _ = self.commands.send(Command::DetachReference);
    }

    /// `query_available_mechanisms(session, wanted) -> list`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the Plugin Host cannot be reached.
    pub async fn query_available_mechanisms(&self, wanted: Vec<String>) -> SessionResult<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::QueryMechanisms { wanted, reply })
            .map_err(|_| SessionError::PluginHost(sso_plugin_host::PluginHostError::Gone))?;
        rx.await
            .map_err(|_| SessionError::PluginHost(sso_plugin_host::PluginHostError::Gone))?
    }

    /// `process(session, reply_channel, session_data, mechanism,
    /// cancel_key)`.
    pub fn process(
        &self,
        cancel_key: impl Into<String>,
        mechanism: impl Into<String>,
        session_data: SessionData,
        reply: oneshot::Sender<RequestOutcome>,
    ) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Utc::now();
        let request = Request::new(cancel_key, mechanism, session_data, reply);
        let _ = self.commands.send(Command::Process(request));
    }

    /// `cancel(session, cancel_key)`.
    pub fn cancel(&self, cancel_key: impl Into<String>) {
        let _ = self.commands.send(Command::Cancel {
            cancel_key: cancel_key.into(),
        });
    }

    /// `set_id(session, new_id)`: rebind a transient session to a
    /// newly persisted identity id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::KeyInUse`] if another session already
    /// lives at `(new_id, method)` — checked by the registry before
    /// this call completes, not here.
    pub async fn set_id(&self, new_id: u32) -> SessionResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SetId { new_id, reply })
            .map_err(|_| SessionError::PluginHost(sso_plugin_host::PluginHostError::Gone))?;
        rx.await
            .map_err(|_| SessionError::PluginHost(sso_plugin_host::PluginHostError::Gone))?
    }
}

/// The session actor itself: the FIFO queue, the Plugin Host, and the
/// "canceled key" bookkeeping, §4.3's "Session" entity.
struct Session {
    identity_id: Arc<AtomicU32>,
    method: Arc<str>,
    queue: VecDeque<Request>,
    plugin_host: PluginHost,
    canceled_key: Option<String>,
    head_sent: bool,
    last_activity: Arc<std::sync::Mutex<DateTime<Utc>>>,
    ref_count: Arc<AtomicU32>,
    ui: Arc<dyn SignOnUi>,
    ui_outstanding_for: Option<String>,
    signals: mpsc::UnboundedSender<StateChange>,
    pending_mechanisms: Option<(Vec<String>, oneshot::Sender<SessionResult<Vec<String>>>)>,
    credentials: Option<Arc<Credentials>>,
}

impl Session {
    /// Spawn a session actor, returning a handle to it.
    #[must_use]
    pub fn spawn(
        identity_id: u32,
        method: impl Into<String>,
        plugins_dir: impl Into<std::path::PathBuf>,
        ui: Arc<dyn SignOnUi>,
        signals: mpsc::UnboundedSender<StateChange>,
        credentials: Option<Arc<Credentials>>,
    ) -> SessionHandle {
        let method: Arc<str> = method.into().into();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let identity_id = Arc::new(AtomicU32::new(identity_id));
        let last_activity = Arc::new(std::sync::Mutex::new(Utc::now()));
        let ref_count = Arc::new(AtomicU32::new(0));

        let mut plugin_host = PluginHost::new(method.to_string(), plugins_dir);
        let events = plugin_host.take_events();

        let mut session = Session {
            identity_id: Arc::clone(&identity_id),
            method: Arc::clone(&method),
            queue: VecDeque::new(),
            plugin_host,
            canceled_key: None,
            head_sent: false,
            last_activity: Arc::clone(&last_activity),
            ref_count: Arc::clone(&ref_count),
            ui,
            ui_outstanding_for: None,
            signals,
            pending_mechanisms: None,
            credentials,
        };

        tokio::spawn(async move {
            session.run(commands_rx, events).await;
        });

        SessionHandle {
            commands: commands_tx,
            identity_id,
            method,
            last_activity,
            ref_count,
        }
    }

    async fn run(
        &mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<sso_plugin_host::PluginEvent>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_plugin_event(event).await,
                        None => break,
                    }
                }
            }
        }
        debug!(method = %self.method, "session actor exiting");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::QueryMechanisms { wanted, reply } => {
                if let Err(e) = self.plugin_host.query_mechanisms().await {
                    let _ = reply.send(Err(SessionError::PluginHost(e)));
                } else {
                    self.pending_mechanisms = Some((wanted, reply));
                }
            }
            Command::Process(request) => {
                self.queue.push_back(request);
                self.dispatch_head_if_idle().await;
            }
            Command::Cancel { cancel_key } => {
                self.cancel(&cancel_key).await;
            }
            Command::SetId { new_id, reply } => {
                self.identity_id.store(new_id, Ordering::Release);
                let _ = reply.send(Ok(()));
            }
            Command::AttachReference => {
                self.ref_count.fetch_add(1, Ordering::AcqRel);
            }
            Command::DetachReference => {
                self.ref_count.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1))).ok();
            }
        }
    }

    async fn dispatch_head_if_idle(&mut self) {
        if self.canceled_key.is_some() || self.head_sent {
            return;
        }
        let Some(head) = self.queue.front() else {
            return;
        };
        let cancel_key = head.cancel_key.clone();
        let mechanism = head.mechanism.clone();
        let mut data = head.session_data.clone();

        // Step 1 of the request-dispatch algorithm: for a persisted
        // identity, splice its username/secret under whatever the
        // request itself already supplies (request keys win). A CS
        // lookup failure doesn't block dispatch — the plugin may then
        // fail with MissingData on its own.
        let identity_id = self.identity_id.load(Ordering::Acquire);
        if identity_id != 0 {
            if let Some(store) = &self.credentials {
                let identity = store.credentials(IdentityId::Persisted(identity_id), true).await;
                if identity.id.is_persisted() {
                    let mut loaded = SessionData::new();
                    loaded.set("UserName", identity.username.clone());
                    if let Some(secret) = identity.password.clone() {
                        loaded.set("Secret", secret);
                    }
                    data.merge_under(&loaded);
                }
            }
        }

        match self.plugin_host.process(&cancel_key, &mechanism, &data).await {
            Ok(()) => {
                self.head_sent = true;
                let _ = self.signals.send(StateChange {
                    cancel_key: cancel_key.clone(),
                    state: STATE_SESSION_STARTED,
                    message: "session-started".to_owned(),
                });
            }
            Err(e) => {
                if let Some(request) = self.queue.pop_front() {
                    let kind = e.to_error_kind();
                    let _ = request.reply.send(Err((kind, e.to_string())));
                }
                self.head_sent = false;
            }
        }
    }

    async fn cancel(&mut self, cancel_key: &str) {
        if let Some(front) = self.queue.front() {
            if front.cancel_key == cancel_key {
                self.canceled_key = Some(cancel_key.to_owned());
                let _ = self.plugin_host.cancel().await;
                return;
            }
        }
        // Not the head: remove and reply immediately.
        if let Some(pos) = self.queue.iter().position(|r| r.cancel_key == cancel_key) {
            if let Some(request) = self.queue.remove(pos) {
                let _ = request
                    .reply
                    .send(Err((ErrorKind::SessionCanceled, "session canceled".to_owned())));
            }
        }
    }

    async fn handle_plugin_event(&mut self, event: sso_plugin_host::PluginEvent) {
        let head_cancel_key = self.queue.front().map(|r| r.cancel_key.clone());
        let is_canceled = self
            .canceled_key
            .as_deref()
            .is_some_and(|canceled| Some(canceled) == head_cancel_key.as_deref());

        match event.kind {
            PluginEventKind::Result(data) => {
                self.finish_head(is_canceled, Ok(data)).await;
            }
            PluginEventKind::Error { kind, message } => {
                if is_canceled {
                    self.finish_head(true, Err((ErrorKind::SessionCanceled, "session canceled".to_owned())))
                        .await;
                } else {
                    self.finish_head(false, Err((kind, message))).await;
                }
            }
            PluginEventKind::Ui(params) => {
                self.mediate_ui(params, false).await;
            }
            PluginEventKind::RefreshReply(params) => {
                self.mediate_ui(params, true).await;
            }
            PluginEventKind::Store(data) => {
                self.persist_store(data).await;
            }
            PluginEventKind::Signal { state, message } => {
                if let Some(cancel_key) = head_cancel_key {
                    let _ = self.signals.send(StateChange {
                        cancel_key,
                        state,
                        message,
                    });
                }
            }
            PluginEventKind::MechanismsList(available) => {
                if let Some((wanted, reply)) = self.pending_mechanisms.take() {
                    // "intersection of `wanted` with `PH.mechanisms()`;
                    // if `wanted` is empty, returns all mechanisms."
                    let result = if wanted.is_empty() {
                        available
                    } else {
                        available.into_iter().filter(|m| wanted.contains(m)).collect()
                    };
                    let _ = reply.send(Ok(result));
                }
            }
            PluginEventKind::Type(_) => {
                // Queried by the daemon's RPC layer directly; no queue
                // state to update here.
            }
            PluginEventKind::Gone => {
                self.drain_queue_as_gone().await;
            }
        }
    }

    async fn finish_head(&mut self, was_canceled: bool, outcome: RequestOutcome) {
        let Some(request) = self.queue.pop_front() else {
            return;
        };
        let outcome = if was_canceled {
            Err((ErrorKind::SessionCanceled, "session canceled".to_owned()))
        } else {
            outcome.map(|data| data.strip_secret_unless_password_method(&self.method))
        };
        let _ = request.reply.send(outcome);
        self.canceled_key = None;
        self.head_sent = false;
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Utc::now();
        self.dispatch_head_if_idle().await;
    }

    async fn mediate_ui(&mut self, plugin_params: SessionData, via_refresh: bool) {
        let Some(head) = self.queue.front() else {
            return;
        };
        let cancel_key = head.cancel_key.clone();

        if let Some(outstanding) = self.ui_outstanding_for.take() {
            self.ui.cancel(&outstanding).await;
        }
        self.ui_outstanding_for = Some(cancel_key.clone());

        let mut merged = head.session_data.clone();
        merged.merge_under(&plugin_params);
        merged.set("requestId", cancel_key.clone());

        let reply = self.ui.request(&cancel_key, merged).await;
        self.ui_outstanding_for = None;

        let reply_data = match reply {
            Ok(data) => data,
            Err(_) => {
                let mut data = plugin_params;
                data.set("no-signon-ui", true);
                data
            }
        };

        let wants_refresh = reply_data.get("refresh").and_then(sso_core::Value::as_bool).unwrap_or(false);
        let result = if via_refresh || wants_refresh {
            self.plugin_host.refresh(&reply_data).await
        } else {
            self.plugin_host.process_ui(&reply_data).await
        };
        if result.is_err() {
            self.finish_head(false, Err((ErrorKind::InternalServer, "plugin host unavailable".to_owned())))
                .await;
        }
    }

    /// "`STORE` events with `identity_id = 0` are no-ops on CS; with
    /// `identity_id != 0` they update that row" (§8).
    async fn persist_store(&self, data: SessionData) {
        let identity_id = self.identity_id.load(Ordering::Acquire);
        if identity_id == 0 {
            return;
        }
        let Some(store) = &self.credentials else {
            return;
        };

        let mut identity = store.credentials(IdentityId::Persisted(identity_id), true).await;
        if !identity.id.is_persisted() {
            return;
        }
        if let Some(username) = data.get("UserName").and_then(Value::as_str) {
            identity.username = username.to_owned();
        }
        if let Some(secret) = data.get("Secret").and_then(Value::as_str) {
            identity.password = Some(secret.to_owned());
            identity.store_password = true;
        }
        let outcome = store.update(&identity, true).await;
        if !outcome.is_persisted() {
            tracing::warn!(identity_id, "STORE event failed to persist");
        }
    }

    async fn drain_queue_as_gone(&mut self) {
        while let Some(request) = self.queue.pop_front() {
            let _ = request
                .reply
                .send(Err((ErrorKind::InternalServer, "plugin subordinate is gone".to_owned())));
        }
        self.canceled_key = None;
        self.head_sent = false;
    }
}

/// Spawn a new session actor for `(identity_id, method)` and return a
/// handle to it.
#[must_use]
pub fn spawn_session(
    identity_id: u32,
    method: impl Into<String>,
    plugins_dir: impl Into<std::path::PathBuf>,
    ui: Arc<dyn SignOnUi>,
    signals: mpsc::UnboundedSender<StateChange>,
    credentials: Option<Arc<Credentials>>,
) -> SessionHandle {
    Session::spawn(identity_id, method, plugins_dir, ui, signals, credentials)
}
