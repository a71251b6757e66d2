//! Events the Plugin Host surfaces to Session Core.
//!
//! Delivered as in-loop callback dispatch from the reader task (a
//! channel send, awaited by SC's event loop) — no true parallelism, per
//! the Design Note on plugin event delivery.

use sso_core::{ErrorKind, SessionData};

/// One event read from a subordinate, tagged with the cancel-key it
/// answers (SC drops events whose key is the recorded "canceled" key).
#[derive(Debug, Clone)]
pub struct PluginEvent {
    /// The cancel-key of the request this event answers.
    pub cancel_key: String,
    /// The event payload.
    pub kind: PluginEventKind,
}

/// The payload half of a [`PluginEvent`].
#[derive(Debug, Clone)]
pub enum PluginEventKind {
    /// RESULT: the final successful session-data map.
    Result(SessionData),
    /// STORE: a map to persist into the identity backing this session.
    Store(SessionData),
    /// ERROR: a typed, plugin-reported failure.
    Error {
        /// The error's classification.
        kind: ErrorKind,
        /// A human-readable message, forwarded as-is.
        message: String,
    },
    /// UI: the plugin needs an interactive round-trip.
    Ui(SessionData),
    /// REFRESH\_REPLY: symmetric to UI but for the refresh round-trip.
    RefreshReply(SessionData),
    /// SIGNAL: an out-of-band state-change notification.
    Signal {
        /// The new state, as reported by the plugin.
        state: u32,
        /// A human-readable message.
        message: String,
    },
    /// The subordinate exited or a stream reached EOF/error.
    Gone,
    /// Reply to a TYPE query.
    Type(String),
    /// Reply to a MECHANISMS query.
    MechanismsList(Vec<String>),
}
