//! Unsolicited object-path-tagged notifications, §6's `stateChanged` /
//! `infoUpdated` / `unregistered` signals.
//!
//! Every connected client subscribes to the same broadcast channel, so
//! a signal fired while N clients are connected is delivered N times —
//! the local transport has no concept of per-client subscription
//! filtering, matching `astrid-kernel::socket`'s own one-bus-many-
//! subscribers model.

use sso_session::StateChange;
use tokio::sync::broadcast;

use crate::session_paths::SessionPaths;

/// Channel capacity for the signal broadcast bus. Generous relative to
/// expected signal volume; a slow client that falls behind by this many
/// signals loses the oldest ones (`broadcast::Receiver::recv` reports a
/// `Lagged` error) rather than applying backpressure to the rest.
const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// A signal to forward to every connected client, tagged with the
/// object path it concerns.
#[derive(Debug, Clone)]
pub enum Signal {
    /// Session object's `stateChanged(int, string)`.
    StateChanged {
        /// The Session object's path.
        path: String,
        /// The new state code.
        state: u32,
        /// A human-readable message.
        message: String,
    },
    /// Identity object's `infoUpdated(int)`.
    InfoUpdated {
        /// The Identity object's path.
        path: String,
        /// What changed (an `ErrorKind`-free daemon-internal code;
        /// `0` for a generic refresh).
        what: i32,
    },
    /// Identity object's `unregistered()`.
    Unregistered {
        /// The Identity object's path.
        path: String,
    },
}

/// Construct the daemon-wide signal broadcast bus.
#[must_use]
pub fn channel() -> (broadcast::Sender<Signal>, broadcast::Receiver<Signal>) {
    broadcast::channel(SIGNAL_CHANNEL_CAPACITY)
}

/// Spawn the bridge from Session Core's internal `StateChange` stream
/// (keyed by cancel-key) onto the daemon's object-path-tagged `Signal`
/// bus.
///
/// A `StateChange` whose cancel-key no longer maps to a live Session
/// object path (the request finished and `end_request` already ran) is
/// silently dropped — there's no longer a client-visible object to tag
/// it with.
pub fn spawn_state_change_bridge(
    mut state_changes: tokio::sync::mpsc::UnboundedReceiver<StateChange>,
    session_paths: std::sync::Arc<SessionPaths>,
    signals: broadcast::Sender<Signal>,
) {
    tokio::spawn(async move {
        while let Some(change) = state_changes.recv().await {
            if let Some(path) = session_paths.path_for_cancel_key(&change.cancel_key) {
                let _ = signals.send(Signal::StateChanged {
                    path,
                    state: change.state,
                    message: change.message,
                });
            }
        }
    });
}
