//! A single queued authentication request, §4.3's "Request".

use sso_core::{ErrorKind, SessionData};
use tokio::sync::oneshot;

/// The outcome delivered on a [`Request`]'s reply channel.
pub type RequestOutcome = Result<SessionData, (ErrorKind, String)>;

/// One request in a Session's FIFO queue.
///
/// Belongs to exactly one Session. The head request is the only one
/// that may be interacting with the plugin.
pub struct Request {
    /// Opaque unique cancellation token for this request.
    pub cancel_key: String,
    /// The mechanism to process.
    pub mechanism: String,
    /// The request's own session-data map.
    pub session_data: SessionData,
    /// Where the eventual success/failure is delivered.
    pub reply: oneshot::Sender<RequestOutcome>,
}

impl Request {
    /// Build a new request.
    #[must_use]
    pub fn new(
        cancel_key: impl Into<String>,
        mechanism: impl Into<String>,
        session_data: SessionData,
        reply: oneshot::Sender<RequestOutcome>,
    ) -> Self {
        Self {
            cancel_key: cancel_key.into(),
            mechanism: mechanism.into(),
            session_data,
            reply,
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("cancel_key", &self.cancel_key)
            .field("mechanism", &self.mechanism)
            .finish_non_exhaustive()
    }
}
