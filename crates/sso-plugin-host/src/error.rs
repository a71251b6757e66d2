//! Plugin Host error types.

use sso_core::ErrorKind;
use thiserror::Error;

/// Failures internal to the Plugin Host itself (as opposed to errors the
/// plugin reports through the wire protocol, which travel as
/// [`crate::event::PluginEvent::Error`]).
#[derive(Debug, Error)]
pub enum PluginHostError {
    /// No subordinate binary exists for the requested method type
    /// (SPEC_FULL.md §4.2's "subordinate discovery": "If the binary is
    /// missing, PH fails the request with `MethodNotKnown`").
    #[error("no plugin subordinate found for method {0:?}")]
    MethodNotKnown(String),
    /// The subordinate binary was found but could not be spawned, or
    /// refused its startup handshake.
    #[error("failed to spawn subordinate: {0}")]
    Spawn(String),
    /// The subordinate process exited, or a stream reached EOF/error.
    #[error("subordinate is gone")]
    Gone,
    /// A framing or (de)serialization error — fatal to this subordinate.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// An operation was attempted while one was already outstanding.
    #[error("operation already outstanding")]
    Busy,
    /// Underlying I/O failure talking to the subordinate.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginHostError {
    /// Map onto the daemon-wide taxonomy — per §7, "PH protocol errors
    /// are always `InternalServer` to the client and GONE internally".
    #[must_use]
    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            Self::MethodNotKnown(_) => ErrorKind::MethodNotKnown,
            Self::Gone | Self::Spawn(_) | Self::Protocol(_) | Self::Io(_) => ErrorKind::InternalServer,
            Self::Busy => ErrorKind::WrongState,
        }
    }
}

/// Result type for Plugin Host operations.
pub type PluginHostResult<T> = Result<T, PluginHostError>;
