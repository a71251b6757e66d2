//! Session Core error types.

use sso_core::ErrorKind;
use thiserror::Error;

/// Failures raised by Session Core itself, as opposed to `(kind,
/// message)` pairs forwarded from a plugin or the Credentials Store.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `set_id` targeted a key that already has a live session.
    #[error("a session already exists for this identity and method")]
    KeyInUse,
    /// The request was canceled before the plugin replied.
    #[error("session canceled")]
    Canceled,
    /// The underlying Plugin Host failed.
    #[error(transparent)]
    PluginHost(#[from] sso_plugin_host::PluginHostError),
    /// The underlying Credentials Store failed.
    #[error(transparent)]
    Storage(#[from] sso_storage::StorageError),
}

impl SessionError {
    /// Map onto the daemon-wide taxonomy, per §7's propagation rules.
    #[must_use]
    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            Self::KeyInUse => ErrorKind::WrongState,
            Self::Canceled => ErrorKind::SessionCanceled,
            Self::PluginHost(e) => e.to_error_kind(),
            Self::Storage(e) => sso_storage::map_to_error_kind(e, false),
        }
    }
}

/// Result type for Session Core operations.
pub type SessionResult<T> = Result<T, SessionError>;
