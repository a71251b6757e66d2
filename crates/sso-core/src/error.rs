//! Canonical error taxonomy shared by every layer of the daemon.
//!
//! A single [`ErrorKind`] enum carries every failure mode that can reach a
//! client, whether it originated in the Credentials Store, the Plugin Host,
//! or a plugin itself. Layers below the client boundary map their own
//! error types onto it (see `From` impls in `sso-storage` and
//! `sso-plugin-host`) rather than inventing a parallel taxonomy.

use thiserror::Error;

/// The kind half of every user-visible `(kind, message)` failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Catchall for anything not otherwise classified.
    Unknown,
    /// An internal invariant was violated, or storage was unreachable.
    InternalServer,
    /// The message-bus RPC transport itself failed.
    InternalCommunication,
    /// The caller is not in the ACL for the requested operation.
    PermissionDenied,
    /// No plugin is registered for the named method.
    MethodNotKnown,
    /// A plugin was found but refuses to handle the request.
    MethodNotAvailable,
    /// The plugin declined the requested mechanism.
    MechanismNotAvailable,
    /// The daemon is shutting down or not yet ready.
    ServiceNotAvailable,
    /// The client supplied a malformed filter or map.
    InvalidQuery,
    /// The identity id is absent from the Credentials Store.
    IdentityNotFound,
    /// A CS `insert`/`update` transaction rolled back.
    StoreFailed,
    /// A CS `remove` transaction rolled back.
    RemoveFailed,
    /// A required session-data key was absent.
    MissingData,
    /// The plugin rejected the supplied secret.
    InvalidCredentials,
    /// The operation is not valid in the session's current state.
    WrongState,
    /// The plugin does not implement the requested operation.
    OperationNotSupported,
    /// Transport problem reported by the plugin: no connection.
    NoConnection,
    /// Transport problem reported by the plugin: network failure.
    Network,
    /// Transport problem reported by the plugin: TLS/SSL failure.
    Ssl,
    /// Deserialization or cast failure crossing the wire protocol.
    Runtime,
    /// The request was explicitly canceled.
    SessionCanceled,
    /// Idle eviction fired on a request still pending.
    TimedOut,
    /// The SignOnUI collaborator refused or errored.
    UserInteraction,
    /// A generic transient plugin failure.
    OperationFailed,
    /// A plugin-defined error code at or above [`ErrorKind::USER_BASE`].
    User(u32),
}

impl ErrorKind {
    /// Plugin-defined error codes are numbered starting here.
    pub const USER_BASE: u32 = 512;

    /// Decode a wire `u32` error-kind into an [`ErrorKind`].
    #[must_use]
    pub fn from_wire(code: u32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::InternalServer,
            2 => Self::InternalCommunication,
            3 => Self::PermissionDenied,
            4 => Self::MethodNotKnown,
            5 => Self::MethodNotAvailable,
            6 => Self::MechanismNotAvailable,
            7 => Self::ServiceNotAvailable,
            8 => Self::InvalidQuery,
            9 => Self::IdentityNotFound,
            10 => Self::StoreFailed,
            11 => Self::RemoveFailed,
            12 => Self::MissingData,
            13 => Self::InvalidCredentials,
            14 => Self::WrongState,
            15 => Self::OperationNotSupported,
            16 => Self::NoConnection,
            17 => Self::Network,
            18 => Self::Ssl,
            19 => Self::Runtime,
            20 => Self::SessionCanceled,
            21 => Self::TimedOut,
            22 => Self::UserInteraction,
            23 => Self::OperationFailed,
            n if n >= Self::USER_BASE => Self::User(n),
            _ => Self::Unknown,
        }
    }

    /// Encode back to the wire `u32` representation.
    #[must_use]
    pub fn to_wire(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::InternalServer => 1,
            Self::InternalCommunication => 2,
            Self::PermissionDenied => 3,
            Self::MethodNotKnown => 4,
            Self::MethodNotAvailable => 5,
            Self::MechanismNotAvailable => 6,
            Self::ServiceNotAvailable => 7,
            Self::InvalidQuery => 8,
            Self::IdentityNotFound => 9,
            Self::StoreFailed => 10,
            Self::RemoveFailed => 11,
            Self::MissingData => 12,
            Self::InvalidCredentials => 13,
            Self::WrongState => 14,
            Self::OperationNotSupported => 15,
            Self::NoConnection => 16,
            Self::Network => 17,
            Self::Ssl => 18,
            Self::Runtime => 19,
            Self::SessionCanceled => 20,
            Self::TimedOut => 21,
            Self::UserInteraction => 22,
            Self::OperationFailed => 23,
            Self::User(n) => n,
        }
    }
}

/// A user-visible failure: a classification plus a human-readable message.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct SsoError {
    /// The error's classification.
    pub kind: ErrorKind,
    /// A human-readable description, forwarded as-is from plugins.
    pub message: String,
}

impl SsoError {
    /// Build an error from a kind and a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`ErrorKind::InternalServer`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalServer, message)
    }

    /// Shorthand for [`ErrorKind::IdentityNotFound`].
    pub fn identity_not_found(id: u32) -> Self {
        Self::new(ErrorKind::IdentityNotFound, format!("no identity {id}"))
    }
}

/// Result type used at every public API boundary in the daemon.
pub type SsoResult<T> = Result<T, SsoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip_covers_known_kinds() {
        let kinds = [
            ErrorKind::Unknown,
            ErrorKind::InternalServer,
            ErrorKind::MechanismNotAvailable,
            ErrorKind::SessionCanceled,
            ErrorKind::TimedOut,
            ErrorKind::OperationFailed,
        ];
        for kind in kinds {
            assert_eq!(ErrorKind::from_wire(kind.to_wire()), kind);
        }
    }

    #[test]
    fn user_codes_round_trip() {
        let kind = ErrorKind::from_wire(600);
        assert_eq!(kind, ErrorKind::User(600));
        assert_eq!(kind.to_wire(), 600);
    }

    #[test]
    fn unrecognized_low_code_maps_to_unknown() {
        assert_eq!(ErrorKind::from_wire(255), ErrorKind::Unknown);
    }
}
