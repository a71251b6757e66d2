//! Sso Storage - the Credentials Store (CS).
//!
//! Durable, transactional persistence for identities, methods,
//! mechanisms, tokens, realms, and ACL entries, over an embedded
//! `SurrealDB` (`SurrealKV` engine) — the same storage engine
//! `astrid-storage` uses for its own system stores, reused here for the
//! concern it already owns rather than hand-rolling a SQL layer.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod credentials;
mod db;
mod error;
mod filter;
mod schema;

pub use credentials::Credentials;
pub use db::Database;
pub use error::{StorageError, StorageErrorKind, StorageResult, map_to_error_kind};
pub use filter::CredentialsFilter;
