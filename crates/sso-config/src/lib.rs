//! Sso Config - layered configuration loading for the sign-on daemon.
//!
//! Resolves the `[General]` / `[SecureStorage]` / `[ObjectTimeouts]`
//! sections of `signond.toml` (§6) and applies `SSO_*` environment
//! variable overrides on top, modeled on `astrid-config`'s
//! defaults-then-overlay loading (scaled down: this daemon has one
//! config file layer, not a multi-directory precedence chain).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod env;
pub mod error;
mod loader;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_file};
pub use types::{Config, General, ObjectTimeouts, SecureStorage};
