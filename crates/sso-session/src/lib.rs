//! Sso Session - the per-`(identity, method)` request queue that drives
//! a Plugin Host and mediates `SignOnUI`, §4.3 of the specification.
//!
//! This crate provides:
//! - The Session actor: one FIFO request queue and one owned Plugin
//!   Host per `(identity-id, method)` pair ([`session`])
//! - The session table and daemon-wide dependency-injection context
//!   ([`registry`])
//! - The `SignOnUI` collaborator trait ([`ui`])

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod registry;
mod request;
mod session;
mod ui;

pub use error::{SessionError, SessionResult};
pub use registry::{DaemonContext, ObjectTimeouts, SessionRegistry};
pub use request::{Request, RequestOutcome};
pub use session::{spawn_session, SessionHandle, StateChange, STATE_SESSION_STARTED};
pub use ui::{NoUi, SignOnUi};
