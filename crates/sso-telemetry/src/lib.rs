//! Sso Telemetry - logging and tracing setup for the sign-on daemon.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats ([`LogConfig`],
//!   [`setup_logging`])
//! - Request context for correlation across operations
//!   ([`RequestContext`])
//! - Integration with the `tracing` ecosystem
//!
//! Modeled directly on `astrid-telemetry`'s `LogConfig`/`setup_logging`/
//! `RequestContext` shape.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{RequestContext, RequestGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
