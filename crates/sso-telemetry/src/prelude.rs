//! Commonly used types for convenient import.
//!
//! ```rust,no_run
//! use sso_telemetry::prelude::*;
//!
//! # fn main() -> TelemetryResult<()> {
//! let config = LogConfig::new("debug").with_format(LogFormat::Pretty);
//! setup_logging(&config)?;
//!
//! let ctx = RequestContext::new("session-core").with_operation("process");
//! let _guard = ctx.enter();
//! tracing::info!("processing request");
//! # Ok(())
//! # }
//! ```

pub use crate::{
    LogConfig, LogFormat, LogTarget, RequestContext, RequestGuard, TelemetryError, TelemetryResult,
    setup_default_logging, setup_logging,
};
