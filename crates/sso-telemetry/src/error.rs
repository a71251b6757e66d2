//! Telemetry error types.

use thiserror::Error;

/// Failures standing up the `tracing` subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The requested logging level string did not parse as a
    /// `tracing` directive.
    #[error("invalid logging level {level:?}: {source}")]
    InvalidLevel {
        /// The offending level string.
        level: String,
        /// The underlying parse failure.
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    /// A global subscriber was already installed.
    #[error("a tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
