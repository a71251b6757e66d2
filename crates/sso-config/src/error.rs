//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failures loading or validating the daemon's configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The config file's TOML was malformed.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// The file that failed to parse.
        path: PathBuf,
        /// The underlying parse failure.
        #[source]
        source: toml::de::Error,
    },
    /// An environment variable override held a value of the wrong shape.
    #[error("environment variable {var} has an invalid value: {reason}")]
    InvalidEnv {
        /// The offending variable name.
        var: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
