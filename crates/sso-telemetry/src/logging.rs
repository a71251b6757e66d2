//! `tracing`-based structured logging setup, configured from
//! `[General] LoggingLevel` and `SSO_LOGGING_OUTPUT` (§6).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use crate::error::{TelemetryError, TelemetryResult};

/// Output destination for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogTarget {
    /// Plain, human-oriented lines on stdout — the interactive default.
    #[default]
    Stdout,
    /// Compact, ANSI-free lines on stderr, suitable for a process
    /// supervisor (systemd/syslog) to capture and forward.
    ///
    /// A full `RFC 5424` syslog transport is an external-collaborator
    /// concern (§1's logging-setup exclusion); this target only changes
    /// formatting, not the transport.
    Syslog,
}

/// Line format for the `Stdout` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, colorized, human-oriented (the default for a
    /// terminal-attached daemon run).
    #[default]
    Pretty,
    /// Single-line, machine-parseable JSON.
    Json,
    /// Single-line, compact text.
    Compact,
}

/// Logging configuration resolved from `[General]` and the environment.
#[derive(Debug, Clone)]
pub struct LogConfig {
    level: String,
    format: LogFormat,
    target: LogTarget,
    extra_directives: Vec<String>,
}

impl LogConfig {
    /// Start from a base level (`trace`/`debug`/`info`/`warn`/`error`).
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            extra_directives: Vec::new(),
        }
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output target; `Syslog` also switches to the compact,
    /// ANSI-free format unless a format was already set explicitly.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Append an extra `tracing-subscriber` filter directive (e.g.
    /// `"sso_plugin_host=trace"`).
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.extra_directives.push(directive.into());
        self
    }

    fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level).map_err(|source| TelemetryError::InvalidLevel {
            level: self.level.clone(),
            source,
        })?;
        for directive in &self.extra_directives {
            let parsed = directive
                .parse()
                .map_err(|source| TelemetryError::InvalidLevel {
                    level: directive.clone(),
                    source,
                })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install a global `tracing` subscriber built from `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidLevel`] if `config`'s level string
/// isn't a valid filter directive, or [`TelemetryError::AlreadyInstalled`]
/// if a global subscriber is already set.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.env_filter()?;
    let format = match config.target {
        LogTarget::Syslog => LogFormat::Compact,
        LogTarget::Stdout => config.format,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(matches!(config.target, LogTarget::Stdout));

    let result = match format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    result.map_err(|_| TelemetryError::AlreadyInstalled)
}

/// Install logging with the `[General] LoggingLevel` default (`info`)
/// and no extra directives — the common case for `sso-daemon`'s entry
/// point.
///
/// # Errors
///
/// See [`setup_logging`].
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::new("info"))
}
