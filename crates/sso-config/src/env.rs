//! Environment variable overrides, §6.
//!
//! "Environment variables override configuration-file values." Applied
//! after the file is parsed, each recognized `SSO_*` variable overwrites
//! the corresponding field unconditionally when present.

use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Apply every recognized `SSO_*` environment variable on top of `config`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnv`] if a numeric override cannot be
/// parsed.
pub fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some(v) = var("SSO_STORAGE_PATH") {
        config.general.storage_path = PathBuf::from(v);
    }
    if let Some(v) = var("SSO_PLUGINS_DIR") {
        config.plugins_dir = PathBuf::from(v);
    }
    if let Some(v) = var("SSO_EXTENSIONS_DIR") {
        config.extensions_dir = PathBuf::from(v);
    }
    if let Some(v) = var("SSO_LOGGING_LEVEL") {
        config.general.logging_level = v;
    }
    if let Some(v) = parse_i64("SSO_DAEMON_TIMEOUT")? {
        config.object_timeouts.daemon_timeout = v;
    }
    if let Some(v) = parse_i64("SSO_IDENTITY_TIMEOUT")? {
        config.object_timeouts.identity_timeout = v;
    }
    if let Some(v) = parse_i64("SSO_AUTHSESSION_TIMEOUT")? {
        config.object_timeouts.auth_session_timeout = v;
    }
    Ok(())
}

/// `SSO_LOGGING_OUTPUT`: `syslog` or `stdout`. Read separately from
/// [`apply_env_overrides`] since it's consumed by `sso-telemetry`, not
/// stored on [`Config`].
#[must_use]
pub fn logging_output() -> Option<String> {
    var("SSO_LOGGING_OUTPUT")
}

/// `SSO_CONFIG_FILE_DIR`: overrides where the config file itself is
/// discovered, read by the loader before any file parsing happens.
#[must_use]
pub fn config_file_dir() -> Option<PathBuf> {
    var("SSO_CONFIG_FILE_DIR").map(PathBuf::from)
}

/// `XDG_RUNTIME_DIR`: the directory the daemon's Unix socket is created
/// under (§6, "Local transport").
#[must_use]
pub fn xdg_runtime_dir() -> Option<PathBuf> {
    var("XDG_RUNTIME_DIR").map(PathBuf::from)
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_i64(name: &'static str) -> ConfigResult<Option<i64>> {
    match var(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnv {
                var: name,
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn overrides_storage_path_and_timeout() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("SSO_STORAGE_PATH", "/tmp/custom.db");
        std::env::set_var("SSO_IDENTITY_TIMEOUT", "42");
        let mut config = Config::default();
        apply_env_overrides(&mut config).expect("overrides apply");
        assert_eq!(config.general.storage_path, PathBuf::from("/tmp/custom.db"));
        assert_eq!(config.object_timeouts.identity_timeout, 42);
        std::env::remove_var("SSO_STORAGE_PATH");
        std::env::remove_var("SSO_IDENTITY_TIMEOUT");
    }

    #[test]
    fn rejects_non_numeric_timeout() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("SSO_DAEMON_TIMEOUT", "not-a-number");
        let mut config = Config::default();
        assert!(apply_env_overrides(&mut config).is_err());
        std::env::remove_var("SSO_DAEMON_TIMEOUT");
    }
}
