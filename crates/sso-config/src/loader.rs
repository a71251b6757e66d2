//! Config file discovery and environment-variable precedence, §6.
//!
//! Precedence chain (lowest to highest): embedded defaults → the file at
//! `${SSO_CONFIG_FILE_DIR}/signond.toml` (or the platform default config
//! directory if that variable is unset) → `SSO_*` environment overrides.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_overrides, config_file_dir};
use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

const DEFAULT_PLUGINS_DIR: &str = "/usr/lib/signon/plugins";
const DEFAULT_EXTENSIONS_DIR: &str = "/usr/lib/signon/extensions";

/// Resolve the daemon's configuration: read `signond.toml` if present,
/// then apply every recognized environment variable on top.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the config file's TOML is
/// malformed, or [`ConfigError::InvalidEnv`] if a numeric environment
/// override fails to parse.
pub fn load() -> ConfigResult<Config> {
    let mut config = match find_config_file() {
        Some(path) => load_file(&path)?,
        None => {
            debug!("no signond.toml found, using embedded defaults");
            Config::default()
        }
    };

    config.plugins_dir = PathBuf::from(DEFAULT_PLUGINS_DIR);
    config.extensions_dir = PathBuf::from(DEFAULT_EXTENSIONS_DIR);

    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Parse a single config file with no further layering, for tests and
/// explicit `--config` invocations.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, or
/// [`ConfigError::Parse`] if its TOML is malformed.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "loaded signond config");
    Ok(config)
}

fn find_config_file() -> Option<PathBuf> {
    let dir = config_file_dir().unwrap_or_else(|| PathBuf::from("/etc/signond"));
    let path = dir.join("signond.toml");
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_file_parses_every_section() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [general]
            storage_path = "/tmp/signon.db"
            logging_level = "debug"

            [object_timeouts]
            identity_timeout = 60
            auth_session_timeout = 90
            daemon_timeout = 0
            "#
        )
        .expect("write temp config");

        let config = load_file(file.path()).expect("parse config");
        assert_eq!(config.general.storage_path, PathBuf::from("/tmp/signon.db"));
        assert_eq!(config.general.logging_level, "debug");
        assert_eq!(config.object_timeouts.identity_timeout, 60);
        assert_eq!(config.object_timeouts.auth_session_timeout, 90);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, r#"[general]"#).expect("write temp config");
        let config = load_file(file.path()).expect("parse config");
        assert_eq!(config.object_timeouts.identity_timeout, 300);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "not valid toml {{{{").expect("write temp config");
        assert!(matches!(load_file(file.path()), Err(ConfigError::Parse { .. })));
    }
}
