//! Configuration struct definitions, §6's "Configuration" file sections.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `[General]`: storage location, logging level, and the legacy
/// secure-storage toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct General {
    /// Where the embedded Credentials Store keeps its on-disk data.
    pub storage_path: PathBuf,
    /// Minimum `tracing` level to emit (`trace`/`debug`/`info`/`warn`/`error`).
    pub logging_level: String,
    /// Legacy toggle carried over from the original configuration format;
    /// at-rest DB encryption itself is out of scope for this core (§1).
    pub use_secure_storage: bool,
}

impl Default for General {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            logging_level: "info".to_owned(),
            use_secure_storage: false,
        }
    }
}

fn default_storage_path() -> PathBuf {
    directories_next_data_dir().join("signon.db")
}

fn directories_next_data_dir() -> PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("signon")
}

/// `[SecureStorage]`: opaque key/value configuration handed to whatever
/// storage extension is in use. The core does not interpret these
/// values; it only carries them through to that (out-of-scope)
/// collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecureStorage(pub HashMap<String, String>);

/// `[ObjectTimeouts]`: the three independently configurable idle
/// timeouts described in §5, all in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectTimeouts {
    /// Identity object idle timeout. Default 300s.
    pub identity_timeout: i64,
    /// Auth session idle timeout. Default 300s.
    pub auth_session_timeout: i64,
    /// Daemon idle shutdown timeout. `0` disables. Default 0.
    pub daemon_timeout: i64,
}

impl Default for ObjectTimeouts {
    fn default() -> Self {
        Self {
            identity_timeout: 300,
            auth_session_timeout: 300,
            daemon_timeout: 0,
        }
    }
}

/// The fully resolved daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `[General]` section.
    pub general: General,
    /// `[SecureStorage]` section.
    pub secure_storage: SecureStorage,
    /// `[ObjectTimeouts]` section.
    pub object_timeouts: ObjectTimeouts,
    /// Directory plugin subordinate binaries are discovered in.
    #[serde(skip)]
    pub plugins_dir: PathBuf,
    /// Directory storage/UI extensions are discovered in (out-of-scope
    /// collaborators; the path is still carried through).
    #[serde(skip)]
    pub extensions_dir: PathBuf,
}
