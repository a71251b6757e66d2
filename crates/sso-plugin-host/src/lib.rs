//! Spawns and speaks the wire protocol to one subordinate plugin
//! process per session, §4.2.
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

mod blob;
mod error;
mod event;
mod host;
mod opcode;
mod state;

pub use blob::MAX_BLOB_BYTES;
pub use error::{PluginHostError, PluginHostResult};
pub use event::{PluginEvent, PluginEventKind};
pub use host::{subordinate_path, PluginHost};
pub use opcode::{ClientOpcode, PluginOpcode};
pub use state::SubordinateState;
