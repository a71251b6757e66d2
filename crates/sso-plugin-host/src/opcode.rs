//! Wire opcodes, §4.2 of the specification.

/// Opcodes the host sends to the subordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOpcode {
    /// Ask the subordinate to shut down cleanly.
    Stop,
    /// Cancel the outstanding PROCESS/PROCESS_UI/REFRESH.
    Cancel,
    /// Query the plugin's type name.
    Type,
    /// Query the plugin's supported mechanisms.
    Mechanisms,
    /// Begin processing a mechanism with session data.
    Process,
    /// Resume processing after a UI round-trip.
    ProcessUi,
    /// Resume processing after a refresh round-trip.
    Refresh,
}

impl ClientOpcode {
    /// The wire `u32` value.
    #[must_use]
    pub fn to_wire(self) -> u32 {
        match self {
            Self::Stop => 0,
            Self::Cancel => 1,
            Self::Type => 2,
            Self::Mechanisms => 3,
            Self::Process => 4,
            Self::ProcessUi => 5,
            Self::Refresh => 6,
        }
    }
}

/// Opcodes the subordinate sends back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginOpcode {
    /// Final successful result.
    Result,
    /// A map to persist into the identity backing the session.
    Store,
    /// A typed error.
    Error,
    /// An interactive UI round-trip is needed.
    Ui,
    /// A refresh round-trip is needed.
    RefreshReply,
    /// An out-of-band state change notification.
    Signal,
    /// Reply to a TYPE query.
    TypeReply,
    /// Reply to a MECHANISMS query.
    MechanismsReply,
}

impl PluginOpcode {
    /// Decode a wire `u32` opcode.
    #[must_use]
    pub fn from_wire(code: u32) -> Option<Self> {
        match code {
            10 => Some(Self::Result),
            11 => Some(Self::Store),
            12 => Some(Self::Error),
            13 => Some(Self::Ui),
            14 => Some(Self::RefreshReply),
            15 => Some(Self::Signal),
            16 => Some(Self::TypeReply),
            17 => Some(Self::MechanismsReply),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_opcodes_match_the_wire_table() {
        assert_eq!(ClientOpcode::Stop.to_wire(), 0);
        assert_eq!(ClientOpcode::Cancel.to_wire(), 1);
        assert_eq!(ClientOpcode::Type.to_wire(), 2);
        assert_eq!(ClientOpcode::Mechanisms.to_wire(), 3);
        assert_eq!(ClientOpcode::Process.to_wire(), 4);
        assert_eq!(ClientOpcode::ProcessUi.to_wire(), 5);
        assert_eq!(ClientOpcode::Refresh.to_wire(), 6);
    }

    #[test]
    fn plugin_opcodes_round_trip() {
        assert_eq!(PluginOpcode::from_wire(10), Some(PluginOpcode::Result));
        assert_eq!(PluginOpcode::from_wire(15), Some(PluginOpcode::Signal));
        assert_eq!(PluginOpcode::from_wire(17), Some(PluginOpcode::MechanismsReply));
        assert_eq!(PluginOpcode::from_wire(99), None);
    }
}
