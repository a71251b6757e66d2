//! The subordinate session-operation state machine, §4.2.
//!
//! ```text
//!   IDLE ──process──► RUNNING ──RESULT──► IDLE
//!                       │
//!                       ├──UI──► AWAIT_UI ──process_ui──► RUNNING
//!                       │
//!                       ├──REFRESH_REQ──► AWAIT_REFRESH ──refresh──► RUNNING
//!                       │
//!                       ├──ERROR──► IDLE (request fails)
//!                       └──CANCEL (host) ──► expect ERROR(cancelled) ──► IDLE
//! ```

/// The subordinate's current operation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubordinateState {
    /// No operation outstanding; ready to accept PROCESS, TYPE, or
    /// MECHANISMS.
    Idle,
    /// A PROCESS/PROCESS\_UI/REFRESH is outstanding; only CANCEL may be
    /// sent.
    Running,
    /// The plugin emitted UI; waiting for the host to send PROCESS\_UI
    /// (or REFRESH, if the UI reply set the refresh flag).
    AwaitUi,
    /// The plugin emitted a refresh request; waiting for REFRESH.
    AwaitRefresh,
    /// The subordinate exited or a stream reached EOF/error. Terminal.
    Gone,
}

impl SubordinateState {
    /// Whether a PROCESS/PROCESS\_UI/REFRESH/TYPE/MECHANISMS query may be
    /// sent right now.
    #[must_use]
    pub fn accepts_new_query(self) -> bool {
        matches!(self, Self::Idle)
    }
}
