//! One subordinate process and the typed protocol spoken to it.
//!
//! A [`PluginHost`] is owned by exactly one Session (§5, "A session owns
//! exactly one Plugin Host"); the subordinate is spawned lazily, on the
//! first PROCESS sent through this host.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use sso_core::{ErrorKind, SessionData};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::blob::{read_blob, read_opcode, read_string, read_string_list, write_blob, write_opcode, write_string};
use crate::error::{PluginHostError, PluginHostResult};
use crate::event::{PluginEvent, PluginEventKind};
use crate::opcode::{ClientOpcode, PluginOpcode};
use crate::state::SubordinateState;

/// The literal startup token a subordinate writes to stdout (unframed)
/// before entering its event loop.
const STARTUP_TOKEN: &str = "process started";

/// Where subordinate binaries live, and how a method type maps to one.
///
/// `${SSO_PLUGINS_DIR}/signon-plugin-<type>`, passed the method type as
/// `argv[1]` — see SPEC_FULL.md §4.2's "Subordinate discovery" note.
#[must_use]
pub fn subordinate_path(plugins_dir: &std::path::Path, method_type: &str) -> std::path::PathBuf {
    plugins_dir.join(format!("signon-plugin-{method_type}"))
}

/// A live (or not-yet-spawned) subordinate and the framed protocol to it.
pub struct PluginHost {
    method_type: String,
    plugins_dir: std::path::PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    state: Arc<Mutex<SubordinateState>>,
    events_tx: mpsc::UnboundedSender<PluginEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<PluginEvent>>,
}

impl PluginHost {
    /// Construct a host for `method_type`; no process is spawned yet.
    #[must_use]
    pub fn new(method_type: impl Into<String>, plugins_dir: impl Into<std::path::PathBuf>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            method_type: method_type.into(),
            plugins_dir: plugins_dir.into(),
            child: None,
            stdin: None,
            state: Arc::new(Mutex::new(SubordinateState::Idle)),
            events_tx: tx,
            events_rx: Some(rx),
        }
    }

    /// Take the event receiver. Session Core polls this in its event
    /// loop; may only be called once.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn take_events(&mut self) -> mpsc::UnboundedReceiver<PluginEvent> {
        self.events_rx.take().expect("events receiver already taken")
    }

    /// The current subordinate state.
    #[must_use]
    pub fn state(&self) -> SubordinateState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SubordinateState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Spawn the subordinate if it isn't already running.
    ///
    /// # Errors
    ///
    /// Returns [`PluginHostError::MethodNotKnown`] if no subordinate
    /// binary exists for this method, or [`PluginHostError::Spawn`] if
    /// the process refuses to start as root, or fails to spawn, or its
    /// startup handshake fails.
    pub async fn ensure_spawned(&mut self) -> PluginHostResult<()> {
        if self.child.is_some() {
            return Ok(());
        }

        if is_running_as_root() {
            return Err(PluginHostError::Spawn(
                "refusing to spawn plugin subordinate as root".to_owned(),
            ));
        }

        let path = self.resolve_subordinate_path()?;
        let mut child = Command::new(&path)
            .arg(&self.method_type)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PluginHostError::Spawn(format!("{}: {e}", path.display())))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| PluginHostError::Spawn("no stdout pipe".to_owned()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PluginHostError::Spawn("no stderr pipe".to_owned()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PluginHostError::Spawn("no stdin pipe".to_owned()))?;

        let mut startup = [0u8; STARTUP_TOKEN.len()];
        stdout
            .read_exact(&mut startup)
            .await
            .map_err(|e| PluginHostError::Spawn(format!("startup handshake failed: {e}")))?;
        if startup != STARTUP_TOKEN.as_bytes() {
            return Err(PluginHostError::Spawn(
                "subordinate did not send the expected startup token".to_owned(),
            ));
        }

        info!(method = %self.method_type, "subordinate started");

        spawn_reader(
            BufReader::new(stdout),
            stderr,
            self.events_tx.clone(),
            Arc::clone(&self.state),
        );

        self.child = Some(child);
        self.stdin = Some(stdin);
        Ok(())
    }

    fn stdin_mut(&mut self) -> PluginHostResult<&mut ChildStdin> {
        self.stdin.as_mut().ok_or(PluginHostError::Gone)
    }

    /// Send TYPE. Synchronous query op — only valid when no operation is
    /// outstanding. The reply arrives as [`PluginEventKind::Type`] on the
    /// event channel returned by [`Self::take_events`].
    ///
    /// # Errors
    ///
    /// Returns [`PluginHostError::Busy`] if an op is outstanding.
    pub async fn query_type(&mut self) -> PluginHostResult<()> {
        self.ensure_spawned().await?;
        if !self.state().accepts_new_query() {
            return Err(PluginHostError::Busy);
        }
        write_opcode(self.stdin_mut()?, ClientOpcode::Type.to_wire()).await
    }

    /// Send MECHANISMS. Synchronous query op — only valid when no
    /// operation is outstanding. The reply arrives as
    /// [`PluginEventKind::MechanismsList`] on the event channel.
    ///
    /// # Errors
    ///
    /// Returns [`PluginHostError::Busy`] if an op is outstanding.
    pub async fn query_mechanisms(&mut self) -> PluginHostResult<()> {
        self.ensure_spawned().await?;
        if !self.state().accepts_new_query() {
            return Err(PluginHostError::Busy);
        }
        write_opcode(self.stdin_mut()?, ClientOpcode::Mechanisms.to_wire()).await
    }

    /// Send PROCESS: begin a mechanism on `data`, tagged with
    /// `cancel_key`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginHostError::Busy`] if an op is already outstanding.
    pub async fn process(
        &mut self,
        cancel_key: &str,
        mechanism: &str,
        data: &SessionData,
    ) -> PluginHostResult<()> {
        self.ensure_spawned().await?;
        if !self.state().accepts_new_query() {
            return Err(PluginHostError::Busy);
        }
        let stdin = self.stdin_mut()?;
        write_opcode(stdin, ClientOpcode::Process.to_wire()).await?;
        write_string(stdin, mechanism).await?;
        write_blob(stdin, data).await?;
        let _ = cancel_key; // carried by Session Core's own request queue, not the wire
        self.set_state(SubordinateState::Running);
        Ok(())
    }

    /// Send PROCESS\_UI: resume after a UI round-trip.
    ///
    /// # Errors
    ///
    /// Returns [`PluginHostError::Protocol`] if not in `AwaitUi`.
    pub async fn process_ui(&mut self, data: &SessionData) -> PluginHostResult<()> {
        if self.state() != SubordinateState::AwaitUi {
            return Err(PluginHostError::Protocol(
                "PROCESS_UI sent while not awaiting UI".to_owned(),
            ));
        }
        let stdin = self.stdin_mut()?;
        write_opcode(stdin, ClientOpcode::ProcessUi.to_wire()).await?;
        write_blob(stdin, data).await?;
        self.set_state(SubordinateState::Running);
        Ok(())
    }

    /// Send REFRESH: resume after a refresh round-trip.
    ///
    /// # Errors
    ///
    /// Returns [`PluginHostError::Protocol`] if not in `AwaitRefresh`.
    pub async fn refresh(&mut self, data: &SessionData) -> PluginHostResult<()> {
        if self.state() != SubordinateState::AwaitRefresh {
            return Err(PluginHostError::Protocol(
                "REFRESH sent while not awaiting refresh".to_owned(),
            ));
        }
        let stdin = self.stdin_mut()?;
        write_opcode(stdin, ClientOpcode::Refresh.to_wire()).await?;
        write_blob(stdin, data).await?;
        self.set_state(SubordinateState::Running);
        Ok(())
    }

    /// Send CANCEL. Valid in any non-`Idle`, non-`Gone` state; while one
    /// op is outstanding this is the *only* opcode PH will send.
    ///
    /// # Errors
    ///
    /// Returns [`PluginHostError::Gone`] if the subordinate has exited.
    pub async fn cancel(&mut self) -> PluginHostResult<()> {
        let stdin = self.stdin_mut()?;
        write_opcode(stdin, ClientOpcode::Cancel.to_wire()).await?;
        Ok(())
    }

    /// Locate the subordinate binary: `${SSO_PLUGINS_DIR}/signon-plugin-
    /// <type>` first, falling back to a `PATH` lookup of the same
    /// filename for subordinates installed outside `plugins_dir`
    /// (mirroring how a real package might ship its plugin binary on
    /// `$PATH` instead of under the configured plugins directory).
    ///
    /// # Errors
    ///
    /// Returns [`PluginHostError::MethodNotKnown`] if neither location
    /// has the binary.
    fn resolve_subordinate_path(&self) -> PluginHostResult<std::path::PathBuf> {
        let configured = subordinate_path(&self.plugins_dir, &self.method_type);
        if configured.is_file() {
            return Ok(configured);
        }
        let name = configured
            .file_name()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or(&self.method_type)
            .to_owned();
        which::which(&name).map_err(|_| PluginHostError::MethodNotKnown(self.method_type.clone()))
    }

    /// Send STOP and let the subordinate shut down.
    pub async fn stop(&mut self) {
        if let Some(stdin) = self.stdin.as_mut() {
            let _ = write_opcode(stdin, ClientOpcode::Stop.to_wire()).await;
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.wait().await;
        }
        self.set_state(SubordinateState::Gone);
    }
}

#[cfg(unix)]
fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_running_as_root() -> bool {
    false
}

fn spawn_reader(
    mut stdout: BufReader<tokio::process::ChildStdout>,
    mut stderr: tokio::process::ChildStderr,
    events_tx: mpsc::UnboundedSender<PluginEvent>,
    state: Arc<Mutex<SubordinateState>>,
) {
    tokio::spawn(async move {
        let mut stderr_buf = [0u8; 1];
        loop {
            tokio::select! {
                opcode = read_opcode(&mut stdout) => {
                    match opcode {
                        Ok(code) => {
                            if handle_plugin_message(code, &mut stdout, &events_tx, &state)
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                n = stderr.read(&mut stderr_buf) => {
                    // A stream-error condition on stderr (EOF, or any
                    // readable byte treated as a liveness signal we
                    // don't otherwise interpret) is not itself fatal;
                    // only an actual read error or stdout EOF is.
                    if matches!(n, Ok(0)) {
                        // stderr EOF alongside a dead stdout read below
                        // is handled by the outer select failing.
                    }
                }
            }
        }

        *state.lock().unwrap_or_else(|e| e.into_inner()) = SubordinateState::Gone;
        let _ = events_tx.send(PluginEvent {
            cancel_key: String::new(),
            kind: PluginEventKind::Gone,
        });
        warn!("plugin subordinate reader loop exited");
    });
}

async fn handle_plugin_message(
    code: u32,
    stdout: &mut BufReader<tokio::process::ChildStdout>,
    events_tx: &mpsc::UnboundedSender<PluginEvent>,
    state: &Arc<Mutex<SubordinateState>>,
) -> PluginHostResult<()> {
    let Some(opcode) = PluginOpcode::from_wire(code) else {
        return Err(PluginHostError::Protocol(format!("unknown plugin opcode {code}")));
    };

    let event_kind = match opcode {
        PluginOpcode::Result => {
            let data = read_blob(stdout).await?;
            set(state, SubordinateState::Idle);
            PluginEventKind::Result(data)
        }
        PluginOpcode::Store => {
            let data = read_blob(stdout).await?;
            PluginEventKind::Store(data)
        }
        PluginOpcode::Error => {
            let mut code_buf = [0u8; 4];
            tokio::io::AsyncReadExt::read_exact(stdout, &mut code_buf).await?;
            let kind = ErrorKind::from_wire(u32::from_be_bytes(code_buf));
            let message = read_string(stdout).await?;
            set(state, SubordinateState::Idle);
            PluginEventKind::Error { kind, message }
        }
        PluginOpcode::Ui => {
            let data = read_blob(stdout).await?;
            set(state, SubordinateState::AwaitUi);
            PluginEventKind::Ui(data)
        }
        PluginOpcode::RefreshReply => {
            let data = read_blob(stdout).await?;
            set(state, SubordinateState::AwaitRefresh);
            PluginEventKind::RefreshReply(data)
        }
        PluginOpcode::Signal => {
            let mut state_buf = [0u8; 4];
            tokio::io::AsyncReadExt::read_exact(stdout, &mut state_buf).await?;
            let signal_state = u32::from_be_bytes(state_buf);
            let message = read_string(stdout).await?;
            PluginEventKind::Signal {
                state: signal_state,
                message,
            }
        }
        PluginOpcode::TypeReply => {
            let type_name = read_string(stdout).await?;
            set(state, SubordinateState::Idle);
            PluginEventKind::Type(type_name)
        }
        PluginOpcode::MechanismsReply => {
            let mechanisms = read_string_list(stdout).await?;
            set(state, SubordinateState::Idle);
            PluginEventKind::MechanismsList(mechanisms)
        }
    };

    let _ = events_tx.send(PluginEvent {
        cancel_key: String::new(),
        kind: event_kind,
    });
    Ok(())
}

fn set(state: &Arc<Mutex<SubordinateState>>, value: SubordinateState) {
    *state.lock().unwrap_or_else(|e| e.into_inner()) = value;
}
