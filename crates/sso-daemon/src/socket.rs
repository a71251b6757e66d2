//! The local Unix Domain Socket transport: one listener, one task per
//! connected client, `[u32 big-endian length][JSON payload]` framing.
//!
//! Grounded on `astrid-kernel::socket`'s accept-loop/split-stream
//! shape, generalized for two independent producers onto the same
//! write half (RPC responses and broadcast signals) by funneling both
//! through one `mpsc` channel per connection rather than the single
//! producer the teacher's event bus forwarder assumed.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::rpc::{self, AppState, RpcRequest, RpcResponse};
use crate::signals::Signal;

/// Maximum accepted frame size, mirroring the teacher's guard against a
/// runaway length prefix.
const MAX_FRAME_BYTES: u32 = 10 * 1024 * 1024;

/// Path to the daemon's local socket: `$XDG_RUNTIME_DIR/sso.sock`,
/// falling back to `/tmp/sso.sock` when the runtime directory isn't
/// set (SPEC_FULL.md §6's transport section).
#[must_use]
pub fn socket_path() -> PathBuf {
    let base = sso_config::env::xdg_runtime_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
    base.join("sso.sock")
}

/// What gets written to a connected client: either the response to one
/// of its own requests, or a signal forwarded from the broadcast bus.
enum Outgoing {
    Response(RpcResponse),
    Signal(Signal),
}

/// Bind `path` and accept connections until the process is asked to
/// stop. Removes a stale socket file left behind by an unclean exit.
pub async fn serve(path: &std::path::Path, state: Arc<AppState>) -> std::io::Result<()> {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "listening on local RPC socket");

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    handle_client(stream, state).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to accept a connection");
            }
        }
    }
}

async fn handle_client(stream: UnixStream, state: Arc<AppState>) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Outgoing>();

    let mut signal_rx = state.signals.subscribe();
    let signal_forward_tx = outgoing_tx.clone();
    let signal_task = tokio::spawn(async move {
        loop {
            match signal_rx.recv().await {
                Ok(signal) => {
                    if signal_forward_tx.send(Outgoing::Signal(signal)).is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "client fell behind on the signal bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let write_task = tokio::spawn(async move {
        while let Some(outgoing) = outgoing_rx.recv().await {
            let json = match outgoing {
                Outgoing::Response(response) => serde_json::to_value(&response),
                Outgoing::Signal(signal) => Ok(signal_to_json(&signal)),
            };
            let Ok(json) = json else { continue };
            let Ok(bytes) = serde_json::to_vec(&json) else { continue };
            if write_frame(&mut write_half, &bytes).await.is_err() {
                break;
            }
        }
    });

    loop {
        let Some(payload) = read_frame(&mut read_half).await else {
            break;
        };
        let request: RpcRequest = match serde_json::from_slice(&payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "dropping a malformed request frame");
                continue;
            }
        };
        let response = rpc::dispatch(&state, request).await;
        if outgoing_tx.send(Outgoing::Response(response)).is_err() {
            break;
        }
    }

    signal_task.abort();
    write_task.abort();
}

fn signal_to_json(signal: &Signal) -> serde_json::Value {
    match signal {
        Signal::StateChanged { path, state, message } => serde_json::json!({
            "signal": "stateChanged",
            "path": path,
            "state": state,
            "message": message,
        }),
        Signal::InfoUpdated { path, what } => serde_json::json!({
            "signal": "infoUpdated",
            "path": path,
            "what": what,
        }),
        Signal::Unregistered { path } => serde_json::json!({
            "signal": "unregistered",
            "path": path,
        }),
    }
}

async fn read_frame(read_half: &mut tokio::net::unix::OwnedReadHalf) -> Option<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    read_half.read_exact(&mut len_buf).await.ok()?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        error!(len, "client sent an oversized frame, dropping connection");
        return None;
    }
    let mut payload = vec![0u8; len as usize];
    read_half.read_exact(&mut payload).await.ok()?;
    Some(payload)
}

async fn write_frame(write_half: &mut tokio::net::unix::OwnedWriteHalf, bytes: &[u8]) -> std::io::Result<()> {
    #[allow(clippy::cast_possible_truncation)]
    let len = bytes.len() as u32;
    write_half.write_all(&len.to_be_bytes()).await?;
    write_half.write_all(bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn socket_path_falls_back_to_tmp_without_xdg_runtime_dir() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let previous = std::env::var("XDG_RUNTIME_DIR").ok();
        std::env::remove_var("XDG_RUNTIME_DIR");
        assert_eq!(socket_path(), PathBuf::from("/tmp/sso.sock"));
        if let Some(value) = previous {
            std::env::set_var("XDG_RUNTIME_DIR", value);
        }
    }

    #[test]
    fn signal_to_json_tags_each_variant() {
        let state_changed = signal_to_json(&Signal::StateChanged {
            path: "/SingleSignOn/AuthSession_1".to_owned(),
            state: 3,
            message: "pending".to_owned(),
        });
        assert_eq!(state_changed["signal"], "stateChanged");
        assert_eq!(state_changed["state"], 3);

        let unregistered = signal_to_json(&Signal::Unregistered {
            path: "/SingleSignOn/Identity_1".to_owned(),
        });
        assert_eq!(unregistered["signal"], "unregistered");
    }
}
