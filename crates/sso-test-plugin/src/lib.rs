//! Fixture subordinate implementing the `ssotest`/`ssotest2` wire
//! protocol described in SPEC_FULL.md §4.2 and exercised by §8's
//! end-to-end scenarios.
//!
//! This is the "sample test plugin" the specification calls out as
//! having out-of-scope business logic — only its *protocol behavior*
//! is specified, and that's all this crate implements. It is spawned
//! as a real child process by [`sso_plugin_host::PluginHost`] in tests,
//! exactly as a production plugin would be.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]

use std::collections::HashSet;

use sso_core::{ErrorKind, SessionData, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt, Stdin, Stdout};

const CLIENT_STOP: u32 = 0;
const CLIENT_CANCEL: u32 = 1;
const CLIENT_TYPE: u32 = 2;
const CLIENT_MECHANISMS: u32 = 3;
const CLIENT_PROCESS: u32 = 4;
const CLIENT_PROCESS_UI: u32 = 5;
const CLIENT_REFRESH: u32 = 6;

const PLUGIN_RESULT: u32 = 10;
const PLUGIN_STORE: u32 = 11;
const PLUGIN_ERROR: u32 = 12;
const PLUGIN_UI: u32 = 13;

const STARTUP_TOKEN: &[u8] = b"process started";
const MAX_BLOB_BYTES: u32 = 16 * 1024 * 1024;

async fn write_opcode(out: &mut Stdout, opcode: u32) -> std::io::Result<()> {
    out.write_all(&opcode.to_be_bytes()).await
}

async fn read_opcode(input: &mut Stdin) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

async fn write_blob(out: &mut Stdout, data: &SessionData) -> std::io::Result<()> {
    let bytes = serde_json::to_vec(data).expect("SessionData always serializes");
    let len = u32::try_from(bytes.len()).expect("fixture blobs stay well under u32::MAX");
    out.write_all(&len.to_be_bytes()).await?;
    out.write_all(&bytes).await
}

async fn read_blob(input: &mut Stdin) -> std::io::Result<SessionData> {
    let mut len_buf = [0u8; 4];
    input.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf).min(MAX_BLOB_BYTES);
    let mut payload = vec![0u8; len as usize];
    input.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload).unwrap_or_default())
}

async fn write_string(out: &mut Stdout, s: &str) -> std::io::Result<()> {
    let bytes = s.as_bytes();
    let len = u32::try_from(bytes.len()).expect("fixture strings stay well under u32::MAX");
    out.write_all(&len.to_be_bytes()).await?;
    out.write_all(bytes).await
}

async fn read_string(input: &mut Stdin) -> std::io::Result<String> {
    let mut len_buf = [0u8; 4];
    input.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf).min(MAX_BLOB_BYTES);
    let mut buf = vec![0u8; len as usize];
    input.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn write_string_list(out: &mut Stdout, items: &[&str]) -> std::io::Result<()> {
    let count = u32::try_from(items.len()).expect("fixture mechanism lists are tiny");
    out.write_all(&count.to_be_bytes()).await?;
    for item in items {
        write_string(out, item).await?;
    }
    Ok(())
}

async fn write_error(out: &mut Stdout, kind: ErrorKind, message: &str) -> std::io::Result<()> {
    write_opcode(out, PLUGIN_ERROR).await?;
    out.write_all(&kind.to_wire().to_be_bytes()).await?;
    write_string(out, message).await
}

/// `Realm` injected by the `mech1` mechanism, matching the `testRealm`
/// naming convention scenario 3 exercises.
pub const MECH1_REALM: &str = "testRealm_after_test";

/// Run the fixture plugin's event loop for `type_name`, supporting
/// `mechanisms`. Blocks until STOP is received or a stream closes.
///
/// # Panics
///
/// Panics if stdout cannot accept the startup handshake — a dead pipe
/// at that point means the parent process is already gone and there is
/// nothing left to serve.
pub async fn run(type_name: &str, mechanisms: &[&str]) {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let known: HashSet<&str> = mechanisms.iter().copied().collect();

    stdout
        .write_all(STARTUP_TOKEN)
        .await
        .expect("startup handshake write failed");
    stdout.flush().await.expect("startup handshake flush failed");

    loop {
        let Ok(opcode) = read_opcode(&mut stdin).await else {
            return;
        };

        match opcode {
            CLIENT_STOP => return,
            CLIENT_CANCEL => {
                // No operation outstanding between reads of this loop;
                // a CANCEL arriving here is racing STOP/shutdown and is
                // silently ignored, matching the "or none" wire-table
                // entry for CANCEL.
            }
            CLIENT_TYPE => {
                if write_opcode(&mut stdout, 16).await.is_err() || write_string(&mut stdout, type_name).await.is_err() {
                    return;
                }
            }
            CLIENT_MECHANISMS => {
                let list: Vec<&str> = mechanisms.to_vec();
                if write_opcode(&mut stdout, 17).await.is_err() || write_string_list(&mut stdout, &list).await.is_err() {
                    return;
                }
            }
            CLIENT_PROCESS => {
                let Ok(mechanism) = read_string(&mut stdin).await else {
                    return;
                };
                let Ok(data) = read_blob(&mut stdin).await else {
                    return;
                };
                if !known.contains(mechanism.as_str()) {
                    if write_error(&mut stdout, ErrorKind::MechanismNotAvailable, &mechanism).await.is_err() {
                        return;
                    }
                    continue;
                }
                if process_mechanism(&mut stdin, &mut stdout, &mechanism, data).await.is_err() {
                    return;
                }
            }
            CLIENT_PROCESS_UI | CLIENT_REFRESH => {
                // Resume after a UI/refresh round-trip: persist the
                // reply map (mirroring a real credential-caching
                // plugin) before confirming it as the final result.
                let Ok(data) = read_blob(&mut stdin).await else {
                    return;
                };
                if write_opcode(&mut stdout, PLUGIN_STORE).await.is_err() || write_blob(&mut stdout, &data).await.is_err() {
                    return;
                }
                if write_opcode(&mut stdout, PLUGIN_RESULT).await.is_err() || write_blob(&mut stdout, &data).await.is_err() {
                    return;
                }
            }
            _ => return,
        }
    }
}

async fn process_mechanism(
    stdin: &mut Stdin,
    stdout: &mut Stdout,
    mechanism: &str,
    mut data: SessionData,
) -> std::io::Result<()> {
    match mechanism {
        "mech1" => {
            data.set("Realm", MECH1_REALM);
            write_opcode(stdout, PLUGIN_RESULT).await?;
            write_blob(stdout, &data).await
        }
        "mech2" => {
            // Emit a UI round-trip; the host mediates it and replies
            // via PROCESS_UI, handled in the main loop above.
            write_opcode(stdout, PLUGIN_UI).await?;
            write_blob(stdout, &SessionData::new().with("QueryPassword", true)).await
        }
        "mech3" => {
            // Deliberately slow mechanism, used to exercise
            // mid-flight cancellation: wait for either a delay to
            // elapse or a CANCEL opcode to arrive.
            tokio::select! {
                () = tokio::time::sleep(std::time::Duration::from_millis(200)) => {
                    write_opcode(stdout, PLUGIN_RESULT).await?;
                    write_blob(stdout, &data).await
                }
                opcode = read_opcode(stdin) => {
                    match opcode {
                        Ok(CLIENT_CANCEL) => write_error(stdout, ErrorKind::SessionCanceled, "canceled").await,
                        _ => write_error(stdout, ErrorKind::InternalServer, "unexpected opcode during mech3").await,
                    }
                }
            }
        }
        "BLOB" => {
            // Pass raw bytes through unchanged, if present.
            if let Some(Value::Bytes(_)) = data.get("payload") {
                // round-trips as-is
            }
            write_opcode(stdout, PLUGIN_RESULT).await?;
            write_blob(stdout, &data).await
        }
        other => write_error(stdout, ErrorKind::MechanismNotAvailable, other).await,
    }
}
