//! JSON-RPC dispatch over the §6 Daemon/Identity/Session object surface.
//!
//! Every request names an `object` (a path minted by
//! [`crate::identity_registry`] or [`crate::session_paths`], or the
//! fixed [`DAEMON_PATH`]) and a `method`; [`dispatch`] routes it to the
//! matching handler and always returns an [`RpcResponse`] — errors never
//! propagate as a transport failure, only as the response's `error`
//! field.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sso_core::{ErrorKind, Identity, IdentityId, SsoError, Value};
use sso_session::{DaemonContext, SignOnUi};
use tokio::sync::{broadcast, oneshot};

use crate::convert::{apply_identity_map, from_json, identity_to_map, session_data_arg, to_json};
use crate::identity_registry::IdentityRegistry;
use crate::session_paths::SessionPaths;
use crate::signals::Signal;

/// The Daemon object's fixed path.
pub const DAEMON_PATH: &str = "/SingleSignOn";

/// Everything a request handler needs, threaded through by `Arc`
/// reference per the "no module-level global registries" design note
/// (SPEC_FULL.md §9).
pub struct AppState {
    /// Session Core / Credentials Store context.
    pub ctx: Arc<DaemonContext>,
    /// Identity object path bookkeeping.
    pub identities: Arc<IdentityRegistry>,
    /// Session object path bookkeeping.
    pub sessions_paths: Arc<SessionPaths>,
    /// Where plugin subordinate binaries are discovered.
    pub plugins_dir: PathBuf,
    /// The `SignOnUI` collaborator, for Identity-level UI round-trips
    /// (`requestCredentialsUpdate`, `verifyUser`) that aren't tied to
    /// any one Session.
    pub ui: Arc<dyn SignOnUi>,
    /// The daemon-wide signal broadcast bus.
    pub signals: broadcast::Sender<Signal>,
}

/// One JSON-RPC-style request frame.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    /// Echoed back verbatim on the matching response.
    pub id: serde_json::Value,
    /// The target object's path.
    pub object: String,
    /// The method name.
    pub method: String,
    /// The method's arguments, as a JSON object. Absent arguments
    /// default to `null`.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// One JSON-RPC-style response frame.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    /// The request's `id`, echoed back.
    pub id: serde_json::Value,
    /// The call's return value, absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The call's failure, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorPayload>,
}

/// The wire form of an [`SsoError`].
#[derive(Debug, Clone, Serialize)]
pub struct RpcErrorPayload {
    /// The error's [`ErrorKind`], wire-encoded.
    pub kind: u32,
    /// A human-readable description.
    pub message: String,
}

/// Dispatch one request frame to its handler.
pub async fn dispatch(state: &AppState, request: RpcRequest) -> RpcResponse {
    let RpcRequest { id, object, method, args } = request;
    match route(state, &object, &method, &args).await {
        Ok(result) => RpcResponse {
            id,
            result: Some(result),
            error: None,
        },
        Err(e) => RpcResponse {
            id,
            result: None,
            error: Some(RpcErrorPayload {
                kind: e.kind.to_wire(),
                message: e.message,
            }),
        },
    }
}

async fn route(
    state: &AppState,
    object: &str,
    method: &str,
    args: &serde_json::Value,
) -> Result<serde_json::Value, SsoError> {
    if object == DAEMON_PATH {
        return handle_daemon(state, method, args).await;
    }
    if let Some(id) = state.identities.resolve(object) {
        return handle_identity(state, object, id, method, args).await;
    }
    if let Some((identity_id, session_method)) = state.sessions_paths.resolve(object) {
        return handle_session(state, object, identity_id, &session_method, method, args).await;
    }
    Err(not_found(object))
}

fn not_found(object: &str) -> SsoError {
    SsoError::new(ErrorKind::InvalidQuery, format!("unknown object path {object}"))
}

fn unknown_method(role: &str, method: &str) -> SsoError {
    SsoError::new(ErrorKind::InvalidQuery, format!("unknown {role} method {method}"))
}

fn method_arg(args: &serde_json::Value) -> Result<String, SsoError> {
    args.get("method")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| SsoError::new(ErrorKind::InvalidQuery, "missing 'method' argument"))
}

fn id_arg(args: &serde_json::Value) -> Result<u32, SsoError> {
    args.get("id")
        .and_then(serde_json::Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| SsoError::new(ErrorKind::InvalidQuery, "missing 'id' argument"))
}

fn identity_id_arg(args: &serde_json::Value) -> Result<IdentityId, SsoError> {
    let raw = args
        .get("identityId")
        .and_then(serde_json::Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| SsoError::new(ErrorKind::InvalidQuery, "missing 'identityId' argument"))?;
    Ok(IdentityId::from_wire(raw))
}

fn persisted_id(id: IdentityId) -> Result<u32, SsoError> {
    match id {
        IdentityId::Persisted(n) => Ok(n),
        IdentityId::New => Err(SsoError::new(ErrorKind::WrongState, "identity is not yet persisted")),
    }
}

/// Discover installed methods by scanning `plugins_dir` for
/// `signon-plugin-<type>` binaries (SPEC_FULL.md §4.2's "Subordinate
/// discovery").
fn scan_methods(plugins_dir: &std::path::Path) -> Vec<String> {
    const PREFIX: &str = "signon-plugin-";
    let mut methods: Vec<String> = std::fs::read_dir(plugins_dir)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| name.strip_prefix(PREFIX).map(str::to_owned))
        .collect();
    methods.sort();
    methods
}

async fn handle_daemon(
    state: &AppState,
    method: &str,
    args: &serde_json::Value,
) -> Result<serde_json::Value, SsoError> {
    match method {
        "registerNewIdentity" => {
            let path = state.identities.register_new();
            Ok(serde_json::json!({ "path": path }))
        }
        "getIdentity" => {
            let numeric = id_arg(args)?;
            let identity = load_persisted(state, numeric).await?;
            let path = state.identities.path_for(numeric);
            let map = identity_to_map(&identity, state.identities.ref_count(&path));
            Ok(serde_json::json!({ "path": path, "identity": to_json(&map) }))
        }
        "queryMethods" => Ok(serde_json::json!({ "methods": scan_methods(&state.plugins_dir) })),
        "queryMechanisms" => {
            let wanted_method = method_arg(args)?;
            let handle = state.ctx.sessions.session_for(IdentityId::New, &wanted_method);
            let mechanisms = handle
                .query_available_mechanisms(Vec::new())
                .await
                .map_err(|e| SsoError::new(e.to_error_kind(), e.to_string()))?;
            Ok(serde_json::json!({ "mechanisms": mechanisms }))
        }
        "queryIdentities" => {
            let filter = sso_storage::CredentialsFilter(session_data_arg(args)?);
            let identities = state.ctx.credentials.credentials_matching(&filter).await;
            let maps: Vec<serde_json::Value> = identities
                .iter()
                .map(|identity| {
                    let path = state.identities.path_for(identity.id.to_wire());
                    to_json(&identity_to_map(identity, state.identities.ref_count(&path)))
                })
                .collect();
            Ok(serde_json::Value::Array(maps))
        }
        "clear" => Ok(serde_json::json!(state.ctx.credentials.clear().await)),
        "getAuthSessionObjectPath" => {
            let identity_id = identity_id_arg(args)?;
            let session_method = method_arg(args)?;
            // Make sure the session actor exists before handing out its
            // path, so a subsequent `process()` never races a not-yet-
            // spawned session.
            let _ = state.ctx.sessions.session_for(identity_id, &session_method);
            let path = state.sessions_paths.register(identity_id, &session_method);
            Ok(serde_json::json!({ "path": path }))
        }
        _ => Err(unknown_method("Daemon", method)),
    }
}

async fn load_persisted(state: &AppState, numeric: u32) -> Result<Identity, SsoError> {
    let identity = state.ctx.credentials.credentials(IdentityId::Persisted(numeric), true).await;
    if identity.id.is_persisted() {
        Ok(identity)
    } else {
        Err(SsoError::identity_not_found(numeric))
    }
}

async fn handle_identity(
    state: &AppState,
    path: &str,
    id: IdentityId,
    method: &str,
    args: &serde_json::Value,
) -> Result<serde_json::Value, SsoError> {
    match method {
        "store" => {
            let patch = session_data_arg(args)?;
            let mut identity = match id {
                IdentityId::Persisted(numeric) => load_persisted(state, numeric).await?,
                IdentityId::New => Identity::new_unsaved(),
            };
            apply_identity_map(&mut identity, &patch);

            let stored = match id {
                IdentityId::Persisted(_) => state.ctx.credentials.update(&identity, identity.store_password).await,
                IdentityId::New => state.ctx.credentials.insert(&identity, identity.store_password).await,
            };
            let IdentityId::Persisted(numeric) = stored else {
                return Err(SsoError::new(ErrorKind::StoreFailed, "identity store failed"));
            };
            if matches!(id, IdentityId::New) {
                state.identities.rebind(path, numeric);
            }
            let _ = state.signals.send(Signal::InfoUpdated {
                path: path.to_owned(),
                what: 0,
            });
            Ok(serde_json::json!({ "id": numeric }))
        }
        "getInfo" => {
            let numeric = persisted_id(id)?;
            let identity = load_persisted(state, numeric).await?;
            Ok(to_json(&identity_to_map(&identity, state.identities.ref_count(path))))
        }
        "remove" => {
            let numeric = persisted_id(id)?;
            let removed = state.ctx.credentials.remove(IdentityId::Persisted(numeric)).await;
            if !removed {
                return Err(SsoError::new(ErrorKind::RemoveFailed, "identity remove failed"));
            }
            state.ctx.sessions.evict_identity(numeric);
            state.identities.forget(path);
            let _ = state.signals.send(Signal::Unregistered { path: path.to_owned() });
            Ok(serde_json::json!(true))
        }
        "addReference" => {
            state.identities.add_reference(path);
            Ok(serde_json::Value::Null)
        }
        "removeReference" => {
            state.identities.remove_reference(path);
            Ok(serde_json::Value::Null)
        }
        "requestCredentialsUpdate" => {
            let numeric = persisted_id(id)?;
            let message = session_data_arg(args)?;
            let reply = state
                .ui
                .request(&format!("credentials-update:{path}"), message)
                .await
                .map_err(|e| SsoError::new(ErrorKind::UserInteraction, e))?;
            let mut identity = load_persisted(state, numeric).await?;
            apply_identity_map(&mut identity, &reply);
            let stored = state.ctx.credentials.update(&identity, identity.store_password).await;
            let _ = state.signals.send(Signal::InfoUpdated {
                path: path.to_owned(),
                what: 0,
            });
            Ok(serde_json::json!({ "id": stored.to_wire() }))
        }
        "verifyUser" => {
            let message = session_data_arg(args)?;
            let verified = match state.ui.request(&format!("verify-user:{path}"), message).await {
                Ok(reply) => reply.get("verified").and_then(Value::as_bool).unwrap_or(false),
                Err(_) => false,
            };
            Ok(serde_json::json!(verified))
        }
        "verifySecret" => {
            let numeric = persisted_id(id)?;
            let secret = args
                .get("secret")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| SsoError::new(ErrorKind::InvalidQuery, "missing 'secret' argument"))?;
            let identity = load_persisted(state, numeric).await?;
            let ok = state
                .ctx
                .credentials
                .check_password(IdentityId::Persisted(numeric), &identity.username, secret)
                .await;
            Ok(serde_json::json!(ok))
        }
        "signOut" => {
            let numeric = persisted_id(id)?;
            state.ctx.sessions.evict_identity(numeric);
            Ok(serde_json::json!(true))
        }
        _ => Err(unknown_method("Identity", method)),
    }
}

async fn handle_session(
    state: &AppState,
    path: &str,
    identity_id: IdentityId,
    bound_method: &str,
    method: &str,
    args: &serde_json::Value,
) -> Result<serde_json::Value, SsoError> {
    let handle = state.ctx.sessions.session_for(identity_id, bound_method);
    match method {
        "queryAvailableMechanisms" => {
            let wanted: Vec<String> = match args.get("wanted") {
                Some(v) => from_json(v)?,
                None => Vec::new(),
            };
            let mechanisms = handle
                .query_available_mechanisms(wanted)
                .await
                .map_err(|e| SsoError::new(e.to_error_kind(), e.to_string()))?;
            Ok(serde_json::json!({ "mechanisms": mechanisms }))
        }
        "process" => {
            let session_data = match args.get("sessionData") {
                Some(v) => session_data_arg(v)?,
                None => Default::default(),
            };
            let mechanism = args
                .get("mechanism")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| SsoError::new(ErrorKind::InvalidQuery, "missing 'mechanism' argument"))?
                .to_owned();

            let cancel_key = uuid::Uuid::new_v4().to_string();
            state.sessions_paths.begin_request(path, &cancel_key);
            let (reply_tx, reply_rx) = oneshot::channel();
            handle.process(cancel_key, mechanism, session_data, reply_tx);
            let outcome = reply_rx.await.map_err(|_| {
                SsoError::new(ErrorKind::InternalCommunication, "session actor dropped the reply channel")
            });
            state.sessions_paths.end_request(path);

            match outcome? {
                Ok(data) => Ok(to_json(&data)),
                Err((kind, message)) => Err(SsoError::new(kind, message)),
            }
        }
        "cancel" => {
            if let Some(cancel_key) = state.sessions_paths.current_cancel_key(path) {
                handle.cancel(cancel_key);
            }
            Ok(serde_json::Value::Null)
        }
        _ => Err(unknown_method("Session", method)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sso_session::{DaemonContext, NoUi, ObjectTimeouts};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    async fn test_state(plugins_dir: PathBuf) -> AppState {
        let credentials = Arc::new(sso_storage::Credentials::open_memory().await.expect("open store"));
        credentials.create_schema().await.expect("create schema");
        let (signals_tx, _rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _broadcast_rx) = crate::signals::channel();
        let ctx = Arc::new(DaemonContext::new(
            credentials,
            plugins_dir.clone(),
            Arc::new(NoUi),
            signals_tx,
            ObjectTimeouts::default(),
        ));
        AppState {
            ctx,
            identities: Arc::new(IdentityRegistry::new()),
            sessions_paths: Arc::new(SessionPaths::new()),
            plugins_dir,
            ui: Arc::new(NoUi),
            signals: broadcast_tx,
        }
    }

    fn req(id: i64, object: &str, method: &str, args: serde_json::Value) -> RpcRequest {
        RpcRequest {
            id: serde_json::json!(id),
            object: object.to_owned(),
            method: method.to_owned(),
            args,
        }
    }

    #[tokio::test]
    async fn unknown_object_reports_invalid_query() {
        let state = test_state(PathBuf::from("/nonexistent")).await;
        let response = dispatch(&state, req(1, "/SingleSignOn/bogus", "getInfo", serde_json::Value::Null)).await;
        let error = response.error.expect("unknown object is an error");
        assert_eq!(error.kind, ErrorKind::InvalidQuery.to_wire());
    }

    #[tokio::test]
    async fn register_store_get_info_is_a_superset_of_the_stored_map() {
        let state = test_state(PathBuf::from("/nonexistent")).await;

        let registered = dispatch(&state, req(1, DAEMON_PATH, "registerNewIdentity", serde_json::Value::Null)).await;
        let path = registered.result.expect("registerNewIdentity succeeds")["path"]
            .as_str()
            .expect("path is a string")
            .to_owned();

        let store_args = serde_json::json!({
            "UserName": {"t": "Str", "v": "John"},
            "Caption": {"t": "Str", "v": "John's account"},
            "AccessControlList": {"t": "StringList", "v": ["*"]},
        });
        let stored = dispatch(&state, req(2, &path, "store", store_args)).await;
        let stored_id = stored.result.expect("store succeeds")["id"].as_u64().expect("id is a number");
        assert!(stored_id > 0);

        let info = dispatch(&state, req(3, &path, "getInfo", serde_json::Value::Null)).await;
        let map = info.result.expect("getInfo succeeds");
        assert_eq!(map["UserName"]["v"], "John");
        assert_eq!(map["Caption"]["v"], "John's account");
        assert_eq!(map["AccessControlList"]["v"], serde_json::json!(["*"]));
    }

    #[tokio::test]
    async fn remove_then_get_info_reports_identity_not_found() {
        let state = test_state(PathBuf::from("/nonexistent")).await;
        let registered = dispatch(&state, req(1, DAEMON_PATH, "registerNewIdentity", serde_json::Value::Null)).await;
        let path = registered.result.expect("ok")["path"].as_str().expect("string").to_owned();
        dispatch(&state, req(2, &path, "store", serde_json::json!({}))).await;

        let removed = dispatch(&state, req(3, &path, "remove", serde_json::Value::Null)).await;
        assert_eq!(removed.result, Some(serde_json::json!(true)));

        let info = dispatch(&state, req(4, &path, "getInfo", serde_json::Value::Null)).await;
        let error = info.error.expect("getInfo fails after remove");
        assert_eq!(error.kind, ErrorKind::IdentityNotFound.to_wire());
    }

    #[tokio::test]
    async fn query_methods_scans_the_plugins_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join("signon-plugin-ssotest"), b"").expect("write fixture");
        std::fs::write(dir.path().join("signon-plugin-ssotest2"), b"").expect("write fixture");
        std::fs::write(dir.path().join("not-a-plugin"), b"").expect("write fixture");

        let state = test_state(dir.path().to_path_buf()).await;
        let response = dispatch(&state, req(1, DAEMON_PATH, "queryMethods", serde_json::Value::Null)).await;
        let methods = response.result.expect("queryMethods succeeds")["methods"].clone();
        assert_eq!(methods, serde_json::json!(["ssotest", "ssotest2"]));
    }
}
