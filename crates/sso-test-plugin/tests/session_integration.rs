//! End-to-end tests of Session Core driving the fixture plugin,
//! covering the Credentials Store splice/STORE-persistence behavior
//! described in §4.3 and the testable properties in §8.

use std::sync::Arc;

use sso_core::{Identity, IdentityId, SessionData, Value};
use sso_session::{spawn_session, NoUi, SignOnUi};
use sso_storage::{Credentials, CredentialsFilter};
use tokio::sync::{mpsc, oneshot};

fn plugins_dir() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_BIN_EXE_signon-plugin-ssotest"))
        .parent()
        .expect("binary path always has a parent directory")
        .to_path_buf()
}

/// A `SignOnUi` that always answers with a fixed reply map.
struct FixedUi(SessionData);

#[async_trait::async_trait]
impl SignOnUi for FixedUi {
    async fn request(&self, _request_id: &str, _params: SessionData) -> Result<SessionData, String> {
        Ok(self.0.clone())
    }

    async fn cancel(&self, _request_id: &str) {}
}

async fn open_store() -> Credentials {
    let store = Credentials::open_memory().await.expect("open in-memory store");
    store.create_schema().await.expect("create schema");
    store
}

#[tokio::test]
async fn transient_session_process_mech1_injects_realm() {
    let (signals_tx, _signals_rx) = mpsc::unbounded_channel();
    let handle = spawn_session(0, "ssotest", plugins_dir(), Arc::new(NoUi), signals_tx, None);

    let (reply_tx, reply_rx) = oneshot::channel();
    handle.process("key-1", "mech1", SessionData::new().with("Some key", "its value"), reply_tx);

    let outcome = reply_rx.await.expect("session did not drop the reply channel");
    let data = outcome.expect("mech1 succeeds");
    assert_eq!(data.get("Some key").and_then(Value::as_str), Some("its value"));
    assert_eq!(data.get("Realm").and_then(Value::as_str), Some(sso_test_plugin::MECH1_REALM));
}

#[tokio::test]
async fn persisted_session_splices_stored_credentials_into_the_request() {
    let store = Arc::new(open_store().await);
    let mut identity = Identity::new_unsaved();
    identity.username = "alice".to_owned();
    identity.password = Some("s3cret1".to_owned());
    identity.store_password = true;
    let id = store.insert(&identity, true).await;
    let IdentityId::Persisted(numeric_id) = id else {
        panic!("insert must assign a persisted id");
    };

    let (signals_tx, _signals_rx) = mpsc::unbounded_channel();
    let handle = spawn_session(
        numeric_id,
        "ssotest",
        plugins_dir(),
        Arc::new(NoUi),
        signals_tx,
        Some(Arc::clone(&store)),
    );

    // The request supplies neither UserName nor Secret — Session Core
    // must splice them in from the Credentials Store before dispatch.
    let (reply_tx, reply_rx) = oneshot::channel();
    handle.process("key-2", "mech1", SessionData::new(), reply_tx);

    let outcome = reply_rx.await.expect("session did not drop the reply channel");
    let data = outcome.expect("mech1 succeeds");
    assert_eq!(data.get("UserName").and_then(Value::as_str), Some("alice"));
    // Secret is stripped on the way out unless the method is literally "password".
    assert!(data.get("Secret").is_none());
    assert_eq!(data.get("Realm").and_then(Value::as_str), Some(sso_test_plugin::MECH1_REALM));
}

#[tokio::test]
async fn store_event_persists_into_the_backing_identity_when_id_is_nonzero() {
    let store = Arc::new(open_store().await);
    let identity = Identity::new_unsaved();
    let id = store.insert(&identity, true).await;
    let IdentityId::Persisted(numeric_id) = id else {
        panic!("insert must assign a persisted id");
    };

    let ui = Arc::new(FixedUi(
        SessionData::new().with("UserName", "bob").with("Secret", "newsecret"),
    ));
    let (signals_tx, _signals_rx) = mpsc::unbounded_channel();
    let handle = spawn_session(numeric_id, "ssotest", plugins_dir(), ui, signals_tx, Some(Arc::clone(&store)));

    let (reply_tx, reply_rx) = oneshot::channel();
    handle.process("key-3", "mech2", SessionData::new(), reply_tx);

    let outcome = reply_rx.await.expect("session did not drop the reply channel");
    let data = outcome.expect("mech2 succeeds");
    assert_eq!(data.get("UserName").and_then(Value::as_str), Some("bob"));
    assert!(data.get("Secret").is_none(), "Secret must be stripped from the client-visible result");

    // Give the session actor a moment to process the STORE event, which
    // arrives on a separate channel message after the UI round-trip.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let persisted = store.credentials(id, true).await;
    assert_eq!(persisted.username, "bob");
    assert_eq!(persisted.password.as_deref(), Some("newsecret"));
}

#[tokio::test]
async fn store_event_is_a_noop_for_a_transient_session() {
    let store = Arc::new(open_store().await);
    let before = store.credentials_matching(&CredentialsFilter::all()).await;
    assert!(before.is_empty());

    let ui = Arc::new(FixedUi(
        SessionData::new().with("UserName", "mallory").with("Secret", "whatever"),
    ));
    let (signals_tx, _signals_rx) = mpsc::unbounded_channel();
    let handle = spawn_session(0, "ssotest", plugins_dir(), ui, signals_tx, Some(Arc::clone(&store)));

    let (reply_tx, reply_rx) = oneshot::channel();
    handle.process("key-4", "mech2", SessionData::new(), reply_tx);
    let outcome = reply_rx.await.expect("session did not drop the reply channel");
    assert!(outcome.is_ok());

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let after = store.credentials_matching(&CredentialsFilter::all()).await;
    assert!(after.is_empty(), "a transient (identity_id = 0) session must not write to the Credentials Store");
}
