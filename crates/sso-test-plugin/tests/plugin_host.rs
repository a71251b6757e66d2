//! End-to-end tests of [`sso_plugin_host::PluginHost`] against the
//! `signon-plugin-ssotest`/`signon-plugin-ssotest2` fixture binaries
//! built alongside this crate.

use sso_core::{ErrorKind, SessionData};
use sso_plugin_host::{PluginEventKind, PluginHost, PluginHostError};

/// The directory `cargo` places this crate's own binary targets in —
/// `subordinate_path` expects `signon-plugin-<type>` to live here.
fn plugins_dir() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_BIN_EXE_signon-plugin-ssotest"))
        .parent()
        .expect("binary path always has a parent directory")
        .to_path_buf()
}

#[tokio::test]
async fn queries_type_and_mechanisms() {
    let mut host = PluginHost::new("ssotest", plugins_dir());
    let mut events = host.take_events();

    host.query_type().await.expect("query_type");
    let event = events.recv().await.expect("event channel open");
    assert!(matches!(event.kind, PluginEventKind::Type(ref t) if t == "ssotest"));

    host.query_mechanisms().await.expect("query_mechanisms");
    let event = events.recv().await.expect("event channel open");
    match event.kind {
        PluginEventKind::MechanismsList(list) => {
            assert_eq!(
                list,
                vec!["mech1".to_owned(), "mech2".to_owned(), "mech3".to_owned(), "BLOB".to_owned()]
            );
        }
        other => panic!("expected MechanismsList, got {other:?}"),
    }

    host.stop().await;
}

#[tokio::test]
async fn ssotest2_has_no_blob_mechanism() {
    let mut host = PluginHost::new("ssotest2", plugins_dir());
    let mut events = host.take_events();

    host.query_mechanisms().await.expect("query_mechanisms");
    let event = events.recv().await.expect("event channel open");
    match event.kind {
        PluginEventKind::MechanismsList(list) => {
            assert!(!list.iter().any(|m| m == "BLOB"));
            assert_eq!(list.len(), 3);
        }
        other => panic!("expected MechanismsList, got {other:?}"),
    }

    host.stop().await;
}

#[tokio::test]
async fn mech1_injects_realm_and_preserves_input() {
    let mut host = PluginHost::new("ssotest", plugins_dir());
    let mut events = host.take_events();

    let request = SessionData::new().with("Some key", "its value");
    host.process("key-1", "mech1", &request).await.expect("process");

    let event = events.recv().await.expect("event channel open");
    match event.kind {
        PluginEventKind::Result(data) => {
            assert_eq!(data.get("Some key").and_then(sso_core::Value::as_str), Some("its value"));
            assert_eq!(
                data.get("Realm").and_then(sso_core::Value::as_str),
                Some(sso_test_plugin::MECH1_REALM)
            );
        }
        other => panic!("expected Result, got {other:?}"),
    }

    host.stop().await;
}

#[tokio::test]
async fn unknown_mechanism_reports_mechanism_not_available() {
    let mut host = PluginHost::new("ssotest", plugins_dir());
    let mut events = host.take_events();

    host.process("key-2", "no-such-mechanism", &SessionData::new())
        .await
        .expect("process");

    let event = events.recv().await.expect("event channel open");
    match event.kind {
        PluginEventKind::Error { kind, .. } => {
            assert_eq!(kind, sso_core::ErrorKind::MechanismNotAvailable);
        }
        other => panic!("expected Error, got {other:?}"),
    }

    host.stop().await;
}

#[tokio::test]
async fn mech2_emits_a_ui_round_trip() {
    let mut host = PluginHost::new("ssotest", plugins_dir());
    let mut events = host.take_events();

    host.process("key-3", "mech2", &SessionData::new()).await.expect("process");
    let event = events.recv().await.expect("event channel open");
    assert!(matches!(event.kind, PluginEventKind::Ui(_)));

    let reply = SessionData::new().with("UserName", "the user").with("Secret", "s3c'r3t");
    host.process_ui(&reply).await.expect("process_ui");

    // The fixture plugin stores before confirming.
    let store_event = events.recv().await.expect("event channel open");
    assert!(matches!(store_event.kind, PluginEventKind::Store(_)));

    let result_event = events.recv().await.expect("event channel open");
    match result_event.kind {
        PluginEventKind::Result(data) => {
            assert_eq!(data.get("UserName").and_then(sso_core::Value::as_str), Some("the user"));
        }
        other => panic!("expected Result, got {other:?}"),
    }

    host.stop().await;
}

#[tokio::test]
async fn missing_subordinate_binary_reports_method_not_known() {
    let empty_dir = tempfile::tempdir().expect("create temp dir");
    let mut host = PluginHost::new("no-such-method", empty_dir.path().to_path_buf());

    let err = host.query_type().await.expect_err("no binary exists for this method");
    assert!(matches!(err, PluginHostError::MethodNotKnown(ref m) if m == "no-such-method"));
    assert_eq!(err.to_error_kind(), ErrorKind::MethodNotKnown);
}
