//! `signond` - the SSO daemon process entry point.
//!
//! Loads configuration, installs logging, opens the Credentials Store,
//! builds the `DaemonContext`, and serves the §6 RPC surface over a
//! local Unix socket until SIGTERM/SIGINT.

use std::sync::Arc;

use sso_daemon::identity_registry::IdentityRegistry;
use sso_daemon::rpc::AppState;
use sso_daemon::session_paths::SessionPaths;
use sso_daemon::{shutdown, signals, socket};
use sso_session::{DaemonContext, NoUi, ObjectTimeouts as SessionObjectTimeouts};
use sso_storage::Credentials;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match sso_config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let log_config = sso_telemetry::LogConfig::new(config.general.logging_level.clone());
    let log_config = match sso_config::env::logging_output().as_deref() {
        Some("syslog") => log_config.with_target(sso_telemetry::LogTarget::Syslog),
        _ => log_config.with_target(sso_telemetry::LogTarget::Stdout),
    };
    if let Err(e) = sso_telemetry::setup_logging(&log_config) {
        eprintln!("failed to install logging: {e}");
    }

    info!(
        storage_path = %config.general.storage_path.display(),
        plugins_dir = %config.plugins_dir.display(),
        "starting signond",
    );

    let storage_path = config.general.storage_path.to_string_lossy().into_owned();
    let credentials = match Credentials::open_embedded(&storage_path).await {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, "failed to open the credentials store");
            std::process::exit(1);
        }
    };
    if let Err(e) = credentials.create_schema().await {
        error!(error = %e, "failed to create the credentials schema");
        std::process::exit(1);
    }

    let (signal_tx, _signal_broadcast_rx) = signals::channel();
    let (state_change_tx, state_change_rx) = tokio::sync::mpsc::unbounded_channel();

    let timeouts = SessionObjectTimeouts {
        daemon_timeout_secs: config.object_timeouts.daemon_timeout,
        identity_timeout_secs: config.object_timeouts.identity_timeout,
        authsession_timeout_secs: config.object_timeouts.auth_session_timeout,
    };
    let ctx = Arc::new(DaemonContext::new(
        Arc::clone(&credentials),
        config.plugins_dir.clone(),
        Arc::new(NoUi),
        state_change_tx,
        timeouts,
    ));
    ctx.spawn_idle_watchdog();

    let session_paths = Arc::new(SessionPaths::new());
    signals::spawn_state_change_bridge(state_change_rx, Arc::clone(&session_paths), signal_tx.clone());

    let state = Arc::new(AppState {
        ctx,
        identities: Arc::new(IdentityRegistry::new()),
        sessions_paths: session_paths,
        plugins_dir: config.plugins_dir.clone(),
        ui: Arc::new(NoUi),
        signals: signal_tx,
    });

    let socket_path = socket::socket_path();
    let socket_path_for_serve = socket_path.clone();
    let serve_task = tokio::spawn(async move {
        if let Err(e) = socket::serve(&socket_path_for_serve, state).await {
            error!(error = %e, "RPC socket listener exited");
        }
    });

    shutdown::wait_for_shutdown_signal().await;
    serve_task.abort();
    let _ = std::fs::remove_file(&socket_path);
    info!("signond shut down cleanly");
}
