// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ghostpost_server::api::router;
use ghostpost_server::auth::JwksManager;
use ghostpost_server::config::Config;
use ghostpost_server::crypto::FieldCipher;
use ghostpost_server::delivery::DeliveryPoller;
use ghostpost_server::notify::{LogNotifier, Notifier, SmtpNotifier};
use ghostpost_server::state::{AppState, AuthConfig};
use ghostpost_server::storage::{CapsuleDatabase, FileStore, StoragePaths};

#[tokio::main]
async fn main() {
    init_tracing();

    // Configuration errors (missing/malformed encryption key above all) are
    // fatal: never boot with a weak or default key.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal configuration error: {e}");
            std::process::exit(1);
        }
    };

    let mut files = FileStore::new(StoragePaths::new(&config.data_dir));
    files
        .initialize()
        .expect("failed to initialize storage directories");

    let capsules = CapsuleDatabase::open(&files.paths().capsule_db())
        .expect("failed to open capsule database");

    let cipher = FieldCipher::new(config.encryption_key.clone());

    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => Arc::new(
            SmtpNotifier::new(
                smtp,
                &config.mail_from_address,
                &config.mail_from_name,
                config.send_timeout,
            )
            .expect("invalid SMTP configuration"),
        ),
        None => {
            warn!("SMTP_HOST not set; delivery notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let auth_config = AuthConfig {
        jwks: config
            .auth
            .jwks_url
            .as_ref()
            .map(|url| JwksManager::new(url.as_str())),
        issuer: config.auth.issuer.clone(),
        audience: config.auth.audience.clone(),
    };
    if auth_config.jwks.is_none() {
        warn!("AUTH_JWKS_URL not set; running in development auth mode (no signature checks)");
    }

    let state = AppState::new(
        files,
        capsules,
        cipher,
        notifier,
        auth_config,
        config.send_timeout,
    );

    // Background delivery poller with graceful shutdown.
    let shutdown = CancellationToken::new();
    let poller = DeliveryPoller::new(state.clone(), config.sweep_interval);
    let poller_handle = tokio::spawn(poller.run(shutdown.clone()));

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("failed to parse bind address");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind server address");

    info!("GhostPost server listening on http://{addr} (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("server failed");

    shutdown.cancel();
    let _ = poller_handle.await;
    info!("shutdown complete");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Resolve on Ctrl-C or SIGTERM, and cancel the poller token so background
/// work stops before the listener closes.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
    shutdown.cancel();
}
