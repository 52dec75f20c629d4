// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warden: container supervisor for the Hytale dedicated server.
//!
//! Keeps the server's OAuth-derived credentials perpetually fresh and owns
//! the server process lifecycle: spawn, readiness detection, auth-failure
//! detection, restart, and clean signal-driven shutdown.

pub mod config;
pub mod credential;
pub mod error;
pub mod supervisor;
pub mod tasks;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::WardenConfig;
use crate::credential::manager::CredentialManager;
use crate::supervisor::Supervisor;

/// How long background loops get to wind down after the child is gone.
const SCHEDULER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the supervisor until the server exits or a termination signal
/// arrives. Returns the process exit code to propagate.
pub async fn run(config: WardenConfig) -> anyhow::Result<i32> {
    // reqwest is built without a default TLS provider; install ring's.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir)?;

    let shutdown = CancellationToken::new();
    spawn_signal_task(shutdown.clone());

    let http = reqwest::Client::builder().timeout(config.http_timeout()).build()?;
    let manager = Arc::new(CredentialManager::new(&config, http));

    // Scheduler loops outlive child restarts; they get their own token so
    // teardown order is child first, then scheduler.
    let scheduler_shutdown = CancellationToken::new();
    let (restart_tx, restart_rx) = mpsc::channel(1);
    let loops = [
        tasks::spawn_credential_health_loop(
            Arc::clone(&manager),
            restart_tx,
            config.check_interval(),
            scheduler_shutdown.clone(),
        ),
        tasks::spawn_log_retention_loop(
            config.log_dir(),
            config.log_retention(),
            scheduler_shutdown.clone(),
        ),
    ];

    let supervisor = Supervisor::new(config, manager, shutdown.clone(), restart_rx);
    let code = supervisor.run().await;

    scheduler_shutdown.cancel();
    for mut handle in loops {
        if tokio::time::timeout(SCHEDULER_DRAIN_TIMEOUT, &mut handle).await.is_err() {
            tracing::warn!("background loop did not stop in time, aborting");
            handle.abort();
        }
    }

    code
}

/// Build a reqwest client for tests, ensuring the rustls crypto provider is
/// installed first. Production installs the provider in `run`; tests exercise
/// lower-level helpers directly and must install it themselves before any
/// client is built.
#[cfg(test)]
pub(crate) fn test_http_client() -> reqwest::Client {
    let _ = rustls::crypto::ring::default_provider().install_default();
    reqwest::Client::new()
}

/// Cancel the shutdown token on SIGTERM or SIGINT.
fn spawn_signal_task(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGTERM");
                shutdown.cancel();
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGINT");
                shutdown.cancel();
            }
        }
    });
}
