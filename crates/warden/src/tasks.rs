// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background loops: credential health and log retention.
//!
//! Both run for the supervisor's whole lifetime (child restarts do not
//! touch them) and stop cooperatively when their shutdown token cancels.
//! Failures are logged and retried on the next tick, never fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::credential::manager::CredentialManager;
use crate::supervisor::RestartReason;

/// Fixed cadence of the log retention sweep.
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Spawn the periodic credential health check.
///
/// When tokens cannot be kept alive, requests a child restart (so the child
/// re-requests credentials) instead of crashing anything. Requests are
/// coalesced: if a restart is already pending, the new one is dropped.
pub fn spawn_credential_health_loop(
    manager: Arc<CredentialManager>,
    restart_tx: mpsc::Sender<RestartReason>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            if let Err(e) = manager.keep_fresh().await {
                tracing::warn!(err = %e, "credential renewal failed, requesting server restart");
                if restart_tx.try_send(RestartReason::CredentialHealth).is_err() {
                    tracing::debug!("restart already pending");
                }
            }
        }
    })
}

/// Spawn the daily log retention sweep over `log_dir`.
pub fn spawn_log_retention_loop(
    log_dir: PathBuf,
    max_age: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            match sweep_logs(&log_dir, max_age, SystemTime::now()) {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::info!(removed, dir = %log_dir.display(), "pruned old server logs")
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(dir = %log_dir.display(), "log dir absent, nothing to prune")
                }
                Err(e) => tracing::warn!(dir = %log_dir.display(), err = %e, "log retention sweep failed"),
            }
        }
    })
}

/// Delete regular files in `dir` whose mtime is older than `max_age`.
/// Returns the number of files removed.
fn sweep_logs(dir: &Path, max_age: Duration, now: SystemTime) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        let expired = now.duration_since(modified).map(|age| age > max_age).unwrap_or(false);
        if !expired {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), err = %e, "failed to delete old log")
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
