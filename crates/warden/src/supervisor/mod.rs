// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server process lifecycle: spawn, watch, restart, two-phase shutdown.
//!
//! Exactly one child exists at a time. Every restart flows through the
//! single `run` loop, so teardown of the old child is always confirmed
//! before a new one is spawned.

pub mod watch;

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::WardenConfig;
use crate::credential::manager::{Acquisition, CredentialManager};
use crate::credential::SessionTokens;
use crate::supervisor::watch::WatchEvent;

/// Why a child restart was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// The background health loop could not keep tokens alive.
    CredentialHealth,
}

impl RestartReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CredentialHealth => "credential_health",
        }
    }
}

/// The one live child process. Destroyed before a successor exists.
struct ChildHandle {
    child: tokio::process::Child,
    pgid: i32,
    started_at: Instant,
}

/// How one supervision round ended.
enum Outcome {
    /// The child exited on its own; carries its mirrored exit code.
    Exited(i32),
    /// Restart with a freshly acquired session (auth-required path).
    Reauth(Option<SessionTokens>),
    /// Restart requested from outside (health loop).
    Requested(RestartReason),
    Shutdown,
}

pub struct Supervisor {
    config: WardenConfig,
    manager: Arc<CredentialManager>,
    shutdown: CancellationToken,
    restart_rx: mpsc::Receiver<RestartReason>,
}

impl Supervisor {
    pub fn new(
        config: WardenConfig,
        manager: Arc<CredentialManager>,
        shutdown: CancellationToken,
        restart_rx: mpsc::Receiver<RestartReason>,
    ) -> Self {
        Self { config, manager, shutdown, restart_rx }
    }

    /// Supervise the server until it exits on its own or shutdown is
    /// signalled. Returns the supervisor's process exit code: the child's
    /// code on a non-restart termination, 0 on graceful shutdown.
    pub async fn run(mut self) -> anyhow::Result<i32> {
        // Running without the server binary is meaningless; this is the one
        // fatal startup error.
        if !self.config.server_binary.is_file() {
            anyhow::bail!("server binary not found at {}", self.config.server_binary.display());
        }

        let mut session = self.acquire_session().await;

        loop {
            let (mut handle, mut events) = self.spawn_child(session.take().as_ref())?;

            match self.supervise(&mut handle, &mut events).await {
                Outcome::Exited(code) => {
                    tracing::info!(code, "server exited");
                    return Ok(code);
                }
                Outcome::Reauth(fresh) => {
                    self.stop_child(&mut handle).await;
                    self.drain_restart_requests();
                    session = fresh;
                }
                Outcome::Requested(reason) => {
                    tracing::info!(reason = reason.as_str(), "restarting server");
                    self.stop_child(&mut handle).await;
                    self.drain_restart_requests();
                    session = self.acquire_session().await;
                }
                Outcome::Shutdown => {
                    tracing::info!("shutting down server");
                    self.stop_child(&mut handle).await;
                    return Ok(0);
                }
            }
        }
    }

    async fn acquire_session(&self) -> Option<SessionTokens> {
        match self.manager.acquire(&self.shutdown).await {
            Acquisition::Acquired { tokens, source } => {
                tracing::info!(source = %source, "game session acquired");
                Some(tokens)
            }
            Acquisition::Unavailable => None,
        }
    }

    /// One supervision round: wait on child exit, watch events, restart
    /// requests and shutdown.
    async fn supervise(
        &mut self,
        handle: &mut ChildHandle,
        events: &mut mpsc::Receiver<WatchEvent>,
    ) -> Outcome {
        loop {
            tokio::select! {
                status = handle.child.wait() => {
                    return Outcome::Exited(mirror_exit_code(status.ok()));
                }
                Some(event) = events.recv() => match event {
                    WatchEvent::BootComplete => {
                        let elapsed = handle.started_at.elapsed();
                        tracing::info!(elapsed_secs = elapsed.as_secs(), "server boot complete");
                    }
                    WatchEvent::AuthRequired => {
                        tracing::warn!("server requires authentication, re-acquiring credentials");
                        match self.manager.acquire(&self.shutdown).await {
                            Acquisition::Acquired { tokens, source } => {
                                tracing::info!(source = %source, "session re-acquired, restarting server");
                                return Outcome::Reauth(Some(tokens));
                            }
                            Acquisition::Unavailable => {
                                tracing::warn!("re-authorization failed, server continues unauthenticated");
                            }
                        }
                    }
                },
                Some(reason) = self.restart_rx.recv() => {
                    return Outcome::Requested(reason);
                }
                _ = self.shutdown.cancelled() => {
                    return Outcome::Shutdown;
                }
            }
        }
    }

    fn spawn_child(
        &self,
        session: Option<&SessionTokens>,
    ) -> anyhow::Result<(ChildHandle, mpsc::Receiver<WatchEvent>)> {
        let mut cmd = tokio::process::Command::new(&self.config.server_binary);
        cmd.current_dir(self.config.server_dir());
        cmd.args(&self.config.server_args);
        if let Some(session) = session {
            cmd.arg("--session-token").arg(&session.session_token);
            cmd.arg("--identity-token").arg(&session.identity_token);
            if let Some(uuid) = &session.profile_uuid {
                cmd.arg("--profile-uuid").arg(uuid);
            }
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Own process group so shutdown signals reach the whole subtree.
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.config.server_binary.display()))?;
        let pid = child.id().context("spawned child has no pid")?;

        let stdout = child.stdout.take().context("child stdout not captured")?;
        let stderr = child.stderr.take().context("child stderr not captured")?;
        let events = watch::spawn_output_watcher(stdout, stderr);

        tracing::info!(pid, authenticated = session.is_some(), "server process started");
        Ok((
            ChildHandle { child, pgid: pid as i32, started_at: Instant::now() },
            events,
        ))
    }

    /// Two-phase shutdown: SIGTERM to the process group, then SIGKILL to the
    /// group if the grace period elapses. Returns only once exit is
    /// confirmed.
    async fn stop_child(&self, handle: &mut ChildHandle) {
        let grace = self.config.shutdown_grace();
        signal_group(handle.pgid, Signal::SIGTERM);

        match tokio::time::timeout(grace, handle.child.wait()).await {
            Ok(status) => {
                tracing::info!(code = mirror_exit_code(status.ok()), "server stopped");
            }
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "server ignored SIGTERM, killing process group"
                );
                signal_group(handle.pgid, Signal::SIGKILL);
                let _ = handle.child.wait().await;
            }
        }
    }

    /// Drop restart requests that accumulated while a restart was already in
    /// progress; near-simultaneous triggers collapse into one restart.
    fn drain_restart_requests(&mut self) {
        while self.restart_rx.try_recv().is_ok() {}
    }
}

fn signal_group(pgid: i32, sig: Signal) {
    // Negative pid addresses the whole group.
    if let Err(e) = kill(Pid::from_raw(-pgid), sig) {
        tracing::warn!(pgid, sig = %sig, err = %e, "failed to signal process group");
    }
}

/// Mirror the child's exit status: its code, or 128+signo when signal-killed.
fn mirror_exit_code(status: Option<std::process::ExitStatus>) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status {
        Some(status) => match status.code() {
            Some(code) => code,
            None => 128 + status.signal().unwrap_or(0),
        },
        None => 1,
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
