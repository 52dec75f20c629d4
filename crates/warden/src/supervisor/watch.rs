// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child output watching.
//!
//! The server signals readiness and authentication failure only through its
//! log output, an external contract we cannot change. The marker text is
//! isolated here; the rest of the supervisor only sees [`WatchEvent`]s.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Printed by the server once world load finishes and it accepts players.
const BOOT_COMPLETE_MARKER: &str = "Server startup complete";

/// Printed by the server when its session credentials are rejected and it
/// falls back to unauthenticated mode.
const AUTH_REQUIRED_MARKER: &str = "Authentication required";

/// Events derived from the child's output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    BootComplete,
    /// Seen only after boot completion; startup auth noise is not a restart
    /// trigger.
    AuthRequired,
}

/// Scans child output lines for the two markers.
///
/// `AuthRequired` is gated on boot completion, and `BootComplete` fires at
/// most once per child.
#[derive(Debug, Default)]
pub struct MarkerScanner {
    booted: bool,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan(&mut self, line: &str) -> Option<WatchEvent> {
        if !self.booted && line.contains(BOOT_COMPLETE_MARKER) {
            self.booted = true;
            return Some(WatchEvent::BootComplete);
        }
        if self.booted && line.contains(AUTH_REQUIRED_MARKER) {
            return Some(WatchEvent::AuthRequired);
        }
        None
    }
}

/// Spawn reader tasks for the child's stdout and stderr.
///
/// Lines are passed through to the supervisor's stdout (container log
/// collection) and scanned for markers. The readers drain continuously so
/// the child never stalls on a full pipe, and events are dropped rather
/// than ever blocking the pass-through.
///
/// The returned channel closes when both streams reach EOF.
pub fn spawn_output_watcher<O, E>(stdout: O, stderr: E) -> mpsc::Receiver<WatchEvent>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let (event_tx, event_rx) = mpsc::channel(8);
    let (line_tx, mut line_rx) = mpsc::channel::<String>(256);

    tokio::spawn(read_lines(stdout, line_tx.clone()));
    tokio::spawn(read_lines(stderr, line_tx));

    tokio::spawn(async move {
        let mut scanner = MarkerScanner::new();
        while let Some(line) = line_rx.recv().await {
            println!("{line}");
            if let Some(event) = scanner.scan(&line) {
                if event_tx.try_send(event).is_err() {
                    tracing::debug!(?event, "watch event dropped, supervisor busy");
                }
            }
        }
    });

    event_rx
}

async fn read_lines<R: AsyncRead + Unpin>(reader: R, tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
