// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::io::AsyncWriteExt;

use super::*;

#[test]
fn auth_marker_before_boot_is_ignored() {
    let mut scanner = MarkerScanner::new();
    assert_eq!(scanner.scan("[AuthManager] Authentication required"), None);
    assert_eq!(
        scanner.scan("[Server] Server startup complete in 3.2s"),
        Some(WatchEvent::BootComplete)
    );
    assert_eq!(
        scanner.scan("[AuthManager] Authentication required"),
        Some(WatchEvent::AuthRequired)
    );
}

#[test]
fn boot_marker_fires_at_most_once() {
    let mut scanner = MarkerScanner::new();
    assert_eq!(scanner.scan("Server startup complete"), Some(WatchEvent::BootComplete));
    assert_eq!(scanner.scan("Server startup complete"), None);
}

#[test]
fn unrelated_lines_emit_nothing() {
    let mut scanner = MarkerScanner::new();
    assert_eq!(scanner.scan("[World] Loaded 42 chunks"), None);
    assert_eq!(scanner.scan(""), None);
}

#[tokio::test]
async fn watcher_emits_events_from_either_stream_and_closes_on_eof() {
    let (mut stdout_w, stdout_r) = tokio::io::duplex(256);
    let (mut stderr_w, stderr_r) = tokio::io::duplex(256);

    let mut events = spawn_output_watcher(stdout_r, stderr_r);

    stdout_w.write_all(b"[World] Loaded 42 chunks\n").await.expect("write");
    stdout_w.write_all(b"Server startup complete\n").await.expect("write");
    assert_eq!(events.recv().await, Some(WatchEvent::BootComplete));

    // The auth marker arrives on stderr; boot state is shared across streams.
    stderr_w.write_all(b"Authentication required\n").await.expect("write");
    assert_eq!(events.recv().await, Some(WatchEvent::AuthRequired));

    // Both streams reaching EOF closes the event channel.
    drop(stdout_w);
    drop(stderr_w);
    assert_eq!(events.recv().await, None);
}
