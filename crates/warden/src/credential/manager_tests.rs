// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::config::WardenConfig;
use crate::credential::store::TokenStore;
use crate::credential::{CredentialSource, OAuthTokens};

struct StubAuth {
    addr: SocketAddr,
    device_calls: Arc<AtomicU32>,
    token_calls: Arc<AtomicU32>,
}

/// Stub provider covering all four endpoints. The token endpoint replays
/// the scripted responses in order (shared across refresh and device-code
/// grants), repeating the last one.
async fn stub_auth(token_responses: Vec<(u16, String)>) -> StubAuth {
    let device_calls = Arc::new(AtomicU32::new(0));
    let token_calls = Arc::new(AtomicU32::new(0));
    let device_clone = Arc::clone(&device_calls);
    let token_clone = Arc::clone(&token_calls);
    let responses = Arc::new(token_responses);

    let app = Router::new()
        .route(
            "/device",
            post(move || {
                let calls = Arc::clone(&device_clone);
                async move {
                    calls.fetch_add(1, Ordering::Relaxed);
                    Json(serde_json::json!({
                        "device_code": "dc-1",
                        "user_code": "WXYZ-1234",
                        "verification_uri": "https://verify.example/device",
                        "interval": 1,
                        "expires_in": 600
                    }))
                }
            }),
        )
        .route(
            "/token",
            post(move |_body: String| {
                let calls = Arc::clone(&token_clone);
                let resps = Arc::clone(&responses);
                async move {
                    let idx = calls.fetch_add(1, Ordering::Relaxed) as usize;
                    let (status, body) = resps
                        .get(idx)
                        .or_else(|| resps.last())
                        .cloned()
                        .unwrap_or((500, "{}".to_owned()));
                    (
                        axum::http::StatusCode::from_u16(status)
                            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                        body,
                    )
                }
            }),
        )
        .route(
            "/profiles",
            get(|| async {
                Json(serde_json::json!([{ "uuid": "prof-1", "name": "Owner" }]))
            }),
        )
        .route(
            "/sessions",
            post(|Json(_): Json<serde_json::Value>| async {
                Json(serde_json::json!({
                    "session_token": "sess-tok",
                    "identity_token": "ident-tok",
                    "expires_in": 1800
                }))
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    StubAuth { addr, device_calls, token_calls }
}

fn grant_body(rotate: bool) -> (u16, String) {
    let mut body = serde_json::json!({
        "access_token": "new-access",
        "expires_in": 3600
    });
    if rotate {
        body["refresh_token"] = "rotated-refresh".into();
    }
    (200, body.to_string())
}

fn invalid_grant() -> (u16, String) {
    (400, serde_json::json!({ "error": "invalid_grant", "error_description": "revoked" }).to_string())
}

/// Config pointing at the stub (or at a dead port when `addr` is `None`).
fn test_config(state_dir: &Path, addr: Option<SocketAddr>, extra: &[&str]) -> WardenConfig {
    let base = match addr {
        Some(a) => format!("http://{a}"),
        None => "http://127.0.0.1:1".to_owned(),
    };
    let mut args = vec![
        "warden".to_owned(),
        "--state-dir".to_owned(),
        state_dir.display().to_string(),
        "--device-auth-url".to_owned(),
        format!("{base}/device"),
        "--token-url".to_owned(),
        format!("{base}/token"),
        "--sessions-url".to_owned(),
        base,
    ];
    args.extend(extra.iter().map(|s| (*s).to_owned()));
    WardenConfig::parse_from(args)
}

fn manager_for(config: &WardenConfig) -> CredentialManager {
    CredentialManager::new(config, crate::test_http_client())
}

fn seed_tokens(config: &WardenConfig, tokens: &OAuthTokens) {
    TokenStore::new(config.token_file()).save(tokens).expect("seed tokens");
}

fn stored_tokens(config: &WardenConfig) -> Option<OAuthTokens> {
    TokenStore::new(config.token_file()).load()
}

#[tokio::test]
async fn environment_override_touches_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Endpoints point at a dead port: any network call would fail loudly.
    let config = test_config(
        dir.path(),
        None,
        &["--session-token", "env-sess", "--identity-token", "env-ident", "--profile-uuid", "env-prof"],
    );
    let manager = manager_for(&config);

    match manager.acquire(&CancellationToken::new()).await {
        Acquisition::Acquired { tokens, source } => {
            assert_eq!(source, CredentialSource::Environment);
            assert_eq!(tokens.session_token, "env-sess");
            assert_eq!(tokens.identity_token, "env-ident");
            assert_eq!(tokens.profile_uuid.as_deref(), Some("env-prof"));
            assert_eq!(tokens.expires_at, None);
        }
        Acquisition::Unavailable => panic!("expected Acquired"),
    }
    assert!(!config.token_file().exists());
}

#[tokio::test]
async fn expired_access_refreshes_once_then_exchanges() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stub = stub_auth(vec![grant_body(false)]).await;
    let config = test_config(dir.path(), Some(stub.addr), &[]);
    seed_tokens(
        &config,
        &OAuthTokens {
            access_token: "stale-access".to_owned(),
            refresh_token: Some("abc".to_owned()),
            expires_at: 1,
            refreshed_at: Some(1),
        },
    );
    let manager = manager_for(&config);

    match manager.acquire(&CancellationToken::new()).await {
        Acquisition::Acquired { tokens, source } => {
            assert_eq!(source, CredentialSource::StoredOauth);
            assert_eq!(tokens.session_token, "sess-tok");
        }
        Acquisition::Unavailable => panic!("expected Acquired"),
    }
    assert_eq!(stub.token_calls.load(Ordering::Relaxed), 1);

    // The provider did not rotate the refresh token; the old one survives
    // alongside the new access token and bookkeeping stamp.
    let stored = stored_tokens(&config).expect("stored tokens");
    assert_eq!(stored.access_token, "new-access");
    assert_eq!(stored.refresh_token.as_deref(), Some("abc"));
    assert!(stored.refreshed_at.is_some());
}

#[tokio::test]
async fn valid_access_token_skips_refresh() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stub = stub_auth(vec![]).await;
    let config = test_config(dir.path(), Some(stub.addr), &[]);
    seed_tokens(
        &config,
        &OAuthTokens {
            access_token: "live-access".to_owned(),
            refresh_token: Some("abc".to_owned()),
            expires_at: crate::credential::epoch_secs() + 3600,
            refreshed_at: Some(1),
        },
    );
    let manager = manager_for(&config);

    assert!(matches!(
        manager.acquire(&CancellationToken::new()).await,
        Acquisition::Acquired { source: CredentialSource::StoredOauth, .. }
    ));
    assert_eq!(stub.token_calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn nothing_stored_and_interactive_disabled_is_unavailable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path(), None, &["--no-device-auth"]);
    let manager = manager_for(&config);

    assert!(matches!(
        manager.acquire(&CancellationToken::new()).await,
        Acquisition::Unavailable
    ));
}

#[tokio::test(start_paused = true)]
async fn invalid_grant_clears_store_and_falls_back_to_device_auth() {
    let dir = tempfile::tempdir().expect("tempdir");
    let device_grant = (
        200,
        serde_json::json!({
            "access_token": "granted-access",
            "refresh_token": "granted-refresh",
            "expires_in": 3600
        })
        .to_string(),
    );
    let stub = stub_auth(vec![invalid_grant(), device_grant]).await;
    let config = test_config(dir.path(), Some(stub.addr), &[]);
    seed_tokens(
        &config,
        &OAuthTokens {
            access_token: "stale-access".to_owned(),
            refresh_token: Some("bad".to_owned()),
            expires_at: 1,
            refreshed_at: Some(1),
        },
    );
    let manager = manager_for(&config);

    match manager.acquire(&CancellationToken::new()).await {
        Acquisition::Acquired { source, .. } => {
            assert_eq!(source, CredentialSource::FreshDeviceAuth);
        }
        Acquisition::Unavailable => panic!("expected Acquired"),
    }

    // Rejected refresh token started a fresh challenge, and the store now
    // holds the device-grant tokens.
    assert_eq!(stub.device_calls.load(Ordering::Relaxed), 1);
    let stored = stored_tokens(&config).expect("stored tokens");
    assert_eq!(stored.access_token, "granted-access");
    assert_eq!(stored.refresh_token.as_deref(), Some("granted-refresh"));
    // Challenge resolved, so the operator artifact is gone again.
    assert!(!config.device_auth_artifact().exists());
}

#[tokio::test(start_paused = true)]
async fn denied_challenge_leaves_artifact_and_degrades() {
    let dir = tempfile::tempdir().expect("tempdir");
    let denied = (400, serde_json::json!({ "error": "access_denied" }).to_string());
    let stub = stub_auth(vec![denied]).await;
    let config = test_config(dir.path(), Some(stub.addr), &[]);
    let manager = manager_for(&config);

    assert!(matches!(
        manager.acquire(&CancellationToken::new()).await,
        Acquisition::Unavailable
    ));
    assert_eq!(stub.device_calls.load(Ordering::Relaxed), 1);

    // The verification URL and code stay readable for the operator.
    let artifact = std::fs::read_to_string(config.device_auth_artifact()).expect("artifact");
    assert!(artifact.contains("WXYZ-1234"));
    assert!(!config.token_file().exists());
}

#[tokio::test]
async fn keep_fresh_is_a_noop_without_aging() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let stub = stub_auth(vec![]).await;
    let config = test_config(dir.path(), Some(stub.addr), &[]);
    seed_tokens(
        &config,
        &OAuthTokens {
            access_token: "live-access".to_owned(),
            refresh_token: Some("abc".to_owned()),
            expires_at: crate::credential::epoch_secs() + 3600,
            refreshed_at: Some(crate::credential::epoch_secs()),
        },
    );

    manager_for(&config).keep_fresh().await?;
    assert_eq!(stub.token_calls.load(Ordering::Relaxed), 0);
    Ok(())
}

#[tokio::test]
async fn keep_fresh_renews_an_aging_refresh_token() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let stub = stub_auth(vec![grant_body(true)]).await;
    let config = test_config(dir.path(), Some(stub.addr), &[]);
    seed_tokens(
        &config,
        &OAuthTokens {
            access_token: "live-access".to_owned(),
            refresh_token: Some("abc".to_owned()),
            expires_at: crate::credential::epoch_secs() + 3600,
            // Ancient stamp: well past the renewal threshold.
            refreshed_at: Some(1),
        },
    );

    manager_for(&config).keep_fresh().await?;

    assert_eq!(stub.token_calls.load(Ordering::Relaxed), 1);
    let stored = stored_tokens(&config).expect("stored tokens");
    assert_eq!(stored.refresh_token.as_deref(), Some("rotated-refresh"));
    Ok(())
}

#[tokio::test]
async fn keep_fresh_clears_store_on_rejection_and_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stub = stub_auth(vec![invalid_grant()]).await;
    let config = test_config(dir.path(), Some(stub.addr), &[]);
    seed_tokens(
        &config,
        &OAuthTokens {
            access_token: "live-access".to_owned(),
            refresh_token: Some("bad".to_owned()),
            expires_at: crate::credential::epoch_secs() + 3600,
            refreshed_at: Some(1),
        },
    );

    let err = manager_for(&config).keep_fresh().await.expect_err("should fail");
    assert!(err.to_string().contains("rejected"));
    assert!(stored_tokens(&config).is_none());
}

#[tokio::test]
async fn keep_fresh_ignores_override_and_empty_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(
        dir.path(),
        None,
        &["--session-token", "env-sess", "--identity-token", "env-ident"],
    );
    manager_for(&config).keep_fresh().await?;

    let config = test_config(dir.path(), None, &[]);
    manager_for(&config).keep_fresh().await?;
    Ok(())
}
