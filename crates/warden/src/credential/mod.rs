// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential lifecycle: OAuth device authorization, token refresh, and the
//! session exchange the server process actually consumes.
//!
//! Only [`OAuthTokens`] are durable (single JSON file, see [`store`]).
//! Session tokens are minted once per server launch and die with it.

pub mod device;
pub mod manager;
pub mod refresh;
pub mod session;
pub mod store;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Durable OAuth credentials, persisted as a single JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token expiry as epoch seconds.
    #[serde(default)]
    pub expires_at: u64,
    /// When the refresh token was last exchanged, epoch seconds. Our own
    /// bookkeeping — the provider does not expose remaining refresh-token
    /// lifetime. Absent in token files written before this field existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<u64>,
}

impl OAuthTokens {
    /// Build from a token-endpoint grant, stamping `refreshed_at` to `now`.
    ///
    /// Not every refresh response rotates the refresh token; when the grant
    /// omits one, `previous_refresh_token` is retained.
    pub fn from_grant(grant: TokenGrant, previous_refresh_token: Option<String>, now: u64) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(previous_refresh_token),
            expires_at: now + grant.expires_in,
            refreshed_at: Some(now),
        }
    }
}

/// Token endpoint response (device-code and refresh-token grants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// RFC 8628 device authorization response. One per authorization attempt,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthChallenge {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

/// Short-lived game session credentials handed to the server process.
/// Never written to disk.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub session_token: String,
    pub identity_token: String,
    pub profile_uuid: Option<String>,
    /// Epoch seconds; `None` when the tokens came from an override and their
    /// expiry is managed externally.
    pub expires_at: Option<u64>,
}

/// How the active session was obtained. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    StoredOauth,
    FreshDeviceAuth,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::StoredOauth => "stored_oauth",
            Self::FreshDeviceAuth => "fresh_device_auth",
        }
    }
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider endpoints and client identity for the auth flows.
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    /// RFC 8628 device authorization endpoint.
    pub device_auth_url: String,
    /// Token endpoint (device-code and refresh-token grants).
    pub token_url: String,
    /// Session service base URL (profile listing + session exchange).
    pub sessions_url: String,
    pub client_id: String,
    pub scope: String,
}

/// Resolve the warden state directory.
///
/// Checks `WARDEN_STATE_DIR`, then `$XDG_STATE_HOME/warden`,
/// then `$HOME/.local/state/warden`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WARDEN_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("warden");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/warden");
    }
    PathBuf::from(".warden")
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
