// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Game-session exchange: profile listing plus the session grant the server
//! process is launched with.

use serde::Deserialize;

use crate::credential::{epoch_secs, AuthEndpoints, SessionTokens};
use crate::error::AuthError;

#[derive(Debug, Clone, Deserialize)]
pub struct GameProfile {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionGrant {
    session_token: String,
    identity_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Exchange a valid OAuth access token for a game session.
///
/// Fetches the account's profile list and creates a session for the first
/// profile in provider response order; there is no user-facing selection,
/// so multi-profile accounts always run their first profile.
///
/// No retry here; retry policy belongs to the caller.
pub async fn exchange(
    client: &reqwest::Client,
    endpoints: &AuthEndpoints,
    access_token: &str,
) -> Result<SessionTokens, AuthError> {
    let resp = client
        .get(format!("{}/profiles", endpoints.sessions_url))
        .bearer_auth(access_token)
        .send()
        .await?;
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::SessionService { status, body });
    }
    let profiles: Vec<GameProfile> = resp.json().await?;

    let Some(profile) = profiles.first() else {
        return Err(AuthError::NoProfile);
    };
    tracing::info!(
        count = profiles.len(),
        profile = %profile.uuid,
        name = profile.name.as_deref().unwrap_or("<unnamed>"),
        "selected game profile"
    );

    let resp = client
        .post(format!("{}/sessions", endpoints.sessions_url))
        .bearer_auth(access_token)
        .json(&serde_json::json!({ "profile_uuid": profile.uuid }))
        .send()
        .await?;
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::SessionService { status, body });
    }
    let grant: SessionGrant = resp.json().await?;

    Ok(SessionTokens {
        session_token: grant.session_token,
        identity_token: grant.identity_token,
        profile_uuid: Some(profile.uuid.clone()),
        expires_at: Some(epoch_secs() + grant.expires_in),
    })
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
