// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth 2.0 Device Authorization Grant (RFC 8628).

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::credential::{AuthEndpoints, DeviceAuthChallenge, TokenGrant};
use crate::error::AuthError;

/// Interval bump applied on every `slow_down` from the provider.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// RFC 6749 error body returned by the token endpoint.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

pub(crate) fn parse_oauth_error(body: &str) -> Option<OAuthErrorBody> {
    serde_json::from_str(body).ok()
}

/// Initiate device authorization by POSTing to the device auth endpoint.
pub async fn start_challenge(
    client: &reqwest::Client,
    endpoints: &AuthEndpoints,
) -> Result<DeviceAuthChallenge, AuthError> {
    let resp = client
        .post(&endpoints.device_auth_url)
        .form(&[("client_id", endpoints.client_id.as_str()), ("scope", endpoints.scope.as_str())])
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::Service { status, body });
    }

    Ok(resp.json().await?)
}

/// Poll the token endpoint until the user completes authorization, the
/// provider reports denial or expiry, the challenge deadline elapses, or
/// shutdown cancels the wait.
///
/// `authorization_pending` continues unchanged; `slow_down` grows the poll
/// interval monotonically (never shrinks it).
pub async fn poll_until_authorized(
    client: &reqwest::Client,
    endpoints: &AuthEndpoints,
    challenge: &DeviceAuthChallenge,
    shutdown: &CancellationToken,
) -> Result<TokenGrant, AuthError> {
    let mut poll_interval = Duration::from_secs(challenge.interval.max(1));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(challenge.expires_in);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Err(AuthError::Cancelled),
            _ = tokio::time::sleep(poll_interval) => {}
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(AuthError::Timeout(challenge.expires_in));
        }

        let resp = client
            .post(&endpoints.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("client_id", endpoints.client_id.as_str()),
                ("device_code", challenge.device_code.as_str()),
            ])
            .send()
            .await?;

        if resp.status().is_success() {
            return Ok(resp.json().await?);
        }

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();

        match parse_oauth_error(&body).map(|e| e.error) {
            Some(code) if code == "authorization_pending" => continue,
            Some(code) if code == "slow_down" => {
                poll_interval += SLOW_DOWN_STEP;
                tracing::debug!(interval_secs = poll_interval.as_secs(), "provider asked to slow down");
                continue;
            }
            Some(code) if code == "expired_token" => return Err(AuthError::Expired),
            Some(code) if code == "access_denied" => return Err(AuthError::Denied),
            _ => return Err(AuthError::Service { status, body }),
        }
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
