// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth token refresh and the expiry/aging predicates that drive it.

use std::time::Duration;

use rand::Rng;

use crate::credential::device::parse_oauth_error;
use crate::credential::{epoch_secs, AuthEndpoints, OAuthTokens, TokenGrant};
use crate::error::AuthError;

/// Safety margin so we never race the provider clock on access expiry.
pub const ACCESS_EXPIRY_BUFFER_SECS: u64 = 60;

/// Fixed rolling lifetime of the provider's refresh tokens.
pub const REFRESH_TOKEN_LIFETIME_SECS: u64 = 30 * 24 * 60 * 60;

/// True when the access token is expired or within the buffer of expiring.
pub fn is_access_expired(tokens: &OAuthTokens, now: u64) -> bool {
    now >= tokens.expires_at.saturating_sub(ACCESS_EXPIRY_BUFFER_SECS)
}

/// True when the refresh token is close enough to its rolling expiry that it
/// should be proactively renewed.
///
/// An absent `refreshed_at` (first run, or a token file predating the field)
/// is treated as not aging; startup must never trigger a refresh burst.
pub fn is_refresh_aging(
    tokens: &OAuthTokens,
    now: u64,
    lifetime_secs: u64,
    renew_threshold_secs: u64,
) -> bool {
    match tokens.refreshed_at {
        None => false,
        Some(at) => now.saturating_sub(at) >= lifetime_secs.saturating_sub(renew_threshold_secs),
    }
}

/// Perform a single refresh-token exchange.
///
/// On success the returned tokens carry `refreshed_at = now`, and keep the
/// old refresh token when the provider did not rotate it. An `invalid_grant`
/// rejection surfaces as [`AuthError::CredentialsInvalid`] so the caller can
/// clear stored state instead of retrying forever.
pub async fn refresh(
    client: &reqwest::Client,
    endpoints: &AuthEndpoints,
    tokens: &OAuthTokens,
) -> Result<OAuthTokens, AuthError> {
    let refresh_token = tokens
        .refresh_token
        .as_deref()
        .ok_or_else(|| AuthError::CredentialsInvalid("no refresh token stored".to_owned()))?;

    let resp = client
        .post(&endpoints.token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", endpoints.client_id.as_str()),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await?;

    if resp.status().is_success() {
        let grant: TokenGrant = resp.json().await?;
        return Ok(OAuthTokens::from_grant(grant, tokens.refresh_token.clone(), epoch_secs()));
    }

    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    match parse_oauth_error(&body) {
        Some(e) if e.error == "invalid_grant" => {
            Err(AuthError::CredentialsInvalid(e.error_description.unwrap_or(e.error)))
        }
        _ => Err(AuthError::Service { status, body }),
    }
}

/// Refresh with exponential backoff and jitter.
///
/// Only transient failures are retried; terminal rejections (notably
/// `CredentialsInvalid`) propagate immediately.
pub async fn refresh_with_retries(
    client: &reqwest::Client,
    endpoints: &AuthEndpoints,
    tokens: &OAuthTokens,
    max_retries: u32,
) -> Result<OAuthTokens, AuthError> {
    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(60);
    let mut attempt = 0;

    loop {
        match refresh(client, endpoints, tokens).await {
            Ok(fresh) => return Ok(fresh),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                let jitter_ms = rand::rng().random_range(0..=backoff.as_millis() as u64 / 2);
                let delay = backoff + Duration::from_millis(jitter_ms);
                tracing::debug!(attempt, err = %e, delay_ms = delay.as_millis() as u64, "refresh attempt failed, retrying");
                tokio::time::sleep(delay).await;
                backoff = (backoff * 2).min(max_backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
