// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential acquisition: override → stored OAuth → interactive device
//! authorization, falling back to running unauthenticated.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::config::WardenConfig;
use crate::credential::store::TokenStore;
use crate::credential::{
    device, epoch_secs, refresh, session, AuthEndpoints, CredentialSource, DeviceAuthChallenge,
    OAuthTokens, SessionTokens,
};
use crate::error::AuthError;

/// Max retries for a single refresh operation (transient failures only).
const MAX_REFRESH_RETRIES: u32 = 5;

/// Outcome of one acquisition attempt.
#[derive(Debug)]
pub enum Acquisition {
    Acquired { tokens: SessionTokens, source: CredentialSource },
    /// No session could be obtained; the server starts unauthenticated
    /// rather than blocking startup.
    Unavailable,
}

/// Orchestrates the token store, device authorizer, refresher and session
/// exchanger. All credential operations are serialized through one lock:
/// the health loop and an auth-required restart must never race on the
/// token file.
pub struct CredentialManager {
    store: TokenStore,
    endpoints: AuthEndpoints,
    http: reqwest::Client,
    override_session: Option<String>,
    override_identity: Option<String>,
    override_profile: Option<String>,
    device_auth_enabled: bool,
    renew_threshold_secs: u64,
    artifact_path: PathBuf,
    op_lock: tokio::sync::Mutex<()>,
}

impl CredentialManager {
    pub fn new(config: &WardenConfig, http: reqwest::Client) -> Self {
        Self {
            store: TokenStore::new(config.token_file()),
            endpoints: config.endpoints(),
            http,
            override_session: config.session_token.clone(),
            override_identity: config.identity_token.clone(),
            override_profile: config.profile_uuid.clone(),
            device_auth_enabled: config.device_auth_enabled(),
            renew_threshold_secs: config.renew_threshold().as_secs(),
            artifact_path: config.device_auth_artifact(),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one acquisition attempt to a terminal state.
    ///
    /// 1. explicit override → used verbatim, nothing touched on disk or net;
    /// 2. stored OAuth tokens, refreshed when the access token is stale;
    /// 3. session exchange;
    /// 4. interactive device authorization (when enabled);
    /// 5. `Unavailable`.
    pub async fn acquire(&self, shutdown: &CancellationToken) -> Acquisition {
        let _guard = self.op_lock.lock().await;

        if let (Some(session_token), Some(identity_token)) =
            (&self.override_session, &self.override_identity)
        {
            tracing::info!(source = %CredentialSource::Environment, "using session token override");
            return Acquisition::Acquired {
                tokens: SessionTokens {
                    session_token: session_token.clone(),
                    identity_token: identity_token.clone(),
                    profile_uuid: self.override_profile.clone(),
                    expires_at: None,
                },
                source: CredentialSource::Environment,
            };
        }

        if let Some(oauth) = self.usable_stored_tokens().await {
            match session::exchange(&self.http, &self.endpoints, &oauth.access_token).await {
                Ok(tokens) => {
                    return Acquisition::Acquired { tokens, source: CredentialSource::StoredOauth }
                }
                // A session-exchange failure alone does not condemn the
                // stored tokens; keep them and try fresh authorization.
                Err(e) => {
                    tracing::warn!(err = %e, "session exchange with stored credentials failed")
                }
            }
        }

        if self.device_auth_enabled && !shutdown.is_cancelled() {
            match self.device_authorize(shutdown).await {
                Ok(tokens) => {
                    return Acquisition::Acquired {
                        tokens,
                        source: CredentialSource::FreshDeviceAuth,
                    }
                }
                Err(AuthError::Cancelled) => {
                    tracing::info!("device authorization cancelled by shutdown")
                }
                Err(e) => tracing::warn!(err = %e, "device authorization failed"),
            }
        }

        tracing::warn!("no credentials available, server will start unauthenticated");
        Acquisition::Unavailable
    }

    /// Stored OAuth tokens with a valid access token, refreshing if stale.
    async fn usable_stored_tokens(&self) -> Option<OAuthTokens> {
        let stored = self.store.load()?;
        if !refresh::is_access_expired(&stored, epoch_secs()) {
            return Some(stored);
        }

        match refresh::refresh_with_retries(&self.http, &self.endpoints, &stored, MAX_REFRESH_RETRIES)
            .await
        {
            Ok(fresh) => {
                if let Err(e) = self.store.save(&fresh) {
                    tracing::warn!(err = %e, "failed to persist refreshed tokens");
                }
                Some(fresh)
            }
            Err(AuthError::CredentialsInvalid(reason)) => {
                tracing::warn!(reason = %reason, "stored refresh token rejected, clearing credentials");
                self.store.clear();
                None
            }
            Err(e) => {
                tracing::warn!(err = %e, "token refresh failed");
                None
            }
        }
    }

    /// Full device challenge + poll + session exchange.
    async fn device_authorize(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<SessionTokens, AuthError> {
        let challenge = device::start_challenge(&self.http, &self.endpoints).await?;
        self.surface_challenge(&challenge);

        let grant =
            device::poll_until_authorized(&self.http, &self.endpoints, &challenge, shutdown).await?;
        let tokens = OAuthTokens::from_grant(grant, None, epoch_secs());
        if let Err(e) = self.store.save(&tokens) {
            tracing::warn!(err = %e, "failed to persist tokens after device authorization");
        }
        let _ = std::fs::remove_file(&self.artifact_path);

        session::exchange(&self.http, &self.endpoints, &tokens.access_token).await
    }

    /// Surface the verification URL and user code, once per challenge: a log
    /// line and an artifact file readable from outside the container.
    fn surface_challenge(&self, challenge: &DeviceAuthChallenge) {
        let url = challenge
            .verification_uri_complete
            .as_deref()
            .unwrap_or(&challenge.verification_uri);
        tracing::info!(
            url = %url,
            code = %challenge.user_code,
            expires_in_secs = challenge.expires_in,
            "authorization required: visit the verification URL and enter the code"
        );
        let contents = format!("Visit {url}\nCode: {}\n", challenge.user_code);
        if let Err(e) = std::fs::write(&self.artifact_path, contents) {
            tracing::warn!(path = %self.artifact_path.display(), err = %e, "failed to write device auth artifact");
        }
    }

    /// Background health check: proactively renew the refresh token before
    /// its rolling expiry.
    ///
    /// An error here means tokens cannot be kept alive and the caller should
    /// restart the child so it re-requests credentials.
    pub async fn keep_fresh(&self) -> anyhow::Result<()> {
        let _guard = self.op_lock.lock().await;

        // Override tokens are externally managed; nothing to renew.
        if self.override_session.is_some() {
            return Ok(());
        }
        let Some(stored) = self.store.load() else {
            return Ok(());
        };

        if !refresh::is_refresh_aging(
            &stored,
            epoch_secs(),
            refresh::REFRESH_TOKEN_LIFETIME_SECS,
            self.renew_threshold_secs,
        ) {
            tracing::debug!("refresh token not near rolling expiry");
            return Ok(());
        }

        match refresh::refresh_with_retries(&self.http, &self.endpoints, &stored, MAX_REFRESH_RETRIES)
            .await
        {
            Ok(fresh) => {
                self.store.save(&fresh)?;
                tracing::info!("oauth tokens proactively renewed");
                Ok(())
            }
            Err(AuthError::CredentialsInvalid(reason)) => {
                self.store.clear();
                anyhow::bail!("refresh token rejected during renewal: {reason}")
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
