// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential error taxonomy.
//!
//! Callers match on variants to pick a recovery policy: transient failures
//! are retried with backoff, `CredentialsInvalid` clears persisted state,
//! and everything else degrades the acquisition attempt rather than
//! crashing the supervisor.

/// Errors from the OAuth and session-exchange flows.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Transport-level failure (DNS, connect, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Auth service returned a non-2xx outside the RFC-defined control
    /// signals, or a body we could not parse.
    #[error("auth service error ({status}): {body}")]
    Service { status: u16, body: String },

    /// The user rejected the device authorization.
    #[error("authorization denied by user")]
    Denied,

    /// The provider reported the device code expired.
    #[error("device code expired before authorization completed")]
    Expired,

    /// The polling deadline elapsed before the user authorized.
    #[error("device authorization timed out after {0}s")]
    Timeout(u64),

    /// The refresh token was rejected as invalid or revoked. Persisted
    /// state must be cleared; retrying is pointless.
    #[error("refresh token rejected: {0}")]
    CredentialsInvalid(String),

    /// The account has no game profiles to create a session for.
    #[error("account has no game profiles")]
    NoProfile,

    /// Profile listing or session exchange failed.
    #[error("session service error ({status}): {body}")]
    SessionService { status: u16, body: String },

    /// Shutdown cancelled an in-flight credential operation.
    #[error("cancelled by shutdown")]
    Cancelled,
}

impl AuthError {
    /// Whether a retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Service { status, .. } | Self::SessionService { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
