// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::credential::AuthEndpoints;

/// Configuration for the warden supervisor.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "warden", about = "Supervisor for the Hytale dedicated server")]
pub struct WardenConfig {
    /// Path to the server binary to supervise.
    #[arg(long, default_value = "server/HytaleServer", env = "WARDEN_SERVER_BINARY")]
    pub server_binary: PathBuf,

    /// Working directory for the server process. Defaults to the binary's parent.
    #[arg(long, env = "WARDEN_SERVER_DIR")]
    pub server_dir: Option<PathBuf>,

    /// Explicit session token override. Bypasses OAuth entirely; expiry is
    /// managed by whoever minted the token.
    #[arg(long, env = "WARDEN_SESSION_TOKEN", hide_env_values = true)]
    pub session_token: Option<String>,

    /// Explicit identity token override (paired with --session-token).
    #[arg(long, env = "WARDEN_IDENTITY_TOKEN", hide_env_values = true)]
    pub identity_token: Option<String>,

    /// Profile UUID accompanying an explicit token override.
    #[arg(long, env = "WARDEN_PROFILE_UUID")]
    pub profile_uuid: Option<String>,

    /// Disable interactive device authorization. Without stored or overridden
    /// credentials the server then starts unauthenticated.
    #[arg(long, env = "WARDEN_NO_DEVICE_AUTH")]
    pub no_device_auth: bool,

    /// Credential health check interval in hours.
    #[arg(long, default_value_t = 24, env = "WARDEN_CHECK_INTERVAL_HOURS")]
    pub check_interval_hours: u64,

    /// Days of refresh-token lifetime remaining before proactive renewal.
    #[arg(long, default_value_t = 5, env = "WARDEN_RENEW_THRESHOLD_DAYS")]
    pub renew_threshold_days: u64,

    /// Server log directory subject to retention. Defaults to `<server dir>/logs`.
    #[arg(long, env = "WARDEN_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Delete server log files older than this many days.
    #[arg(long, default_value_t = 7, env = "WARDEN_LOG_RETENTION_DAYS")]
    pub log_retention_days: u64,

    /// Grace period in seconds between group SIGTERM and SIGKILL at shutdown.
    #[arg(long, default_value_t = 30, env = "WARDEN_SHUTDOWN_GRACE_SECS")]
    pub shutdown_grace_secs: u64,

    /// Timeout in seconds for outbound HTTP calls.
    #[arg(long, default_value_t = 30, env = "WARDEN_HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: u64,

    /// State directory (token file, device auth artifact).
    /// Falls back to `$XDG_STATE_HOME/warden` resolution.
    #[arg(long, env = "WARDEN_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// OAuth device authorization endpoint.
    #[arg(
        long,
        default_value = "https://oauth.hytale.com/oauth2/device/authorize",
        env = "WARDEN_DEVICE_AUTH_URL"
    )]
    pub device_auth_url: String,

    /// OAuth token endpoint.
    #[arg(long, default_value = "https://oauth.hytale.com/oauth2/token", env = "WARDEN_TOKEN_URL")]
    pub token_url: String,

    /// Session service base URL (profile listing + session exchange).
    #[arg(long, default_value = "https://sessions.hytale.com", env = "WARDEN_SESSIONS_URL")]
    pub sessions_url: String,

    /// OAuth client id.
    #[arg(long, default_value = "hytale-server", env = "WARDEN_CLIENT_ID")]
    pub client_id: String,

    /// Scopes requested during device authorization.
    #[arg(long, default_value = "openid offline_access", env = "WARDEN_SCOPE")]
    pub scope: String,

    /// Extra arguments appended to the server command line.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub server_args: Vec<String>,
}

impl WardenConfig {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(crate::credential::state_dir)
    }

    pub fn token_file(&self) -> PathBuf {
        self.state_dir().join("tokens.json")
    }

    /// Operator-readable artifact holding the current verification URL/code.
    pub fn device_auth_artifact(&self) -> PathBuf {
        self.state_dir().join("device_auth.txt")
    }

    pub fn server_dir(&self) -> PathBuf {
        self.server_dir.clone().unwrap_or_else(|| {
            self.server_binary.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| self.server_dir().join("logs"))
    }

    pub fn device_auth_enabled(&self) -> bool {
        !self.no_device_auth
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_hours * 60 * 60)
    }

    pub fn renew_threshold(&self) -> Duration {
        Duration::from_secs(self.renew_threshold_days * 24 * 60 * 60)
    }

    pub fn log_retention(&self) -> Duration {
        Duration::from_secs(self.log_retention_days * 24 * 60 * 60)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn endpoints(&self) -> AuthEndpoints {
        AuthEndpoints {
            device_auth_url: self.device_auth_url.clone(),
            token_url: self.token_url.clone(),
            sessions_url: self.sessions_url.clone(),
            client_id: self.client_id.clone(),
            scope: self.scope.clone(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
