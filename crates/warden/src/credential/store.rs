// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token persistence: load/save a single JSON file with atomic writes.

use std::path::{Path, PathBuf};

use crate::credential::OAuthTokens;

/// Durable store for [`OAuthTokens`] at a fixed path.
///
/// A missing, empty, or corrupt file is treated as "no stored credentials" —
/// it forces re-authorization, never a crash.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored tokens, or `None` when absent or unreadable.
    pub fn load(&self) -> Option<OAuthTokens> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "failed to read token file");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    err = %e,
                    "token file is corrupt, treating as absent"
                );
                None
            }
        }
    }

    /// Save tokens atomically (write tmp + rename), owner-readable only.
    ///
    /// Uses a unique temp filename (PID + counter) to avoid corruption when
    /// concurrent saves race on the same `.tmp` file — a shorter write can
    /// leave trailing bytes from a longer previous write.
    pub fn save(&self, tokens: &OAuthTokens) -> anyhow::Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let json = serde_json::to_string_pretty(tokens)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Delete stored tokens. Missing file is fine.
    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "failed to delete token file");
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
