//! Token record and storage backends
//!
//! A token record is only ever written after a complete, successful exchange,
//! and only ever replaced wholesale. `expires_at` is stamped locally when the
//! token response is received; upstream supplies only the relative
//! `expires_in`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Freshness margin against clock drift and request latency.
pub const EXPIRY_SKEW_SECS: u64 = 60;

/// Persisted OAuth token record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub token_type: String,
    /// Space-separated granted scopes.
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds at issuance (informational).
    pub expires_in: u64,
    /// Absolute Unix expiry, computed at issuance. Authoritative for the
    /// freshness check. Defaults to 0 (never fresh) on legacy records.
    #[serde(default)]
    pub expires_at: u64,
}

impl TokenRecord {
    /// Build a record from a token-endpoint response, stamping `expires_at`
    /// as now + `expires_in`.
    pub fn issued_now(
        access_token: String,
        token_type: String,
        scope: String,
        expires_in: u64,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token,
            token_type,
            scope,
            refresh_token,
            expires_in,
            expires_at: now_epoch() + expires_in,
        }
    }

    /// Fresh iff `now < expires_at - skew`.
    pub fn is_fresh(&self) -> bool {
        now_epoch() + EXPIRY_SKEW_SECS < self.expires_at
    }
}

/// Current Unix time in whole seconds.
pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Storage seam for the token record, so alternate backends (in-memory,
/// encrypted, multi-account) can be substituted without touching the manager.
pub trait TokenStore: Send + Sync {
    /// `Ok(None)` means "no cached token", which is not an error.
    fn load(&self) -> Result<Option<TokenRecord>>;
    fn save(&self, record: &TokenRecord) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// JSON file store. Writes are atomic: serialize to a temp file in the same
/// directory, restrict permissions, then rename over the target.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<TokenRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read token file {}", self.path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse token file {}", self.path.display()))?;
        Ok(Some(record))
    }

    fn save(&self, record: &TokenRecord) -> Result<()> {
        let dir = self
            .path
            .parent()
            .context("Token file path has no parent directory")?;
        if !dir.is_dir() {
            bail!("Token directory {} does not exist", dir.display());
        }

        let content =
            serde_json::to_string_pretty(record).context("Failed to serialize token record")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write token file {}", tmp.display()))?;

        // Restrictive permissions before the file becomes visible (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&tmp, perms).context("Failed to set token file permissions")?;
        }

        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace token file {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

/// In-memory store backend.
#[derive(Default)]
pub struct MemoryTokenStore {
    record: Mutex<Option<TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new(record: Option<TokenRecord>) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenRecord>> {
        Ok(self.record.lock().expect("token store lock poisoned").clone())
    }

    fn save(&self, record: &TokenRecord) -> Result<()> {
        *self.record.lock().expect("token store lock poisoned") = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.record.lock().expect("token store lock poisoned") = None;
        Ok(())
    }
}
