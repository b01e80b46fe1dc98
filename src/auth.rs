//! Token store: the bearer credential and the per-install device id
//!
//! The host captures the bearer token (browser traffic, environment, CLI
//! argument) and hands it to [`TokenStore::set`]. A fresher token always
//! replaces the stored one. Tokens carry no expiry here: a stale token is
//! discovered when the remote API answers 401/403, which the client maps to
//! [`Error::NotAuthenticated`].

use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What the backing store persists
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Bearer token, once captured
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Device identifier, once generated
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Host capability to read and write the stored credential
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the stored credential (empty when nothing was saved yet)
    async fn load(&self) -> Result<StoredCredential>;

    /// Replace the stored credential
    async fn save(&self, credential: &StoredCredential) -> Result<()>;
}

/// Credential store backed by a JSON file
#[derive(Clone, Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store at `path`; the file and its parent directory are created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<StoredCredential> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredCredential::default()),
            Err(e) => Err(Error::filesystem(&self.path, e)),
        }
    }

    async fn save(&self, credential: &StoredCredential) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::filesystem(parent, e))?;
        }

        // write-then-rename
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(credential)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::filesystem(&tmp, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| Error::filesystem(&tmp, e))?;
        }

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::filesystem(&self.path, e))
    }
}

/// In-memory credential store, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: std::sync::Mutex<StoredCredential>,
}

impl MemoryCredentialStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `credential`
    pub fn with_credential(credential: StoredCredential) -> Self {
        Self {
            inner: std::sync::Mutex::new(credential),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<StoredCredential> {
        Ok(self
            .inner
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone()))
    }

    async fn save(&self, credential: &StoredCredential) -> Result<()> {
        match self.inner.lock() {
            Ok(mut guard) => *guard = credential.clone(),
            Err(poisoned) => *poisoned.into_inner() = credential.clone(),
        }
        Ok(())
    }
}

/// Credentials attached to every authenticated request
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token, without the `Bearer ` prefix
    pub bearer_token: String,
    /// Stable per-install device id
    pub device_id: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("bearer_token", &crate::utils::redact(&self.bearer_token))
            .field("device_id", &self.device_id)
            .finish()
    }
}

/// Token store shared by every request of a session
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn CredentialStore>,
    // serializes read-modify-write cycles against the backend
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl TokenStore {
    /// Token store over `backend`
    pub fn new(backend: Arc<dyn CredentialStore>) -> Self {
        Self {
            backend,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Token store backed by a JSON file at `path`
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileCredentialStore::new(path)))
    }

    /// Token store held in memory only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCredentialStore::new()))
    }

    /// Current credential
    ///
    /// Fails with [`Error::NotAuthenticated`] when no token was ever captured.
    /// Generates the device id on first use.
    pub async fn get(&self) -> Result<Credential> {
        let stored = self.backend.load().await?;
        let bearer_token = stored
            .bearer_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::NotAuthenticated {
                reason: "no token captured yet; set one with `suno-export token set`".to_string(),
            })?;
        let device_id = self.get_or_create_device_id().await?;
        Ok(Credential {
            bearer_token,
            device_id,
        })
    }

    /// Store a freshly observed token, replacing any previous one
    ///
    /// Accepts a raw `Authorization` header value: a leading `Bearer ` and
    /// surrounding whitespace are stripped.
    pub async fn set(&self, token: &str) -> Result<()> {
        let token = normalize_token(token);
        if token.is_empty() {
            return Err(Error::config("token", "token is empty"));
        }

        let _guard = self.write_lock.lock().await;
        let mut stored = self.backend.load().await?;
        stored.bearer_token = Some(token.to_string());
        self.backend.save(&stored).await?;
        tracing::info!(token = %crate::utils::redact(token), "stored bearer token");
        Ok(())
    }

    /// Forget the bearer token, keeping the device id
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.backend.load().await?;
        stored.bearer_token = None;
        self.backend.save(&stored).await
    }

    /// Forget `rejected` after the remote API refused it
    ///
    /// A token stored since the rejected request was signed is kept. Returns
    /// whether anything was cleared.
    pub async fn invalidate(&self, rejected: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.backend.load().await?;
        if stored.bearer_token.as_deref() != Some(rejected) {
            return Ok(false);
        }
        stored.bearer_token = None;
        self.backend.save(&stored).await?;
        Ok(true)
    }

    /// Stored device id, generating and persisting a random v4 UUID on first use
    pub async fn get_or_create_device_id(&self) -> Result<String> {
        if let Some(id) = self.backend.load().await?.device_id {
            return Ok(id);
        }

        let _guard = self.write_lock.lock().await;
        let mut stored = self.backend.load().await?;
        if let Some(id) = stored.device_id {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().to_string();
        stored.device_id = Some(id.clone());
        self.backend.save(&stored).await?;
        tracing::debug!(device_id = %id, "generated device id");
        Ok(id)
    }

    /// Seed the device id (e.g. from `SUNO_DEVICE_ID`), replacing a generated one
    pub async fn set_device_id(&self, device_id: &str) -> Result<()> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(Error::config("device_id", "device id is empty"));
        }
        let _guard = self.write_lock.lock().await;
        let mut stored = self.backend.load().await?;
        stored.device_id = Some(device_id.to_string());
        self.backend.save(&stored).await
    }

    /// Fresh `browser-token` header value, derived from the current time
    pub fn browser_token() -> String {
        browser_token_at(chrono::Utc::now().timestamp_millis())
    }
}

fn normalize_token(token: &str) -> &str {
    let token = token.trim();
    token
        .strip_prefix("Bearer ")
        .or_else(|| token.strip_prefix("bearer "))
        .unwrap_or(token)
        .trim()
}

fn browser_token_at(timestamp_ms: i64) -> String {
    let inner = serde_json::json!({ "timestamp": timestamp_ms }).to_string();
    let encoded = base64::engine::general_purpose::STANDARD.encode(inner);
    serde_json::json!({ "token": encoded }).to_string()
}
