//! High-level credential API over a [`SecureStorage`] backend.

use crate::{SecureStorage, StorageError, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Seconds before expiry at which a stored session is treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Metadata persisted next to the session tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Identity provider user id
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// When the access token expires. `None` for non-expiring credentials.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Scoped store for the auth subsystem's credentials.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn SecureStorage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Store `value` under `key`, replacing any existing entry.
    pub fn store(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        debug!(key = %key, len = value.len(), "Storing credential entry");
        self.storage.set(key, value)
    }

    /// Retrieve the entry under `key`. An absent entry is `Ok(None)`.
    pub fn retrieve(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.storage.get(key)
    }

    /// Remove the entry under `key`. Removing an absent key succeeds.
    pub fn remove(&self, key: &str) -> StorageResult<()> {
        let existed = self.storage.delete(key)?;
        debug!(key = %key, existed, "Removed credential entry");
        Ok(())
    }

    /// Keys currently stored in the scope.
    pub fn keys(&self) -> StorageResult<Vec<String>> {
        self.storage.list_keys()
    }

    /// Delete every entry in the scope.
    pub fn clear_scope(&self) -> StorageResult<()> {
        self.storage.clear()
    }

    // ==========================================
    // Session
    // ==========================================

    /// Persist a complete session: tokens first, metadata last.
    pub fn set_session(
        &self,
        access_token: &[u8],
        refresh_token: Option<&[u8]>,
        meta: &SessionMeta,
    ) -> StorageResult<()> {
        self.store(StorageKeys::ACCESS_TOKEN, access_token)?;
        match refresh_token {
            Some(token) => self.store(StorageKeys::REFRESH_TOKEN, token)?,
            None => self.remove(StorageKeys::REFRESH_TOKEN)?,
        }
        self.set_session_meta(meta)
    }

    pub fn access_token(&self) -> StorageResult<Option<Vec<u8>>> {
        self.retrieve(StorageKeys::ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> StorageResult<Option<Vec<u8>>> {
        self.retrieve(StorageKeys::REFRESH_TOKEN)
    }

    pub fn set_session_meta(&self, meta: &SessionMeta) -> StorageResult<()> {
        let json = serde_json::to_vec(meta).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.store(StorageKeys::SESSION_META, &json)
    }

    pub fn session_meta(&self) -> StorageResult<Option<SessionMeta>> {
        match self.retrieve(StorageKeys::SESSION_META)? {
            Some(json) => {
                let meta = serde_json::from_slice(&json)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Whether both an access token and its metadata are present.
    pub fn has_session(&self) -> StorageResult<bool> {
        let has_token = self.storage.has(StorageKeys::ACCESS_TOKEN)?;
        let has_meta = self.storage.has(StorageKeys::SESSION_META)?;
        Ok(has_token && has_meta)
    }

    /// Whether the stored session is missing or within a minute of expiry.
    pub fn is_session_expired(&self) -> StorageResult<bool> {
        Ok(match self.session_meta()? {
            Some(SessionMeta {
                expires_at: Some(expires_at),
                ..
            }) => expires_at.signed_duration_since(Utc::now()).num_seconds() < EXPIRY_SKEW_SECS,
            Some(_) => false,
            None => true,
        })
    }
}
