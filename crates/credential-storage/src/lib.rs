//! Secure credential storage.
//!
//! Every entry lives under one storage scope so a sign-out can delete the
//! whole set without keeping a key inventory anywhere else.
//!
//! Platform backends:
//! - **macOS**: Keychain via `security-framework` (readable only while unlocked, this device only)
//! - **Linux**: Secret Service (GNOME Keyring / KWallet) via `secret-service`
//! - **Windows**: Credential Vault via `windows` crate
//!
//! [`MemoryStorage`] backs tests and hosts without a keystore.

mod keys;
mod memory;
mod store;
mod traits;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "windows")]
mod windows;

pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use store::{CredentialStore, SessionMeta};
pub use traits::SecureStorage;

use std::sync::Arc;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Writing an entry failed.
    #[error("Failed to save {key}: {reason}")]
    SaveFailed { key: String, reason: String },

    /// Deleting an entry failed.
    #[error("Failed to delete {key}: {reason}")]
    DeleteFailed { key: String, reason: String },

    /// Reading an entry failed (distinct from the entry being absent).
    #[error("Failed to read {key}: {reason}")]
    ReadFailed { key: String, reason: String },

    /// Backend unavailable or misconfigured.
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl StorageError {
    /// Whether the caller may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::SaveFailed { .. }
                | StorageError::DeleteFailed { .. }
                | StorageError::ReadFailed { .. }
        )
    }

    pub(crate) fn save(key: &str, reason: impl ToString) -> Self {
        StorageError::SaveFailed {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn delete(key: &str, reason: impl ToString) -> Self {
        StorageError::DeleteFailed {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn read(key: &str, reason: impl ToString) -> Self {
        StorageError::ReadFailed {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default platform-specific storage for a scope.
pub fn create_storage(scope: &str) -> StorageResult<Arc<dyn SecureStorage>> {
    #[cfg(target_os = "macos")]
    {
        let storage = macos::KeychainStorage::new(scope)?;
        Ok(Arc::new(storage))
    }

    #[cfg(target_os = "linux")]
    {
        let storage = linux::SecretServiceStorage::new(scope)?;
        Ok(Arc::new(storage))
    }

    #[cfg(target_os = "windows")]
    {
        let storage = windows::CredentialStorage::new(scope)?;
        Ok(Arc::new(storage))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        let _ = scope;
        Err(StorageError::Platform(
            "No secure storage implementation available for this platform".to_string(),
        ))
    }
}

/// Create a [`CredentialStore`] over the default platform storage.
pub fn create_credential_store(scope: &str) -> StorageResult<CredentialStore> {
    Ok(CredentialStore::new(create_storage(scope)?))
}
