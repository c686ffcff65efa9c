//! Windows Credential Vault implementation.

use crate::{SecureStorage, StorageError, StorageResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::debug;
use windows::{
    core::HSTRING,
    Security::Credentials::{PasswordCredential, PasswordVault},
};

/// ERROR_NOT_FOUND as an HRESULT.
const NOT_FOUND: u32 = 0x8007_0490;

fn is_not_found(e: &windows::core::Error) -> bool {
    e.code().0 as u32 == NOT_FOUND
}

/// Credential Vault based secure storage for Windows.
///
/// The vault only holds string passwords, so values are stored base64
/// encoded with `resource = scope` and `user name = key`.
pub struct CredentialStorage {
    resource_name: String,
}

impl CredentialStorage {
    pub fn new(service_name: &str) -> StorageResult<Self> {
        PasswordVault::new().map_err(|e| {
            StorageError::Platform(format!("Failed to access Credential Vault: {}", e))
        })?;

        Ok(Self {
            resource_name: service_name.to_string(),
        })
    }

    fn get_vault(&self) -> StorageResult<PasswordVault> {
        PasswordVault::new().map_err(|e| {
            StorageError::Platform(format!("Failed to access Credential Vault: {}", e))
        })
    }

    fn retrieve(&self, vault: &PasswordVault, key: &str) -> windows::core::Result<PasswordCredential> {
        vault.Retrieve(&HSTRING::from(&self.resource_name), &HSTRING::from(key))
    }
}

impl SecureStorage for CredentialStorage {
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        debug!(resource = %self.resource_name, key = %key, "Setting credential");

        let vault = self.get_vault()?;
        let credential = PasswordCredential::CreatePasswordCredential(
            &HSTRING::from(&self.resource_name),
            &HSTRING::from(key),
            &HSTRING::from(BASE64.encode(value)),
        )
        .map_err(|e| StorageError::save(key, e))?;

        // Add replaces an existing credential with the same resource and user name.
        vault.Add(&credential).map_err(|e| StorageError::save(key, e))
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        debug!(resource = %self.resource_name, key = %key, "Getting credential");

        let vault = self.get_vault()?;
        let credential = match self.retrieve(&vault, key) {
            Ok(credential) => credential,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(StorageError::read(key, e)),
        };

        // Password is only populated after RetrievePassword
        credential
            .RetrievePassword()
            .map_err(|e| StorageError::read(key, e))?;
        let password = credential
            .Password()
            .map_err(|e| StorageError::read(key, e))?;

        BASE64
            .decode(password.to_string())
            .map(Some)
            .map_err(|e| StorageError::Encoding(e.to_string()))
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(resource = %self.resource_name, key = %key, "Deleting credential");

        let vault = self.get_vault()?;
        match self.retrieve(&vault, key) {
            Ok(credential) => {
                vault
                    .Remove(&credential)
                    .map_err(|e| StorageError::delete(key, e))?;
                Ok(true)
            }
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(StorageError::delete(key, e)),
        }
    }

    fn list_keys(&self) -> StorageResult<Vec<String>> {
        let vault = self.get_vault()?;
        let credentials = match vault.FindAllByResource(&HSTRING::from(&self.resource_name)) {
            Ok(credentials) => credentials,
            Err(e) if is_not_found(&e) => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Platform(format!(
                    "Failed to enumerate credentials: {}",
                    e
                )))
            }
        };

        let mut keys = Vec::new();
        for credential in credentials {
            let user_name = credential
                .UserName()
                .map_err(|e| StorageError::Platform(e.to_string()))?;
            keys.push(user_name.to_string());
        }
        Ok(keys)
    }
}
