//! Linux Secret Service implementation.

use crate::{SecureStorage, StorageError, StorageResult};
use secret_service::{blocking::SecretService, EncryptionType};
use std::collections::HashMap;
use tracing::debug;

/// Secret Service based secure storage for Linux.
///
/// Items carry `service = scope` and `key = key` attributes in the default
/// collection.
pub struct SecretServiceStorage {
    service_name: String,
}

impl SecretServiceStorage {
    pub fn new(service_name: &str) -> StorageResult<Self> {
        SecretService::connect(EncryptionType::Dh).map_err(|e| {
            StorageError::Platform(format!("Failed to connect to Secret Service: {}", e))
        })?;

        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    fn with_collection<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&secret_service::blocking::Collection) -> StorageResult<T>,
    {
        let ss = SecretService::connect(EncryptionType::Dh)
            .map_err(|e| StorageError::Platform(e.to_string()))?;

        let collection = ss
            .get_default_collection()
            .map_err(|e| StorageError::Platform(e.to_string()))?;

        if collection.is_locked().unwrap_or(false) {
            collection.unlock().map_err(|e| {
                StorageError::Platform(format!("Failed to unlock collection: {}", e))
            })?;
        }

        f(&collection)
    }

    fn scope_attributes(&self) -> HashMap<&str, &str> {
        HashMap::from([("service", self.service_name.as_str())])
    }

    fn build_attributes<'a>(&'a self, key: &'a str) -> HashMap<&'a str, &'a str> {
        let mut attrs = self.scope_attributes();
        attrs.insert("key", key);
        attrs
    }
}

impl SecureStorage for SecretServiceStorage {
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        debug!(service = %self.service_name, key = %key, "Setting secret");

        self.with_collection(|collection| {
            let label = format!("{}/{}", self.service_name, key);
            collection
                .create_item(
                    &label,
                    self.build_attributes(key),
                    value,
                    true, // replace
                    "application/octet-stream",
                )
                .map_err(|e| StorageError::save(key, e))?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        debug!(service = %self.service_name, key = %key, "Getting secret");

        self.with_collection(|collection| {
            let items = collection
                .search_items(self.build_attributes(key))
                .map_err(|e| StorageError::read(key, e))?;

            match items.first() {
                Some(item) => item
                    .get_secret()
                    .map(Some)
                    .map_err(|e| StorageError::read(key, e)),
                None => Ok(None),
            }
        })
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service_name, key = %key, "Deleting secret");

        self.with_collection(|collection| {
            let items = collection
                .search_items(self.build_attributes(key))
                .map_err(|e| StorageError::delete(key, e))?;

            if items.is_empty() {
                return Ok(false);
            }

            for item in &items {
                item.delete().map_err(|e| StorageError::delete(key, e))?;
            }
            Ok(true)
        })
    }

    fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.with_collection(|collection| {
            let items = collection
                .search_items(self.scope_attributes())
                .map_err(|e| StorageError::Platform(e.to_string()))?;

            let mut keys = Vec::with_capacity(items.len());
            for item in &items {
                let attrs = item
                    .get_attributes()
                    .map_err(|e| StorageError::Platform(e.to_string()))?;
                if let Some(key) = attrs.get("key") {
                    keys.push(key.clone());
                }
            }
            keys.sort();
            keys.dedup();
            Ok(keys)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SERVICE: &str = "org.ai4science.auth.test";

    #[test]
    #[ignore] // Requires Linux Secret Service (D-Bus)
    fn test_secret_service_operations() {
        let storage = SecretServiceStorage::new(TEST_SERVICE).unwrap();
        let _ = storage.clear();

        storage.set("test_key", &[0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert_eq!(
            storage.get("test_key").unwrap(),
            Some(vec![0xde, 0xad, 0xbe, 0xef])
        );

        storage.set("test_key", b"new_value").unwrap();
        assert_eq!(storage.get("test_key").unwrap(), Some(b"new_value".to_vec()));
        assert_eq!(storage.list_keys().unwrap(), vec!["test_key".to_string()]);

        storage.clear().unwrap();
        assert_eq!(storage.get("test_key").unwrap(), None);
        assert!(!storage.delete("test_key").unwrap());
    }
}
