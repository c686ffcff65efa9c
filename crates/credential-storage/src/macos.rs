//! macOS Keychain implementation.

use crate::{SecureStorage, StorageError, StorageResult};
use core_foundation::data::CFData;
use security_framework::access_control::{ProtectionMode, SecAccessControl};
use security_framework::item::{
    ItemAddOptions, ItemAddValue, ItemClass, ItemSearchOptions, Limit, SearchResult,
};
use security_framework::passwords::{
    delete_generic_password, set_generic_password_options, PasswordOptions,
};
use tracing::{debug, warn};

const ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;

/// Keychain-based secure storage for macOS.
///
/// Items are generic passwords with `service = scope` and `account = key`,
/// readable only while the device is unlocked and never migrated to
/// another device.
pub struct KeychainStorage {
    service_name: String,
}

impl KeychainStorage {
    pub fn new(service_name: &str) -> StorageResult<Self> {
        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    fn access_control() -> StorageResult<SecAccessControl> {
        SecAccessControl::create_with_protection(
            Some(ProtectionMode::AccessibleWhenUnlockedThisDeviceOnly),
            0,
        )
        .map_err(|e| StorageError::Platform(format!("Failed to build access control: {}", e)))
    }

    fn add_item(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut options = ItemAddOptions::new(ItemAddValue::Data {
            class: ItemClass::generic_password(),
            data: CFData::from_buffer(value),
        });
        options
            .set_service(&self.service_name)
            .set_account_name(key)
            .set_label(format!("{}/{}", self.service_name, key))
            .set_access_control(Self::access_control()?);
        options.add().map_err(|e| StorageError::save(key, e))
    }
}

fn is_not_found(e: &security_framework::base::Error) -> bool {
    e.code() == ERR_SEC_ITEM_NOT_FOUND
}

impl SecureStorage for KeychainStorage {
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        debug!(service = %self.service_name, key = %key, "Setting keychain item");

        // Adds the item, or updates it in place when it already exists.
        let mut options = PasswordOptions::new_generic_password(&self.service_name, key);
        options.set_access_control(Self::access_control()?);
        let in_place = match set_generic_password_options(value, options) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        warn!(key = %key, error = %in_place, "Keychain update failed, replacing item");

        match delete_generic_password(&self.service_name, key) {
            Ok(()) => {}
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(StorageError::save(key, e)),
        }

        self.add_item(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        debug!(service = %self.service_name, key = %key, "Getting keychain item");

        let mut search = ItemSearchOptions::new();
        search
            .class(ItemClass::generic_password())
            .service(&self.service_name)
            .account(key)
            .limit(Limit::Max(1))
            .load_data(true);

        match search.search() {
            Ok(results) => match results.into_iter().next() {
                Some(SearchResult::Data(data)) => Ok(Some(data)),
                _ => Ok(None),
            },
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(StorageError::read(key, e)),
        }
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service_name, key = %key, "Deleting keychain item");

        match delete_generic_password(&self.service_name, key) {
            Ok(()) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(StorageError::delete(key, e)),
        }
    }

    fn list_keys(&self) -> StorageResult<Vec<String>> {
        let mut search = ItemSearchOptions::new();
        search
            .class(ItemClass::generic_password())
            .service(&self.service_name)
            .load_attributes(true)
            .limit(Limit::All);

        let results = match search.search() {
            Ok(results) => results,
            Err(e) if is_not_found(&e) => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Platform(format!(
                    "Failed to list keychain items: {}",
                    e
                )))
            }
        };

        Ok(results
            .iter()
            .filter_map(SearchResult::simplify_dict)
            .filter_map(|attrs| attrs.get("acct").cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SERVICE: &str = "org.ai4science.auth.test";

    #[test]
    #[ignore] // Requires macOS Keychain access
    fn test_keychain_operations() {
        let storage = KeychainStorage::new(TEST_SERVICE).unwrap();
        let _ = storage.clear();

        storage.set("test_key", b"test_value").unwrap();
        assert_eq!(storage.get("test_key").unwrap(), Some(b"test_value".to_vec()));

        storage.set("test_key", b"new_value").unwrap();
        assert_eq!(storage.get("test_key").unwrap(), Some(b"new_value".to_vec()));

        assert_eq!(storage.list_keys().unwrap(), vec!["test_key".to_string()]);

        assert!(storage.delete("test_key").unwrap());
        assert!(!storage.delete("test_key").unwrap());
        assert_eq!(storage.get("test_key").unwrap(), None);
    }

    #[test]
    #[ignore] // Requires macOS Keychain access
    fn test_overwrite_updates_in_place() {
        let storage = KeychainStorage::new("org.ai4science.auth.test.overwrite").unwrap();
        let _ = storage.clear();

        storage.set("token", b"first").unwrap();
        storage.set("token", b"second").unwrap();

        assert_eq!(storage.get("token").unwrap(), Some(b"second".to_vec()));
        assert_eq!(storage.list_keys().unwrap(), vec!["token".to_string()]);
        storage.clear().unwrap();
    }
}
