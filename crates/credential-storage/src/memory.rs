//! In-memory storage.

use crate::{SecureStorage, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Process-local storage with the same contract as the platform backends.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

impl SecureStorage for MemoryStorage {
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.data.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }

    fn list_keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.data.lock().keys().cloned().collect())
    }

    fn clear(&self) -> StorageResult<()> {
        self.data.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let storage = MemoryStorage::new();
        storage.set("k", b"v1").unwrap();
        assert_eq!(storage.get("k").unwrap(), Some(b"v1".to_vec()));

        storage.set("k", b"v2").unwrap();
        assert_eq!(storage.get("k").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(storage.len(), 1);

        assert!(storage.delete("k").unwrap());
        assert!(!storage.delete("k").unwrap());
        assert_eq!(storage.get("k").unwrap(), None);
    }

    #[test]
    fn test_clear_removes_everything() {
        let storage = MemoryStorage::new();
        storage.set("a", b"1").unwrap();
        storage.set("b", b"2").unwrap();
        storage.clear().unwrap();
        assert!(storage.is_empty());
        assert!(storage.list_keys().unwrap().is_empty());
    }
}
