//! Storage trait definitions.

use crate::StorageResult;

/// A scoped, byte-valued secure key-value store.
///
/// Implementations are bound to one storage scope at construction; keys are
/// unique within it.
pub trait SecureStorage: Send + Sync {
    /// Store a value, replacing any existing entry under `key`.
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Retrieve a value. Absent entries are `Ok(None)`, not an error.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Delete a value. Returns whether an entry existed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// List every key stored under this scope.
    fn list_keys(&self) -> StorageResult<Vec<String>>;

    /// Delete every entry under this scope.
    ///
    /// Attempts every key even after a failure and reports the first error.
    fn clear(&self) -> StorageResult<()> {
        let mut first_error = None;
        for key in self.list_keys()? {
            if let Err(e) = self.delete(&key) {
                tracing::warn!(key = %key, error = %e, "Failed to delete entry while clearing scope");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
