//! Local profile cache.
//!
//! A JSON array of display records at `Paths::user_cache_file()`. The first
//! record is the profile restoration checks against.

use async_trait::async_trait;
use auth_session::{AuthError, AuthResult, DisplayRecord, UserDisplayRepository};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

pub struct UserCache {
    path: PathBuf,
}

impl UserCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// All cached records, most recent first.
    pub async fn load(&self) -> AuthResult<Vec<DisplayRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(cache_error),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(cache_error(e)),
        }
    }

    /// Put `record` first, replacing any record with the same id.
    pub async fn save(&self, record: DisplayRecord) -> AuthResult<()> {
        let mut records = self.load().await?;
        records.retain(|existing| existing.id != record.id);
        records.insert(0, record);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(cache_error)?;
        }
        let content = serde_json::to_string_pretty(&records).map_err(cache_error)?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(cache_error)?;
        debug!(records = records.len(), "Saved user cache");
        Ok(())
    }
}

#[async_trait]
impl UserDisplayRepository for UserCache {
    async fn first_user_display_data(&self) -> AuthResult<Option<DisplayRecord>> {
        Ok(self.load().await?.into_iter().next())
    }
}

fn cache_error(e: impl std::fmt::Display) -> AuthError {
    AuthError::ProviderError(format!("user cache: {}", e))
}
