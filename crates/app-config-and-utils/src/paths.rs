//! File system paths.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

const BASE_DIR_NAME: &str = ".ai4science";

/// Manages file system paths for the host.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.ai4science)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.ai4science`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.ai4science).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.ai4science/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the logs directory (~/.ai4science/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the central log file (~/.ai4science/logs/dev.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("dev.jsonl")
    }

    /// Get the cached user display records (~/.ai4science/users.json).
    pub fn user_cache_file(&self) -> PathBuf {
        self.base_dir.join("users.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir).map_err(CoreError::io("base directory"))?;
        std::fs::create_dir_all(self.logs_dir()).map_err(CoreError::io("logs directory"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-ai4science");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.logs_dir(), base.join("logs"));
        assert_eq!(paths.log_file(), base.join("logs/dev.jsonl"));
        assert_eq!(paths.user_cache_file(), base.join("users.json"));
    }

    #[test]
    fn test_paths_default() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();

        assert_eq!(paths.base_dir(), &home.join(".ai4science"));
    }

    #[test]
    fn test_ensure_dirs_creates_directories() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("ai4science");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(base.is_dir());
        assert!(paths.logs_dir().is_dir());
    }
}
