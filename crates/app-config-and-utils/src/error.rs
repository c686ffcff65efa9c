//! Errors raised while loading configuration or resolving paths.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A config value the auth flow cannot work with.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not read or write {what}: {source}")]
    Io {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Malformed `config.json`.
    #[error("Malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path error: {0}")]
    Path(String),
}

impl CoreError {
    pub(crate) fn io(what: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Io { what, source }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
