//! Configuration, paths and logging for the AI4Science auth workspace.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, CALLBACK_SCHEME, DEFAULT_CREDENTIAL_SCOPE, DEFAULT_IDENTITY_PROVIDER_URL,
    DEFAULT_LOG_LEVEL,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
