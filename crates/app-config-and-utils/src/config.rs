//! Configuration for the auth subsystem host.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default identity provider URL (can be overridden at compile time via AI4SCIENCE_IDP_URL).
pub const DEFAULT_IDENTITY_PROVIDER_URL: &str = match option_env!("AI4SCIENCE_IDP_URL") {
    Some(url) => url,
    None => "https://auth.ai4science.org",
};

/// Default identity provider publishable key (compile time via AI4SCIENCE_IDP_PUBLISHABLE_KEY).
pub const DEFAULT_IDENTITY_PROVIDER_PUBLISHABLE_KEY: &str =
    match option_env!("AI4SCIENCE_IDP_PUBLISHABLE_KEY") {
        Some(key) => key,
        None => "public-anon-key",
    };

/// Custom URL scheme the OAuth callback is delivered on. Registered with
/// the OS, so it is not configurable.
pub const CALLBACK_SCHEME: &str = "ai4science";

/// Storage scope shared by every credential entry this subsystem writes.
pub const DEFAULT_CREDENTIAL_SCOPE: &str = "org.ai4science.auth";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVEL_ENV: &str = "AI4SCIENCE_LOG_LEVEL";
const IDP_URL_ENV: &str = "AI4SCIENCE_IDP_URL";

/// Host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Identity provider base URL.
    #[serde(default = "default_identity_provider_url")]
    pub identity_provider_url: String,
    /// Identity provider publishable API key (public, safe to expose).
    #[serde(default = "default_identity_provider_publishable_key")]
    pub identity_provider_publishable_key: String,
    /// Authorization endpoint opened in the browser. Derived from the
    /// provider URL when absent.
    #[serde(default)]
    pub authorization_url: Option<String>,
    /// Secure storage scope.
    #[serde(default = "default_credential_scope")]
    pub credential_scope: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_identity_provider_url() -> String {
    DEFAULT_IDENTITY_PROVIDER_URL.to_string()
}

fn default_identity_provider_publishable_key() -> String {
    DEFAULT_IDENTITY_PROVIDER_PUBLISHABLE_KEY.to_string()
}

fn default_credential_scope() -> String {
    DEFAULT_CREDENTIAL_SCOPE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            identity_provider_url: default_identity_provider_url(),
            identity_provider_publishable_key: default_identity_provider_publishable_key(),
            authorization_url: None,
            credential_scope: default_credential_scope(),
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(CoreError::io("config file"))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content).map_err(CoreError::io("config file"))?;
        Ok(())
    }

    /// Override fields from environment variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(LOG_LEVEL_ENV).and_then(non_empty) {
            self.log_level = level;
        }
        if let Some(url) = lookup(IDP_URL_ENV).and_then(non_empty) {
            self.identity_provider_url = url;
        }
    }

    /// Reject configurations the auth flow cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        self.identity_provider_url()?;
        self.authorization_url()?;

        if self.credential_scope.trim().is_empty() {
            return Err(CoreError::Config("Credential scope must not be empty".into()));
        }

        Ok(())
    }

    /// The identity provider URL, parsed.
    pub fn identity_provider_url(&self) -> CoreResult<Url> {
        Url::parse(&self.identity_provider_url).map_err(CoreError::from)
    }

    /// The authorization URL opened in the browser.
    ///
    /// Falls back to `{provider}/auth/v1/authorize?redirect_to=ai4science://auth/callback`.
    pub fn authorization_url(&self) -> CoreResult<Url> {
        if let Some(explicit) = &self.authorization_url {
            return Url::parse(explicit).map_err(CoreError::from);
        }

        let mut url = self.identity_provider_url()?.join("auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("redirect_to", &self.callback_url());
        Ok(url)
    }

    /// The callback URL the provider redirects to.
    pub fn callback_url(&self) -> String {
        format!("{}://auth/callback", CALLBACK_SCHEME)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
