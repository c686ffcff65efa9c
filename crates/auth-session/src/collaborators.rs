//! Interfaces the session subsystem consumes.

use crate::{AuthResult, DisplayRecord, Session};
use async_trait::async_trait;
use url::Url;

/// Identity provider access.
#[async_trait]
pub trait IdentityProviderClient: Send + Sync {
    /// The persisted session, if any.
    async fn current_session(&self) -> AuthResult<Option<Session>>;

    /// Whether the persisted session is still accepted by the provider.
    async fn validate_session(&self) -> AuthResult<bool>;

    /// Exchange a successful OAuth callback for a session and persist it.
    async fn complete_authorization(&self, callback_url: &Url) -> AuthResult<Session>;
}

/// Local profile cache.
#[async_trait]
pub trait UserDisplayRepository: Send + Sync {
    async fn first_user_display_data(&self) -> AuthResult<Option<DisplayRecord>>;
}

/// How the sign-in surface should be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationOptions {
    /// Custom scheme that ends the session when navigated to.
    pub callback_scheme: String,
    /// `false` shares cookies with the system browser so existing SSO
    /// sessions are reused.
    pub prefers_ephemeral_session: bool,
}

impl PresentationOptions {
    pub fn shared_session(callback_scheme: impl Into<String>) -> Self {
        Self {
            callback_scheme: callback_scheme.into(),
            prefers_ephemeral_session: false,
        }
    }
}

/// How a presented surface ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOutcome {
    Callback(Url),
    Cancelled,
    LaunchFailed(String),
}

/// A browser or web-auth sheet that can show the authorization page.
#[async_trait]
pub trait ExternalAuthSurface: Send + Sync {
    /// Show `url` and complete once the surface ends.
    async fn present(&self, url: &Url, options: &PresentationOptions) -> SurfaceOutcome;
}
