//! Authentication error types.

use credential_storage::StorageError;
use thiserror::Error;

/// Authentication error type.
///
/// This set is closed: provider, transport and storage failures are mapped
/// into one of these kinds before they leave the crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Credentials were rejected by the identity provider
    #[error("Invalid email or password.")]
    InvalidCredentials,

    /// The stored session has expired
    #[error("Your session has expired. Please sign in again.")]
    ExpiredToken,

    /// The session could not be renewed
    #[error("Unable to refresh your session. Please sign in again.")]
    RefreshFailed,

    /// Identity provider or transport failure
    #[error("Authentication service error: {0}")]
    ProviderError(String),

    /// Browser-based sign-in failed
    #[error("OAuth sign-in failed: {0}")]
    OAuthFailed(String),

    /// Platform-native sign-in failed
    #[error("Sign-in failed: {0}")]
    NativeSignInFailed(String),

    /// A user id that is not a valid UUID
    #[error("Invalid user ID: {0}")]
    InvalidUserId(String),

    /// Sign-out could not clear stored credentials
    #[error("Sign out failed: {0}")]
    SignOutFailed(String),
}

impl AuthError {
    /// Returns true if the user has to sign in again to recover.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials | AuthError::ExpiredToken | AuthError::RefreshFailed
        )
    }
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        AuthError::ProviderError(e.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::ProviderError(e.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

/// Ways an OAuth flow can end without a callback result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// The user dismissed the sign-in surface
    #[error("Sign-in was cancelled")]
    Cancelled,

    /// Another flow is still pending
    #[error("A sign-in flow is already in progress")]
    AlreadyInProgress,

    /// The sign-in surface could not be opened
    #[error("Failed to open the sign-in page: {0}")]
    LaunchFailed(String),

    /// The flow ended without delivering a callback for this handler
    #[error("Sign-in ended without a result")]
    Abandoned,
}

impl FlowError {
    /// Intentional cancellation, which callers should not report as a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FlowError::Cancelled)
    }
}

impl From<FlowError> for AuthError {
    fn from(e: FlowError) -> Self {
        AuthError::OAuthFailed(e.to_string())
    }
}
