//! Error surface shown to users.

use crate::AuthError;
use serde::Serialize;
use thiserror::Error;

/// Displayable error classification.
///
/// Only the three kinds with their own recovery action keep a dedicated
/// case; everything else is carried as a message.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AppError {
    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("Your session has expired. Please sign in again.")]
    ExpiredToken,

    #[error("Unable to refresh your session. Please sign in again.")]
    RefreshFailed,

    #[error("{0}")]
    Unknown(String),
}

impl AppError {
    /// Suggested next step for the user.
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "Check your credentials and sign in again.",
            AppError::ExpiredToken | AppError::RefreshFailed => "Sign in again to continue.",
            AppError::Unknown(_) => "Please try again.",
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::ExpiredToken => AppError::ExpiredToken,
            AuthError::RefreshFailed => AppError::RefreshFailed,
            other @ (AuthError::ProviderError(_)
            | AuthError::OAuthFailed(_)
            | AuthError::NativeSignInFailed(_)
            | AuthError::InvalidUserId(_)
            | AuthError::SignOutFailed(_)) => AppError::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedicated_cases_survive() {
        assert_eq!(
            AppError::from(AuthError::InvalidCredentials),
            AppError::InvalidCredentials
        );
        assert_eq!(AppError::from(AuthError::ExpiredToken), AppError::ExpiredToken);
        assert_eq!(AppError::from(AuthError::RefreshFailed), AppError::RefreshFailed);
    }

    #[test]
    fn test_other_kinds_collapse_with_message() {
        let cases = [
            AuthError::ProviderError("HTTP 503".into()),
            AuthError::OAuthFailed("access_denied".into()),
            AuthError::NativeSignInFailed("no account".into()),
            AuthError::SignOutFailed("locked".into()),
        ];
        for err in cases {
            let message = err.to_string();
            assert_eq!(AppError::from(err), AppError::Unknown(message));
        }
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let json = serde_json::to_value(AppError::Unknown("boom".into())).unwrap();
        assert_eq!(json["kind"], "unknown");
        assert_eq!(json["message"], "boom");

        let json = serde_json::to_value(AppError::ExpiredToken).unwrap();
        assert_eq!(json["kind"], "expired_token");
    }
}
