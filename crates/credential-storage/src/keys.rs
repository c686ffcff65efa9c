//! Storage key constants.

/// Keys the auth subsystem writes under its storage scope.
pub struct StorageKeys;

impl StorageKeys {
    /// Identity provider access token
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Identity provider refresh token
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// Session metadata (JSON)
    pub const SESSION_META: &'static str = "session_meta";

    /// PKCE code verifier for the sign-in in progress
    pub const PKCE_VERIFIER: &'static str = "pkce_code_verifier";
}
