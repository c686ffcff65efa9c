//! OAuth callback URL validation.

use url::Url;

/// Host every callback URL must carry.
pub const CALLBACK_HOST: &str = "auth";

/// Path every callback URL must carry.
pub const CALLBACK_PATH: &str = "/callback";

/// Outcome of one OAuth attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    Success(Url),
    Error(String),
}

impl CallbackResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CallbackResult::Success(_))
    }
}

/// Validate a callback URL delivered on `scheme`.
///
/// Returns `None` when the URL is not on `scheme` at all, so another handler
/// may claim it. Host and path mismatches, and an explicit `error` query
/// parameter, are reported as [`CallbackResult::Error`].
pub fn parse_callback(url: &Url, scheme: &str) -> Option<CallbackResult> {
    if !url.scheme().eq_ignore_ascii_case(scheme) {
        return None;
    }

    if url.host_str() != Some(CALLBACK_HOST) {
        return Some(CallbackResult::Error("Invalid OAuth callback URL".to_string()));
    }

    if url.path() != CALLBACK_PATH {
        return Some(CallbackResult::Error(
            "Invalid OAuth callback path".to_string(),
        ));
    }

    if let Some((_, message)) = url.query_pairs().find(|(name, _)| name == "error") {
        return Some(CallbackResult::Error(message.into_owned()));
    }

    Some(CallbackResult::Success(url.clone()))
}

/// [`parse_callback`] over a raw string. Unparseable input is not ours.
pub fn parse_callback_str(raw: &str, scheme: &str) -> Option<CallbackResult> {
    Url::parse(raw.trim())
        .ok()
        .and_then(|url| parse_callback(&url, scheme))
}
