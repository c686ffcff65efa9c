//! HTTP identity provider client.
//!
//! Talks to a Supabase-style auth API. The session itself lives in the
//! [`CredentialStore`]; this client only reads it back, checks it against
//! `GET /auth/v1/user` and writes new sessions from OAuth callbacks.
//!
//! Callbacks carry either tokens (implicit grant) or an authorization
//! `code`, which is exchanged at `POST /auth/v1/token?grant_type=pkce`
//! with the verifier recorded by [`HttpIdentityProviderClient::authorization_url_with_pkce`].

use crate::collaborators::IdentityProviderClient;
use crate::pkce::{PkcePair, CHALLENGE_METHOD};
use crate::{AuthError, AuthResult, DisplayRecord, Session};
use app_config_and_utils::Config;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use credential_storage::{CredentialStore, SessionMeta, StorageKeys};
use reqwest::StatusCode;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const USER_ENDPOINT: &str = "auth/v1/user";
const TOKEN_ENDPOINT: &str = "auth/v1/token";

const DEFAULT_ROLE: &str = "member";

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    lab_affiliation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<UserResponse>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// Tokens from a callback or a code exchange, before they are stored.
struct TokenGrant {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    user: Option<(String, Option<String>)>,
}

impl From<TokenResponse> for TokenGrant {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: expiry_from(response.expires_in, response.expires_at),
            user: response.user.map(|u| (u.id, u.email)),
        }
    }
}

impl From<UserResponse> for DisplayRecord {
    fn from(user: UserResponse) -> Self {
        let metadata = user.user_metadata;
        let (first_name, last_name) = match (metadata.first_name, metadata.last_name) {
            (Some(first), Some(last)) => (first, last),
            (first, last) => {
                let full_name = metadata.full_name.unwrap_or_default();
                let mut parts = full_name.splitn(2, ' ');
                let first_from_full = parts.next().unwrap_or_default().to_string();
                let last_from_full = parts.next().unwrap_or_default().trim().to_string();
                (
                    first.unwrap_or(first_from_full),
                    last.unwrap_or(last_from_full),
                )
            }
        };

        DisplayRecord {
            id: user.id,
            first_name,
            last_name,
            email: user.email.unwrap_or_default(),
            role: metadata.role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            lab_affiliation: metadata.lab_affiliation,
        }
    }
}

/// Identity provider client over HTTP.
#[derive(Clone)]
pub struct HttpIdentityProviderClient {
    http_client: reqwest::Client,
    api_url: Url,
    publishable_key: String,
    credentials: CredentialStore,
    /// Verifier of the sign-in started by this client, if any.
    pending_verifier: Arc<Mutex<Option<String>>>,
}

impl HttpIdentityProviderClient {
    pub fn new(api_url: Url, publishable_key: impl Into<String>, credentials: CredentialStore) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url,
            publishable_key: publishable_key.into(),
            credentials,
            pending_verifier: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(config: &Config, credentials: CredentialStore) -> AuthResult<Self> {
        let api_url = config
            .identity_provider_url()
            .map_err(|e| AuthError::ProviderError(e.to_string()))?;
        Ok(Self::new(
            api_url,
            config.identity_provider_publishable_key.clone(),
            credentials,
        ))
    }

    /// Add a PKCE challenge to `authorization_url`.
    ///
    /// The verifier is kept in memory and in the credential store, so a
    /// callback handled by another process can still be exchanged.
    pub fn authorization_url_with_pkce(&self, authorization_url: &Url) -> AuthResult<Url> {
        let pair = PkcePair::generate();
        self.credentials
            .store(StorageKeys::PKCE_VERIFIER, pair.verifier.as_bytes())?;
        *self.pending_verifier.lock() = Some(pair.verifier);

        let mut url = authorization_url.clone();
        url.query_pairs_mut()
            .append_pair("code_challenge", &pair.challenge)
            .append_pair("code_challenge_method", CHALLENGE_METHOD);
        Ok(url)
    }

    /// Profile of the signed-in user as the provider knows it.
    pub async fn fetch_profile(&self) -> AuthResult<DisplayRecord> {
        let session = self
            .current_session()
            .await?
            .ok_or_else(|| AuthError::ProviderError("No stored session".to_string()))?;
        let token = access_token_str(&session)?;
        self.fetch_user(token)
            .await?
            .map(DisplayRecord::from)
            .ok_or(AuthError::ExpiredToken)
    }

    fn take_verifier(&self) -> AuthResult<String> {
        let stored = self.credentials.retrieve(StorageKeys::PKCE_VERIFIER)?;
        self.credentials.remove(StorageKeys::PKCE_VERIFIER)?;
        if let Some(verifier) = self.pending_verifier.lock().take() {
            return Ok(verifier);
        }
        stored
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| {
                AuthError::OAuthFailed("No sign-in in progress for this authorization code".to_string())
            })
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<TokenGrant> {
        let code_verifier = self.take_verifier()?;
        let mut url = self
            .api_url
            .join(TOKEN_ENDPOINT)
            .map_err(|e| AuthError::ProviderError(e.to_string()))?;
        url.query_pairs_mut().append_pair("grant_type", "pkce");

        debug!(url = %url, "Exchanging authorization code");

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.publishable_key)
            .json(&serde_json::json!({
                "auth_code": code,
                "code_verifier": code_verifier,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let body: TokenErrorResponse = response.json().await.unwrap_or_default();
            let reason = body.error_description.or(body.msg).unwrap_or_default();
            warn!(status = %status, reason = %reason, "Authorization code rejected");
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            warn!(status = %status, "Authorization code exchange failed");
            return Err(AuthError::ProviderError(format!("HTTP {}", status)));
        }

        let tokens: TokenResponse = response.json().await?;
        Ok(tokens.into())
    }

    /// `Ok(None)` when the provider rejects the token.
    async fn fetch_user(&self, access_token: &str) -> AuthResult<Option<UserResponse>> {
        let url = self
            .api_url
            .join(USER_ENDPOINT)
            .map_err(|e| AuthError::ProviderError(e.to_string()))?;

        debug!(url = %url, "Fetching user from identity provider");

        let response = self
            .http_client
            .get(url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            warn!(status = %status, "Identity provider rejected the session");
            return Ok(None);
        }
        if !status.is_success() {
            warn!(status = %status, "Identity provider request failed");
            return Err(AuthError::ProviderError(format!("HTTP {}", status)));
        }

        Ok(Some(response.json().await?))
    }
}

#[async_trait]
impl IdentityProviderClient for HttpIdentityProviderClient {
    async fn current_session(&self) -> AuthResult<Option<Session>> {
        let Some(access_token) = self.credentials.access_token()? else {
            return Ok(None);
        };
        let Some(meta) = self.credentials.session_meta()? else {
            debug!("Access token stored without session metadata");
            return Ok(None);
        };

        Ok(Some(Session {
            user_id: meta.user_id,
            issued_credential: access_token,
            expiry: meta.expires_at,
        }))
    }

    async fn validate_session(&self) -> AuthResult<bool> {
        let Some(session) = self.current_session().await? else {
            return Ok(false);
        };
        if self.credentials.is_session_expired()? {
            return Err(AuthError::ExpiredToken);
        }

        match self.fetch_user(access_token_str(&session)?).await? {
            Some(user) if user.id == session.user_id => Ok(true),
            Some(user) => {
                warn!(
                    stored_user_id = %session.user_id,
                    provider_user_id = %user.id,
                    "Stored session belongs to a different user"
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn complete_authorization(&self, callback_url: &Url) -> AuthResult<Session> {
        let params = callback_params(callback_url);

        if let Some(error) = params.get("error") {
            let message = params.get("error_description").unwrap_or(error);
            return Err(AuthError::OAuthFailed(message.clone()));
        }

        let grant = match (non_empty(&params, "access_token"), non_empty(&params, "code")) {
            (Some(access_token), _) => TokenGrant {
                access_token: access_token.to_string(),
                refresh_token: params.get("refresh_token").cloned(),
                expires_at: expiry_from(
                    parse_i64(&params, "expires_in"),
                    parse_i64(&params, "expires_at"),
                ),
                user: params
                    .get("user_id")
                    .map(|id| (id.clone(), params.get("email").cloned())),
            },
            (None, Some(code)) => self.exchange_code(code).await?,
            (None, None) => {
                return Err(AuthError::OAuthFailed(
                    "Callback did not include an access token or authorization code".to_string(),
                ))
            }
        };

        let (user_id, email) = match grant.user {
            Some(user) => user,
            None => {
                let user = self
                    .fetch_user(&grant.access_token)
                    .await?
                    .ok_or(AuthError::InvalidCredentials)?;
                (user.id, user.email)
            }
        };

        let meta = SessionMeta {
            user_id: user_id.clone(),
            email,
            expires_at: grant.expires_at,
        };
        self.credentials.set_session(
            grant.access_token.as_bytes(),
            grant.refresh_token.as_deref().map(str::as_bytes),
            &meta,
        )?;

        info!(user_id = %user_id, "Stored session from OAuth callback");

        Ok(Session {
            user_id,
            issued_credential: grant.access_token.into_bytes(),
            expiry: grant.expires_at,
        })
    }
}

fn access_token_str(session: &Session) -> AuthResult<&str> {
    std::str::from_utf8(&session.issued_credential)
        .map_err(|_| AuthError::ProviderError("Stored access token is not valid UTF-8".to_string()))
}

/// Query parameters merged with fragment parameters; the query wins.
fn callback_params(url: &Url) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    if let Some(fragment) = url.fragment() {
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()).into_owned() {
            params.entry(key).or_insert(value);
        }
    }
    params
}

fn non_empty<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

fn parse_i64(params: &HashMap<String, String>, name: &str) -> Option<i64> {
    params.get(name).and_then(|v| v.parse().ok())
}

fn expiry_from(expires_in: Option<i64>, expires_at: Option<i64>) -> Option<DateTime<Utc>> {
    if let Some(secs) = expires_in {
        return Some(Utc::now() + Duration::seconds(secs));
    }
    expires_at.and_then(|ts| DateTime::from_timestamp(ts, 0))
}
