//! Wiring of the auth collaborators for one CLI invocation.

use crate::browser::BrowserSurface;
use crate::user_cache::UserCache;
use anyhow::Result;
use app_config_and_utils::{Config, Paths, CALLBACK_SCHEME};
use auth_session::{HttpIdentityProviderClient, OAuthFlowCoordinator, SessionController, SessionHandle};
use credential_storage::{create_credential_store, CredentialStore};
use std::sync::Arc;
use tracing::debug;

pub struct AuthContext {
    pub config: Config,
    pub credentials: CredentialStore,
    pub provider: Arc<HttpIdentityProviderClient>,
    pub users: Arc<UserCache>,
    pub session: SessionHandle,
}

impl AuthContext {
    pub fn new(config: Config, paths: Paths) -> Result<Self> {
        let credentials = create_credential_store(&config.credential_scope)?;
        Self::with_credentials(config, paths, credentials)
    }

    pub fn with_credentials(config: Config, paths: Paths, credentials: CredentialStore) -> Result<Self> {
        let provider = Arc::new(HttpIdentityProviderClient::from_config(
            &config,
            credentials.clone(),
        )?);
        let users = Arc::new(UserCache::new(paths.user_cache_file()));
        let coordinator = Arc::new(OAuthFlowCoordinator::new(
            Arc::new(BrowserSurface),
            CALLBACK_SCHEME,
        ));

        let session = SessionController::new(
            provider.clone(),
            users.clone(),
            credentials.clone(),
            coordinator,
        )
        .with_state_callback(Box::new(|payload| {
            debug!(state = %payload.state, user_id = ?payload.user_id, "Auth state changed");
        }))
        .spawn();

        Ok(Self {
            config,
            credentials,
            provider,
            users,
            session,
        })
    }
}
