//! Authentication commands.

use crate::context::AuthContext;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use app_config_and_utils::CALLBACK_SCHEME;
use auth_session::{
    parse_callback_str, AppError, AuthError, AuthenticationState, CallbackResult, OAuthSignIn,
    User,
};
use std::time::Duration;
use tracing::{info, warn};

const CLEAR_TIMEOUT: Duration = Duration::from_secs(10);
const CLEAR_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Sign in through the system browser.
pub async fn login(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    if ctx.session.resolve_state().await.is_authenticated() {
        if let Some(user) = ctx.session.current_user() {
            output::print_success(&format!("Already logged in as {}", user.email), format);
            return Ok(());
        }
    }

    let authorization_url = ctx
        .provider
        .authorization_url_with_pkce(&ctx.config.authorization_url()?)?;
    let outcome = ctx.session.sign_in_with_oauth(&authorization_url).await;
    finish_sign_in(ctx, outcome, format).await
}

/// Complete sign-in from a callback URL forwarded by the OS URL handler.
pub async fn handle_url(ctx: &AuthContext, raw_url: &str, format: &OutputFormat) -> Result<()> {
    let scheme = CALLBACK_SCHEME;
    match parse_callback_str(raw_url, scheme) {
        None => {
            output::print_error(&format!("Not a {}:// callback URL", scheme), None, format);
            Ok(())
        }
        Some(CallbackResult::Error(message)) => {
            print_app_error(&AuthError::OAuthFailed(message).into(), format);
            Ok(())
        }
        Some(CallbackResult::Success(callback_url)) => {
            let outcome = ctx.session.complete_oauth_sign_in(&callback_url).await;
            finish_sign_in(ctx, outcome, format).await
        }
    }
}

/// Sign out and wait for stored credentials to be cleared.
pub async fn logout(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    let had_session = ctx.credentials.has_session()?;

    ctx.session.sign_out().await;

    match wait_for_clear(ctx).await {
        Ok(()) if had_session => output::print_success("Logged out successfully", format),
        Ok(()) => output::print_success("Not logged in", format),
        Err(e) => print_app_error(&e, format),
    }
    Ok(())
}

/// Check authentication status.
pub async fn status(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    let state = ctx.session.resolve_state().await;
    let user = ctx.session.current_user();
    let meta = ctx.credentials.session_meta()?;
    let expires_at = meta
        .as_ref()
        .and_then(|m| m.expires_at)
        .map(|t| t.to_rfc3339());

    match format {
        OutputFormat::Text => {
            match (&state, &user) {
                (AuthenticationState::Authenticated, Some(user)) => {
                    output::print_row("Auth", "logged in");
                    output::print_row("User", &format!("{} <{}>", user.display_name(), user.email));
                    output::print_row("User ID", &user.id.to_string());
                    if let Some(lab) = &user.lab_affiliation {
                        output::print_row("Lab", lab);
                    }
                    output::print_row("Expires", expires_at.as_deref().unwrap_or("unknown"));
                }
                _ if meta.is_some() => {
                    output::print_row("Auth", "not logged in");
                    println!("A stored session exists but could not be restored. Run 'ai4science login'.");
                }
                _ => output::print_row("Auth", "not logged in"),
            }
        }
        OutputFormat::Json => {
            output::print_json(&serde_json::json!({
                "logged_in": state.is_authenticated(),
                "state": state,
                "user_id": user.as_ref().map(|u| u.id.to_string()),
                "email": user.as_ref().map(|u| u.email.clone()),
                "expires_at": expires_at,
            }));
        }
    }
    Ok(())
}

async fn finish_sign_in(
    ctx: &AuthContext,
    outcome: Result<OAuthSignIn, AppError>,
    format: &OutputFormat,
) -> Result<()> {
    match outcome {
        Ok(OAuthSignIn::Authenticated(user)) => {
            output::print_success(&format!("Logged in as {}", user.email), format);
        }
        Ok(OAuthSignIn::Onboarding { user_id }) => {
            info!(user_id = %user_id, "Creating local profile");
            match create_profile(ctx).await {
                Ok(user) => {
                    ctx.session.sign_in(user.clone()).await;
                    output::print_success(&format!("Logged in as {}", user.email), format);
                }
                Err(e) => {
                    let app_error = AppError::from(e);
                    ctx.session.handle_error(app_error.clone());
                    print_app_error(&app_error, format);
                }
            }
        }
        Ok(OAuthSignIn::Cancelled) => output::print_error("Login cancelled", None, format),
        Err(e) => print_app_error(&e, format),
    }
    Ok(())
}

/// Fetch the provider profile and cache it as the local profile.
async fn create_profile(ctx: &AuthContext) -> Result<User, AuthError> {
    let record = ctx.provider.fetch_profile().await?;
    let user = User::try_from(record.clone())?;
    ctx.users.save(record).await?;
    Ok(user)
}

/// Wait until the background clear has emptied the credential scope or
/// published a failure.
async fn wait_for_clear(ctx: &AuthContext) -> Result<(), AppError> {
    let deadline = tokio::time::Instant::now() + CLEAR_TIMEOUT;
    loop {
        if let Some(error) = ctx.session.last_error() {
            return Err(error);
        }
        match ctx.credentials.keys() {
            Ok(keys) if keys.is_empty() => return Ok(()),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to list stored credentials"),
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(AppError::Unknown(
                "Timed out clearing stored credentials".to_string(),
            ));
        }
        tokio::time::sleep(CLEAR_POLL_INTERVAL).await;
    }
}

fn print_app_error(error: &AppError, format: &OutputFormat) {
    output::print_error(&error.to_string(), Some(error.recovery_suggestion()), format);
}
