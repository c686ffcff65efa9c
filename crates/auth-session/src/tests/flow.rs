//! OAuth flow tests.
//!
//! Covers:
//! - surface outcomes mapped to flow results
//! - one flow at a time; a second is rejected without disturbing the first
//! - exactly one result per flow whatever arrives first
//! - pending state released on every exit path
//! - full sign-in through `sign_in_with_oauth`

use super::harness::{
    authorization_url, callback_url, test_record, test_session, test_user, GatedSurface,
    TestHarness, OTHER_USER_ID, SCHEME, USER_ID,
};
use crate::{
    AppError, AuthError, AuthenticationState, CallbackResult, FlowError, OAuthSignIn,
    SurfaceOutcome,
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use url::Url;

fn held_harness() -> TestHarness {
    TestHarness::with_surface(GatedSurface::held(SurfaceOutcome::Cancelled))
}

/// Start a flow in the background and wait until the surface is showing.
async fn start_flow(
    harness: &TestHarness,
) -> tokio::task::JoinHandle<Result<CallbackResult, FlowError>> {
    let handle = harness.handle.clone();
    let flow = tokio::spawn(async move { handle.begin_oauth_flow(&authorization_url()).await });
    harness.surface.started.notified().await;
    flow
}

// =============================================================================
// Surface outcomes
// =============================================================================

#[tokio::test]
async fn surface_callback_completes_flow() {
    let harness = TestHarness::new();

    let result = harness.handle.begin_oauth_flow(&authorization_url()).await;

    assert_eq!(result, Ok(CallbackResult::Success(callback_url())));
    assert_eq!(harness.handle.pending_flow_count(), 0);

    let presented = harness.surface.presented.lock().unwrap().clone();
    assert_eq!(presented.len(), 1);
    assert_eq!(presented[0].0, authorization_url());
    assert_eq!(presented[0].1.callback_scheme, SCHEME);
    assert_eq!(harness.coordinator.callback_scheme(), SCHEME);
    assert!(!presented[0].1.prefers_ephemeral_session);
}

#[tokio::test]
async fn cancellation_is_silent_and_releases_the_flow() {
    let harness =
        TestHarness::with_surface(GatedSurface::immediate(SurfaceOutcome::Cancelled));

    let result = harness.handle.begin_oauth_flow(&authorization_url()).await;

    assert_eq!(result, Err(FlowError::Cancelled));
    assert_eq!(harness.handle.pending_flow_count(), 0);
    assert_eq!(harness.handle.last_error(), None);

    harness
        .surface
        .set_outcome(SurfaceOutcome::Callback(callback_url()));
    assert!(harness
        .handle
        .begin_oauth_flow(&authorization_url())
        .await
        .is_ok());
}

#[tokio::test]
async fn launch_failure_is_published() {
    let harness = TestHarness::with_surface(GatedSurface::immediate(
        SurfaceOutcome::LaunchFailed("no browser".into()),
    ));

    let result = harness.handle.begin_oauth_flow(&authorization_url()).await;

    assert_eq!(result, Err(FlowError::LaunchFailed("no browser".into())));
    assert_eq!(harness.handle.pending_flow_count(), 0);

    let snapshot = harness.wait_for(|s| s.error_visible).await;
    assert!(matches!(
        snapshot.last_error,
        Some(AppError::Unknown(message)) if message.contains("no browser")
    ));
}

#[tokio::test]
async fn error_callback_is_returned_and_published() {
    let error_url = Url::parse("ai4science://auth/callback?error=access_denied").unwrap();
    let harness =
        TestHarness::with_surface(GatedSurface::immediate(SurfaceOutcome::Callback(error_url)));

    let result = harness.handle.begin_oauth_flow(&authorization_url()).await;

    assert_eq!(result, Ok(CallbackResult::Error("access_denied".into())));
    let snapshot = harness.wait_for(|s| s.error_visible).await;
    assert_eq!(
        snapshot.last_error,
        Some(AppError::Unknown("OAuth sign-in failed: access_denied".into()))
    );
}

#[tokio::test]
async fn surface_url_on_foreign_scheme_abandons_flow() {
    let foreign = Url::parse("https://idp.example/done").unwrap();
    let harness =
        TestHarness::with_surface(GatedSurface::immediate(SurfaceOutcome::Callback(foreign)));

    let result = harness.handle.begin_oauth_flow(&authorization_url()).await;

    assert_eq!(result, Err(FlowError::Abandoned));
    assert_eq!(harness.handle.pending_flow_count(), 0);
}

// =============================================================================
// One flow at a time
// =============================================================================

#[tokio::test]
async fn concurrent_flow_is_rejected() {
    let harness = held_harness();
    let first = start_flow(&harness).await;

    let second = harness.handle.begin_oauth_flow(&authorization_url()).await;

    assert_eq!(second, Err(FlowError::AlreadyInProgress));
    assert_eq!(harness.handle.pending_flow_count(), 1);
    assert_eq!(harness.surface.presented_count(), 1);
    assert_eq!(harness.handle.last_error(), None);

    assert!(harness.handle.handle_callback_url(&callback_url()));
    assert_eq!(
        first.await.unwrap(),
        Ok(CallbackResult::Success(callback_url()))
    );
    assert_eq!(harness.handle.pending_flow_count(), 0);
}

// =============================================================================
// Exactly one result
// =============================================================================

#[tokio::test]
async fn deep_link_resolves_pending_flow() {
    let harness = held_harness();
    let flow = start_flow(&harness).await;

    assert!(harness.handle.handle_callback_url(&callback_url()));

    assert_eq!(
        flow.await.unwrap(),
        Ok(CallbackResult::Success(callback_url()))
    );
    assert_eq!(harness.handle.pending_flow_count(), 0);
}

#[tokio::test]
async fn cancel_resolves_pending_flow() {
    let harness = held_harness();
    let flow = start_flow(&harness).await;

    assert!(harness.handle.cancel_flow());

    assert_eq!(flow.await.unwrap(), Err(FlowError::Cancelled));
    assert_eq!(harness.handle.pending_flow_count(), 0);
    assert!(!harness.handle.cancel_flow());
}

#[tokio::test]
async fn deep_link_then_cancel_keeps_first_result() {
    let harness = held_harness();
    let flow = start_flow(&harness).await;

    assert!(harness.handle.handle_callback_url(&callback_url()));
    assert!(!harness.handle.cancel_flow());

    assert_eq!(
        flow.await.unwrap(),
        Ok(CallbackResult::Success(callback_url()))
    );
}

#[tokio::test]
async fn cancel_then_deep_link_keeps_first_result() {
    let harness = held_harness();
    let flow = start_flow(&harness).await;

    assert!(harness.handle.cancel_flow());
    // Still claimed as ours, but the flow already has its result.
    assert!(harness.handle.handle_callback_url(&callback_url()));

    assert_eq!(flow.await.unwrap(), Err(FlowError::Cancelled));
}

#[tokio::test]
async fn surface_finishing_after_deep_link_is_ignored() {
    let harness = TestHarness::with_surface(GatedSurface::held(SurfaceOutcome::LaunchFailed(
        "late".into(),
    )));
    let flow = start_flow(&harness).await;

    assert!(harness.handle.handle_callback_url(&callback_url()));
    harness.surface.release();

    assert_eq!(
        flow.await.unwrap(),
        Ok(CallbackResult::Success(callback_url()))
    );
    assert_eq!(harness.handle.last_error(), None);
}

#[tokio::test]
async fn foreign_url_is_not_claimed() {
    let harness = held_harness();
    let flow = start_flow(&harness).await;

    let foreign = Url::parse("otherapp://auth/callback?code=1").unwrap();
    assert!(!harness.handle.handle_callback_url(&foreign));
    assert_eq!(harness.handle.pending_flow_count(), 1);

    harness.handle.cancel_flow();
    assert_eq!(flow.await.unwrap(), Err(FlowError::Cancelled));
}

#[tokio::test]
async fn callback_without_pending_flow_is_claimed() {
    let harness = TestHarness::new();

    assert!(harness.handle.handle_callback_url(&callback_url()));
    assert_eq!(harness.handle.pending_flow_count(), 0);
}

#[tokio::test]
async fn dropping_the_flow_releases_it() {
    let harness = held_harness();

    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        harness.handle.begin_oauth_flow(&authorization_url()),
    )
    .await;

    assert!(timed_out.is_err());
    assert_eq!(harness.handle.pending_flow_count(), 0);
}

// =============================================================================
// Full sign-in
// =============================================================================

#[tokio::test]
async fn oauth_sign_in_with_local_profile() {
    let harness = TestHarness::new();
    harness.repository.set_record(Some(test_record(USER_ID)));

    let outcome = harness
        .handle
        .sign_in_with_oauth(&authorization_url())
        .await
        .unwrap();

    assert_eq!(outcome, OAuthSignIn::Authenticated(test_user(USER_ID)));
    assert_eq!(
        harness.handle.current_authentication_state(),
        AuthenticationState::Authenticated
    );
    assert_eq!(harness.provider.authorization_calls.load(Ordering::SeqCst), 1);
    assert!(harness.credentials.has_session().unwrap());
}

#[tokio::test]
async fn oauth_sign_in_without_local_profile_starts_onboarding() {
    let harness = TestHarness::new();
    harness.repository.set_record(Some(test_record(OTHER_USER_ID)));

    let outcome = harness
        .handle
        .sign_in_with_oauth(&authorization_url())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        OAuthSignIn::Onboarding {
            user_id: USER_ID.to_string()
        }
    );
    assert_eq!(
        harness.handle.current_authentication_state(),
        AuthenticationState::Onboarding
    );
    assert_eq!(harness.handle.current_user(), None);
}

#[tokio::test]
async fn oauth_sign_in_cancelled_changes_nothing() {
    let harness =
        TestHarness::with_surface(GatedSurface::immediate(SurfaceOutcome::Cancelled));
    harness.handle.resolve_state().await;

    let outcome = harness
        .handle
        .sign_in_with_oauth(&authorization_url())
        .await
        .unwrap();

    assert_eq!(outcome, OAuthSignIn::Cancelled);
    assert_eq!(
        harness.handle.current_authentication_state(),
        AuthenticationState::Unauthenticated
    );
    assert_eq!(harness.provider.authorization_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.handle.last_error(), None);
}

#[tokio::test]
async fn oauth_sign_in_rejected_by_provider() {
    let harness = TestHarness::new();
    harness
        .provider
        .set_authorization(Err(AuthError::InvalidCredentials));

    let result = harness.handle.sign_in_with_oauth(&authorization_url()).await;

    assert_eq!(result, Err(AppError::InvalidCredentials));
    let snapshot = harness.wait_for(|s| s.error_visible).await;
    assert_eq!(snapshot.last_error, Some(AppError::InvalidCredentials));
    assert!(!harness.credentials.has_session().unwrap());
}

#[tokio::test]
async fn oauth_sign_in_with_malformed_user_id() {
    let harness = TestHarness::new();
    harness
        .provider
        .set_authorization(Ok(test_session("not-a-uuid")));

    let result = harness.handle.sign_in_with_oauth(&authorization_url()).await;

    assert!(matches!(result, Err(AppError::Unknown(message)) if message.contains("not-a-uuid")));
}

#[tokio::test]
async fn deep_link_without_flow_completes_sign_in() {
    let harness = TestHarness::new();
    harness.repository.set_record(Some(test_record(USER_ID)));

    let outcome = harness
        .handle
        .complete_oauth_sign_in(&callback_url())
        .await
        .unwrap();

    assert_eq!(outcome, OAuthSignIn::Authenticated(test_user(USER_ID)));
    assert_eq!(harness.surface.presented_count(), 0);
    assert!(harness.credentials.has_session().unwrap());
}
