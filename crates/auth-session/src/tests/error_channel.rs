//! Error channel tests.

use super::harness::{test_user, TestHarness, USER_ID};
use crate::{AppError, AuthError, AuthenticationState};

#[tokio::test]
async fn handle_error_publishes_without_changing_state() {
    let harness = TestHarness::new();
    harness.handle.sign_in(test_user(USER_ID)).await;

    harness.handle.handle_error(AuthError::ExpiredToken);

    let snapshot = harness.wait_for(|s| s.error_visible).await;
    assert_eq!(snapshot.last_error, Some(AppError::ExpiredToken));
    assert_eq!(snapshot.state, AuthenticationState::Authenticated);
    assert_eq!(snapshot.user, Some(test_user(USER_ID)));
}

#[tokio::test]
async fn clear_error_hides_it() {
    let harness = TestHarness::new();
    harness.handle.handle_error(AppError::RefreshFailed);
    harness.wait_for(|s| s.error_visible).await;

    harness.handle.clear_error();

    let snapshot = harness.wait_for(|s| !s.error_visible).await;
    assert_eq!(snapshot.last_error, None);
}

#[tokio::test]
async fn newer_error_replaces_older() {
    let harness = TestHarness::new();

    harness.handle.handle_error(AuthError::InvalidCredentials);
    harness
        .handle
        .handle_error(AuthError::ProviderError("timeout".into()));

    let snapshot = harness
        .wait_for(|s| matches!(s.last_error, Some(AppError::Unknown(_))))
        .await;
    assert_eq!(
        snapshot.last_error,
        Some(AppError::Unknown(
            "Authentication service error: timeout".into()
        ))
    );
    assert!(snapshot.error_visible);
}

#[tokio::test]
async fn errors_do_not_notify_state_callback() {
    let harness = TestHarness::new();

    harness.handle.handle_error(AuthError::ExpiredToken);
    harness.wait_for(|s| s.error_visible).await;

    assert!(harness.events().is_empty());
}
