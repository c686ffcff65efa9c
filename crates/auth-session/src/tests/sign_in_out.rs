//! Sign-in, sign-out and onboarding tests.

use super::harness::{
    authorization_url, callback_url, eventually, test_record, test_session, test_user, FailingStorage,
    TestHarness, OTHER_USER_ID, USER_ID,
};
use crate::{AppError, AuthStateChangedPayload, AuthenticationState, OAuthSignIn};
use credential_storage::SessionMeta;
use std::sync::Arc;

fn persist_session(harness: &TestHarness) {
    harness
        .credentials
        .set_session(
            b"access-token",
            Some(b"refresh-token"),
            &SessionMeta {
                user_id: USER_ID.to_string(),
                email: None,
                expires_at: None,
            },
        )
        .unwrap();
}

// =============================================================================
// Sign in
// =============================================================================

#[tokio::test]
async fn sign_in_sets_user_and_state() {
    let harness = TestHarness::new();

    harness.handle.sign_in(test_user(USER_ID)).await;

    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.state, AuthenticationState::Authenticated);
    assert_eq!(snapshot.user, Some(test_user(USER_ID)));
    assert_eq!(
        harness.events(),
        vec![AuthStateChangedPayload {
            state: AuthenticationState::Authenticated,
            user_id: Some(USER_ID.to_string()),
            email: Some("grace@lab.example".to_string()),
        }]
    );
}

#[tokio::test]
async fn repeated_sign_in_notifies_once() {
    let harness = TestHarness::new();

    harness.handle.sign_in(test_user(USER_ID)).await;
    harness.handle.sign_in(test_user(USER_ID)).await;

    assert_eq!(harness.events().len(), 1);
}

#[tokio::test]
async fn sign_in_replaces_previous_user() {
    let harness = TestHarness::new();

    harness.handle.sign_in(test_user(USER_ID)).await;
    harness.handle.sign_in(test_user(OTHER_USER_ID)).await;

    assert_eq!(harness.handle.current_user(), Some(test_user(OTHER_USER_ID)));
    assert_eq!(harness.events().len(), 2);
}

// =============================================================================
// Sign out
// =============================================================================

#[tokio::test]
async fn sign_out_is_immediate() {
    let harness = TestHarness::new();
    harness.handle.sign_in(test_user(USER_ID)).await;

    harness.handle.sign_out().await;

    assert_eq!(
        harness.handle.current_authentication_state(),
        AuthenticationState::Unauthenticated
    );
    assert_eq!(harness.handle.current_user(), None);

    let events = harness.events();
    assert_eq!(events.last().map(|e| e.state), Some(AuthenticationState::Unauthenticated));
    assert_eq!(events.last().and_then(|e| e.user_id.clone()), None);
}

#[tokio::test]
async fn sign_out_clears_stored_credentials() {
    let harness = TestHarness::new();
    persist_session(&harness);
    harness.handle.sign_in(test_user(USER_ID)).await;

    harness.handle.sign_out().await;

    let credentials = harness.credentials.clone();
    eventually(move || credentials.keys().unwrap().is_empty()).await;
    assert_eq!(harness.handle.last_error(), None);
}

#[tokio::test]
async fn sign_out_from_unknown() {
    let harness = TestHarness::new();

    harness.handle.sign_out().await;

    assert_eq!(
        harness.handle.current_authentication_state(),
        AuthenticationState::Unauthenticated
    );
}

#[tokio::test]
async fn failed_clear_is_published() {
    let harness = TestHarness::with_storage(Arc::new(FailingStorage::default()));
    persist_session(&harness);
    harness.handle.sign_in(test_user(USER_ID)).await;

    harness.handle.sign_out().await;

    let snapshot = harness.wait_for(|s| s.last_error.is_some()).await;
    assert_eq!(snapshot.state, AuthenticationState::Unauthenticated);
    assert!(snapshot.error_visible);
    assert!(matches!(
        snapshot.last_error,
        Some(AppError::Unknown(message)) if message.starts_with("Sign out failed")
    ));
}

#[tokio::test]
async fn sign_in_after_sign_out_keeps_new_session() {
    let harness = TestHarness::new();
    persist_session(&harness);
    harness.handle.sign_in(test_user(USER_ID)).await;
    harness.repository.set_record(Some(test_record(USER_ID)));

    harness.handle.sign_out().await;
    let outcome = harness
        .handle
        .sign_in_with_oauth(&authorization_url())
        .await
        .unwrap();

    assert_eq!(outcome, OAuthSignIn::Authenticated(test_user(USER_ID)));
    assert!(harness.credentials.has_session().unwrap());
    assert_eq!(
        harness.credentials.access_token().unwrap(),
        Some(test_session(USER_ID).issued_credential)
    );
}

#[tokio::test]
async fn sign_out_during_oauth_completion_discards_new_session() {
    let harness = TestHarness::new();
    harness.repository.set_record(Some(test_record(USER_ID)));
    let gate = harness.provider.hold_authorization();

    let handle = harness.handle.clone();
    let sign_in =
        tokio::spawn(async move { handle.complete_oauth_sign_in(&callback_url()).await });
    harness.provider.authorization_entered.notified().await;

    harness.handle.sign_out().await;
    gate.notify_one();

    assert_eq!(sign_in.await.unwrap(), Ok(OAuthSignIn::Cancelled));
    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.state, AuthenticationState::Unauthenticated);
    assert_eq!(snapshot.user, None);
    assert_eq!(snapshot.last_error, None);

    let credentials = harness.credentials.clone();
    eventually(move || credentials.keys().unwrap().is_empty()).await;
}

#[tokio::test]
async fn sign_in_started_after_sign_out_is_not_cleared() {
    let harness = TestHarness::new();
    persist_session(&harness);
    harness.handle.sign_in(test_user(USER_ID)).await;
    harness.repository.set_record(Some(test_record(USER_ID)));

    harness.handle.sign_out().await;
    let outcome = harness
        .handle
        .complete_oauth_sign_in(&callback_url())
        .await
        .unwrap();
    // Let any clear still queued for the sign-out run.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert_eq!(outcome, OAuthSignIn::Authenticated(test_user(USER_ID)));
    assert!(harness.credentials.has_session().unwrap());
    assert_eq!(
        harness.handle.current_authentication_state(),
        AuthenticationState::Authenticated
    );
}

// =============================================================================
// Onboarding
// =============================================================================

#[tokio::test]
async fn onboarding_from_unauthenticated() {
    let harness = TestHarness::new();
    harness.handle.resolve_state().await;

    assert_eq!(
        harness.handle.begin_onboarding().await,
        AuthenticationState::Onboarding
    );
    assert_eq!(harness.handle.current_user(), None);

    harness.handle.sign_in(test_user(USER_ID)).await;
    assert_eq!(
        harness.handle.current_authentication_state(),
        AuthenticationState::Authenticated
    );
}

#[tokio::test]
async fn onboarding_drops_current_user() {
    let harness = TestHarness::new();
    harness.handle.sign_in(test_user(USER_ID)).await;

    assert_eq!(
        harness.handle.begin_onboarding().await,
        AuthenticationState::Onboarding
    );
    assert_eq!(harness.handle.current_user(), None);
}

#[tokio::test]
async fn onboarding_supersedes_restoration() {
    let harness = TestHarness::new().with_restorable_session();
    let gate = harness.provider.hold_validation();

    let handle = harness.handle.clone();
    let resolving = tokio::spawn(async move { handle.resolve_state().await });
    harness.provider.validation_entered.notified().await;

    harness.handle.begin_onboarding().await;
    gate.notify_one();

    assert_eq!(resolving.await.unwrap(), AuthenticationState::Onboarding);
    assert_eq!(harness.handle.current_user(), None);
}
