//! Authentication state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!                 ┌─────────────────┐
//!   Resolve ────► │     Unknown     │ (initial)
//!  (from any)     └────────┬────────┘
//!                          │
//!        RestoreFailed     │     RestoreSucceeded / SignedIn
//!       ┌──────────────────┴───────────────────┐
//!       ▼                                      ▼
//! ┌─────────────────┐      SignedIn      ┌─────────────────┐
//! │ Unauthenticated │ ─────────────────► │  Authenticated  │
//! └────────┬────────┘ ◄───────────────── └─────────────────┘
//!          │               SignedOut              ▲
//!          │ StartOnboarding (also from Unknown   │ SignedIn
//!          ▼  and Authenticated)                  │
//! ┌─────────────────┐                             │
//! │   Onboarding    │ ────────────────────────────┘
//! └─────────────────┘   (SignedOut → Unauthenticated)
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Unknown)

    Unknown => {
        Resolve => Unknown,
        RestoreSucceeded => Authenticated,
        RestoreFailed => Unauthenticated,
        SignedIn => Authenticated,
        SignedOut => Unauthenticated,
        StartOnboarding => Onboarding
    },
    Unauthenticated => {
        Resolve => Unknown,
        SignedIn => Authenticated,
        SignedOut => Unauthenticated,
        StartOnboarding => Onboarding
    },
    Authenticated => {
        Resolve => Unknown,
        SignedIn => Authenticated,
        SignedOut => Unauthenticated,
        StartOnboarding => Onboarding
    },
    Onboarding => {
        Resolve => Unknown,
        SignedIn => Authenticated,
        SignedOut => Unauthenticated,
        StartOnboarding => Onboarding
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Authentication state as seen by the rest of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationState {
    /// Not yet resolved (startup, or restoration in progress).
    Unknown,
    Unauthenticated,
    Authenticated,
    /// Signed in with the provider but no local profile yet.
    Onboarding,
}

impl AuthenticationState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthenticationState::Authenticated)
    }
}

impl std::fmt::Display for AuthenticationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AuthenticationState::Unknown => "unknown",
            AuthenticationState::Unauthenticated => "unauthenticated",
            AuthenticationState::Authenticated => "authenticated",
            AuthenticationState::Onboarding => "onboarding",
        })
    }
}

impl From<&SessionMachineState> for AuthenticationState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Unknown => AuthenticationState::Unknown,
            SessionMachineState::Unauthenticated => AuthenticationState::Unauthenticated,
            SessionMachineState::Authenticated => AuthenticationState::Authenticated,
            SessionMachineState::Onboarding => AuthenticationState::Onboarding,
        }
    }
}

/// Payload for auth state change events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    pub state: AuthenticationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
