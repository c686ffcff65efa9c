//! Authentication session subsystem.
//!
//! - [`SessionController`] / [`SessionHandle`]: the authentication state,
//!   the signed-in user and the user-facing error channel
//! - [`OAuthFlowCoordinator`]: browser round trips, one at a time
//! - [`HttpIdentityProviderClient`]: session validation and OAuth
//!   completion against the identity provider
//! - [`AuthError`] / [`AppError`]: the error taxonomy

mod app_error;
mod auth_fsm;
mod callback;
mod collaborators;
mod controller;
mod error;
mod model;
mod oauth;
mod pkce;
mod provider;
mod slot;

#[cfg(test)]
mod tests;

pub use app_error::AppError;
pub use auth_fsm::{
    AuthStateChangedPayload, AuthenticationState, SessionMachine, SessionMachineInput,
    SessionMachineState,
};
pub use callback::{parse_callback, parse_callback_str, CallbackResult, CALLBACK_HOST, CALLBACK_PATH};
pub use collaborators::{
    ExternalAuthSurface, IdentityProviderClient, PresentationOptions, SurfaceOutcome,
    UserDisplayRepository,
};
pub use controller::{OAuthSignIn, SessionController, SessionHandle, SessionSnapshot, StateCallback};
pub use error::{AuthError, AuthResult, FlowError};
pub use model::{DisplayRecord, Session, User};
pub use oauth::{FlowOutcome, OAuthFlowCoordinator};
pub use provider::HttpIdentityProviderClient;
pub use slot::ResultSlot;
