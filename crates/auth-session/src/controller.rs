//! Session state controller.
//!
//! One tokio task owns the authentication state, the current user and the
//! error channel. [`SessionHandle`] clones talk to it over an unbounded
//! channel, and every change is published on a `watch` channel so reads are
//! synchronous.
//!
//! Restoration and credential clearing run in their own tasks and report
//! back as commands. Each command that decides the state bumps a
//! generation counter; a restoration result from an older generation is
//! dropped and its caller is answered once the state leaves `Unknown`.
//!
//! Sign-outs are numbered. Writing a new session and clearing after a
//! sign-out both run under one lock; a clear whose sign-out is already
//! covered is skipped, and an OAuth sign-in overtaken by a sign-out is
//! discarded by the controller.

use crate::auth_fsm::{
    AuthStateChangedPayload, AuthenticationState, SessionMachine, SessionMachineInput,
};
use crate::callback::CallbackResult;
use crate::collaborators::{IdentityProviderClient, UserDisplayRepository};
use crate::oauth::OAuthFlowCoordinator;
use crate::{AppError, AuthError, FlowError, User};
use credential_storage::CredentialStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};
use url::Url;

/// Callback type for auth state change notifications.
pub type StateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

/// Everything the controller publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: AuthenticationState,
    pub user: Option<User>,
    pub last_error: Option<AppError>,
    pub error_visible: bool,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self {
            state: AuthenticationState::Unknown,
            user: None,
            last_error: None,
            error_visible: false,
        }
    }
}

/// Orders session writes against sign-out clears.
#[derive(Default)]
struct CredentialGate {
    lock: AsyncMutex<()>,
    /// Sign-outs processed by the controller. Written only by the actor.
    sign_outs: AtomicU64,
    /// Latest sign-out whose clear has run.
    cleared_through: AtomicU64,
}

/// How [`SessionHandle::sign_in_with_oauth`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthSignIn {
    /// Signed in with a matching local profile.
    Authenticated(User),
    /// Provider session stored, but no local profile matches it yet.
    Onboarding { user_id: String },
    /// The user dismissed the sign-in surface, or signed out before the
    /// sign-in finished.
    Cancelled,
}

#[derive(Debug, Error)]
enum RestoreFailure {
    #[error("no persisted session")]
    NoSession,
    #[error("persisted session has expired")]
    Expired,
    #[error("session rejected by provider")]
    SessionRejected,
    #[error("no local profile")]
    NoLocalRecord,
    #[error("local profile belongs to another user")]
    UserMismatch,
    #[error(transparent)]
    Error(#[from] AuthError),
}

impl RestoreFailure {
    /// Anything other than a missing, expired or rejected session.
    fn is_unexpected(&self) -> bool {
        match self {
            RestoreFailure::Error(e) => !e.requires_reauthentication(),
            _ => false,
        }
    }
}

enum Command {
    ResolveState {
        reply: oneshot::Sender<AuthenticationState>,
    },
    RestoreFinished {
        generation: u64,
        outcome: Result<User, RestoreFailure>,
        reply: oneshot::Sender<AuthenticationState>,
    },
    SignIn {
        user: User,
        reply: oneshot::Sender<()>,
    },
    SignOut {
        reply: oneshot::Sender<()>,
    },
    BeginOnboarding {
        reply: oneshot::Sender<AuthenticationState>,
    },
    /// Result of an OAuth sign-in; `user` is `None` for onboarding.
    FinishOAuth {
        sign_out_epoch: u64,
        user: Option<User>,
        reply: oneshot::Sender<bool>,
    },
    HandleError {
        error: AppError,
    },
    ClearError,
    ClearFailed {
        error: AuthError,
    },
}

/// Builder for the controller task.
pub struct SessionController {
    identity_provider: Arc<dyn IdentityProviderClient>,
    user_repository: Arc<dyn UserDisplayRepository>,
    credentials: CredentialStore,
    coordinator: Arc<OAuthFlowCoordinator>,
    state_callback: Option<StateCallback>,
}

impl SessionController {
    pub fn new(
        identity_provider: Arc<dyn IdentityProviderClient>,
        user_repository: Arc<dyn UserDisplayRepository>,
        credentials: CredentialStore,
        coordinator: Arc<OAuthFlowCoordinator>,
    ) -> Self {
        Self {
            identity_provider,
            user_repository,
            credentials,
            coordinator,
            state_callback: None,
        }
    }

    /// Set a callback to be notified of auth state changes.
    pub fn with_state_callback(mut self, callback: StateCallback) -> Self {
        self.state_callback = Some(callback);
        self
    }

    /// Start the controller task. Must be called inside a tokio runtime.
    ///
    /// The task stops once every [`SessionHandle`] is dropped.
    pub fn spawn(self) -> SessionHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::initial());
        let gate = Arc::new(CredentialGate::default());

        let actor = SessionActor {
            fsm: SessionMachine::new(),
            user: None,
            last_error: None,
            error_visible: false,
            generation: 0,
            parked_replies: Vec::new(),
            identity_provider: self.identity_provider.clone(),
            user_repository: self.user_repository.clone(),
            credentials: self.credentials.clone(),
            gate: gate.clone(),
            snapshot_tx,
            state_callback: self.state_callback,
            last_payload: AuthStateChangedPayload {
                state: AuthenticationState::Unknown,
                user_id: None,
                email: None,
            },
            commands: commands.downgrade(),
        };
        tokio::spawn(actor.run(rx));

        SessionHandle {
            commands,
            snapshot: snapshot_rx,
            coordinator: self.coordinator,
            identity_provider: self.identity_provider,
            user_repository: self.user_repository,
            credentials: self.credentials,
            gate,
        }
    }
}

struct SessionActor {
    fsm: SessionMachine,
    user: Option<User>,
    last_error: Option<AppError>,
    error_visible: bool,
    generation: u64,
    /// Replies for superseded restorations, answered once the state settles.
    parked_replies: Vec<oneshot::Sender<AuthenticationState>>,
    identity_provider: Arc<dyn IdentityProviderClient>,
    user_repository: Arc<dyn UserDisplayRepository>,
    credentials: CredentialStore,
    gate: Arc<CredentialGate>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    state_callback: Option<StateCallback>,
    last_payload: AuthStateChangedPayload,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
            self.publish();
            self.answer_parked();
        }
        debug!("Session controller stopped");
    }

    fn state(&self) -> AuthenticationState {
        AuthenticationState::from(self.fsm.state())
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::ResolveState { reply } => {
                self.generation += 1;
                self.transition(SessionMachineInput::Resolve);
                self.spawn_restore(self.generation, reply);
            }
            Command::RestoreFinished {
                generation,
                outcome,
                reply,
            } => {
                if generation != self.generation {
                    debug!(generation, current = self.generation, "Discarding stale restoration result");
                    self.parked_replies.push(reply);
                } else {
                    match outcome {
                        Ok(user) => {
                            info!(user_id = %user.id, "Session restored");
                            self.user = Some(user);
                            self.transition(SessionMachineInput::RestoreSucceeded);
                        }
                        Err(failure) => {
                            if failure.is_unexpected() {
                                warn!(reason = %failure, "Session not restored");
                            } else {
                                info!(reason = %failure, "Session not restored");
                            }
                            self.user = None;
                            self.transition(SessionMachineInput::RestoreFailed);
                        }
                    }
                    self.publish();
                    let _ = reply.send(self.state());
                }
            }
            Command::SignIn { user, reply } => {
                self.sign_in(user);
                self.publish();
                let _ = reply.send(());
            }
            Command::SignOut { reply } => {
                self.generation += 1;
                info!("Signed out");
                self.user = None;
                self.transition(SessionMachineInput::SignedOut);
                let epoch = self.gate.sign_outs.fetch_add(1, Ordering::SeqCst) + 1;
                self.spawn_clear(epoch);
                self.publish();
                let _ = reply.send(());
            }
            Command::BeginOnboarding { reply } => {
                self.begin_onboarding();
                self.publish();
                let _ = reply.send(self.state());
            }
            Command::FinishOAuth {
                sign_out_epoch,
                user,
                reply,
            } => {
                if self.gate.sign_outs.load(Ordering::SeqCst) != sign_out_epoch {
                    info!("Signed out during OAuth sign-in; discarding its session");
                    let _ = reply.send(false);
                    return;
                }
                match user {
                    Some(user) => self.sign_in(user),
                    None => self.begin_onboarding(),
                }
                self.publish();
                let _ = reply.send(true);
            }
            Command::HandleError { error } => {
                debug!(error = %error, "Publishing error");
                self.last_error = Some(error);
                self.error_visible = true;
            }
            Command::ClearError => {
                self.last_error = None;
                self.error_visible = false;
            }
            Command::ClearFailed { error } => {
                self.last_error = Some(AppError::from(error));
                self.error_visible = true;
            }
        }
    }

    fn sign_in(&mut self, user: User) {
        self.generation += 1;
        info!(user_id = %user.id, "Signed in");
        self.user = Some(user);
        self.transition(SessionMachineInput::SignedIn);
    }

    fn begin_onboarding(&mut self) {
        if self.transition(SessionMachineInput::StartOnboarding) {
            self.generation += 1;
            self.user = None;
        }
    }

    fn answer_parked(&mut self) {
        let state = self.state();
        if state == AuthenticationState::Unknown {
            return;
        }
        for reply in self.parked_replies.drain(..) {
            let _ = reply.send(state);
        }
    }

    /// Apply `input`, returning whether the machine accepted it.
    fn transition(&mut self, input: SessionMachineInput) -> bool {
        let old_state = self.state();
        if self.fsm.consume(&input).is_err() {
            warn!(input = ?input, state = %old_state, "Ignoring invalid session state transition");
            return false;
        }
        let new_state = self.state();
        if old_state != new_state {
            debug!(old_state = %old_state, new_state = %new_state, "Session state transition");
        }
        true
    }

    fn publish(&mut self) {
        let snapshot = SessionSnapshot {
            state: self.state(),
            user: self.user.clone(),
            last_error: self.last_error.clone(),
            error_visible: self.error_visible,
        };

        let payload = AuthStateChangedPayload {
            state: snapshot.state,
            user_id: snapshot.user.as_ref().map(|u| u.id.to_string()),
            email: snapshot.user.as_ref().map(|u| u.email.clone()),
        };
        if self.last_payload != payload {
            if let Some(callback) = &self.state_callback {
                callback(payload.clone());
            }
            self.last_payload = payload;
        }

        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn spawn_restore(&self, generation: u64, reply: oneshot::Sender<AuthenticationState>) {
        let identity_provider = self.identity_provider.clone();
        let user_repository = self.user_repository.clone();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let outcome =
                restore_session(identity_provider.as_ref(), user_repository.as_ref()).await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::RestoreFinished {
                    generation,
                    outcome,
                    reply,
                });
            }
        });
    }

    fn spawn_clear(&self, epoch: u64) {
        let credentials = self.credentials.clone();
        let commands = self.commands.clone();
        let gate = self.gate.clone();

        tokio::spawn(async move {
            let _guard = gate.lock.lock().await;
            if gate.cleared_through.load(Ordering::SeqCst) >= epoch {
                debug!(epoch, "Credentials already cleared for this sign-out");
                return;
            }

            let result = clear_credentials(credentials).await;
            gate.cleared_through.fetch_max(epoch, Ordering::SeqCst);
            let Err(error) = result else {
                debug!(epoch, "Cleared stored credentials");
                return;
            };

            error!(error = %error, "Failed to clear stored credentials after sign-out");
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::ClearFailed { error });
            }
        });
    }
}

async fn clear_credentials(credentials: CredentialStore) -> Result<(), AuthError> {
    match tokio::task::spawn_blocking(move || credentials.clear_scope()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(AuthError::SignOutFailed(e.to_string())),
        Err(e) => Err(AuthError::SignOutFailed(e.to_string())),
    }
}

async fn restore_session(
    identity_provider: &dyn IdentityProviderClient,
    user_repository: &dyn UserDisplayRepository,
) -> Result<User, RestoreFailure> {
    let session = identity_provider
        .current_session()
        .await?
        .ok_or(RestoreFailure::NoSession)?;
    if session.is_expired() {
        return Err(RestoreFailure::Expired);
    }

    if !identity_provider.validate_session().await? {
        return Err(RestoreFailure::SessionRejected);
    }

    let record = user_repository
        .first_user_display_data()
        .await?
        .ok_or(RestoreFailure::NoLocalRecord)?;

    let user = User::try_from(record)?;
    if user.id != session.user_uuid()? {
        return Err(RestoreFailure::UserMismatch);
    }
    Ok(user)
}

/// Cloneable access to the session controller.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    coordinator: Arc<OAuthFlowCoordinator>,
    identity_provider: Arc<dyn IdentityProviderClient>,
    user_repository: Arc<dyn UserDisplayRepository>,
    credentials: CredentialStore,
    gate: Arc<CredentialGate>,
}

impl SessionHandle {
    pub fn current_authentication_state(&self) -> AuthenticationState {
        self.snapshot.borrow().state
    }

    pub fn current_user(&self) -> Option<User> {
        self.snapshot.borrow().user.clone()
    }

    pub fn last_error(&self) -> Option<AppError> {
        self.snapshot.borrow().last_error.clone()
    }

    pub fn is_error_visible(&self) -> bool {
        self.snapshot.borrow().error_visible
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Re-derive the state from persisted data.
    ///
    /// The state reads `Unknown` until restoration finishes. Restoration
    /// failures end in `Unauthenticated` and are logged, never published as
    /// errors. Returns the state once this request has been settled.
    pub async fn resolve_state(&self) -> AuthenticationState {
        let (reply, rx) = oneshot::channel();
        self.request(Command::ResolveState { reply }, rx)
            .await
            .unwrap_or_else(|| self.current_authentication_state())
    }

    /// Record a user whose credentials have already been persisted.
    pub async fn sign_in(&self, user: User) {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SignIn { user, reply }, rx).await;
    }

    /// Sign out immediately; stored credentials are cleared in the background.
    pub async fn sign_out(&self) {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SignOut { reply }, rx).await;
    }

    /// Enter `Onboarding`, dropping any current user.
    pub async fn begin_onboarding(&self) -> AuthenticationState {
        let (reply, rx) = oneshot::channel();
        self.request(Command::BeginOnboarding { reply }, rx)
            .await
            .unwrap_or_else(|| self.current_authentication_state())
    }

    /// Publish an error. Does not change the authentication state.
    pub fn handle_error(&self, error: impl Into<AppError>) {
        self.send(Command::HandleError {
            error: error.into(),
        });
    }

    pub fn clear_error(&self) {
        self.send(Command::ClearError);
    }

    /// Run one OAuth flow and return its callback result.
    ///
    /// Failures other than cancellation and a rejected concurrent flow are
    /// also published as errors.
    pub async fn begin_oauth_flow(
        &self,
        authorization_url: &Url,
    ) -> Result<CallbackResult, FlowError> {
        let outcome = self.coordinator.begin_flow(authorization_url).await;
        match &outcome {
            Ok(CallbackResult::Success(_)) => {}
            Ok(CallbackResult::Error(message)) => {
                self.handle_error(AuthError::OAuthFailed(message.clone()))
            }
            Err(FlowError::Cancelled | FlowError::AlreadyInProgress) => {}
            Err(e) => self.handle_error(AuthError::from(e.clone())),
        }
        outcome
    }

    /// Full browser sign-in: run the flow, then [`Self::complete_oauth_sign_in`].
    pub async fn sign_in_with_oauth(&self, authorization_url: &Url) -> Result<OAuthSignIn, AppError> {
        match self.begin_oauth_flow(authorization_url).await {
            Ok(CallbackResult::Success(callback_url)) => {
                self.complete_oauth_sign_in(&callback_url).await
            }
            Ok(CallbackResult::Error(message)) => Err(AuthError::OAuthFailed(message).into()),
            Err(FlowError::Cancelled) => Ok(OAuthSignIn::Cancelled),
            Err(e) => Err(AuthError::from(e).into()),
        }
    }

    /// Persist the session from a successful callback URL, then sign in with
    /// the matching local profile or enter onboarding.
    ///
    /// Returns [`OAuthSignIn::Cancelled`] if a sign-out is processed while
    /// the session is being persisted; that sign-out's clear removes it.
    pub async fn complete_oauth_sign_in(&self, callback_url: &Url) -> Result<OAuthSignIn, AppError> {
        let (session, sign_out_epoch) = {
            let _guard = self.gate.lock.lock().await;
            let sign_out_epoch = self.gate.sign_outs.load(Ordering::SeqCst);
            if self.gate.cleared_through.load(Ordering::SeqCst) < sign_out_epoch {
                debug!(epoch = sign_out_epoch, "Clearing credentials before storing the new session");
                clear_credentials(self.credentials.clone())
                    .await
                    .map_err(|e| self.publish_error(e))?;
                self.gate
                    .cleared_through
                    .fetch_max(sign_out_epoch, Ordering::SeqCst);
            }
            let session = self
                .identity_provider
                .complete_authorization(callback_url)
                .await
                .map_err(|e| self.publish_error(e))?;
            (session, sign_out_epoch)
        };
        let session_user = session.user_uuid().map_err(|e| self.publish_error(e))?;

        let record = match self.user_repository.first_user_display_data().await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Failed to read local profile after sign-in");
                None
            }
        };
        let user = match record.map(User::try_from) {
            Some(Ok(user)) if user.id == session_user => Some(user),
            _ => {
                info!(user_id = %session_user, "No local profile for signed-in user");
                None
            }
        };

        let (reply, rx) = oneshot::channel();
        let command = Command::FinishOAuth {
            sign_out_epoch,
            user: user.clone(),
            reply,
        };
        if !self.request(command, rx).await.unwrap_or(false) {
            return Ok(OAuthSignIn::Cancelled);
        }
        Ok(match user {
            Some(user) => OAuthSignIn::Authenticated(user),
            None => OAuthSignIn::Onboarding {
                user_id: session.user_id,
            },
        })
    }

    /// Forward a URL received from the OS. Returns `false` if it is not a
    /// callback URL for this application.
    pub fn handle_callback_url(&self, url: &Url) -> bool {
        self.coordinator.handle_callback_url(url)
    }

    /// Cancel the pending OAuth flow. Returns whether one was waiting.
    pub fn cancel_flow(&self) -> bool {
        self.coordinator.cancel_flow()
    }

    pub fn pending_flow_count(&self) -> usize {
        self.coordinator.pending_count()
    }

    fn publish_error(&self, error: AuthError) -> AppError {
        let app_error = AppError::from(error);
        self.handle_error(app_error.clone());
        app_error
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Session controller is not running");
        }
    }

    async fn request<T>(&self, command: Command, rx: oneshot::Receiver<T>) -> Option<T> {
        self.send(command);
        rx.await.ok()
    }
}
