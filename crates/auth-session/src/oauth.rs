//! OAuth flow coordination.
//!
//! At most one flow is pending at a time; a second `begin_flow` is rejected
//! with [`FlowError::AlreadyInProgress`] and the first flow is unaffected.
//! Each flow owns a [`ResultSlot`] that is resolved exactly once by whichever
//! comes first: the surface finishing, a deep link delivered through
//! [`OAuthFlowCoordinator::handle_callback_url`], or
//! [`OAuthFlowCoordinator::cancel_flow`].

use crate::callback::{parse_callback, CallbackResult};
use crate::collaborators::{ExternalAuthSurface, PresentationOptions, SurfaceOutcome};
use crate::slot::ResultSlot;
use crate::FlowError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

/// What a finished flow yields.
pub type FlowOutcome = Result<CallbackResult, FlowError>;

struct PendingFlow {
    id: u64,
    slot: Arc<ResultSlot<FlowOutcome>>,
}

/// Clears the pending flow when `begin_flow` returns or is dropped.
struct PendingGuard<'a> {
    pending: &'a Mutex<Option<PendingFlow>>,
    flow_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if pending.as_ref().is_some_and(|flow| flow.id == self.flow_id) {
            *pending = None;
        }
    }
}

/// Drives the browser round trip for sign-in.
pub struct OAuthFlowCoordinator {
    surface: Arc<dyn ExternalAuthSurface>,
    callback_scheme: String,
    pending: Mutex<Option<PendingFlow>>,
    next_flow_id: AtomicU64,
}

impl OAuthFlowCoordinator {
    pub fn new(surface: Arc<dyn ExternalAuthSurface>, callback_scheme: impl Into<String>) -> Self {
        Self {
            surface,
            callback_scheme: callback_scheme.into(),
            pending: Mutex::new(None),
            next_flow_id: AtomicU64::new(1),
        }
    }

    pub fn callback_scheme(&self) -> &str {
        &self.callback_scheme
    }

    /// Number of flows awaiting a result (0 or 1).
    pub fn pending_count(&self) -> usize {
        usize::from(self.pending.lock().is_some())
    }

    /// Open `authorization_url` and wait until the flow resolves.
    ///
    /// No timeout is applied; the flow ends when the surface ends, a callback
    /// is delivered, or the flow is cancelled.
    pub async fn begin_flow(&self, authorization_url: &Url) -> FlowOutcome {
        let (flow_id, slot, mut rx) = self.register()?;
        let _guard = PendingGuard {
            pending: &self.pending,
            flow_id,
        };

        info!(
            flow_id,
            host = authorization_url.host_str().unwrap_or_default(),
            "Starting OAuth flow"
        );

        let options = PresentationOptions::shared_session(&self.callback_scheme);
        let present = async {
            let outcome = self.surface.present(authorization_url, &options).await;
            let result = self.surface_result(outcome);
            if !slot.resolve(result) {
                debug!(flow_id, "Surface finished after the flow was already resolved");
            }
        };

        let received = tokio::select! {
            received = &mut rx => received,
            () = present => rx.await,
        };

        let outcome = received.unwrap_or(Err(FlowError::Abandoned));
        match &outcome {
            Ok(CallbackResult::Success(_)) => info!(flow_id, "OAuth flow completed"),
            Ok(CallbackResult::Error(message)) => {
                warn!(flow_id, error = %message, "OAuth callback reported an error")
            }
            Err(e) if e.is_cancellation() => info!(flow_id, "OAuth flow cancelled by user"),
            Err(e) => warn!(flow_id, error = %e, "OAuth flow failed"),
        }
        outcome
    }

    /// Offer a URL received outside the surface, e.g. from an OS URL handler.
    ///
    /// Returns `false` when the URL is not on the callback scheme. A claimed
    /// URL resolves the pending flow if there is one that is still waiting.
    pub fn handle_callback_url(&self, url: &Url) -> bool {
        let Some(result) = parse_callback(url, &self.callback_scheme) else {
            return false;
        };

        match self.pending_slot() {
            Some(slot) => {
                if !slot.resolve(Ok(result)) {
                    debug!("Callback arrived after the flow was already resolved");
                }
            }
            None => debug!("Callback arrived with no flow pending"),
        }
        true
    }

    /// Resolve the pending flow as cancelled. Returns whether one was waiting.
    pub fn cancel_flow(&self) -> bool {
        self.pending_slot()
            .is_some_and(|slot| slot.resolve(Err(FlowError::Cancelled)))
    }

    fn register(
        &self,
    ) -> Result<
        (
            u64,
            Arc<ResultSlot<FlowOutcome>>,
            oneshot::Receiver<FlowOutcome>,
        ),
        FlowError,
    > {
        let mut pending = self.pending.lock();
        if let Some(flow) = pending.as_ref() {
            warn!(pending_flow = flow.id, "Rejecting OAuth flow while another is pending");
            return Err(FlowError::AlreadyInProgress);
        }

        let flow_id = self.next_flow_id.fetch_add(1, Ordering::Relaxed);
        let (slot, rx) = ResultSlot::new();
        let slot = Arc::new(slot);
        *pending = Some(PendingFlow {
            id: flow_id,
            slot: slot.clone(),
        });
        Ok((flow_id, slot, rx))
    }

    fn pending_slot(&self) -> Option<Arc<ResultSlot<FlowOutcome>>> {
        self.pending.lock().as_ref().map(|flow| flow.slot.clone())
    }

    fn surface_result(&self, outcome: SurfaceOutcome) -> FlowOutcome {
        match outcome {
            SurfaceOutcome::Callback(url) => parse_callback(&url, &self.callback_scheme)
                .ok_or_else(|| {
                    warn!(scheme = url.scheme(), "Surface returned a URL on a foreign scheme");
                    FlowError::Abandoned
                }),
            SurfaceOutcome::Cancelled => Err(FlowError::Cancelled),
            SurfaceOutcome::LaunchFailed(reason) => Err(FlowError::LaunchFailed(reason)),
        }
    }
}
