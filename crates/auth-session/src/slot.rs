//! One-shot result slot with an explicit resolved guard.

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

enum SlotState<T> {
    Waiting(oneshot::Sender<T>),
    Resolved,
}

/// Delivers exactly one value to a waiting receiver.
///
/// Later `resolve` calls are no-ops. Dropping an unresolved slot closes the
/// receiver, so a waiter never hangs on a slot nobody holds.
pub struct ResultSlot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> ResultSlot<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let slot = Self {
            state: Mutex::new(SlotState::Waiting(tx)),
        };
        (slot, rx)
    }

    /// Resolve the slot. Returns `false` if it was already resolved.
    pub fn resolve(&self, value: T) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), SlotState::Resolved);
        match previous {
            SlotState::Waiting(tx) => {
                if tx.send(value).is_err() {
                    debug!("Result slot resolved after its receiver went away");
                }
                true
            }
            SlotState::Resolved => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_once() {
        let (slot, rx) = ResultSlot::new();
        assert!(!slot.is_resolved());

        assert!(slot.resolve(1));
        assert!(!slot.resolve(2));
        assert!(slot.is_resolved());

        assert_eq!(rx.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drop_closes_receiver() {
        let (slot, rx) = ResultSlot::<u8>::new();
        drop(slot);
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_resolve_without_receiver_does_not_panic() {
        let (slot, rx) = ResultSlot::new();
        drop(rx);
        assert!(slot.resolve("late"));
        assert!(!slot.resolve("later"));
    }
}
