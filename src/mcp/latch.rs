//! Write-once failure latch shared between the session and its waiters.

use std::sync::Arc;

use tokio::sync::watch;

use crate::mcp::error::TransportError;

/// Single-write failure slot for one session.
///
/// The first `set` wins; later calls are ignored. Every blocked listener is
/// woken directly through the underlying watch channel, and callers that
/// subscribe after the fact observe the same cause immediately.
#[derive(Clone)]
pub struct ErrorLatch {
    slot: Arc<watch::Sender<Option<TransportError>>>,
}

impl ErrorLatch {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot: Arc::new(slot) }
    }

    /// Latch a terminal cause. Returns `true` when this call was the first
    /// writer.
    pub fn set(&self, cause: TransportError) -> bool {
        self.slot.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause);
            true
        })
    }

    pub fn is_set(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn get(&self) -> Option<TransportError> {
        self.slot.borrow().clone()
    }

    /// Receiver for waiting on the latch alongside other events.
    pub fn subscribe(&self) -> watch::Receiver<Option<TransportError>> {
        self.slot.subscribe()
    }
}

impl Default for ErrorLatch {
    fn default() -> Self {
        Self::new()
    }
}
