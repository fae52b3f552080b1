//! Cancellable scheduled actions
//!
//! Controllers use this to clear payload or identity data once an exit
//! transition has had time to finish. A new `open()` cancels the pending
//! action before it can wipe fresh state.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// A single pending action that runs after a delay unless cancelled
#[derive(Debug)]
pub struct DeferredAction {
    label: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl DeferredAction {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            handle: None,
        }
    }

    /// Run `action` after `delay`, replacing any action still pending.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        trace!("Scheduling {} in {:?}", self.label, delay);
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    /// Cancel the pending action; returns whether one was still pending.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                trace!("Cancelled pending {}", self.label);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DeferredAction {
    fn drop(&mut self) {
        self.cancel();
    }
}
