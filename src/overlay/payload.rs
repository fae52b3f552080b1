//! Payload modal controller
//!
//! A modal that carries one optional payload while open (the record being
//! edited, the candidate being submitted). The payload outlives `close()` by
//! the grace window so the exit transition still has something to render.

use super::deferred::DeferredAction;
use super::error::ModalError;
use super::stack::SharedRegistry;
use super::types::{EventSink, OverlayEvent, OverlayId};
use crate::config::OverlayConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

/// What the render layer paints
#[derive(Debug, Clone, PartialEq)]
pub struct ModalSnapshot<P> {
    pub is_open: bool,
    pub payload: Option<P>,
    pub is_submitting: bool,
    pub priority: Option<i32>,
}

#[derive(Debug)]
struct ModalState<P> {
    is_open: bool,
    payload: Option<P>,
    is_submitting: bool,
    priority: Option<i32>,
    generation: u64,
    /// Identifies the submission that owns `is_submitting`
    submission: u64,
    pending_clear: DeferredAction,
}

impl<P> ModalState<P> {
    /// Clear the in-flight flag if `submission` still owns it
    fn release_submission(&mut self, submission: u64) {
        if self.submission == submission {
            self.is_submitting = false;
        }
    }
}

/// Controller for a modal with an attached payload
pub struct PayloadModalController<P> {
    id: OverlayId,
    state: Arc<RwLock<ModalState<P>>>,
    grace_window: Duration,
    registry: Option<SharedRegistry>,
    events: EventSink,
}

impl<P> Clone for PayloadModalController<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            state: Arc::clone(&self.state),
            grace_window: self.grace_window,
            registry: self.registry.clone(),
            events: self.events.clone(),
        }
    }
}

impl<P> PayloadModalController<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new(id: impl Into<OverlayId>, config: &OverlayConfig) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(RwLock::new(ModalState {
                is_open: false,
                payload: None,
                is_submitting: false,
                priority: None,
                generation: 0,
                submission: 0,
                pending_clear: DeferredAction::new("modal payload clear"),
            })),
            grace_window: config.grace_window(),
            registry: None,
            events: EventSink::default(),
        }
    }

    pub fn with_registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_event_sender(mut self, sender: mpsc::UnboundedSender<OverlayEvent>) -> Self {
        self.events.set(sender);
        self
    }

    pub fn id(&self) -> &OverlayId {
        &self.id
    }

    /// Open the modal, replacing any payload it had
    pub async fn open(&self, payload: Option<P>) {
        // Registry before state, the same order as `close`.
        let mut registry = match &self.registry {
            Some(registry) => Some(registry.write().await),
            None => None,
        };
        let mut state = self.state.write().await;

        let was_open = state.is_open;
        if state.pending_clear.cancel() {
            debug!("Modal '{}' reopened within grace window", self.id);
        }
        if !was_open {
            state.priority = registry.as_mut().map(|registry| registry.register(&self.id));
        }
        state.generation += 1;
        state.is_open = true;
        state.payload = payload;
        drop(state);
        drop(registry);

        if !was_open {
            info!("Modal '{}' opened", self.id);
            self.events.send(OverlayEvent::Opened {
                id: self.id.clone(),
            });
        }
    }

    /// Start closing; the payload is dropped after the grace window
    pub async fn close(&self) {
        let mut registry = match &self.registry {
            Some(registry) => Some(registry.write().await),
            None => None,
        };
        let mut state = self.state.write().await;
        if !state.is_open {
            return;
        }
        state.is_open = false;
        state.is_submitting = false;
        state.priority = None;
        state.generation += 1;
        if let Some(registry) = registry.as_mut() {
            registry.unregister(&self.id);
        }

        let generation = state.generation;
        let weak = Arc::downgrade(&self.state);
        let events = self.events.clone();
        let id = self.id.clone();
        state.pending_clear.schedule(self.grace_window, async move {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let mut state = state.write().await;
            if state.generation == generation && !state.is_open {
                state.payload = None;
                debug!("Modal '{}' payload cleared", id);
                events.send(OverlayEvent::Cleared { id });
            }
        });
        drop(state);
        drop(registry);

        info!("Modal '{}' closed", self.id);
        self.events.send(OverlayEvent::Closed {
            id: self.id.clone(),
        });
    }

    /// Close when open, otherwise open with `payload`
    pub async fn toggle(&self, payload: Option<P>) {
        if self.is_open().await {
            self.close().await;
        } else {
            self.open(payload).await;
        }
    }

    /// Hand the payload to `on_submit` and close on success
    ///
    /// On failure the modal stays open with its payload so the user can
    /// retry.
    pub async fn submit<F, Fut>(&self, on_submit: F) -> Result<(), ModalError>
    where
        F: FnOnce(Option<P>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let (payload, generation, submission) = {
            let mut state = self.state.write().await;
            if !state.is_open {
                error!("Submit on closed modal '{}'", self.id);
                return Err(ModalError::NotOpen(self.id.clone()));
            }
            if state.is_submitting {
                error!("Modal '{}' is already submitting", self.id);
                return Err(ModalError::AlreadySubmitting(self.id.clone()));
            }
            state.is_submitting = true;
            state.submission += 1;
            (state.payload.clone(), state.generation, state.submission)
        };

        debug!("Submitting modal '{}'", self.id);
        match on_submit(payload).await {
            Ok(()) => {
                let unchanged = {
                    let mut state = self.state.write().await;
                    state.release_submission(submission);
                    state.generation == generation
                };
                if unchanged {
                    self.close().await;
                } else {
                    debug!("Modal '{}' changed during submit; leaving it as is", self.id);
                }
                Ok(())
            }
            Err(err) => {
                warn!("Modal '{}' submission failed: {:#}", self.id, err);
                self.state.write().await.release_submission(submission);
                Err(ModalError::SubmitFailed(err))
            }
        }
    }

    pub async fn snapshot(&self) -> ModalSnapshot<P> {
        let state = self.state.read().await;
        ModalSnapshot {
            is_open: state.is_open,
            payload: state.payload.clone(),
            is_submitting: state.is_submitting,
            priority: state.priority,
        }
    }

    pub async fn payload(&self) -> Option<P> {
        self.state.read().await.payload.clone()
    }

    pub async fn is_open(&self) -> bool {
        self.state.read().await.is_open
    }

    pub async fn is_submitting(&self) -> bool {
        self.state.read().await.is_submitting
    }
}
