//! Confirmation broker
//!
//! Any part of the application can ask the user a yes/no question through a
//! [`ConfirmHandle`] and await the answer. The broker owns a single dialog
//! slot; an always-mounted host reads [`ConfirmationBroker::current`] to paint
//! the dialog and calls [`ConfirmationBroker::settle`] when the user acts.
//!
//! Every request settles exactly once. A request that leaves the slot without
//! an explicit answer (superseded by a newer request, or the broker dropped)
//! settles with `false`.
//!
//! A broker built with a registry puts the dialog on the overlay stack under
//! [`CONFIRM_OVERLAY_ID`] while a request is pending.

use super::error::ConfirmError;
use super::stack::SharedRegistry;
use super::types::{EventSink, OverlayEvent, OverlayId, RequestId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

/// Stack identity of the confirmation dialog
pub const CONFIRM_OVERLAY_ID: &str = "confirm-dialog";

/// Visual tone of a confirmation dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmVariant {
    #[default]
    Info,
    Warning,
    Danger,
    Success,
}

/// What the confirmation dialog should say
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOptions {
    pub title: String,
    pub message: String,
    pub variant: ConfirmVariant,
    pub confirm_text: String,
    pub cancel_text: String,
}

impl ConfirmOptions {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: String::new(),
            variant: ConfirmVariant::default(),
            confirm_text: "Confirm".to_string(),
            cancel_text: "Cancel".to_string(),
        }
    }

    /// Preset for destructive deletes of a named record
    pub fn delete(entity_name: &str) -> Self {
        Self::new(format!("Delete {entity_name}?"))
            .with_message(format!(
                "Are you sure you want to delete {entity_name}? This action cannot be undone."
            ))
            .with_variant(ConfirmVariant::Danger)
            .with_confirm_text("Delete")
            .with_cancel_text("Cancel")
    }

    /// Preset for leaving a form with unsaved edits
    pub fn unsaved_changes() -> Self {
        Self::new("Unsaved changes")
            .with_message(
                "You have unsaved changes. Are you sure you want to leave? Your changes will be lost.",
            )
            .with_variant(ConfirmVariant::Warning)
            .with_confirm_text("Leave")
            .with_cancel_text("Stay")
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_variant(mut self, variant: ConfirmVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_confirm_text(mut self, text: impl Into<String>) -> Self {
        self.confirm_text = text.into();
        self
    }

    pub fn with_cancel_text(mut self, text: impl Into<String>) -> Self {
        self.cancel_text = text.into();
        self
    }
}

/// The request currently occupying the dialog slot, as seen by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmPrompt {
    pub id: RequestId,
    pub options: ConfirmOptions,
    /// Stack priority, when the broker is wired to a registry
    pub priority: Option<i32>,
}

struct PendingConfirm {
    id: RequestId,
    options: ConfirmOptions,
    priority: Option<i32>,
    settle: oneshot::Sender<bool>,
}

impl PendingConfirm {
    fn settle(self, confirmed: bool, events: &EventSink) {
        debug!("Settling confirmation '{}' with {}", self.id, confirmed);
        // The caller may have stopped awaiting; the request is retired either way.
        let _ = self.settle.send(confirmed);
        events.send(OverlayEvent::ConfirmSettled {
            request: self.id,
            confirmed,
        });
    }
}

#[derive(Default)]
struct BrokerState {
    pending: Option<PendingConfirm>,
    registry: Option<SharedRegistry>,
    events: EventSink,
}

impl BrokerState {
    fn post(&mut self, options: ConfirmOptions) -> oneshot::Receiver<bool> {
        if let Some(previous) = self.pending.take() {
            debug!("Confirmation '{}' superseded", previous.id);
            previous.settle(false, &self.events);
        }

        let (settle, receiver) = oneshot::channel();
        let id = RequestId::new();
        info!("Confirmation '{}' requested: {}", id, options.title);

        self.pending = Some(PendingConfirm {
            id,
            options,
            priority: None,
            settle,
        });
        self.events
            .send(OverlayEvent::ConfirmRequested { request: id });
        receiver
    }

    /// Settle the pending request and take the dialog off the stack
    async fn settle_current(&mut self, confirmed: bool) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        pending.settle(confirmed, &self.events);

        if let Some(registry) = &self.registry {
            registry
                .write()
                .await
                .unregister(&OverlayId::from(CONFIRM_OVERLAY_ID));
        }
        true
    }

    /// Put the pending request's dialog on top of the stack
    async fn raise(&mut self) {
        let Some(registry) = &self.registry else {
            return;
        };
        let priority = registry.write().await.register(CONFIRM_OVERLAY_ID);
        if let Some(pending) = self.pending.as_mut() {
            pending.priority = Some(priority);
        }
    }
}

impl Drop for BrokerState {
    fn drop(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        warn!("Confirmation broker dropped with request '{}' pending", pending.id);
        pending.settle(false, &self.events);

        if let Some(registry) = &self.registry {
            match registry.try_write() {
                Ok(mut registry) => {
                    registry.unregister(&OverlayId::from(CONFIRM_OVERLAY_ID));
                }
                Err(_) => warn!("Registry busy; confirmation dialog left on the stack"),
            }
        }
    }
}

/// Owner of the confirmation dialog slot
pub struct ConfirmationBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl ConfirmationBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
        }
    }

    /// A broker whose dialog joins `registry` while a request is pending
    pub fn with_registry(registry: SharedRegistry) -> Self {
        let mut state = BrokerState::default();
        state.registry = Some(registry);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Set the event sender for confirmation events
    pub async fn set_event_sender(&self, sender: mpsc::UnboundedSender<OverlayEvent>) {
        self.state.lock().await.events.set(sender);
    }

    /// A handle consumers use to request confirmations
    pub fn handle(&self) -> ConfirmHandle {
        ConfirmHandle {
            state: Arc::downgrade(&self.state),
        }
    }

    /// The request the dialog host should currently display
    pub async fn current(&self) -> Option<ConfirmPrompt> {
        self.state
            .lock()
            .await
            .pending
            .as_ref()
            .map(|pending| ConfirmPrompt {
                id: pending.id,
                options: pending.options.clone(),
                priority: pending.priority,
            })
    }

    pub async fn has_pending(&self) -> bool {
        self.state.lock().await.pending.is_some()
    }

    /// Answer a specific request
    ///
    /// Fails with [`ConfirmError::UnknownRequest`] if the request has already
    /// been settled or superseded.
    pub async fn settle(&self, id: RequestId, confirmed: bool) -> Result<(), ConfirmError> {
        let mut state = self.state.lock().await;
        if !state.pending.as_ref().is_some_and(|pending| pending.id == id) {
            warn!("Ignoring settlement of stale confirmation '{}'", id);
            return Err(ConfirmError::UnknownRequest(id));
        }
        state.settle_current(confirmed).await;
        Ok(())
    }

    /// User pressed the confirm button
    pub async fn confirm_current(&self) -> bool {
        self.state.lock().await.settle_current(true).await
    }

    /// User pressed the cancel button
    pub async fn cancel_current(&self) -> bool {
        self.state.lock().await.settle_current(false).await
    }

    /// Dialog dismissed without a choice (escape, backdrop click)
    pub async fn dismiss(&self) -> bool {
        self.cancel_current().await
    }
}

impl Default for ConfirmationBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of the broker
///
/// Holds a weak reference: once the broker is gone every request fails
/// with [`ConfirmError::NoActiveBroker`] instead of being silently ignored.
#[derive(Clone)]
pub struct ConfirmHandle {
    state: Weak<Mutex<BrokerState>>,
}

impl ConfirmHandle {
    /// A handle that is not attached to any broker
    pub fn detached() -> Self {
        Self { state: Weak::new() }
    }

    pub fn is_attached(&self) -> bool {
        self.state.strong_count() > 0
    }

    /// Ask the user and wait for the answer
    pub async fn confirm(&self, options: ConfirmOptions) -> Result<bool, ConfirmError> {
        let receiver = {
            let Some(state) = self.state.upgrade() else {
                error!(
                    "Confirmation '{}' requested without an active broker",
                    options.title
                );
                return Err(ConfirmError::NoActiveBroker);
            };
            let mut guard = state.lock().await;
            let receiver = guard.post(options);
            guard.raise().await;
            receiver
        };

        // A dropped sender means the broker went away: treat as a cancel.
        Ok(receiver.await.unwrap_or(false))
    }

    pub async fn confirm_delete(&self, entity_name: &str) -> Result<bool, ConfirmError> {
        self.confirm(ConfirmOptions::delete(entity_name)).await
    }

    pub async fn confirm_unsaved_changes(&self) -> Result<bool, ConfirmError> {
        self.confirm(ConfirmOptions::unsaved_changes()).await
    }

    /// Ask, then run `on_confirm` only if the user agreed
    ///
    /// Returns `Ok(None)` when the user declined. A failing action is logged
    /// and reported as [`ConfirmError::ActionFailed`].
    pub async fn confirm_then<F, Fut, T>(
        &self,
        options: ConfirmOptions,
        on_confirm: F,
    ) -> Result<Option<T>, ConfirmError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if !self.confirm(options).await? {
            return Ok(None);
        }

        match on_confirm().await {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!("Confirmed action failed: {:#}", err);
                Err(ConfirmError::ActionFailed(err))
            }
        }
    }
}
