//! Overlay manager
//!
//! The composition root for overlays. It owns the configuration, the shared
//! stack registry and the confirmation broker, and hands out controllers
//! already wired to them. Nothing here is global: construct one manager per
//! application shell and pass it (or the handles it produces) down.

use super::confirm::{ConfirmHandle, ConfirmationBroker, CONFIRM_OVERLAY_ID};
use super::drawer::EntityDrawerController;
use super::error::{ConfigError, WizardError};
use super::location::LocationSync;
use super::payload::PayloadModalController;
use super::search::{DebouncedLookup, LookupSource};
use super::stack::{SharedRegistry, StackRegistry};
use super::types::{EventSink, OverlayEvent, OverlayId};
use super::wizard::{StepData, WizardEngine};
use crate::config::OverlayConfig;
use crossterm::event::KeyEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// What an escape key press resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscapeOutcome {
    /// The pending confirmation was answered with "no"
    ConfirmationDismissed,
    /// This overlay is top-most and should close itself
    Dismiss(OverlayId),
    /// Not an escape, or nothing to dismiss
    Ignored,
}

/// Owns the shared overlay services and builds controllers around them
pub struct OverlayManager {
    config: OverlayConfig,
    registry: SharedRegistry,
    broker: ConfirmationBroker,
    events: EventSink,
}

impl OverlayManager {
    /// Create a manager after validating `config`
    pub fn new(config: OverlayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = StackRegistry::with_config(&config).shared();
        let broker = ConfirmationBroker::with_registry(Arc::clone(&registry));
        info!(
            "Overlay manager ready (base priority {}, grace window {:?})",
            config.base_priority,
            config.grace_window()
        );
        Ok(Self {
            config,
            registry,
            broker,
            events: EventSink::default(),
        })
    }

    /// Route events from the registry, the broker and every controller
    /// built afterwards to `sender`
    pub async fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<OverlayEvent>) {
        self.registry.write().await.set_event_sender(sender.clone());
        self.broker.set_event_sender(sender.clone()).await;
        self.events.set(sender);
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// The broker the confirmation dialog host renders from
    pub fn broker(&self) -> &ConfirmationBroker {
        &self.broker
    }

    pub fn confirm_handle(&self) -> ConfirmHandle {
        self.broker.handle()
    }

    pub fn drawer(&self, id: impl Into<OverlayId>) -> EntityDrawerController {
        let mut drawer =
            EntityDrawerController::new(id, &self.config).with_registry(self.registry());
        if let Some(sender) = self.events.sender() {
            drawer = drawer.with_event_sender(sender);
        }
        drawer
    }

    /// A drawer that mirrors its entity into the address bar
    pub fn synced_drawer(
        &self,
        id: impl Into<OverlayId>,
        location: Arc<dyn LocationSync>,
    ) -> EntityDrawerController {
        self.drawer(id).with_location(location)
    }

    pub fn modal<P>(&self, id: impl Into<OverlayId>) -> PayloadModalController<P>
    where
        P: Clone + Send + Sync + 'static,
    {
        let mut modal =
            PayloadModalController::new(id, &self.config).with_registry(self.registry());
        if let Some(sender) = self.events.sender() {
            modal = modal.with_event_sender(sender);
        }
        modal
    }

    pub fn wizard<T: StepData>(
        &self,
        id: impl Into<OverlayId>,
        total_steps: usize,
    ) -> Result<WizardEngine<T>, WizardError> {
        let mut wizard = WizardEngine::new(id, total_steps)?.with_registry(self.registry());
        if let Some(sender) = self.events.sender() {
            wizard = wizard.with_event_sender(sender);
        }
        Ok(wizard)
    }

    pub fn lookup<R>(&self, source: Arc<dyn LookupSource<R>>) -> DebouncedLookup<R>
    where
        R: Clone + Send + Sync + 'static,
    {
        DebouncedLookup::new(source, &self.config)
    }

    /// Route a key event to whatever should react to it
    ///
    /// Only the top-most overlay sees escape. When that is the confirmation
    /// dialog the pending request is answered "no" here.
    pub async fn handle_key_event(&self, event: &KeyEvent) -> EscapeOutcome {
        let target = self.registry.read().await.handle_key_event(event);
        let Some(target) = target else {
            return EscapeOutcome::Ignored;
        };

        if target.as_str() != CONFIRM_OVERLAY_ID {
            return EscapeOutcome::Dismiss(target);
        }
        if self.broker.dismiss().await {
            debug!("Escape dismissed pending confirmation");
            EscapeOutcome::ConfirmationDismissed
        } else {
            trace!("Confirmation dialog already settled");
            EscapeOutcome::Ignored
        }
    }
}
