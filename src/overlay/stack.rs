//! Overlay stack registry
//!
//! The registry is responsible for:
//! - Tracking the overlays that are currently open and their draw order
//! - Assigning each overlay a layering priority
//! - Holding the reference-counted background scroll lock
//! - Routing dismissal keys to the top-most overlay only

use super::types::{EventSink, OverlayEvent, OverlayId};
use crate::config::OverlayConfig;
use crossterm::event::{KeyCode, KeyEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};

/// A bare `Esc` press, the only key that dismisses overlays
pub fn is_escape(event: &KeyEvent) -> bool {
    event.code == KeyCode::Esc && event.modifiers.is_empty()
}

/// Registry shared between the overlay root and its controllers
pub type SharedRegistry = Arc<RwLock<StackRegistry>>;

/// An open overlay and its layering priority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    /// Overlay identifier
    id: OverlayId,

    /// Layering priority (higher = drawn on top)
    priority: i32,
}

impl StackEntry {
    fn new(id: OverlayId, priority: i32) -> Self {
        Self { id, priority }
    }

    pub fn id(&self) -> &OverlayId {
        &self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Tracks open overlays in draw order
#[derive(Debug)]
pub struct StackRegistry {
    /// Open overlays, bottom first; priorities are strictly ascending
    entries: Vec<StackEntry>,

    /// Priority of the first overlay on an empty stack
    base_priority: i32,

    /// Gap between consecutive priorities
    priority_step: i32,

    /// Event sender for stack events
    events: EventSink,
}

impl StackRegistry {
    /// Create a registry with the default priority scheme
    pub fn new() -> Self {
        Self::with_config(&OverlayConfig::default())
    }

    pub fn with_config(config: &OverlayConfig) -> Self {
        Self {
            entries: Vec::new(),
            base_priority: config.base_priority,
            priority_step: config.priority_step,
            events: EventSink::default(),
        }
    }

    /// Wrap the registry for sharing with controllers
    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Set the event sender for stack events
    pub fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<OverlayEvent>) {
        self.events.set(sender);
    }

    /// Register an overlay and return its priority
    ///
    /// Registering an id that is already top-most keeps its priority.
    /// Registering an id that is lower in the stack moves it to the top
    /// with a fresh priority; it is never duplicated.
    pub fn register(&mut self, id: impl Into<OverlayId>) -> i32 {
        let id = id.into();

        if let Some(index) = self.position(&id) {
            if index + 1 == self.entries.len() {
                trace!("Overlay '{}' already top-most", id);
                return self.entries[index].priority;
            }
            self.entries.remove(index);
            debug!("Moving overlay '{}' to the top of the stack", id);
        }

        let was_empty = self.entries.is_empty();
        let priority = self.next_priority();
        self.entries.push(StackEntry::new(id.clone(), priority));

        debug!(
            "Registered overlay '{}' at priority {} (depth {})",
            id,
            priority,
            self.entries.len()
        );
        self.events.send(OverlayEvent::Registered { id, priority });

        if was_empty {
            debug!("Scroll lock acquired");
            self.events
                .send(OverlayEvent::ScrollLockChanged { locked: true });
        }

        priority
    }

    /// Remove an overlay from the stack
    ///
    /// Unknown ids are ignored. The scroll lock is released only when the
    /// last overlay leaves, whatever order overlays close in.
    pub fn unregister(&mut self, id: &OverlayId) -> Option<StackEntry> {
        let index = match self.position(id) {
            Some(index) => index,
            None => {
                trace!("Ignoring unregister of unknown overlay '{}'", id);
                return None;
            }
        };

        let entry = self.entries.remove(index);
        debug!(
            "Unregistered overlay '{}' (depth {})",
            id,
            self.entries.len()
        );
        self.events
            .send(OverlayEvent::Unregistered { id: id.clone() });

        if self.entries.is_empty() {
            debug!("Scroll lock released");
            self.events
                .send(OverlayEvent::ScrollLockChanged { locked: false });
        }

        Some(entry)
    }

    /// Unregister every overlay, top first
    pub fn clear(&mut self) {
        while let Some(entry) = self.entries.last() {
            let id = entry.id.clone();
            self.unregister(&id);
        }
    }

    /// Priority of a registered overlay, or the base priority if unknown
    pub fn priority_of(&self, id: &OverlayId) -> i32 {
        self.position(id)
            .map(|index| self.entries[index].priority)
            .unwrap_or(self.base_priority)
    }

    pub fn base_priority(&self) -> i32 {
        self.base_priority
    }

    /// Number of registered overlays
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &OverlayId) -> bool {
        self.position(id).is_some()
    }

    /// Whether background scrolling is currently suppressed
    pub fn is_scroll_locked(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Registered overlays, bottom first
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    /// The overlay with the highest priority
    pub fn top(&self) -> Option<&StackEntry> {
        self.entries.last()
    }

    pub fn is_topmost(&self, id: &OverlayId) -> bool {
        self.top().is_some_and(|entry| &entry.id == id)
    }

    /// The only overlay allowed to react to a dismissal
    pub fn escape_target(&self) -> Option<&OverlayId> {
        self.top().map(|entry| &entry.id)
    }

    /// Whether `id` should react to an escape key press
    ///
    /// Overlays call this from their own key handlers; only the top-most
    /// one gets `true`, so a single press never dismisses two overlays.
    pub fn should_dismiss(&self, id: &OverlayId) -> bool {
        self.is_topmost(id)
    }

    /// Route a key event to the overlay that should be dismissed
    ///
    /// Returns the top-most overlay for a bare `Esc`, `None` for anything
    /// else or when the stack is empty.
    pub fn handle_key_event(&self, event: &KeyEvent) -> Option<OverlayId> {
        if !is_escape(event) {
            return None;
        }

        let target = self.escape_target().cloned();
        if let Some(id) = &target {
            debug!("Escape routed to overlay '{}'", id);
        }
        target
    }

    fn next_priority(&self) -> i32 {
        let depth = i32::try_from(self.entries.len()).unwrap_or(i32::MAX);
        let by_depth = self
            .base_priority
            .saturating_add(self.priority_step.saturating_mul(depth));

        // After out-of-order closes the depth formula could hand out a
        // priority still held by a registered overlay.
        match self.entries.last() {
            Some(top) => by_depth.max(top.priority.saturating_add(self.priority_step)),
            None => by_depth,
        }
    }

    fn position(&self, id: &OverlayId) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.id == id)
    }
}

impl Default for StackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
