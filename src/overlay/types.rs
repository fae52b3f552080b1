//! Core overlay types
//!
//! Identifiers shared by every controller, the entity kinds a drawer can show,
//! and the event stream the render layer can subscribe to.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::sync::mpsc;

use super::error::DrawerError;

/// Unique identifier for an overlay instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverlayId(pub String);

impl OverlayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OverlayId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OverlayId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&OverlayId> for OverlayId {
    fn from(id: &OverlayId) -> Self {
        id.clone()
    }
}

impl std::fmt::Display for OverlayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single confirmation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Business entities that can be shown in the entity drawer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Candidate,
    Job,
    Account,
    Deal,
    Employee,
    Contact,
    Lead,
    Submission,
    Placement,
    Vendor,
    Campaign,
}

impl EntityKind {
    pub const ALL: [EntityKind; 11] = [
        EntityKind::Candidate,
        EntityKind::Job,
        EntityKind::Account,
        EntityKind::Deal,
        EntityKind::Employee,
        EntityKind::Contact,
        EntityKind::Lead,
        EntityKind::Submission,
        EntityKind::Placement,
        EntityKind::Vendor,
        EntityKind::Campaign,
    ];

    /// Name used in the address bar and in events
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Candidate => "candidate",
            EntityKind::Job => "job",
            EntityKind::Account => "account",
            EntityKind::Deal => "deal",
            EntityKind::Employee => "employee",
            EntityKind::Contact => "contact",
            EntityKind::Lead => "lead",
            EntityKind::Submission => "submission",
            EntityKind::Placement => "placement",
            EntityKind::Vendor => "vendor",
            EntityKind::Campaign => "campaign",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = DrawerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DrawerError::UnknownEntityKind(s.to_string()))
    }
}

/// Events emitted by the overlay core for the render layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayEvent {
    /// Overlay joined the stack
    Registered { id: OverlayId, priority: i32 },
    /// Overlay left the stack
    Unregistered { id: OverlayId },
    /// Background scrolling was suppressed or released
    ScrollLockChanged { locked: bool },
    /// A confirmation request took the dialog slot
    ConfirmRequested { request: RequestId },
    /// A confirmation request was answered
    ConfirmSettled { request: RequestId, confirmed: bool },
    /// Overlay became visible
    Opened { id: OverlayId },
    /// Overlay started its exit transition
    Closed { id: OverlayId },
    /// Payload or identity dropped after the grace window
    Cleared { id: OverlayId },
    /// Drawer now shows a different entity
    EntityChanged {
        id: OverlayId,
        kind: EntityKind,
        entity_id: String,
    },
    /// Wizard moved between steps
    StepChanged { id: OverlayId, from: usize, to: usize },
}

/// Optional event sender shared by controllers
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink(Option<mpsc::UnboundedSender<OverlayEvent>>);

impl EventSink {
    pub(crate) fn sender(&self) -> Option<mpsc::UnboundedSender<OverlayEvent>> {
        self.0.clone()
    }

    pub(crate) fn set(&mut self, sender: mpsc::UnboundedSender<OverlayEvent>) {
        self.0 = Some(sender);
    }

    /// Send an event if a sender is configured; a closed receiver is ignored.
    pub(crate) fn send(&self, event: OverlayEvent) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(event);
        }
    }
}
