//! Entity drawer controller
//!
//! Tracks which single entity is shown in the side panel. Closing starts the
//! exit transition immediately but keeps the entity around for the grace
//! window so the panel does not go blank mid-animation. Any `open()` during
//! that window cancels the pending clear.

use super::deferred::DeferredAction;
use super::error::DrawerError;
use super::location::LocationSync;
use super::stack::SharedRegistry;
use super::types::{EntityKind, EventSink, OverlayEvent, OverlayId};
use crate::config::OverlayConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, trace};

/// The entity a drawer is showing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawerEntity {
    pub kind: EntityKind,
    pub id: String,
}

/// What the render layer paints
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrawerSnapshot {
    pub is_open: bool,
    pub entity: Option<DrawerEntity>,
    pub priority: Option<i32>,
}

#[derive(Debug)]
struct DrawerState {
    is_open: bool,
    entity: Option<DrawerEntity>,
    priority: Option<i32>,
    /// Bumped on every open and close so a stale clear can detect it lost
    generation: u64,
    pending_clear: DeferredAction,
}

struct UrlSync {
    location: Arc<dyn LocationSync>,
    drawer_param: String,
    entity_param: String,
}

impl UrlSync {
    fn write(&self, entity: &DrawerEntity) {
        self.location.set_query_params(&[
            (self.drawer_param.as_str(), entity.kind.as_str()),
            (self.entity_param.as_str(), entity.id.as_str()),
        ]);
    }

    fn remove(&self) {
        self.location
            .remove_query_params(&[self.drawer_param.as_str(), self.entity_param.as_str()]);
    }
}

/// Controller for the entity side panel
#[derive(Clone)]
pub struct EntityDrawerController {
    id: OverlayId,
    state: Arc<RwLock<DrawerState>>,
    grace_window: Duration,
    drawer_param: String,
    entity_param: String,
    registry: Option<SharedRegistry>,
    url_sync: Option<Arc<UrlSync>>,
    events: EventSink,
}

impl EntityDrawerController {
    pub fn new(id: impl Into<OverlayId>, config: &OverlayConfig) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(RwLock::new(DrawerState {
                is_open: false,
                entity: None,
                priority: None,
                generation: 0,
                pending_clear: DeferredAction::new("drawer clear"),
            })),
            grace_window: config.grace_window(),
            drawer_param: config.drawer_param.clone(),
            entity_param: config.entity_param.clone(),
            registry: None,
            url_sync: None,
            events: EventSink::default(),
        }
    }

    /// Register with the overlay stack while open
    pub fn with_registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Mirror the open entity into the address bar
    pub fn with_location(mut self, location: Arc<dyn LocationSync>) -> Self {
        self.url_sync = Some(Arc::new(UrlSync {
            location,
            drawer_param: self.drawer_param.clone(),
            entity_param: self.entity_param.clone(),
        }));
        self
    }

    pub fn with_event_sender(mut self, sender: mpsc::UnboundedSender<OverlayEvent>) -> Self {
        self.events.set(sender);
        self
    }

    pub fn id(&self) -> &OverlayId {
        &self.id
    }

    pub fn grace_window(&self) -> Duration {
        self.grace_window
    }

    /// Show `entity_id` of `kind`
    ///
    /// When already open for another entity the identity is swapped in one
    /// step, with no empty state in between.
    pub async fn open(&self, kind: EntityKind, entity_id: impl Into<String>) {
        let entity = DrawerEntity {
            kind,
            id: entity_id.into(),
        };

        // Registry before state, the same order as `close`.
        let mut registry = match &self.registry {
            Some(registry) => Some(registry.write().await),
            None => None,
        };
        let mut state = self.state.write().await;

        let was_open = state.is_open;
        if state.pending_clear.cancel() {
            debug!("Drawer '{}' reopened within grace window", self.id);
        }
        if !was_open {
            state.priority = registry.as_mut().map(|registry| registry.register(&self.id));
        }
        state.generation += 1;
        state.is_open = true;
        state.entity = Some(entity.clone());
        drop(state);
        drop(registry);

        if !was_open {
            info!("Drawer '{}' opened for {} {}", self.id, entity.kind, entity.id);
            self.events.send(OverlayEvent::Opened {
                id: self.id.clone(),
            });
        } else {
            debug!("Drawer '{}' switched to {} {}", self.id, entity.kind, entity.id);
        }
        self.events.send(OverlayEvent::EntityChanged {
            id: self.id.clone(),
            kind: entity.kind,
            entity_id: entity.id.clone(),
        });

        if let Some(sync) = &self.url_sync {
            sync.write(&entity);
        }
    }

    /// Start closing; the entity is cleared after the grace window
    pub async fn close(&self) {
        let mut registry = match &self.registry {
            Some(registry) => Some(registry.write().await),
            None => None,
        };
        let mut state = self.state.write().await;
        if !state.is_open {
            trace!("Drawer '{}' already closed", self.id);
            return;
        }
        state.is_open = false;
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
                state.entity = None;
                debug!("Drawer '{}' cleared after grace window", id);
                events.send(OverlayEvent::Cleared { id });
            }
        });
        drop(state);
        drop(registry);

        info!("Drawer '{}' closed", self.id);
        self.events.send(OverlayEvent::Closed {
            id: self.id.clone(),
        });

        if let Some(sync) = &self.url_sync {
            sync.remove();
        }
    }

    /// Open the drawer from the address bar's parameters
    ///
    /// Meant for the initial mount of a deep link. Browser back/forward is
    /// not wired to this; the address bar is written, not observed.
    pub async fn restore_from_location(&self) -> Result<bool, DrawerError> {
        let sync = self
            .url_sync
            .as_ref()
            .ok_or_else(|| DrawerError::NoLocation(self.id.clone()))?;

        let kind = sync.location.query_param(&sync.drawer_param);
        let entity_id = sync.location.query_param(&sync.entity_param);
        match (kind, entity_id) {
            (Some(kind), Some(entity_id)) if !entity_id.is_empty() => {
                let kind: EntityKind = kind.parse()?;
                self.open(kind, entity_id).await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn snapshot(&self) -> DrawerSnapshot {
        let state = self.state.read().await;
        DrawerSnapshot {
            is_open: state.is_open,
            entity: state.entity.clone(),
            priority: state.priority,
        }
    }

    pub async fn is_open(&self) -> bool {
        self.state.read().await.is_open
    }

    pub async fn entity(&self) -> Option<DrawerEntity> {
        self.state.read().await.entity.clone()
    }

    /// Whether a clear is still waiting for the grace window
    pub async fn is_clear_pending(&self) -> bool {
        self.state.read().await.pending_clear.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::location::MemoryLocation;
    use crate::overlay::stack::StackRegistry;
    use tokio::time::sleep;

    fn drawer() -> EntityDrawerController {
        EntityDrawerController::new("entity-drawer", &OverlayConfig::default())
    }

    fn entity(kind: EntityKind, id: &str) -> Option<DrawerEntity> {
        Some(DrawerEntity {
            kind,
            id: id.to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_defers_clear() {
        let drawer = drawer();
        drawer.open(EntityKind::Candidate, "42").await;
        drawer.close().await;

        let snapshot = drawer.snapshot().await;
        assert!(!snapshot.is_open);
        assert_eq!(snapshot.entity, entity(EntityKind::Candidate, "42"));
        assert!(drawer.is_clear_pending().await);

        sleep(Duration::from_millis(299)).await;
        assert_eq!(drawer.entity().await, entity(EntityKind::Candidate, "42"));

        sleep(Duration::from_millis(2)).await;
        assert_eq!(drawer.entity().await, None);
        assert!(!drawer.is_clear_pending().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_within_grace_window_cancels_clear() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let drawer = drawer().with_event_sender(tx);

        drawer.open(EntityKind::Candidate, "42").await;
        drawer.close().await;
        sleep(Duration::from_millis(100)).await;
        drawer.open(EntityKind::Job, "7").await;
        assert!(!drawer.is_clear_pending().await);

        sleep(Duration::from_millis(400)).await;
        let snapshot = drawer.snapshot().await;
        assert!(snapshot.is_open);
        assert_eq!(snapshot.entity, entity(EntityKind::Job, "7"));

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(!events
            .iter()
            .any(|event| matches!(event, OverlayEvent::Cleared { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_while_open_has_no_empty_state() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let drawer = drawer().with_event_sender(tx);

        drawer.open(EntityKind::Candidate, "1").await;
        drawer.open(EntityKind::Candidate, "2").await;
        assert_eq!(drawer.entity().await, entity(EntityKind::Candidate, "2"));

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(drawer.entity().await, entity(EntityKind::Candidate, "2"));

        let opened = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|event| matches!(event, OverlayEvent::Opened { .. }))
            .count();
        assert_eq!(opened, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_open_close_uses_latest_timer() {
        let drawer = drawer();

        drawer.open(EntityKind::Deal, "a").await;
        drawer.close().await;
        sleep(Duration::from_millis(200)).await;
        drawer.open(EntityKind::Deal, "b").await;
        drawer.close().await;

        // The first close's deadline passes; the second close still owns the entity.
        sleep(Duration::from_millis(150)).await;
        assert_eq!(drawer.entity().await, entity(EntityKind::Deal, "b"));

        sleep(Duration::from_millis(200)).await;
        assert_eq!(drawer.entity().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_and_url_sync() {
        let registry = StackRegistry::new().shared();
        let location = Arc::new(MemoryLocation::parse("https://app.test/accounts").unwrap());
        let drawer = drawer()
            .with_registry(Arc::clone(&registry))
            .with_location(location.clone());

        drawer.open(EntityKind::Account, "acme").await;
        assert_eq!(drawer.snapshot().await.priority, Some(50));
        assert!(registry.read().await.is_scroll_locked());
        assert_eq!(
            location.url().as_str(),
            "https://app.test/accounts?drawer=account&entity=acme"
        );

        drawer.open(EntityKind::Account, "globex").await;
        assert_eq!(registry.read().await.depth(), 1);
        assert_eq!(location.query_param("entity").as_deref(), Some("globex"));

        drawer.close().await;
        assert!(!registry.read().await.is_scroll_locked());
        assert_eq!(location.url().as_str(), "https://app.test/accounts");
        assert_eq!(drawer.snapshot().await.priority, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_from_location() {
        let location = Arc::new(
            MemoryLocation::parse("https://app.test/jobs?drawer=job&entity=7").unwrap(),
        );
        let drawer = drawer().with_location(location);
        assert!(drawer.restore_from_location().await.unwrap());
        assert_eq!(drawer.entity().await, entity(EntityKind::Job, "7"));

        let bogus = Arc::new(
            MemoryLocation::parse("https://app.test/jobs?drawer=rocket&entity=7").unwrap(),
        );
        let drawer = self::drawer().with_location(bogus);
        assert!(matches!(
            drawer.restore_from_location().await,
            Err(DrawerError::UnknownEntityKind(_))
        ));

        let unsynced = self::drawer();
        assert!(matches!(
            unsynced.restore_from_location().await,
            Err(DrawerError::NoLocation(_))
        ));

        let empty = Arc::new(MemoryLocation::parse("https://app.test/jobs").unwrap());
        let drawer = self::drawer().with_location(empty);
        assert!(!drawer.restore_from_location().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_when_closed_is_noop() {
        let drawer = drawer();
        drawer.close().await;
        assert_eq!(drawer.snapshot().await, DrawerSnapshot::default());
        assert!(!drawer.is_clear_pending().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_open_close_keeps_stack_in_step() {
        let registry = StackRegistry::new().shared();
        let drawer = drawer().with_registry(Arc::clone(&registry));

        for round in 0..200 {
            let tasks: Vec<_> = (0..4)
                .map(|n| {
                    let drawer = drawer.clone();
                    tokio::spawn(async move {
                        if (round + n) % 2 == 0 {
                            drawer.open(EntityKind::Placement, format!("p-{n}")).await;
                        } else {
                            drawer.close().await;
                        }
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            let snapshot = drawer.snapshot().await;
            let registry = registry.read().await;
            assert_eq!(snapshot.is_open, registry.contains(drawer.id()));
            assert_eq!(snapshot.is_open, snapshot.priority.is_some());
        }
    }
}
