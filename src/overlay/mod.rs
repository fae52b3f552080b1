//! Overlay orchestration for modals, drawers, wizards and confirmations
//!
//! Everything here is headless. The render layer reads snapshots from the
//! controllers (or listens for [`OverlayEvent`]s) and calls back into them
//! on user input; no controller knows how it is drawn.

pub mod confirm;
pub mod deferred;
pub mod drawer;
pub mod error;
pub mod location;
pub mod manager;
pub mod payload;
pub mod search;
pub mod stack;
pub mod types;
pub mod wizard;

pub use confirm::{ConfirmHandle, ConfirmOptions, ConfirmPrompt, ConfirmVariant, ConfirmationBroker};
pub use deferred::DeferredAction;
pub use drawer::{DrawerEntity, DrawerSnapshot, EntityDrawerController};
pub use error::{ConfigError, ConfirmError, DrawerError, ModalError, WizardError};
pub use location::{LocationSync, MemoryLocation};
pub use manager::{EscapeOutcome, OverlayManager};
pub use payload::{ModalSnapshot, PayloadModalController};
pub use search::{DebouncedLookup, LookupSource};
pub use stack::{SharedRegistry, StackEntry, StackRegistry};
pub use types::{EntityKind, OverlayEvent, OverlayId, RequestId};
pub use wizard::{FieldErrors, StepData, StepStatus, StepValidity, WizardEngine};
