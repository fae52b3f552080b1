//! Headless overlay orchestration core
//!
//! Layering, scroll lock and escape routing for stacked overlays, a
//! confirmation broker, a generic multi-step wizard engine, and controllers
//! for entity drawers and payload modals.

pub mod config;
pub mod overlay;
pub mod telemetry;

pub use config::OverlayConfig;
pub use overlay::*;
