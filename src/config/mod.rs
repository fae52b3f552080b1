//! Overlay core configuration
//!
//! Timing, priority and query-parameter settings, loaded from JSON with
//! defaults for every missing field.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tracing::debug;

use crate::overlay::error::ConfigError;

/// Overlay core configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Priority assigned to the first overlay on an empty stack
    pub base_priority: i32,

    /// Gap between consecutive stack priorities
    pub priority_step: i32,

    /// Delay between a visual close and clearing payload/identity data
    pub grace_window_ms: u64,

    /// Quiet period before a debounced lookup fires
    pub search_debounce_ms: u64,

    /// Queries shorter than this clear results instead of searching
    pub search_min_query_len: usize,

    /// Query parameter holding the drawer's entity kind
    pub drawer_param: String,

    /// Query parameter holding the drawer's entity id
    pub entity_param: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            base_priority: 50,
            priority_step: 10,
            grace_window_ms: 300,
            search_debounce_ms: 300,
            search_min_query_len: 2,
            drawer_param: "drawer".to_string(),
            entity_param: "entity".to_string(),
        }
    }
}

impl OverlayConfig {
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_window_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// Parse a JSON configuration; missing keys fall back to defaults.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(content).context("Failed to parse overlay configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading overlay configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Merge another configuration into this one
    ///
    /// Only values that differ from the defaults override ours.
    pub fn merge_with(&mut self, other: Self) {
        let defaults = Self::default();

        if other.base_priority != defaults.base_priority {
            self.base_priority = other.base_priority;
        }
        if other.priority_step != defaults.priority_step {
            self.priority_step = other.priority_step;
        }
        if other.grace_window_ms != defaults.grace_window_ms {
            self.grace_window_ms = other.grace_window_ms;
        }
        if other.search_debounce_ms != defaults.search_debounce_ms {
            self.search_debounce_ms = other.search_debounce_ms;
        }
        if other.search_min_query_len != defaults.search_min_query_len {
            self.search_min_query_len = other.search_min_query_len;
        }
        if other.drawer_param != defaults.drawer_param {
            self.drawer_param = other.drawer_param;
        }
        if other.entity_param != defaults.entity_param {
            self.entity_param = other.entity_param;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.priority_step <= 0 {
            return Err(ConfigError::NonPositivePriorityStep);
        }
        if self.drawer_param.is_empty() {
            return Err(ConfigError::EmptyParam("drawer_param"));
        }
        if self.entity_param.is_empty() {
            return Err(ConfigError::EmptyParam("entity_param"));
        }
        if self.drawer_param == self.entity_param {
            return Err(ConfigError::DuplicateParam(self.drawer_param.clone()));
        }
        Ok(())
    }
}
