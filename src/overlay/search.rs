//! Debounced type-ahead lookup
//!
//! Pickers inside submission flows search as the user types. Each keystroke
//! restarts the quiet period, and only the most recent query may publish
//! results.

use super::deferred::DeferredAction;
use crate::config::OverlayConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

/// Something that can answer a search query
#[async_trait]
pub trait LookupSource<R>: Send + Sync {
    async fn lookup(&self, query: &str) -> anyhow::Result<Vec<R>>;
}

#[derive(Debug)]
struct LookupState<R> {
    query: String,
    results: Vec<R>,
    is_searching: bool,
    generation: u64,
    pending: DeferredAction,
}

/// Debounced search over a [`LookupSource`]
pub struct DebouncedLookup<R> {
    source: Arc<dyn LookupSource<R>>,
    state: Arc<RwLock<LookupState<R>>>,
    debounce: Duration,
    min_query_len: usize,
}

impl<R> Clone for DebouncedLookup<R> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            state: Arc::clone(&self.state),
            debounce: self.debounce,
            min_query_len: self.min_query_len,
        }
    }
}

impl<R> DebouncedLookup<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn LookupSource<R>>, config: &OverlayConfig) -> Self {
        Self {
            source,
            state: Arc::new(RwLock::new(LookupState {
                query: String::new(),
                results: Vec::new(),
                is_searching: false,
                generation: 0,
                pending: DeferredAction::new("lookup"),
            })),
            debounce: config.search_debounce(),
            min_query_len: config.search_min_query_len,
        }
    }

    /// Record the latest query and restart the quiet period
    ///
    /// Queries shorter than the minimum length clear results right away.
    pub async fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        let term = query.trim().to_string();
        let mut state = self.state.write().await;
        state.pending.cancel();
        state.generation += 1;
        state.query = query;

        if term.chars().count() < self.min_query_len {
            trace!("Query '{}' below minimum length; clearing results", term);
            state.results.clear();
            state.is_searching = false;
            return;
        }

        state.is_searching = true;
        let generation = state.generation;
        let weak = Arc::downgrade(&self.state);
        let source = Arc::clone(&self.source);
        state.pending.schedule(self.debounce, async move {
            {
                let Some(state) = weak.upgrade() else {
                    return;
                };
                if state.read().await.generation != generation {
                    return;
                }
            }

            debug!("Looking up '{}'", term);
            let outcome = source.lookup(&term).await;

            let Some(state) = weak.upgrade() else {
                return;
            };
            let mut state = state.write().await;
            if state.generation != generation {
                trace!("Discarding results for superseded term '{}'", term);
                return;
            }
            state.is_searching = false;
            match outcome {
                Ok(results) => {
                    debug!("Lookup '{}' returned {} results", term, results.len());
                    state.results = results;
                }
                Err(err) => warn!("Lookup '{}' failed: {:#}", term, err),
            }
        });
    }

    /// Drop any pending lookup without touching current results
    pub async fn cancel(&self) {
        let mut state = self.state.write().await;
        state.pending.cancel();
        state.generation += 1;
        state.is_searching = false;
    }

    pub async fn results(&self) -> Vec<R> {
        self.state.read().await.results.clone()
    }

    pub async fn is_searching(&self) -> bool {
        self.state.read().await.is_searching
    }

    pub async fn query(&self) -> String {
        self.state.read().await.query.clone()
    }
}
