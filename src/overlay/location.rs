//! Address-bar synchronization for deep-linkable drawers

use std::sync::{Mutex, PoisonError};
use url::Url;

/// The slice of browser history the drawer needs
///
/// Implementations must update the address in place (history replace),
/// never trigger a full navigation.
pub trait LocationSync: Send + Sync {
    fn query_param(&self, key: &str) -> Option<String>;

    /// Set the given parameters, keeping every other parameter as is
    fn set_query_params(&self, params: &[(&str, &str)]);

    fn remove_query_params(&self, keys: &[&str]);
}

/// In-memory location backed by a parsed URL
///
/// Used by headless hosts and tests; counts replacements so callers can
/// check that syncing never pushes history entries.
#[derive(Debug)]
pub struct MemoryLocation {
    url: Mutex<Url>,
    replacements: Mutex<usize>,
}

impl MemoryLocation {
    pub fn new(url: Url) -> Self {
        Self {
            url: Mutex::new(url),
            replacements: Mutex::new(0),
        }
    }

    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Url::parse(url).map(Self::new)
    }

    pub fn url(&self) -> Url {
        self.url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of in-place address updates so far
    pub fn replacements(&self) -> usize {
        *self
            .replacements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn replace_query<F>(&self, edit: F)
    where
        F: FnOnce(&mut Vec<(String, String)>),
    {
        let mut url = self.url.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        edit(&mut pairs);

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }

        *self
            .replacements
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

impl LocationSync for MemoryLocation {
    fn query_param(&self, key: &str) -> Option<String> {
        self.url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    fn set_query_params(&self, params: &[(&str, &str)]) {
        self.replace_query(|pairs| {
            pairs.retain(|(k, _)| !params.iter().any(|(key, _)| k == key));
            pairs.extend(
                params
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
            );
        });
    }

    fn remove_query_params(&self, keys: &[&str]) {
        self.replace_query(|pairs| pairs.retain(|(k, _)| !keys.contains(&k.as_str())));
    }
}
