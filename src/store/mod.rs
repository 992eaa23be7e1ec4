//! Persisted state for the Privacy Origin agent.
//!
//! State lives in a key-value store with one entry per event category plus
//! `globalStats`. The store itself is a collaborator behind [`StateStore`];
//! writes go through a single [`PersistQueue`] thread so that updates to the
//! same key are applied in order.

pub mod file;
pub mod queue;

pub use file::{JsonFileStore, MemoryStore};
pub use queue::PersistQueue;

use crate::core::event::{Category, ClassifiedEvent};
use crate::core::tracker_index::GlobalStats;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A key in the persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    Events(Category),
    GlobalStats,
}

impl StoreKey {
    pub const ALL: [StoreKey; 6] = [
        StoreKey::Events(Category::Network),
        StoreKey::Events(Category::Cookie),
        StoreKey::Events(Category::Geolocation),
        StoreKey::Events(Category::Fingerprint),
        StoreKey::Events(Category::Form),
        StoreKey::GlobalStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::Events(category) => category.store_key(),
            StoreKey::GlobalStats => "globalStats",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        StoreKey::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store errors.
#[derive(Debug)]
pub enum StoreError {
    IoError(String),
    ParseError { key: StoreKey, message: String },
    SerializeError(String),
    /// The persist queue has shut down
    Closed,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::IoError(e) => write!(f, "IO error: {e}"),
            StoreError::ParseError { key, message } => {
                write!(f, "Parse error in {key}: {message}")
            }
            StoreError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            StoreError::Closed => write!(f, "Persist queue closed"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Read/write capability over the persisted key-value state.
pub trait StateStore: Send + Sync {
    /// Current value of `key`, or `None` if it was never written.
    fn read(&self, key: StoreKey) -> Result<Option<Value>, StoreError>;

    /// Replace the value of `key`.
    fn write(&self, key: StoreKey, value: &Value) -> Result<(), StoreError>;
}

/// The full persisted shape, for loading and exporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub network_requests: Vec<ClassifiedEvent>,
    #[serde(default)]
    pub cookies: Vec<ClassifiedEvent>,
    #[serde(default)]
    pub geolocation_attempts: Vec<ClassifiedEvent>,
    #[serde(default)]
    pub fingerprinting_attempts: Vec<ClassifiedEvent>,
    #[serde(default)]
    pub form_data: Vec<ClassifiedEvent>,
    #[serde(default)]
    pub global_stats: GlobalStats,
}

impl PersistedState {
    pub fn events(&self, category: Category) -> &[ClassifiedEvent] {
        match category {
            Category::Network => &self.network_requests,
            Category::Cookie => &self.cookies,
            Category::Geolocation => &self.geolocation_attempts,
            Category::Fingerprint => &self.fingerprinting_attempts,
            Category::Form => &self.form_data,
        }
    }

    pub fn events_mut(&mut self, category: Category) -> &mut Vec<ClassifiedEvent> {
        match category {
            Category::Network => &mut self.network_requests,
            Category::Cookie => &mut self.cookies,
            Category::Geolocation => &mut self.geolocation_attempts,
            Category::Fingerprint => &mut self.fingerprinting_attempts,
            Category::Form => &mut self.form_data,
        }
    }

    /// Load every key from `store`.
    ///
    /// A key that cannot be read or parsed is logged and left empty; the
    /// rest of the state still loads.
    pub fn load(store: &dyn StateStore) -> Self {
        let mut state = PersistedState::default();

        for key in StoreKey::ALL {
            let value = match store.read(key) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Could not read {}: {}", key, e);
                    continue;
                }
            };

            let result = match key {
                StoreKey::Events(category) => serde_json::from_value(value)
                    .map(|events| *state.events_mut(category) = events),
                StoreKey::GlobalStats => {
                    serde_json::from_value(value).map(|stats| state.global_stats = stats)
                }
            };
            if let Err(e) = result {
                tracing::warn!("Ignoring malformed {}: {}", key, e);
            }
        }

        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::RawEvent;
    use crate::core::classifier::classify;

    #[test]
    fn test_store_key_names() {
        let names: Vec<&str> = StoreKey::ALL.iter().map(StoreKey::as_str).collect();
        assert_eq!(
            names,
            vec![
                "networkRequests",
                "cookies",
                "geolocationAttempts",
                "fingerprintingAttempts",
                "formData",
                "globalStats"
            ]
        );
        assert_eq!(StoreKey::parse("formData"), Some(StoreKey::Events(Category::Form)));
        assert_eq!(StoreKey::parse("nope"), None);
    }

    #[test]
    fn test_load_skips_malformed_keys() {
        let store = MemoryStore::new();
        let event = classify(&RawEvent::network(1, 5, "https://t.net/x", Some("https://a.com")));
        store
            .write(StoreKey::Events(Category::Network), &serde_json::json!([event]))
            .unwrap();
        store
            .write(StoreKey::GlobalStats, &serde_json::json!("not an object"))
            .unwrap();

        let state = PersistedState::load(&store);
        assert_eq!(state.network_requests.len(), 1);
        assert_eq!(state.global_stats, GlobalStats::default());
        assert!(state.cookies.is_empty());
    }

    #[test]
    fn test_persisted_state_keys() {
        let value = serde_json::to_value(PersistedState::default()).unwrap();
        for key in StoreKey::ALL {
            assert!(value.get(key.as_str()).is_some(), "missing {key}");
        }
    }
}
