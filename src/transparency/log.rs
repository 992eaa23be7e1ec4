//! Ingestion transparency log.
//!
//! Counts what the agent did with the events it was handed, without storing
//! any URL, cookie value or other page content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ingestion counters for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Raw events handed to the agent
    events_received: AtomicU64,
    /// Raw events without an attributable tab
    events_ignored: AtomicU64,
    /// Classified events appended to a log
    events_logged: AtomicU64,
    /// Exact duplicate cookie sightings dropped
    duplicates_dropped: AtomicU64,
    /// Low-information signals held back by a count threshold or latch
    signals_suppressed: AtomicU64,
    /// Signals held by a debounce timer
    signals_deferred: AtomicU64,
    /// Entries evicted to stay within capacity
    capacity_evictions: AtomicU64,
    /// Entries removed by navigation or clear requests
    entries_cleared: AtomicU64,
    /// Third-party contacts recorded in the tracker index
    tracker_contacts: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_ignored: AtomicU64::new(0),
            events_logged: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            signals_suppressed: AtomicU64::new(0),
            signals_deferred: AtomicU64::new(0),
            capacity_evictions: AtomicU64::new(0),
            entries_cleared: AtomicU64::new(0),
            tracker_contacts: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that resumes from, and saves to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::info!("Could not load previous transparency stats: {}", e);
        }

        log
    }

    pub fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_logged(&self) {
        self.events_logged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.signals_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deferred(&self) {
        self.signals_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.capacity_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cleared(&self, count: u64) {
        self.entries_cleared.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_tracker_contact(&self) {
        self.tracker_contacts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            events_logged: self.events_logged.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            signals_suppressed: self.signals_suppressed.load(Ordering::Relaxed),
            signals_deferred: self.signals_deferred.load(Ordering::Relaxed),
            capacity_evictions: self.capacity_evictions.load(Ordering::Relaxed),
            entries_cleared: self.entries_cleared.load(Ordering::Relaxed),
            tracker_contacts: self.tracker_contacts.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Ingestion Statistics:\n\
             - Events received: {}\n\
             - Events without a tab: {}\n\
             - Events logged: {}\n\
             - Duplicate cookies dropped: {}\n\
             - Repeated signals suppressed: {}\n\
             - Signals debounced: {}\n\
             - Capacity evictions: {}\n\
             - Entries cleared: {}\n\
             - Tracker contacts recorded: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - Everything stays on this machine\n\
             - Only hostnames feed the tracker index\n\
             - Page data is dropped when a tab navigates",
            stats.events_received,
            stats.events_ignored,
            stats.events_logged,
            stats.duplicates_dropped,
            stats.signals_suppressed,
            stats.signals_deferred,
            stats.capacity_evictions,
            stats.entries_cleared,
            stats.tracker_contacts,
            stats.session_duration_secs
        )
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                events_received: stats.events_received,
                events_ignored: stats.events_ignored,
                events_logged: stats.events_logged,
                duplicates_dropped: stats.duplicates_dropped,
                signals_suppressed: stats.signals_suppressed,
                signals_deferred: stats.signals_deferred,
                capacity_evictions: stats.capacity_evictions,
                entries_cleared: stats.entries_cleared,
                tracker_contacts: stats.tracker_contacts,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.events_received
                    .store(persisted.events_received, Ordering::Relaxed);
                self.events_ignored
                    .store(persisted.events_ignored, Ordering::Relaxed);
                self.events_logged
                    .store(persisted.events_logged, Ordering::Relaxed);
                self.duplicates_dropped
                    .store(persisted.duplicates_dropped, Ordering::Relaxed);
                self.signals_suppressed
                    .store(persisted.signals_suppressed, Ordering::Relaxed);
                self.signals_deferred
                    .store(persisted.signals_deferred, Ordering::Relaxed);
                self.capacity_evictions
                    .store(persisted.capacity_evictions, Ordering::Relaxed);
                self.entries_cleared
                    .store(persisted.entries_cleared, Ordering::Relaxed);
                self.tracker_contacts
                    .store(persisted.tracker_contacts, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        for counter in [
            &self.events_received,
            &self.events_ignored,
            &self.events_logged,
            &self.duplicates_dropped,
            &self.signals_suppressed,
            &self.signals_deferred,
            &self.capacity_evictions,
            &self.entries_cleared,
            &self.tracker_contacts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the ingestion counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub events_received: u64,
    pub events_ignored: u64,
    pub events_logged: u64,
    pub duplicates_dropped: u64,
    pub signals_suppressed: u64,
    pub signals_deferred: u64,
    pub capacity_evictions: u64,
    pub entries_cleared: u64,
    pub tracker_contacts: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    events_received: u64,
    #[serde(default)]
    events_ignored: u64,
    #[serde(default)]
    events_logged: u64,
    #[serde(default)]
    duplicates_dropped: u64,
    #[serde(default)]
    signals_suppressed: u64,
    #[serde(default)]
    signals_deferred: u64,
    #[serde(default)]
    capacity_evictions: u64,
    #[serde(default)]
    entries_cleared: u64,
    #[serde(default)]
    tracker_contacts: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let log = TransparencyLog::new();

        log.record_received();
        log.record_received();
        log.record_logged();
        log.record_duplicate();
        log.record_cleared(5);

        let stats = log.stats();
        assert_eq!(stats.events_received, 2);
        assert_eq!(stats.events_logged, 1);
        assert_eq!(stats.duplicates_dropped, 1);
        assert_eq!(stats.entries_cleared, 5);
    }

    #[test]
    fn test_reset() {
        let log = TransparencyLog::new();
        log.record_suppressed();
        log.record_tracker_contact();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.signals_suppressed, 0);
        assert_eq!(stats.tracker_contacts, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_received();
        log.record_eviction();
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path);
        assert_eq!(reloaded.stats().events_received, 1);
        assert_eq!(reloaded.stats().capacity_evictions, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = TransparencyLog::new().summary();
        assert!(summary.contains("Events received"));
        assert!(summary.contains("Privacy Guarantee"));
    }
}
