//! The aggregation engine.
//!
//! [`Engine`] is the single owner of the event logs, the global tracker
//! statistics and the per-page coalescing state. Every mutation goes through
//! `&mut self`, so updates are serialized by construction; reads take
//! `&self` and see a consistent view across all categories.

use crate::collector::types::{ClearScope, InboundMessage, RawEvent, TabId};
use crate::config::{Config, ConfigError};
use crate::core::bucketing::{Histogram, TimeBucketer};
use crate::core::classifier::{classify, hostname};
use crate::core::coalescer::{Admission, Coalescer};
use crate::core::event::{Category, ClassifiedEvent};
use crate::core::event_log::{AppendOutcome, EventLog};
use crate::core::report::{self, GlobalReport, TabSnapshot, TipThresholds};
use crate::core::tracker_index::GlobalStats;
use crate::store::{PersistedState, StateStore, StoreKey};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// What happened to one raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Not attributable to a tab
    Ignored,
    Logged,
    /// Exact duplicate cookie sighting
    Duplicate,
    /// Waiting on a debounce timer
    Deferred,
    /// Dropped by a count threshold or latch
    Suppressed,
}

/// Single-writer aggregate behind every read model.
#[derive(Debug)]
pub struct Engine {
    log: EventLog,
    stats: GlobalStats,
    coalescer: Coalescer,
    bucketer: TimeBucketer,
    tips: TipThresholds,
    report_limit: usize,
    /// Last known page URL per tab
    tab_urls: HashMap<TabId, String>,
    transparency: SharedTransparencyLog,
    dirty: BTreeSet<StoreKey>,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            log: EventLog::new(config.log_capacity),
            stats: GlobalStats::new(),
            coalescer: Coalescer::new(config.coalescing()),
            bucketer: TimeBucketer::new(config.tz()?),
            tips: config.tip_thresholds(),
            report_limit: config.report_list_limit,
            tab_urls: HashMap::new(),
            transparency: create_shared_log(),
            dirty: BTreeSet::new(),
        })
    }

    /// Report ingestion counters to `log` instead of a private one.
    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = log;
        self
    }

    pub fn transparency(&self) -> &SharedTransparencyLog {
        &self.transparency
    }

    /// Apply one inbound message, scheduling debounce timers on the event's
    /// own timestamp. Suited to replays that `tick` with event time.
    pub fn apply(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::RawEvent(raw) => {
                self.notify_raw_event(raw);
            }
            other => self.apply_control(other),
        }
    }

    /// Apply one inbound message, scheduling debounce timers at `now_ms`.
    ///
    /// Use this when `tick` is driven by a clock other than the producer's,
    /// so a burst stays coalesced even if its timestamps lag that clock.
    pub fn apply_at(&mut self, message: InboundMessage, now_ms: i64) {
        match message {
            InboundMessage::RawEvent(raw) => {
                self.notify_raw_event_at(raw, now_ms);
            }
            other => self.apply_control(other),
        }
    }

    fn apply_control(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::RawEvent(raw) => {
                self.notify_raw_event(raw);
            }
            InboundMessage::TabNavigationStart { tab_id, url } => {
                self.notify_tab_navigation_start(tab_id, url);
            }
            InboundMessage::TabClosed { tab_id } => {
                self.notify_tab_closed(tab_id);
            }
            InboundMessage::ClearRequest { scope } => {
                self.notify_clear_request(scope);
            }
        }
    }

    /// Classify, coalesce and record one raw event.
    pub fn notify_raw_event(&mut self, raw: RawEvent) -> IngestOutcome {
        let at = raw.timestamp_ms;
        self.notify_raw_event_at(raw, at)
    }

    /// Like [`Engine::notify_raw_event`], with debounce timers scheduled at
    /// `now_ms` instead of the event timestamp.
    pub fn notify_raw_event_at(&mut self, raw: RawEvent, now_ms: i64) -> IngestOutcome {
        self.transparency.record_received();

        if !raw.has_tab() {
            self.transparency.record_ignored();
            return IngestOutcome::Ignored;
        }

        let classified = classify(&raw);
        match self.coalescer.admit(&raw, classified, now_ms) {
            Admission::Pass(event) => self.record(event),
            Admission::Deferred { flushed } => {
                if let Some(event) = flushed {
                    self.record(event);
                }
                self.transparency.record_deferred();
                IngestOutcome::Deferred
            }
            Admission::Suppressed => {
                tracing::debug!("Suppressed repeated {:?} signal on tab {}", raw.kind(), raw.tab_id);
                self.transparency.record_suppressed();
                IngestOutcome::Suppressed
            }
        }
    }

    fn record(&mut self, event: ClassifiedEvent) -> IngestOutcome {
        // Contacts count even when the cookie sighting itself is a duplicate.
        if event.is_third_party {
            let first_party = event.origin_url.as_deref().and_then(hostname);
            if let (Some(tracker), Some(site)) = (event.domain.as_deref(), first_party.as_deref()) {
                if self.stats.record_contact(tracker, site) {
                    self.transparency.record_tracker_contact();
                    self.dirty.insert(StoreKey::GlobalStats);
                }
            }
        }

        let category = event.category();
        match self.log.append(event) {
            AppendOutcome::Duplicate => {
                tracing::debug!("Dropped duplicate cookie sighting");
                self.transparency.record_duplicate();
                IngestOutcome::Duplicate
            }
            outcome => {
                if outcome == AppendOutcome::AppendedWithEviction {
                    self.transparency.record_eviction();
                }
                self.transparency.record_logged();
                self.dirty.insert(StoreKey::Events(category));
                IngestOutcome::Logged
            }
        }
    }

    /// A tab started loading a new page: drop everything from the old one.
    ///
    /// Returns the number of log entries removed.
    pub fn notify_tab_navigation_start(&mut self, tab: TabId, url: Option<String>) -> usize {
        let removed = self.forget_tab(tab);
        if let Some(url) = url {
            self.tab_urls.insert(tab, url);
        }
        tracing::debug!("Tab {} navigated, {} entries evicted", tab, removed);
        removed
    }

    /// The tab is gone: drop its entries and every bit of per-page state.
    pub fn notify_tab_closed(&mut self, tab: TabId) -> usize {
        let removed = self.forget_tab(tab);
        tracing::debug!("Tab {} closed, {} entries evicted", tab, removed);
        removed
    }

    /// Remove log entries for one tab or for all tabs.
    ///
    /// Only stored entries go. The pages stay loaded, so their URLs, latches
    /// and pending timers survive, and global statistics are untouched.
    pub fn notify_clear_request(&mut self, scope: ClearScope) -> usize {
        let removed = match scope {
            ClearScope::Tab(tab) => self.log.evict_tab(tab),
            ClearScope::All => {
                let removed = self.log.total_len();
                self.log.clear();
                removed
            }
        };
        if removed > 0 {
            self.transparency.record_cleared(removed as u64);
        }
        self.mark_events_dirty();
        tracing::info!("Cleared {} entries ({:?})", removed, scope);
        removed
    }

    fn forget_tab(&mut self, tab: TabId) -> usize {
        let removed = self.log.evict_tab(tab);
        let cancelled = self.coalescer.reset_tab(tab);
        self.tab_urls.remove(&tab);

        if cancelled > 0 {
            tracing::debug!("Cancelled {} pending signals for tab {}", cancelled, tab);
        }
        if removed > 0 {
            self.transparency.record_cleared(removed as u64);
            self.mark_events_dirty();
        }
        removed
    }

    /// Explicit reset of the cross-site statistics.
    pub fn reset_global_stats(&mut self) {
        self.stats.reset();
        self.dirty.insert(StoreKey::GlobalStats);
    }

    /// Record events whose debounce timers have fired by `now_ms`.
    pub fn tick(&mut self, now_ms: i64) -> usize {
        let due = self.coalescer.poll(now_ms);
        let count = due.len();
        for event in due {
            self.record(event);
        }
        count
    }

    /// Earliest time `tick` has work to do.
    pub fn next_deadline(&self) -> Option<i64> {
        self.coalescer.next_deadline()
    }

    pub fn get_snapshot(&self, tab: TabId, now_ms: i64) -> TabSnapshot {
        report::build_snapshot(
            &self.log,
            tab,
            self.tab_urls.get(&tab).map(String::as_str),
            &self.bucketer,
            &self.tips,
            now_ms,
        )
    }

    pub fn get_global_report(&self) -> GlobalReport {
        report::build_global_report(&self.stats, self.report_limit)
    }

    /// Network activity histogram for `tab`, hidden if it cannot be built.
    pub fn get_histogram(&self, tab: TabId, now_ms: i64) -> Option<Histogram> {
        report::network_histogram(&self.log, tab, &self.bucketer, now_ms)
    }

    pub fn global_stats(&self) -> &GlobalStats {
        &self.stats
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn current_url(&self, tab: TabId) -> Option<&str> {
        self.tab_urls.get(&tab).map(String::as_str)
    }

    /// Replace the logs with persisted state and merge in its statistics.
    pub fn restore(&mut self, state: PersistedState) {
        let PersistedState {
            network_requests,
            cookies,
            geolocation_attempts,
            fingerprinting_attempts,
            form_data,
            global_stats,
        } = state;

        for (category, events) in [
            (Category::Network, network_requests),
            (Category::Cookie, cookies),
            (Category::Geolocation, geolocation_attempts),
            (Category::Fingerprint, fingerprinting_attempts),
            (Category::Form, form_data),
        ] {
            let kept = self.log.restore(category, events);
            tracing::debug!("Restored {} {} entries", kept, category.store_key());
        }
        self.stats.merge(global_stats);
    }

    /// Load and restore everything `store` holds.
    pub fn load_from(&mut self, store: &dyn StateStore) {
        self.restore(PersistedState::load(store));
        tracing::info!(
            "Loaded {} events and {} tracker domains",
            self.log.total_len(),
            self.stats.tracker_count()
        );
    }

    /// Full persisted shape of the current state.
    pub fn to_persisted(&self) -> PersistedState {
        let mut state = PersistedState {
            global_stats: self.stats.clone(),
            ..PersistedState::default()
        };
        for category in Category::ALL {
            *state.events_mut(category) = self.log.entries(category).cloned().collect();
        }
        state
    }

    /// Mark every key for writing on the next flush.
    pub fn mark_all_dirty(&mut self) {
        self.dirty.extend(StoreKey::ALL);
    }

    fn mark_events_dirty(&mut self) {
        self.dirty
            .extend(Category::ALL.into_iter().map(StoreKey::Events));
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Serialize and clear the keys changed since the last call.
    pub fn take_dirty(&mut self) -> Vec<(StoreKey, Value)> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|key| {
                let value = match key {
                    StoreKey::Events(category) => {
                        serde_json::to_value(self.log.entries(category).collect::<Vec<_>>())
                    }
                    StoreKey::GlobalStats => serde_json::to_value(&self.stats),
                };
                match value {
                    Ok(value) => Some((key, value)),
                    Err(e) => {
                        tracing::warn!("Could not serialize {}: {}", key, e);
                        None
                    }
                }
            })
            .collect()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            log: EventLog::default(),
            stats: GlobalStats::new(),
            coalescer: Coalescer::default(),
            bucketer: TimeBucketer::default(),
            tips: TipThresholds::default(),
            report_limit: 20,
            tab_urls: HashMap::new(),
            transparency: create_shared_log(),
            dirty: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{
        FieldDescriptor, FingerprintSignal, FormSignal, RawPayload, GPU_VENDOR_PARAM,
    };
    use crate::store::MemoryStore;

    fn input(tab: TabId, t: i64, name: &str) -> RawEvent {
        RawEvent::new(
            tab,
            t,
            Some("https://a.com/signup"),
            RawPayload::Form {
                signal: FormSignal::Input {
                    form_id: "signup".to_string(),
                    field: FieldDescriptor {
                        field_type: Some("text".to_string()),
                        name: Some(name.to_string()),
                        autocomplete: None,
                    },
                },
            },
        )
    }

    #[test]
    fn test_negative_tab_ignored() {
        let mut engine = Engine::default();
        let outcome =
            engine.notify_raw_event(RawEvent::network(-1, 0, "https://t.net", Some("https://a.com")));
        assert_eq!(outcome, IngestOutcome::Ignored);
        assert!(engine.event_log().is_empty());
        assert_eq!(engine.global_stats().tracker_count(), 0);
        assert_eq!(engine.transparency().stats().events_ignored, 1);
    }

    #[test]
    fn test_third_party_requests_feed_tracker_index() {
        let mut engine = Engine::default();
        for target in ["https://a.com/", "https://b-cdn.com/1.js", "https://b-cdn.com/2.js"] {
            engine.notify_raw_event(RawEvent::network(1, 0, target, Some("https://a.com")));
        }

        let snap = engine.get_snapshot(1, 1);
        assert_eq!(snap.counts.network, 3);
        assert_eq!(snap.counts.third_party_requests, 2);

        let entry = engine.global_stats().tracker("b-cdn.com").unwrap();
        assert_eq!(entry.count, 2);
        assert_eq!(entry.sites.iter().collect::<Vec<_>>(), vec!["a.com"]);
        assert_eq!(engine.global_stats().tracker_count(), 1);
    }

    #[test]
    fn test_duplicate_cookie_still_counts_contact() {
        let mut engine = Engine::default();
        let cookie = RawEvent::cookie(1, 0, "https://ads.net/p", "uid=1", Some("https://a.com"));
        assert_eq!(engine.notify_raw_event(cookie.clone()), IngestOutcome::Logged);
        assert_eq!(engine.notify_raw_event(cookie), IngestOutcome::Duplicate);

        assert_eq!(engine.event_log().len(Category::Cookie), 1);
        assert_eq!(engine.global_stats().tracker("ads.net").unwrap().count, 2);
    }

    #[test]
    fn test_form_input_debounced_through_tick() {
        let mut engine = Engine::default();
        assert_eq!(engine.notify_raw_event(input(1, 0, "user")), IngestOutcome::Deferred);
        engine.notify_raw_event(input(1, 500, "email"));
        assert_eq!(engine.next_deadline(), Some(2500));

        assert_eq!(engine.tick(2499), 0);
        assert_eq!(engine.tick(2500), 1);

        let snap = engine.get_snapshot(1, 3000);
        assert_eq!(snap.forms.len(), 1);
        assert_eq!(snap.counts.forms, 1);
        assert!(snap.tips.iter().any(|t| t.text.starts_with("Form input monitoring")));
    }

    #[test]
    fn test_navigation_evicts_and_cancels() {
        let mut engine = Engine::default();
        engine.notify_raw_event(RawEvent::network(1, 0, "https://t.net/x", Some("https://a.com")));
        engine.notify_raw_event(input(1, 10, "user"));

        let removed = engine.notify_tab_navigation_start(1, Some("http://b.com/".to_string()));
        assert_eq!(removed, 1);
        assert_eq!(engine.tick(10_000), 0);
        assert_eq!(engine.current_url(1), Some("http://b.com/"));
        assert_eq!(engine.global_stats().tracker("t.net").unwrap().count, 1);

        let snap = engine.get_snapshot(1, 10_000);
        assert_eq!(snap.current_site.as_deref(), Some("b.com"));
        assert!(snap.tips.iter().any(|t| t.text.starts_with("Insecure connection")));
    }

    #[test]
    fn test_clear_tab_leaves_other_tabs_and_stats() {
        let mut engine = Engine::default();
        engine.notify_raw_event(RawEvent::network(5, 0, "https://t.net/x", Some("https://a.com")));
        engine.notify_raw_event(RawEvent::network(7, 1, "https://t.net/y", Some("https://c.com")));
        let before = engine.global_stats().clone();

        assert_eq!(engine.notify_clear_request(ClearScope::Tab(5)), 1);
        assert!(engine.event_log().read(Category::Network, 5).is_empty());
        assert_eq!(engine.event_log().read(Category::Network, 7).len(), 1);
        assert_eq!(engine.global_stats(), &before);

        engine.notify_clear_request(ClearScope::All);
        assert!(engine.event_log().is_empty());
        assert_eq!(engine.global_stats(), &before);
    }

    #[test]
    fn test_clear_keeps_page_state() {
        let mut engine = Engine::default();
        let gpu = || {
            RawEvent::new(
                1,
                0,
                Some("http://plain.example/"),
                RawPayload::Fingerprint {
                    signal: FingerprintSignal::GpuParameter { param: GPU_VENDOR_PARAM },
                },
            )
        };
        engine.notify_tab_navigation_start(1, Some("http://plain.example/".to_string()));
        assert_eq!(engine.notify_raw_event(gpu()), IngestOutcome::Logged);
        engine.notify_raw_event(input(1, 10, "user"));

        assert_eq!(engine.notify_clear_request(ClearScope::Tab(1)), 1);
        assert!(engine.event_log().read(Category::Fingerprint, 1).is_empty());

        // Same page load: the URL, the latch and the pending input survive.
        assert_eq!(engine.current_url(1), Some("http://plain.example/"));
        let snap = engine.get_snapshot(1, 100);
        assert_eq!(snap.current_site.as_deref(), Some("plain.example"));
        assert!(snap.tips.iter().any(|t| t.text.starts_with("Insecure connection")));
        assert_eq!(engine.notify_raw_event(gpu()), IngestOutcome::Suppressed);
        assert_eq!(engine.tick(10_000), 1);

        engine.notify_clear_request(ClearScope::All);
        assert!(engine.event_log().is_empty());
        assert_eq!(engine.current_url(1), Some("http://plain.example/"));
        assert_eq!(engine.notify_raw_event(gpu()), IngestOutcome::Suppressed);
    }

    #[test]
    fn test_tab_closed_drops_page_state() {
        let mut engine = Engine::default();
        engine.notify_tab_navigation_start(4, Some("https://a.com/".to_string()));
        engine.notify_raw_event(RawEvent::network(4, 0, "https://t.net/x", Some("https://a.com")));
        engine.notify_raw_event(input(4, 10, "user"));

        engine.apply(InboundMessage::TabClosed { tab_id: 4 });
        assert_eq!(engine.current_url(4), None);
        assert!(engine.event_log().is_empty());
        assert_eq!(engine.next_deadline(), None);
        assert_eq!(engine.global_stats().tracker("t.net").unwrap().count, 1);
    }

    #[test]
    fn test_runtime_clock_schedules_debounce() {
        let mut engine = Engine::default();
        engine.apply_at(input(1, 0, "user").into(), 50_000);
        engine.apply_at(input(1, 100, "email").into(), 50_400);

        assert_eq!(engine.next_deadline(), Some(52_400));
        assert_eq!(engine.tick(52_399), 0);
        assert_eq!(engine.tick(52_400), 1);
        assert_eq!(engine.get_snapshot(1, 60_000).forms[0].timestamp_ms, 100);
    }

    #[test]
    fn test_dirty_keys_and_restore() {
        let mut engine = Engine::default();
        engine.notify_raw_event(RawEvent::network(1, 0, "https://t.net/x", Some("https://a.com")));

        let writes = engine.take_dirty();
        let keys: Vec<StoreKey> = writes.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![StoreKey::Events(Category::Network), StoreKey::GlobalStats]);
        assert!(!engine.has_dirty());

        let store = MemoryStore::new();
        for (key, value) in &writes {
            store.write(*key, value).unwrap();
        }

        let mut restored = Engine::default();
        restored.load_from(&store);
        assert_eq!(restored.event_log().len(Category::Network), 1);
        assert_eq!(restored.global_stats(), engine.global_stats());
        assert_eq!(restored.to_persisted(), engine.to_persisted());
    }

    #[test]
    fn test_apply_dispatches_messages() {
        let mut engine = Engine::default();
        engine.apply(RawEvent::network(2, 0, "https://t.net/x", Some("https://a.com")).into());
        engine.apply(InboundMessage::TabNavigationStart {
            tab_id: 2,
            url: None,
        });
        assert!(engine.event_log().is_empty());
    }
}
