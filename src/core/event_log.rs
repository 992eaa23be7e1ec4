//! Capacity-capped, per-category event logs.
//!
//! One FIFO sequence per [`Category`]. Appending beyond the cap evicts the
//! oldest entry, so a log never holds more than `capacity` events. Cookie
//! sightings are deduplicated on (url, cookie value, tab) before insertion.

use crate::collector::types::TabId;
use crate::core::event::{Category, ClassifiedEvent, EventDetail};
use std::collections::VecDeque;

/// Default per-category capacity.
pub const DEFAULT_LOG_CAPACITY: usize = 2000;

/// What happened to an appended event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Appended, and the oldest entry was evicted to stay within capacity
    AppendedWithEviction,
    /// Exact duplicate cookie sighting for the same tab, dropped
    Duplicate,
}

impl AppendOutcome {
    pub fn is_stored(&self) -> bool {
        !matches!(self, AppendOutcome::Duplicate)
    }
}

/// Bounded event logs for every tracked category.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    logs: [VecDeque<ClassifiedEvent>; 5],
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            logs: Default::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event to the log for its category.
    pub fn append(&mut self, event: ClassifiedEvent) -> AppendOutcome {
        let category = event.category();
        if category == Category::Cookie && self.is_duplicate_cookie(&event) {
            return AppendOutcome::Duplicate;
        }

        let log = &mut self.logs[category.index()];
        log.push_back(event);

        let mut evicted = false;
        while log.len() > self.capacity {
            log.pop_front();
            evicted = true;
        }

        if evicted {
            AppendOutcome::AppendedWithEviction
        } else {
            AppendOutcome::Appended
        }
    }

    fn is_duplicate_cookie(&self, event: &ClassifiedEvent) -> bool {
        let EventDetail::Cookie { url, cookie } = &event.detail else {
            return false;
        };

        self.logs[Category::Cookie.index()].iter().any(|existing| {
            existing.tab_id == event.tab_id
                && matches!(
                    &existing.detail,
                    EventDetail::Cookie { url: u, cookie: c } if u == url && c == cookie
                )
        })
    }

    /// Remove every entry for `tab` from all categories. Returns the number removed.
    pub fn evict_tab(&mut self, tab: TabId) -> usize {
        let mut removed = 0;
        for log in self.logs.iter_mut() {
            let before = log.len();
            log.retain(|e| e.tab_id != tab);
            removed += before - log.len();
        }
        removed
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        for log in self.logs.iter_mut() {
            log.clear();
        }
    }

    /// Entries of `category` for `tab`, oldest first.
    pub fn read(&self, category: Category, tab: TabId) -> Vec<&ClassifiedEvent> {
        self.logs[category.index()]
            .iter()
            .filter(|e| e.tab_id == tab)
            .collect()
    }

    /// Every entry of `category`, oldest first.
    pub fn entries(&self, category: Category) -> impl Iterator<Item = &ClassifiedEvent> {
        self.logs[category.index()].iter()
    }

    pub fn len(&self, category: Category) -> usize {
        self.logs[category.index()].len()
    }

    pub fn total_len(&self) -> usize {
        self.logs.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Replace one category's contents, e.g. when restoring persisted state.
    ///
    /// Entries filed under the wrong category are skipped and only the most
    /// recent `capacity` entries are kept. Returns how many entries were kept.
    pub fn restore(&mut self, category: Category, events: Vec<ClassifiedEvent>) -> usize {
        let mut restored: VecDeque<ClassifiedEvent> = events
            .into_iter()
            .filter(|e| e.category() == category)
            .collect();
        while restored.len() > self.capacity {
            restored.pop_front();
        }

        let kept = restored.len();
        self.logs[category.index()] = restored;
        kept
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(tab: TabId, t: i64) -> ClassifiedEvent {
        ClassifiedEvent {
            tab_id: tab,
            timestamp_ms: t,
            origin_url: None,
            detail: EventDetail::Network {
                url: format!("https://example.com/{t}"),
                resource_type: None,
            },
            is_third_party: false,
            domain: Some("example.com".to_string()),
        }
    }

    fn cookie(tab: TabId, url: &str, value: &str) -> ClassifiedEvent {
        ClassifiedEvent {
            tab_id: tab,
            timestamp_ms: 0,
            origin_url: None,
            detail: EventDetail::Cookie {
                url: url.to_string(),
                cookie: value.to_string(),
            },
            is_third_party: false,
            domain: None,
        }
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = EventLog::new(3);
        assert_eq!(log.append(network(1, 0)), AppendOutcome::Appended);
        log.append(network(1, 1));
        log.append(network(1, 2));
        assert_eq!(log.append(network(1, 3)), AppendOutcome::AppendedWithEviction);

        let kept: Vec<i64> = log.read(Category::Network, 1).iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(kept, vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_cookie_dropped_per_tab() {
        let mut log = EventLog::default();
        assert!(log.append(cookie(1, "https://a.com", "id=1")).is_stored());
        assert_eq!(log.append(cookie(1, "https://a.com", "id=1")), AppendOutcome::Duplicate);

        // Same cookie on another tab, or another value, is a new sighting.
        assert!(log.append(cookie(2, "https://a.com", "id=1")).is_stored());
        assert!(log.append(cookie(1, "https://a.com", "id=2")).is_stored());
        assert_eq!(log.len(Category::Cookie), 3);
    }

    #[test]
    fn test_evict_tab_spans_categories() {
        let mut log = EventLog::default();
        log.append(network(5, 0));
        log.append(cookie(5, "https://a.com", "x"));
        log.append(network(7, 1));

        assert_eq!(log.evict_tab(5), 2);
        assert_eq!(log.evict_tab(5), 0);
        assert_eq!(log.read(Category::Network, 7).len(), 1);
        assert_eq!(log.total_len(), 1);
    }

    #[test]
    fn test_restore_filters_and_caps() {
        let mut log = EventLog::new(2);
        let kept = log.restore(
            Category::Network,
            vec![network(1, 0), cookie(1, "https://a.com", "x"), network(1, 1), network(1, 2)],
        );
        assert_eq!(kept, 2);
        let times: Vec<i64> = log.entries(Category::Network).map(|e| e.timestamp_ms).collect();
        assert_eq!(times, vec![1, 2]);
    }
}
