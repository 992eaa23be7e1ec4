//! Cross-site tracker reputation index.
//!
//! Maps each third-party domain to how often it was contacted and from
//! which first-party sites. Counts and site sets only grow; nothing short of
//! an explicit reset shrinks them, and tab navigation never touches them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Contact statistics for one third-party domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerEntry {
    pub count: u64,
    pub sites: BTreeSet<String>,
}

impl TrackerEntry {
    /// Number of distinct first-party sites this domain was seen on.
    pub fn breadth(&self) -> usize {
        self.sites.len()
    }
}

/// Third-party domain to contact statistics.
pub type TrackerIndex = BTreeMap<String, TrackerEntry>;

/// Global statistics persisted under `globalStats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    #[serde(default)]
    pub trackers: TrackerIndex,
    /// First-party sites ever seen initiating a cross-domain request
    #[serde(default)]
    pub websites_visited: BTreeSet<String>,
}

impl GlobalStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `first_party_site` contacted `third_party_domain`.
    ///
    /// No-op when either is empty or they are the same host. Returns whether
    /// anything was recorded.
    pub fn record_contact(&mut self, third_party_domain: &str, first_party_site: &str) -> bool {
        if third_party_domain.is_empty()
            || first_party_site.is_empty()
            || third_party_domain == first_party_site
        {
            return false;
        }

        let entry = self
            .trackers
            .entry(third_party_domain.to_string())
            .or_default();
        entry.count = entry.count.saturating_add(1);
        if !entry.sites.contains(first_party_site) {
            entry.sites.insert(first_party_site.to_string());
        }

        if !self.websites_visited.contains(first_party_site) {
            self.websites_visited.insert(first_party_site.to_string());
        }
        true
    }

    pub fn tracker(&self, domain: &str) -> Option<&TrackerEntry> {
        self.trackers.get(domain)
    }

    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    /// Distinct first-party sites that contacted at least one tracker.
    pub fn sites_with_trackers(&self) -> BTreeSet<&str> {
        self.trackers
            .values()
            .flat_map(|t| t.sites.iter().map(String::as_str))
            .collect()
    }

    /// Merge another set of statistics in, keeping both monotonic.
    ///
    /// Counts take the larger value so merging the same state twice is
    /// harmless.
    pub fn merge(&mut self, other: GlobalStats) {
        for (domain, theirs) in other.trackers {
            let ours = self.trackers.entry(domain).or_default();
            ours.count = ours.count.max(theirs.count);
            ours.sites.extend(theirs.sites);
        }
        self.websites_visited.extend(other.websites_visited);
    }

    /// Explicit reset, the only shrink path.
    pub fn reset(&mut self) {
        self.trackers.clear();
        self.websites_visited.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_contact_counts_and_sites() {
        let mut stats = GlobalStats::new();
        assert!(stats.record_contact("b-cdn.com", "a.com"));
        assert!(stats.record_contact("b-cdn.com", "a.com"));
        assert!(stats.record_contact("b-cdn.com", "c.com"));

        let entry = stats.tracker("b-cdn.com").unwrap();
        assert_eq!(entry.count, 3);
        assert_eq!(entry.breadth(), 2);
        assert_eq!(stats.websites_visited.len(), 2);
    }

    #[test]
    fn test_self_and_empty_contacts_ignored() {
        let mut stats = GlobalStats::new();
        assert!(!stats.record_contact("a.com", "a.com"));
        assert!(!stats.record_contact("", "a.com"));
        assert!(!stats.record_contact("b.com", ""));
        assert_eq!(stats, GlobalStats::default());
    }

    #[test]
    fn test_persisted_shape() {
        let mut stats = GlobalStats::new();
        stats.record_contact("t.net", "a.com");

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["trackers"]["t.net"]["count"], 1);
        assert_eq!(value["trackers"]["t.net"]["sites"][0], "a.com");
        assert_eq!(value["websitesVisited"][0], "a.com");

        let back: GlobalStats = serde_json::from_value(value).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn test_merge_is_monotonic() {
        let mut ours = GlobalStats::new();
        ours.record_contact("t.net", "a.com");
        ours.record_contact("t.net", "a.com");

        let mut theirs = GlobalStats::new();
        theirs.record_contact("t.net", "b.com");
        theirs.record_contact("u.net", "b.com");

        ours.merge(theirs.clone());
        ours.merge(theirs);
        assert_eq!(ours.tracker("t.net").unwrap().count, 2);
        assert_eq!(ours.tracker("t.net").unwrap().breadth(), 2);
        assert_eq!(ours.tracker_count(), 2);
    }
}
