//! Read models: the per-tab snapshot and the global tracker report.
//!
//! Both are rebuilt from the event log and global statistics on every read
//! and never persisted.

use crate::collector::types::TabId;
use crate::core::bucketing::{Histogram, TimeBucketer};
use crate::core::classifier::hostname;
use crate::core::event::{Category, ClassifiedEvent, FormAction};
use crate::core::event_log::EventLog;
use crate::core::known_trackers::{self, TrackerCategory};
use crate::core::tracker_index::GlobalStats;
use serde::{Deserialize, Serialize};

/// Severity of a count, for colouring indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountLevel {
    /// Nothing observed
    Safe,
    Normal,
    Warning,
    Alert,
}

/// Warning and alert thresholds for one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelThresholds {
    pub warning: usize,
    pub alert: usize,
}

impl LevelThresholds {
    pub const fn new(warning: usize, alert: usize) -> Self {
        Self { warning, alert }
    }

    pub fn level(&self, count: usize) -> CountLevel {
        if count >= self.alert {
            CountLevel::Alert
        } else if count >= self.warning {
            CountLevel::Warning
        } else if count == 0 {
            CountLevel::Safe
        } else {
            CountLevel::Normal
        }
    }
}

const NETWORK_LEVELS: LevelThresholds = LevelThresholds::new(100, 200);
const COOKIE_LEVELS: LevelThresholds = LevelThresholds::new(10, 30);
const THIRD_PARTY_COOKIE_LEVELS: LevelThresholds = LevelThresholds::new(3, 10);
const GEOLOCATION_LEVELS: LevelThresholds = LevelThresholds::new(1, 1);
const FORM_LEVELS: LevelThresholds = LevelThresholds::new(5, 10);
const FINGERPRINT_LEVELS: LevelThresholds = LevelThresholds::new(1, 3);

/// How many detected trackers the snapshot preview shows.
pub const TRACKER_PREVIEW_LEN: usize = 4;

/// Per-category counts for one tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub network: usize,
    pub third_party_requests: usize,
    pub cookies: usize,
    pub third_party_cookies: usize,
    pub geolocation: usize,
    pub forms: usize,
    pub fingerprinting: usize,
}

/// Severity of each displayed count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountLevels {
    pub network: CountLevel,
    pub cookies: CountLevel,
    pub third_party_cookies: CountLevel,
    pub geolocation: CountLevel,
    pub forms: CountLevel,
    pub fingerprinting: CountLevel,
}

impl CountLevels {
    fn from_counts(counts: &CategoryCounts) -> Self {
        Self {
            network: NETWORK_LEVELS.level(counts.network),
            cookies: COOKIE_LEVELS.level(counts.cookies),
            third_party_cookies: THIRD_PARTY_COOKIE_LEVELS.level(counts.third_party_cookies),
            geolocation: GEOLOCATION_LEVELS.level(counts.geolocation),
            forms: FORM_LEVELS.level(counts.forms),
            fingerprinting: FINGERPRINT_LEVELS.level(counts.fingerprinting),
        }
    }
}

/// A known tracker seen on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedTracker {
    pub name: String,
    pub domain: String,
    pub category: TrackerCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipLevel {
    Danger,
    Warning,
    Info,
    Success,
}

/// One piece of advice about the current page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tip {
    pub level: TipLevel,
    pub text: String,
}

impl Tip {
    fn new(level: TipLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

/// Text of the single tip shown when no rule fires.
pub const NO_CONCERNS_TIP: &str = "No major privacy concerns detected on this page so far.";

/// Thresholds for the count-based tip rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipThresholds {
    /// Third-party cookie tip fires above this many
    pub third_party_cookies: usize,
    /// High-volume tip fires above this many third-party requests
    pub third_party_requests: usize,
}

impl Default for TipThresholds {
    fn default() -> Self {
        Self {
            third_party_cookies: 5,
            third_party_requests: 50,
        }
    }
}

/// Everything the tip rules look at.
#[derive(Debug, Clone, Copy)]
pub struct TipInputs<'a> {
    pub current_url: Option<&'a str>,
    pub counts: &'a CategoryCounts,
    pub fingerprint_methods: &'a [String],
    pub detected_trackers: &'a [DetectedTracker],
    pub form_inputs: usize,
}

/// Evaluate every tip rule. All applicable rules fire, in a fixed order.
pub fn generate_tips(inputs: &TipInputs<'_>, thresholds: &TipThresholds) -> Vec<Tip> {
    let counts = inputs.counts;
    let mut tips = Vec::new();

    if counts.fingerprinting > 0 {
        tips.push(Tip::new(
            TipLevel::Danger,
            format!(
                "Fingerprinting detected ({}). This site may be creating a unique identifier for your device without cookies.",
                inputs.fingerprint_methods.join(", ")
            ),
        ));
    }

    if inputs
        .current_url
        .is_some_and(|url| url.to_ascii_lowercase().starts_with("http:"))
    {
        tips.push(Tip::new(
            TipLevel::Danger,
            "Insecure connection (HTTP). Your data is not encrypted and could be intercepted.",
        ));
    }

    if counts.geolocation > 0 {
        tips.push(Tip::new(
            TipLevel::Warning,
            "This site requested your location. It now knows your approximate physical address.",
        ));
    }

    if counts.third_party_cookies > thresholds.third_party_cookies {
        tips.push(Tip::new(
            TipLevel::Warning,
            format!(
                "{} third-party cookies detected. These can track you across different websites.",
                counts.third_party_cookies
            ),
        ));
    }

    if !inputs.detected_trackers.is_empty() {
        // Categories in the order their first tracker was seen.
        let mut per_category: Vec<(TrackerCategory, usize)> = Vec::new();
        for tracker in inputs.detected_trackers {
            match per_category.iter_mut().find(|(c, _)| *c == tracker.category) {
                Some((_, count)) => *count += 1,
                None => per_category.push((tracker.category, 1)),
            }
        }
        let summary = per_category
            .iter()
            .map(|(category, count)| format!("{count} {category}"))
            .collect::<Vec<_>>()
            .join(", ");
        tips.push(Tip::new(
            TipLevel::Info,
            format!(
                "Detected trackers: {summary}. These companies may share data about your browsing habits."
            ),
        ));
    }

    if counts.third_party_requests > thresholds.third_party_requests {
        tips.push(Tip::new(
            TipLevel::Info,
            format!(
                "{} third-party requests. High background activity often indicates extensive analytics or ad networks.",
                counts.third_party_requests
            ),
        ));
    }

    if inputs.form_inputs > 0 {
        tips.push(Tip::new(
            TipLevel::Info,
            "Form input monitoring detected. The site may be tracking what you type, even before submitting.",
        ));
    }

    tips
}

/// Known trackers among third-party requests, deduplicated by display name
/// in first-seen order.
pub fn detect_known_trackers<'a, I>(third_party_requests: I) -> Vec<DetectedTracker>
where
    I: IntoIterator<Item = &'a ClassifiedEvent>,
{
    let mut detected: Vec<DetectedTracker> = Vec::new();
    for event in third_party_requests {
        let Some(host) = event.target_url().and_then(hostname) else {
            continue;
        };
        let Some(known) = known_trackers::lookup(&host) else {
            continue;
        };
        if detected.iter().all(|d| d.name != known.name) {
            detected.push(DetectedTracker {
                name: known.name.to_string(),
                domain: known.domain.to_string(),
                category: known.category,
            });
        }
    }
    detected
}

/// Live view of one tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabSnapshot {
    pub tab_id: TabId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_site: Option<String>,
    pub counts: CategoryCounts,
    pub levels: CountLevels,
    pub network: Vec<ClassifiedEvent>,
    pub cookies: Vec<ClassifiedEvent>,
    pub geolocation: Vec<ClassifiedEvent>,
    pub fingerprinting: Vec<ClassifiedEvent>,
    pub forms: Vec<ClassifiedEvent>,
    pub third_party_requests: Vec<ClassifiedEvent>,
    pub third_party_cookies: Vec<ClassifiedEvent>,
    pub known_trackers: Vec<DetectedTracker>,
    pub tips: Vec<Tip>,
    /// Absent when the histogram could not be computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram: Option<Histogram>,
}

impl TabSnapshot {
    /// The first few detected trackers, for a compact preview.
    pub fn tracker_preview(&self) -> &[DetectedTracker] {
        let len = self.known_trackers.len().min(TRACKER_PREVIEW_LEN);
        &self.known_trackers[..len]
    }

    /// Distinct fingerprinting methods, in first-seen order.
    pub fn fingerprint_methods(&self) -> Vec<String> {
        distinct_methods(&self.fingerprinting)
    }
}

fn distinct_methods(events: &[ClassifiedEvent]) -> Vec<String> {
    let mut methods: Vec<String> = Vec::new();
    for method in events.iter().filter_map(ClassifiedEvent::fingerprint_method) {
        if !methods.iter().any(|m| m == method) {
            methods.push(method.to_string());
        }
    }
    methods
}

fn owned(events: Vec<&ClassifiedEvent>) -> Vec<ClassifiedEvent> {
    events.into_iter().cloned().collect()
}

/// Histogram of a tab's network requests.
pub fn network_histogram(
    log: &EventLog,
    tab: TabId,
    bucketer: &TimeBucketer,
    now_ms: i64,
) -> Option<Histogram> {
    let timestamps = log
        .read(Category::Network, tab)
        .into_iter()
        .map(|e| e.timestamp_ms);

    match bucketer.bucket(timestamps, now_ms) {
        Ok(histogram) => Some(histogram),
        Err(e) => {
            tracing::debug!("Hiding histogram for tab {}: {}", tab, e);
            None
        }
    }
}

/// Build the snapshot for `tab`.
pub fn build_snapshot(
    log: &EventLog,
    tab: TabId,
    current_url: Option<&str>,
    bucketer: &TimeBucketer,
    thresholds: &TipThresholds,
    now_ms: i64,
) -> TabSnapshot {
    let network = owned(log.read(Category::Network, tab));
    let cookies = owned(log.read(Category::Cookie, tab));
    let geolocation = owned(log.read(Category::Geolocation, tab));
    let fingerprinting = owned(log.read(Category::Fingerprint, tab));
    let forms = owned(log.read(Category::Form, tab));

    let third_party_requests: Vec<ClassifiedEvent> =
        network.iter().filter(|e| e.is_third_party).cloned().collect();
    let third_party_cookies: Vec<ClassifiedEvent> =
        cookies.iter().filter(|e| e.is_third_party).cloned().collect();

    let counts = CategoryCounts {
        network: network.len(),
        third_party_requests: third_party_requests.len(),
        cookies: cookies.len(),
        third_party_cookies: third_party_cookies.len(),
        geolocation: geolocation.len(),
        forms: forms.len(),
        fingerprinting: fingerprinting.len(),
    };

    let known_trackers = detect_known_trackers(&third_party_requests);
    let fingerprint_methods = distinct_methods(&fingerprinting);
    let form_inputs = forms
        .iter()
        .filter(|e| e.form_action() == Some(FormAction::Input))
        .count();

    let mut tips = generate_tips(
        &TipInputs {
            current_url,
            counts: &counts,
            fingerprint_methods: &fingerprint_methods,
            detected_trackers: &known_trackers,
            form_inputs,
        },
        thresholds,
    );
    if tips.is_empty() {
        tips.push(Tip::new(TipLevel::Success, NO_CONCERNS_TIP));
    }

    TabSnapshot {
        tab_id: tab,
        current_site: current_url.and_then(hostname),
        levels: CountLevels::from_counts(&counts),
        counts,
        histogram: network_histogram(log, tab, bucketer, now_ms),
        network,
        cookies,
        geolocation,
        fingerprinting,
        forms,
        third_party_requests,
        third_party_cookies,
        known_trackers,
        tips,
    }
}

/// One tracker row in the global report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRanking {
    pub domain: String,
    pub count: u64,
    /// Distinct first-party sites
    pub sites: usize,
}

/// Cross-site summary over everything ever observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalReport {
    pub total_tracker_domains: usize,
    pub total_sites: usize,
    /// Rounded share of visited sites that contacted any tracker
    pub percent_sites_with_trackers: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_tracker: Option<TrackerRanking>,
    /// Ordered by breadth, then contact count, then domain
    pub ranked: Vec<TrackerRanking>,
}

/// Rank trackers by breadth and summarize coverage.
pub fn build_global_report(stats: &GlobalStats, limit: usize) -> GlobalReport {
    let total_sites = stats.websites_visited.len();
    let sites_with_trackers = stats.sites_with_trackers().len();
    let percent_sites_with_trackers = if total_sites > 0 {
        ((sites_with_trackers as f64 / total_sites as f64) * 100.0)
            .round()
            .min(100.0) as u32
    } else {
        0
    };

    let mut ranked: Vec<TrackerRanking> = stats
        .trackers
        .iter()
        .map(|(domain, entry)| TrackerRanking {
            domain: domain.clone(),
            count: entry.count,
            sites: entry.breadth(),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.sites
            .cmp(&a.sites)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.domain.cmp(&b.domain))
    });

    let top_tracker = ranked.first().cloned();
    ranked.truncate(limit);

    GlobalReport {
        total_tracker_domains: stats.tracker_count(),
        total_sites,
        percent_sites_with_trackers,
        top_tracker,
        ranked,
    }
}
