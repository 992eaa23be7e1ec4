//! Core functionality for the Privacy Origin agent.
//!
//! This module contains:
//! - Classification of raw events and sensitive form fields
//! - Coalescing of bursty low-information signals
//! - Bounded per-category event logs
//! - The cross-site tracker index
//! - Adaptive time bucketing for the activity histogram
//! - Snapshot and global report builders

pub mod bucketing;
pub mod classifier;
pub mod coalescer;
pub mod debounce;
pub mod event;
pub mod event_log;
pub mod known_trackers;
pub mod report;
pub mod tracker_index;

// Re-export commonly used types
pub use bucketing::{BucketError, Histogram, TimeBucketer};
pub use classifier::{classify, classify_field, hostname};
pub use coalescer::{Admission, Coalescer, CoalescingConfig};
pub use debounce::{CountThreshold, OneShotLatch, Policy, ThresholdMode, TrailingDebounce};
pub use event::{Category, ClassifiedEvent, EventDetail, FormAction};
pub use event_log::{AppendOutcome, EventLog, DEFAULT_LOG_CAPACITY};
pub use known_trackers::{KnownTracker, TrackerCategory};
pub use report::{GlobalReport, TabSnapshot, Tip, TipLevel, TipThresholds, TrackerRanking};
pub use tracker_index::{GlobalStats, TrackerEntry, TrackerIndex};
