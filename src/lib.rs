//! Privacy Origin - local aggregation of privacy-sensitive browser activity.
//!
//! This library turns a stream of raw browser events (network requests,
//! cookies, geolocation calls, fingerprinting API use, form interaction)
//! into per-tab activity views and a cross-site tracker index.
//!
//! # Guarantees
//!
//! - **Bounded memory**: each event category keeps at most a fixed number of entries
//! - **Page isolation**: a tab's entries are dropped when it navigates
//! - **Monotonic statistics**: tracker counts and site sets only grow until explicitly reset
//! - **Local only**: nothing leaves the machine
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Privacy Origin                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌────────────┐   ┌───────────┐              │
//! │  │ Collector │──▶│ Classifier │──▶│ Coalescer │              │
//! │  │  (queue)  │   │            │   │           │              │
//! │  └───────────┘   └────────────┘   └───────────┘              │
//! │                                         │                    │
//! │                         ┌───────────────┴──────┐             │
//! │                         ▼                      ▼             │
//! │                  ┌────────────┐        ┌──────────────┐      │
//! │                  │ Event logs │        │ Tracker index│      │
//! │                  └────────────┘        └──────────────┘      │
//! │                         │                      │             │
//! │                         ▼                      ▼             │
//! │                  ┌────────────┐        ┌──────────────┐      │
//! │                  │  Snapshot  │        │ Global report│      │
//! │                  │ +histogram │        │              │      │
//! │                  └────────────┘        └──────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use privacy_origin::{Engine, RawEvent};
//!
//! let mut engine = Engine::default();
//! engine.notify_raw_event(RawEvent::network(
//!     1,
//!     1_000,
//!     "https://cdn.tracker.net/pixel.gif",
//!     Some("https://news.example/"),
//! ));
//!
//! let snapshot = engine.get_snapshot(1, 2_000);
//! assert_eq!(snapshot.counts.third_party_requests, 1);
//! assert_eq!(engine.get_global_report().total_tracker_domains, 1);
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod engine;
pub mod runtime;
pub mod store;
pub mod transparency;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use collector::{
    ClearScope, CollectorConfig, CollectorError, EventQueue, EventSink, InboundMessage, RawEvent,
    RawPayload, TabId,
};
pub use config::{Config, ConfigError};
pub use core::{
    BucketError, Category, ClassifiedEvent, GlobalReport, GlobalStats, Histogram, TabSnapshot,
    TimeBucketer,
};
pub use engine::{Engine, IngestOutcome};
pub use runtime::{AggregatorHandle, RuntimeConfig};
pub use store::{JsonFileStore, MemoryStore, PersistQueue, PersistedState, StateStore, StoreError};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What the agent observes, for display to users.
pub const OBSERVATION_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              PRIVACY ORIGIN - WHAT THIS AGENT SEES               ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent shows you what websites do while you browse.         ║
║                                                                  ║
║  ✓ WHAT WE RECORD:                                               ║
║    • Which hosts a page contacts, and whether they are           ║
║      third parties                                               ║
║    • Cookies set by those hosts                                  ║
║    • Location requests and fingerprinting API use                ║
║    • That a form was typed into or submitted, and the kind       ║
║      of field (email, password, ...)                             ║
║                                                                  ║
║  ✗ WHAT WE NEVER RECORD:                                         ║
║    • What you type into any form                                 ║
║    • Page content or screenshots                                 ║
║    • Anything outside the browser                                ║
║                                                                  ║
║  Everything stays on this machine. A tab's records are dropped   ║
║  when it loads a new page.                                       ║
║                                                                  ║
║  Review or clear what is stored with:                            ║
║    privacy-origin report                                         ║
║    privacy-origin clear --all                                    ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
