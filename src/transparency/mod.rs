//! Transparency module for the Privacy Origin agent.
//!
//! Tracks what the agent did with the events it received so users can audit
//! it without the agent keeping anything beyond its bounded logs.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
