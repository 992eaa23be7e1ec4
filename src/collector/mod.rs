//! Event intake for the Privacy Origin agent.
//!
//! This module defines the raw event types collaborators produce and the
//! queue they use to hand them to the aggregator. How events are captured
//! (extension hooks, replay files, tests) is up to the producer.

pub mod channel;
pub mod types;

// Re-export commonly used types
pub use channel::{CollectorConfig, CollectorError, EventQueue, EventSink};
pub use types::{
    AudioNodeKind, CanvasReadMethod, ClearScope, EventKind, FieldDescriptor, FingerprintSignal,
    FormSignal, InboundMessage, RawEvent, RawPayload, TabId, GPU_RENDERER_PARAM,
    GPU_VENDOR_PARAM,
};
