//! Channel-backed ingestion queue.
//!
//! Collaborators hold an [`EventSink`] and push inbound messages; the
//! aggregation worker owns the matching [`EventQueue`] and drains it one
//! message at a time, so every mutation of the aggregate is serialized.

use crate::collector::types::InboundMessage;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Configuration for the ingestion queue.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Maximum number of queued messages before senders see `QueueFull`
    pub capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Errors that can occur while handing a message to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    /// The receiving side has been torn down (page or agent shutdown)
    RecipientGone,
    /// The queue is at capacity
    QueueFull,
}

impl CollectorError {
    /// Whether this error is the expected teardown race rather than a fault.
    pub fn is_recipient_gone(&self) -> bool {
        matches!(self, CollectorError::RecipientGone)
    }
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::RecipientGone => write!(f, "Aggregator is no longer receiving"),
            CollectorError::QueueFull => write!(f, "Ingestion queue is full"),
        }
    }
}

impl std::error::Error for CollectorError {}

impl<T> From<TrySendError<T>> for CollectorError {
    fn from(err: TrySendError<T>) -> Self {
        match err {
            TrySendError::Full(_) => CollectorError::QueueFull,
            TrySendError::Disconnected(_) => CollectorError::RecipientGone,
        }
    }
}

/// Sending half handed to event producers.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Sender<InboundMessage>,
}

impl EventSink {
    /// Push a message without blocking.
    pub fn send(&self, message: impl Into<InboundMessage>) -> Result<(), CollectorError> {
        self.sender.try_send(message.into()).map_err(CollectorError::from)
    }

    /// Fire-and-forget push.
    ///
    /// A torn-down recipient is expected during page teardown and is only
    /// logged at debug level; anything else is reported as a warning. The
    /// message is dropped in both cases.
    pub fn notify(&self, message: impl Into<InboundMessage>) {
        match self.send(message) {
            Ok(()) => {}
            Err(e) if e.is_recipient_gone() => {
                tracing::debug!("Dropping message for torn-down recipient");
            }
            Err(e) => {
                tracing::warn!("Dropping inbound message: {}", e);
            }
        }
    }
}

/// Receiving half owned by the aggregation worker.
pub struct EventQueue {
    sink: EventSink,
    receiver: Receiver<InboundMessage>,
}

impl EventQueue {
    /// Create a new bounded queue.
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(config.capacity.max(1));
        Self {
            sink: EventSink { sender },
            receiver,
        }
    }

    /// A new sending handle for a producer.
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Get the receiver for inbound messages.
    pub fn receiver(&self) -> &Receiver<InboundMessage> {
        &self.receiver
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Option<InboundMessage> {
        self.receiver.try_recv().ok()
    }

    /// Number of messages waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Split into the receiver, dropping the queue's own sending handle.
    ///
    /// Once every producer sink is dropped the receiver reports disconnection.
    pub fn into_receiver(self) -> Receiver<InboundMessage> {
        self.receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{ClearScope, RawEvent};

    #[test]
    fn test_messages_arrive_in_order() {
        let queue = EventQueue::new(CollectorConfig::default());
        let sink = queue.sink();

        sink.send(RawEvent::network(1, 10, "https://a.com", None)).unwrap();
        sink.send(InboundMessage::ClearRequest {
            scope: ClearScope::All,
        })
        .unwrap();

        assert_eq!(queue.len(), 2);
        assert!(matches!(queue.try_recv(), Some(InboundMessage::RawEvent(_))));
        assert!(matches!(
            queue.try_recv(),
            Some(InboundMessage::ClearRequest { .. })
        ));
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn test_full_queue_is_not_recipient_gone() {
        let queue = EventQueue::new(CollectorConfig { capacity: 1 });
        let sink = queue.sink();

        sink.send(RawEvent::network(1, 10, "https://a.com", None)).unwrap();
        let err = sink
            .send(RawEvent::network(1, 11, "https://a.com", None))
            .unwrap_err();
        assert_eq!(err, CollectorError::QueueFull);
        assert!(!err.is_recipient_gone());
    }

    #[test]
    fn test_dropped_receiver_is_recipient_gone() {
        let queue = EventQueue::new(CollectorConfig::default());
        let sink = queue.sink();
        drop(queue);

        let err = sink
            .send(RawEvent::network(1, 10, "https://a.com", None))
            .unwrap_err();
        assert!(err.is_recipient_gone());

        // Swallowed without panicking.
        sink.notify(RawEvent::network(1, 11, "https://a.com", None));
    }
}
