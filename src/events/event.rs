//! # Runtime events emitted by the pipeline manager and handler groups.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Pipeline lifecycle**: the manager started or stopped.
//! - **Group lifecycle**: a stage's workers came up or drained out.
//! - **Diagnostics**: handler failures, producer backpressure, subscriber
//!   panics.
//!
//! The [`Event`] struct carries additional metadata such as the group
//! name, the sequence identifier involved, an error message, and the
//! handler count of a starting group.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so events can be ordered correctly even when delivered
//! out-of-order through async channels.
//!
//! ## Example
//! ```rust
//! use seqpipe::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::HandlerFailed)
//!     .with_group("group-0")
//!     .with_id(42)
//!     .with_error("boom");
//!
//! assert_eq!(ev.kind, EventKind::HandlerFailed);
//! assert_eq!(ev.group.as_deref(), Some("group-0"));
//! assert_eq!(ev.id, Some(42));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::sequence::SequenceId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Pipeline lifecycle ===
    /// The manager started every group and accepts submissions.
    PipelineStarted,
    /// The manager drained every group and released all task state.
    PipelineStopped,

    // === Group lifecycle ===
    /// A handler group's workers and forwarder are up.
    GroupStarted,
    /// A handler group's forwarder exited.
    GroupStopped,

    // === Diagnostics ===
    /// A handler returned an error for an identifier.
    ///
    /// The identifier still flows downstream; this event is the only
    /// trace of the failure.
    HandlerFailed,
    /// The producer entered the slot-reservation wait loop.
    ///
    /// Published once per wait, not per probe; a healthy pipeline emits
    /// this rarely.
    SlotContended,
    /// A subscriber panicked while handling an event.
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// ## Fields
/// - `seq`: unique sequence number for ordering (monotonically increasing)
/// - `at`: wall-clock timestamp (may go backwards due to NTP, use for logging only)
/// - `kind`: event classification
/// - `group`, `id`, `error`, `handlers`: optional metadata
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards, use for logging only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Name of the handler group, if applicable.
    pub group: Option<String>,
    /// Sequence identifier involved, if applicable.
    pub id: Option<SequenceId>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
    /// Handler count of the group, for `GroupStarted`.
    pub handlers: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp
    /// and next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            kind,
            at: SystemTime::now(),
            group: None,
            id: None,
            error: None,
            handlers: None,
        }
    }

    /// Attaches a group name.
    pub fn with_group(mut self, name: impl Into<String>) -> Self {
        self.group = Some(name.into());
        self
    }

    /// Attaches a sequence identifier.
    pub fn with_id(mut self, id: SequenceId) -> Self {
        self.id = Some(id);
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Attaches a handler count.
    pub fn with_handlers(mut self, n: usize) -> Self {
        self.handlers = Some(n);
        self
    }

    /// Creates a subscriber panic event.
    ///
    /// Emitted when a subscriber panics during event processing.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_group(subscriber)
            .with_error(info)
    }

    /// True for events generated by the subscriber plumbing itself.
    ///
    /// Used to avoid diagnostic storms: a panic raised while handling one
    /// of these does not produce another diagnostic.
    pub(crate) fn is_internal(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::now(EventKind::PipelineStarted);
        let b = Event::now(EventKind::PipelineStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_attach_metadata() {
        let ev = Event::now(EventKind::GroupStarted)
            .with_group("group-1")
            .with_handlers(5);
        assert_eq!(ev.group.as_deref(), Some("group-1"));
        assert_eq!(ev.handlers, Some(5));
        assert_eq!(ev.id, None);
    }

    #[test]
    fn panic_events_are_internal() {
        let ev = Event::subscriber_panicked("metrics", "boom".into());
        assert!(ev.is_internal());
        assert!(!Event::now(EventKind::HandlerFailed).is_internal());
    }
}
