//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [pipeline-started]
//! [group-started] group=group-0 handlers=3
//! [handler-failed] group=group-0 id=42 err="boom"
//! [slot-contended] id=1024
//! [group-stopped] group=group-0
//! [pipeline-stopped]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscriber;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable event
/// descriptions to stdout for debugging and demonstration purposes.
///
/// Not intended for production use - implement a custom [`Subscriber`]
/// for structured logging or metrics collection.
pub struct LogWriter;

#[async_trait]
impl Subscriber for LogWriter {
    async fn handle(&self, e: &Event) {
        match e.kind {
            EventKind::PipelineStarted => {
                println!("[pipeline-started]");
            }
            EventKind::PipelineStopped => {
                println!("[pipeline-stopped]");
            }
            EventKind::GroupStarted => {
                if let (Some(group), Some(n)) = (&e.group, e.handlers) {
                    println!("[group-started] group={group} handlers={n}");
                }
            }
            EventKind::GroupStopped => {
                println!("[group-stopped] group={:?}", e.group);
            }
            EventKind::HandlerFailed => {
                println!(
                    "[handler-failed] group={:?} id={:?} err={:?}",
                    e.group, e.id, e.error
                );
            }
            EventKind::SlotContended => {
                println!("[slot-contended] id={:?}", e.id);
            }
            EventKind::SubscriberPanicked => {
                println!(
                    "[subscriber-panicked] subscriber={:?} err={:?}",
                    e.group, e.error
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
