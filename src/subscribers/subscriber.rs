//! # Event subscriber trait.
//!
//! Provides [`Subscriber`] — the extension point for plugging custom
//! event handlers into the pipeline runtime.
//!
//! Each subscriber registered on the manager gets:
//! - **Dedicated listener task** (runs independently of the pipeline hot path)
//! - **Panic isolation** (panics caught, reported as `SubscriberPanicked`)
//!
//! ## Rules
//! - A slow subscriber only lags its own broadcast receiver; the pipeline
//!   never blocks on observers.
//! - Panics are isolated and do not crash the runtime or other subscribers.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use seqpipe::{Event, EventKind, Subscriber};
//!
//! struct Metrics;
//!
//! #[async_trait]
//! impl Subscriber for Metrics {
//!     async fn handle(&self, event: &Event) {
//!         if event.kind == EventKind::HandlerFailed {
//!             // increment failure counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "metrics"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
///
/// Receives every pipeline event via a dedicated listener task spawned by
/// [`TaskManager::start`](crate::TaskManager::start).
///
/// ### Implementation requirements
/// - **Async-friendly**: avoid blocking operations, use async I/O.
/// - **Error handling**: handle errors internally; a panic is caught and
///   reported as `SubscriberPanicked`, then the listener keeps going.
/// - **Keep up**: a listener that falls behind the bus capacity skips the
///   events it missed.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from the subscriber's dedicated listener task, never from a
    /// publisher. Events arrive in publication order.
    async fn handle(&self, event: &Event);

    /// Returns the subscriber name for diagnostics.
    ///
    /// Used in `SubscriberPanicked` events. Keep short and descriptive
    /// (e.g., "metrics", "audit").
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
