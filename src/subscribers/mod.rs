//! # Event subscribers for the seqpipe runtime.
//!
//! This module provides the [`Subscriber`] trait and built-in
//! implementations for handling runtime events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   workers / forwarders / manager ── publish(Event) ──► Bus
//!                                                         │
//!                                              broadcast to listeners
//!                                                         │
//!                                               ┌─────────┴─────────┐
//!                                               ▼                   ▼
//!                                     Subscriber::handle()   TaskManager::events()
//!                                        │                      (raw receiver)
//!                                   ┌────┴────┬────────┐
//!                                   ▼         ▼        ▼
//!                               LogWriter  Metrics  Custom
//! ```
//!
//! Each subscriber runs on its own listener task spawned at
//! [`TaskManager::start`](crate::TaskManager::start); a panic inside
//! [`Subscriber::handle`] is caught and reported as a
//! `SubscriberPanicked` event without affecting the pipeline.

mod subscriber;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscriber;
