//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the manager, handler
//! group workers and forwarders.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `TaskManager` (pipeline lifecycle, slot contention),
//!   handler workers (`HandlerFailed`), forwarders (group lifecycle),
//!   subscriber listeners (panic diagnostics).
//! - **Consumers**: the per-subscriber listener tasks spawned by
//!   `TaskManager::start`, and anything holding a receiver from
//!   `TaskManager::events`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
