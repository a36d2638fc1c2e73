//! # seqpipe
//!
//! **Seqpipe** is a staged, in-process task pipeline built around a
//! fixed-size slot ring.
//!
//! A single producer allocates monotonically increasing sequence
//! identifiers; each identifier maps to a slot index by its low bits.
//! Parallel handler groups consume identifiers in order and can be
//! chained into a DAG: a downstream group sees an identifier only after
//! every handler in every upstream group has finished it. The producer is
//! throttled so no identifier is issued until the slot it would occupy
//! has been fully drained by the slowest terminal group — the core
//! backpressure and slot-reuse invariant.
//!
//! ## Features
//!
//! | Area            | Description                                                        | Key types / traits                        |
//! |-----------------|--------------------------------------------------------------------|-------------------------------------------|
//! | **Pipeline**    | Slot-ring reservation, ordered fan-out/fan-in across stages.       | [`TaskManager`], [`HandlerGroup`]         |
//! | **Handlers**    | Define stage consumers as functions or trait impls.                | [`Handler`], [`HandlerFn`], [`HandlerRef`]|
//! | **Executor**    | Independent bounded worker pool with one-shot result handles.      | [`BoundedExecutor`], [`JobFuture`]        |
//! | **Sequencing**  | Atomic monotonic identifier source and slot mapping.               | [`Sequence`], [`SequenceId`], [`masked_index`] |
//! | **Observability** | Hook into pipeline lifecycle events.                             | [`Subscriber`], [`Event`], [`Bus`]        |
//! | **Errors**      | Typed errors for orchestration, handlers and jobs.                 | [`RuntimeError`], [`HandlerError`], [`JobError`] |
//! | **Configuration** | Centralize channel and backoff settings.                         | [`Config`]                                |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber _(demo/reference only)_.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use seqpipe::{HandlerError, HandlerFn, SequenceId, TaskManager};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tm = TaskManager::new(1024)?;
//!
//!     let hits = Arc::new(AtomicUsize::new(0));
//!     let counter = hits.clone();
//!
//!     // Two chained stages: the second sees an identifier only after
//!     // the first completed it.
//!     tm.add_handler(HandlerFn::arc("count", move |_id: SequenceId, _index: usize| {
//!         let counter = counter.clone();
//!         async move {
//!             counter.fetch_add(1, Ordering::Relaxed);
//!             Ok::<_, HandlerError>(())
//!         }
//!     }))?
//!     .then(HandlerFn::arc("print", |id: SequenceId, index: usize| async move {
//!         println!("drained id={id} slot={index}");
//!         Ok::<_, HandlerError>(())
//!     }))?;
//!
//!     tm.start().await?;
//!     for _ in 0..3 {
//!         tm.submit().await?;
//!     }
//!     tm.stop().await?;
//!
//!     assert_eq!(hits.load(Ordering::Relaxed), 3);
//!     Ok(())
//! }
//! ```
//!
//! ---

mod config;
mod error;
mod events;
mod executor;
mod future;
mod group;
mod handler;
mod manager;
mod sequence;
mod subscribers;

// ---- Public re-exports ----

pub use config::Config;
pub use error::{HandlerError, JobError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use executor::BoundedExecutor;
pub use future::JobFuture;
pub use group::HandlerGroup;
pub use handler::{Handler, HandlerFn, HandlerRef};
pub use manager::TaskManager;
pub use sequence::{IndexFn, Sequence, SequenceId, masked_index};
pub use subscribers::Subscriber;

// Optional: expose a simple built-in stdout subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
