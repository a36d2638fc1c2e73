//! # Task manager: slot reservation and the producer entry point.
//!
//! [`TaskManager`] owns the root set of [`HandlerGroup`]s and the
//! fixed-size slot ring that throttles the producer. It is the only place
//! identifiers are born: [`TaskManager::submit`] reserves the next
//! identifier, blocking until the slot it maps to has been fully drained
//! by the slowest terminal group.
//!
//! ## Architecture
//! ```text
//!  submit ──► reserve slot ──► init callback ──► broadcast to roots
//!                 │                                   │
//!        min(last_processed)                ┌─────────┴────────┐
//!        over terminal groups               ▼                  ▼
//!                 ▲                    root group A        root group B
//!                 │                         │  then             │
//!                 └──── gates reuse ── terminal group ◄─────────┘
//! ```
//!
//! ## Rules
//! - `submit` is single-producer; the `&mut self` receiver makes a second
//!   concurrent producer unrepresentable instead of undefined.
//! - The reservation scan over terminal groups is cached: the common case
//!   re-reads nothing. The cache is refreshed whenever the wrap point
//!   catches up with it or it falls behind the producer cursor.
//! - Lifecycle is one-way: configurable → running → stopped.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::{sync::broadcast, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::RuntimeError,
    events::{Bus, Event, EventKind},
    group::HandlerGroup,
    handler::HandlerRef,
    sequence::{IndexFn, SequenceId, masked_index},
    subscribers::Subscriber,
};

/// One-way lifecycle of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Configurable,
    Running,
    Stopped,
}

/// Orchestrates a DAG of handler groups over a fixed-size slot ring.
///
/// The ring stores no payload; slots are coordination points whose
/// occupancy is the gap between the producer cursor and the slowest
/// terminal group. Users who need per-slot state keep it externally in a
/// fixed-size array indexed by the slot, seeded under the
/// [`submit_with`](TaskManager::submit_with) init callback: at the moment
/// the callback runs, no downstream handler can still be reading that
/// slot.
///
/// # Example
/// ```no_run
/// use seqpipe::{HandlerError, HandlerFn, SequenceId, TaskManager};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut tm = TaskManager::new(1024)?;
/// tm.add_handler(HandlerFn::arc("print", |id: SequenceId, index: usize| async move {
///     println!("id={id} slot={index}");
///     Ok::<_, HandlerError>(())
/// }))?;
///
/// tm.start().await?;
/// tm.submit().await?;
/// tm.submit().await?;
/// tm.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct TaskManager {
    cfg: Config,
    size: SequenceId,
    index_fn: IndexFn,
    roots: Vec<Arc<HandlerGroup>>,
    /// Terminal leaves of every root DAG, cached at start.
    terminals: Vec<Arc<HandlerGroup>>,
    subscribers: Vec<Arc<dyn Subscriber>>,
    listeners: Vec<JoinHandle<()>>,
    bus: Bus,
    shutdown: CancellationToken,
    current_id: SequenceId,
    cached_min: SequenceId,
    state: State,
}

impl TaskManager {
    /// Creates a manager with a ring of `size` slots and default [`Config`].
    ///
    /// `size` must be a power of two; the default index function maps an
    /// identifier to `id & (size - 1)`.
    pub fn new(size: usize) -> Result<Self, RuntimeError> {
        Self::with_config(size, Config::default())
    }

    /// Creates a manager with an explicit [`Config`].
    pub fn with_config(size: usize, cfg: Config) -> Result<Self, RuntimeError> {
        if size == 0 || !size.is_power_of_two() {
            return Err(RuntimeError::SizeNotPowerOfTwo { size });
        }
        let bus = Bus::new(cfg.bus_capacity);
        Ok(Self {
            cfg,
            size: size as SequenceId,
            index_fn: masked_index(size),
            roots: Vec::new(),
            terminals: Vec::new(),
            subscribers: Vec::new(),
            listeners: Vec::new(),
            bus,
            shutdown: CancellationToken::new(),
            current_id: -1,
            cached_min: -1,
            state: State::Configurable,
        })
    }

    /// Creates a new root group seeded with one handler.
    ///
    /// Every root group independently sees every submitted identifier.
    /// The returned group can be chained with
    /// [`then`](HandlerGroup::then).
    pub fn add_handler(&mut self, handler: HandlerRef) -> Result<Arc<HandlerGroup>, RuntimeError> {
        self.add_handlers([handler])
    }

    /// Creates a new root group seeded with several parallel handlers.
    pub fn add_handlers(
        &mut self,
        handlers: impl IntoIterator<Item = HandlerRef>,
    ) -> Result<Arc<HandlerGroup>, RuntimeError> {
        if self.state != State::Configurable {
            return Err(RuntimeError::NotConfigurable);
        }
        let group = HandlerGroup::with_handlers(
            handlers.into_iter().collect(),
            self.index_fn.clone(),
            self.cfg.channel_capacity,
            self.bus.clone(),
        )?;
        self.roots.push(group.clone());
        Ok(group)
    }

    /// Registers an event subscriber. Legal only before `start`.
    ///
    /// Each subscriber gets a dedicated listener task at start; see
    /// [`Subscriber`].
    pub fn add_subscriber(&mut self, subscriber: Arc<dyn Subscriber>) -> Result<(), RuntimeError> {
        if self.state != State::Configurable {
            return Err(RuntimeError::NotConfigurable);
        }
        self.subscribers.push(subscriber);
        Ok(())
    }

    /// Returns a raw receiver of all future pipeline events.
    ///
    /// Useful for tests and custom wiring that does not want the
    /// [`Subscriber`] plumbing.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Starts every group and transitions to running.
    ///
    /// Groups start leaves-first so downstream channels exist before any
    /// upstream forwarder sends; this is also what lets the stop sentinel
    /// cascade safely later. After `start`, the topology is frozen.
    pub async fn start(&mut self) -> Result<(), RuntimeError> {
        if self.state != State::Configurable {
            return Err(RuntimeError::AlreadyStarted);
        }

        // Listeners first, so they observe the group start-up events.
        for subscriber in &self.subscribers {
            self.listeners
                .push(spawn_listener(subscriber.clone(), &self.bus, &self.shutdown));
        }

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for root in &self.roots {
            root.collect_post_order(&mut visited, &mut order);
        }
        for group in &order {
            group.start().await?;
        }

        let mut visited = HashSet::new();
        let mut terminals = Vec::new();
        for root in &self.roots {
            root.collect_terminals(&mut visited, &mut terminals);
        }
        self.terminals = terminals;

        self.bus.publish(Event::now(EventKind::PipelineStarted));
        self.state = State::Running;
        Ok(())
    }

    /// Reserves the next identifier and broadcasts it to every root group.
    ///
    /// Blocks while the slot the identifier maps to is still occupied by
    /// the slowest terminal group (the ring is full), and again if any
    /// stage's inbound channel is full. May therefore block arbitrarily
    /// long when a handler is slow or stuck.
    pub async fn submit(&mut self) -> Result<SequenceId, RuntimeError> {
        let next = self.reserve().await?;
        self.dispatch(next).await;
        Ok(next)
    }

    /// Like [`submit`](TaskManager::submit), but runs `init` after the
    /// slot is reserved and before any handler sees the identifier.
    ///
    /// This is the hook for seeding slot-keyed state: when `init(next,
    /// index)` runs, no downstream handler can still be reading slot
    /// `index`.
    pub async fn submit_with<F>(&mut self, init: F) -> Result<SequenceId, RuntimeError>
    where
        F: FnOnce(SequenceId, usize),
    {
        let next = self.reserve().await?;
        init(next, (self.index_fn)(next));
        self.dispatch(next).await;
        Ok(next)
    }

    /// Stops the pipeline: injects the cascade sentinel into every root,
    /// waits for the whole DAG to drain, then releases all task state.
    ///
    /// Blocks until every in-flight identifier has been processed; may
    /// block arbitrarily long if a handler is stuck.
    pub async fn stop(&mut self) -> Result<(), RuntimeError> {
        if self.state != State::Running {
            return Err(RuntimeError::NotRunning);
        }
        for root in &self.roots {
            root.stop_all().await;
        }
        self.bus.publish(Event::now(EventKind::PipelineStopped));
        for listener in self.listeners.drain(..) {
            let _ = listener.await;
        }
        self.shutdown.cancel();
        self.state = State::Stopped;
        Ok(())
    }

    /// The slot-reservation protocol.
    ///
    /// `wrap_point = next - size` is the oldest identifier that must be
    /// fully drained before `next` may be issued. The scan over terminal
    /// groups is skipped while the cached minimum proves the ring has
    /// room; the cache is re-read when the wrap point passes it or it
    /// falls behind the producer cursor.
    async fn reserve(&mut self) -> Result<SequenceId, RuntimeError> {
        if self.state != State::Running {
            return Err(RuntimeError::NotRunning);
        }
        let current = self.current_id;
        let next = current + 1;
        let wrap_point = next - self.size;

        if wrap_point > self.cached_min || self.cached_min > current {
            let mut min = self.minimum_last_processed(current);
            if wrap_point > min {
                self.bus
                    .publish(Event::now(EventKind::SlotContended).with_id(next));
                while wrap_point > min {
                    time::sleep(self.cfg.reserve_backoff).await;
                    min = self.minimum_last_processed(current);
                }
            }
            self.cached_min = min;
        }

        self.current_id = next;
        Ok(next)
    }

    /// Broadcasts a reserved identifier to every root group, in order.
    async fn dispatch(&self, id: SequenceId) {
        for root in &self.roots {
            root.broadcast(id).await;
        }
    }

    /// Smallest `last_processed` across all terminal groups, starting
    /// from `floor`.
    fn minimum_last_processed(&self, floor: SequenceId) -> SequenceId {
        let mut min = floor;
        for terminal in &self.terminals {
            let n = terminal.last_processed_id();
            if n < min {
                min = n;
            }
        }
        min
    }
}

impl Drop for TaskManager {
    /// Cancels the subscriber listeners if the manager is dropped without
    /// a clean `stop`. Group workers still drain via their sentinels; a
    /// dropped running manager leaks no listener task.
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Spawns the dedicated listener task for one subscriber.
///
/// The listener exits after delivering `PipelineStopped` (the final event
/// a manager publishes) or when the shutdown token fires. A panic inside
/// the subscriber is caught and reported, except while handling an
/// internal diagnostic event, which would risk a storm.
fn spawn_listener(
    subscriber: Arc<dyn Subscriber>,
    bus: &Bus,
    shutdown: &CancellationToken,
) -> JoinHandle<()> {
    use futures::FutureExt;

    let mut rx = bus.subscribe();
    let bus = bus.clone();
    let token = shutdown.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => {
                        let fut = subscriber.handle(&ev);
                        if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                            if !ev.is_internal() {
                                bus.publish(Event::subscriber_panicked(
                                    subscriber.name(),
                                    panic_message(&panic),
                                ));
                            }
                        }
                        if ev.kind == EventKind::PipelineStopped {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        }
    })
}

/// Extracts a printable message from a caught panic payload.
fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
