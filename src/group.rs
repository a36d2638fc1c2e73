//! # Handler group: one stage of the pipeline.
//!
//! A [`HandlerGroup`] runs `M` handlers in parallel on every identifier it
//! receives, gathers their completions, and forwards each identifier to
//! its successor groups exactly once, in arrival order, after every
//! handler has completed it.
//!
//! ## Architecture
//! ```text
//!                 broadcast(id)
//!                      │
//!        ┌─────────────┼─────────────┐
//!        ▼             ▼             ▼
//!   [inbound 0]   [inbound 1]   [inbound M-1]     bounded channels
//!        │             │             │
//!    worker 0      worker 1      worker M-1       handler(id, index)
//!        │             │             │
//!   [outbound 0]  [outbound 1]  [outbound M-1]
//!        └─────────────┼─────────────┘
//!                      ▼
//!                  forwarder          one recv per outbound per round
//!                      │
//!            successors.broadcast(id) ; last_processed = id
//! ```
//!
//! ## Rules
//! - Every handler receives every identifier the group receives, in order.
//! - The forwarder emits to successors strictly in inbound order.
//! - `last_processed` advances only after every handler completed the
//!   identifier; it is the datum that gates slot reuse upstream.
//! - Stop sentinels travel the same channels as real identifiers and are
//!   the last value each channel carries: `-1` stops this group only,
//!   `-2` cascades through successors.

use std::collections::HashSet;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use tokio::{
    sync::{Barrier, mpsc},
    task::JoinHandle,
};

use crate::{
    error::RuntimeError,
    events::{Bus, Event, EventKind},
    handler::HandlerRef,
    sequence::{IndexFn, Sequence, SequenceId},
};

/// Stops the receiving group; not forwarded to successors.
pub(crate) const STOP_GROUP: SequenceId = -1;
/// Stops the receiving group after forwarding, so successors drain too.
pub(crate) const STOP_ALL: SequenceId = -2;

/// Source of generated group names (`group-0`, `group-1`, ...).
static GROUP_SEQ: AtomicU64 = AtomicU64::new(0);

/// A pipeline stage: `M` parallel handlers plus one forwarder.
///
/// Created through [`TaskManager::add_handler`](crate::TaskManager::add_handler)
/// (root stages) or [`HandlerGroup::then`] (successor stages). The handler
/// and successor lists are frozen once the pipeline starts.
pub struct HandlerGroup {
    name: String,
    handlers: Mutex<Vec<HandlerRef>>,
    next_groups: Mutex<Vec<Arc<HandlerGroup>>>,
    last_processed: Sequence,
    index_fn: IndexFn,
    channel_capacity: usize,
    bus: Bus,
    started: AtomicBool,
    inbound: Mutex<Vec<mpsc::Sender<SequenceId>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl HandlerGroup {
    /// Creates a group seeded with the given handlers.
    ///
    /// Returns [`RuntimeError::NoHandlers`] for an empty list: a group
    /// without handlers would never advance `last_processed` and would
    /// stall the producer forever.
    pub(crate) fn with_handlers(
        handlers: Vec<HandlerRef>,
        index_fn: IndexFn,
        channel_capacity: usize,
        bus: Bus,
    ) -> Result<Arc<Self>, RuntimeError> {
        if handlers.is_empty() {
            return Err(RuntimeError::NoHandlers);
        }
        let n = GROUP_SEQ.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(Self {
            name: format!("group-{n}"),
            handlers: Mutex::new(handlers),
            next_groups: Mutex::new(Vec::new()),
            last_processed: Sequence::new(),
            index_fn,
            channel_capacity,
            bus,
            started: AtomicBool::new(false),
            inbound: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
        }))
    }

    /// Returns the generated stable name of this group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a handler. Legal only before the pipeline starts.
    pub fn add_handler(&self, handler: HandlerRef) -> Result<(), RuntimeError> {
        self.add_handlers([handler])
    }

    /// Appends several handlers. Legal only before the pipeline starts.
    pub fn add_handlers(
        &self,
        handlers: impl IntoIterator<Item = HandlerRef>,
    ) -> Result<(), RuntimeError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(RuntimeError::NotConfigurable);
        }
        self.handlers.lock().unwrap().extend(handlers);
        Ok(())
    }

    /// Creates a fresh successor group with one handler and registers it.
    ///
    /// The returned group runs each identifier only after **every**
    /// handler of this group has completed it, and can itself be chained
    /// further.
    ///
    /// # Example
    /// ```no_run
    /// # use seqpipe::{TaskManager, HandlerFn, HandlerError, SequenceId};
    /// # fn handler() -> seqpipe::HandlerRef {
    /// #     HandlerFn::arc("h", |_: SequenceId, _: usize| async { Ok::<_, HandlerError>(()) })
    /// # }
    /// # fn main() -> Result<(), seqpipe::RuntimeError> {
    /// let mut tm = TaskManager::new(1024)?;
    /// tm.add_handler(handler())?.then(handler())?.then(handler())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn then(&self, handler: HandlerRef) -> Result<Arc<HandlerGroup>, RuntimeError> {
        self.then_many([handler])
    }

    /// Creates a fresh successor group with several handlers.
    pub fn then_many(
        &self,
        handlers: impl IntoIterator<Item = HandlerRef>,
    ) -> Result<Arc<HandlerGroup>, RuntimeError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(RuntimeError::NotConfigurable);
        }
        let group = Self::with_handlers(
            handlers.into_iter().collect(),
            self.index_fn.clone(),
            self.channel_capacity,
            self.bus.clone(),
        )?;
        self.next_groups.lock().unwrap().push(group.clone());
        Ok(group)
    }

    /// Returns the last identifier completed by every handler of this group.
    ///
    /// Monotonic, never decreases. `-1` until the first identifier drains.
    pub fn last_processed_id(&self) -> SequenceId {
        self.last_processed.get()
    }

    /// Number of handlers in this group.
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    /// Sends an identifier to every handler's inbound channel, in handler
    /// order.
    ///
    /// Blocks when a channel is full; this is the backpressure edge that
    /// cascades upstream to the producer.
    pub(crate) async fn broadcast(&self, id: SequenceId) {
        let inbound = self.inbound.lock().unwrap().clone();
        for tx in inbound {
            // A send error means the stage already drained; the sentinel
            // that caused it is ahead of us on the channel.
            let _ = tx.send(id).await;
        }
    }

    /// Allocates channels and spawns `M` workers plus the forwarder.
    ///
    /// Returns once every spawned task has passed the start barrier, so a
    /// predecessor forwarder can never send into a stage that is not yet
    /// listening. Successors must already be started (the manager starts
    /// leaves first).
    pub(crate) async fn start(self: &Arc<Self>) -> Result<(), RuntimeError> {
        let handlers = self.handlers.lock().unwrap().clone();
        if handlers.is_empty() {
            return Err(RuntimeError::NoHandlers);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyStarted);
        }

        let m = handlers.len();
        let barrier = Arc::new(Barrier::new(m + 2));
        let mut inbound = Vec::with_capacity(m);
        let mut outbound = Vec::with_capacity(m);
        let mut workers = Vec::with_capacity(m + 1);

        for handler in handlers {
            let (in_tx, in_rx) = mpsc::channel(self.channel_capacity);
            let (out_tx, out_rx) = mpsc::channel(self.channel_capacity);
            inbound.push(in_tx);
            outbound.push(out_rx);
            workers.push(tokio::spawn(Self::handler_worker(
                handler,
                self.index_fn.clone(),
                in_rx,
                out_tx,
                self.bus.clone(),
                self.name.clone(),
                barrier.clone(),
            )));
        }
        workers.push(tokio::spawn(
            self.clone().forward_loop(outbound, barrier.clone()),
        ));

        *self.inbound.lock().unwrap() = inbound;
        *self.workers.lock().unwrap() = workers;

        barrier.wait().await;
        self.bus.publish(
            Event::now(EventKind::GroupStarted)
                .with_group(&self.name)
                .with_handlers(m),
        );
        Ok(())
    }

    /// Per-handler worker loop.
    ///
    /// Receives identifiers in FIFO order, runs the handler, then reports
    /// completion on the outbound channel. A sentinel is forwarded as-is
    /// and terminates the loop; handler errors are published and absorbed.
    async fn handler_worker(
        handler: HandlerRef,
        index_fn: IndexFn,
        mut in_rx: mpsc::Receiver<SequenceId>,
        out_tx: mpsc::Sender<SequenceId>,
        bus: Bus,
        group_name: String,
        barrier: Arc<Barrier>,
    ) {
        barrier.wait().await;
        while let Some(id) = in_rx.recv().await {
            if id < 0 {
                let _ = out_tx.send(id).await;
                break;
            }
            if let Err(e) = handler.handle(id, (index_fn)(id)).await {
                bus.publish(
                    Event::now(EventKind::HandlerFailed)
                        .with_group(&group_name)
                        .with_id(id)
                        .with_error(format!("{}: {e}", handler.name())),
                );
            }
            if out_tx.send(id).await.is_err() {
                break;
            }
        }
    }

    /// Forwarder loop: fan-in of handler completions, fan-out to successors.
    ///
    /// Each round reads exactly one value from every outbound channel.
    /// All `M` values must be equal because each handler received the same
    /// input in the same order; debug builds assert it.
    async fn forward_loop(
        self: Arc<Self>,
        mut outbound: Vec<mpsc::Receiver<SequenceId>>,
        barrier: Arc<Barrier>,
    ) {
        barrier.wait().await;
        // Successor list is frozen once the pipeline starts.
        let successors = self.next_groups.lock().unwrap().clone();
        'rounds: loop {
            let mut id = STOP_GROUP;
            let mut first = None;
            for rx in outbound.iter_mut() {
                match rx.recv().await {
                    Some(v) => {
                        match first {
                            Some(f) => debug_assert_eq!(
                                f, v,
                                "handlers of a group completed different identifiers in one round"
                            ),
                            None => first = Some(v),
                        }
                        id = v;
                    }
                    // A worker dropped its outbound without a sentinel;
                    // treat as stage shutdown rather than hanging.
                    None => break 'rounds,
                }
            }
            if id == STOP_GROUP {
                break;
            }
            for next in &successors {
                next.broadcast(id).await;
            }
            if id == STOP_ALL {
                break;
            }
            self.last_processed.set(id);
        }
        self.bus
            .publish(Event::now(EventKind::GroupStopped).with_group(&self.name));
    }

    /// Stops this group only: injects the stage-local sentinel, which
    /// drains queued identifiers ahead of it, then joins this group's
    /// workers.
    ///
    /// Only a terminal group (no successors) may stop on its own — a
    /// stopped stage no longer forwards, so stopping mid-DAG would leave
    /// its successors waiting for a sentinel that never arrives. Returns
    /// [`RuntimeError::NotTerminal`] otherwise.
    ///
    /// A stopped terminal group stops advancing its `last_processed`,
    /// which stalls the producer once the ring wraps; the manager's
    /// cascading [`stop`](crate::TaskManager::stop) remains valid
    /// afterwards.
    pub async fn stop(&self) -> Result<(), RuntimeError> {
        if !self.next_groups.lock().unwrap().is_empty() {
            return Err(RuntimeError::NotTerminal);
        }
        self.broadcast(STOP_GROUP).await;
        self.wait_stop().await;
        Ok(())
    }

    /// Stops this group and every successor: injects the cascade sentinel,
    /// then waits for the teardown of the whole sub-DAG, this group first.
    pub(crate) async fn stop_all(self: &Arc<Self>) {
        self.broadcast(STOP_ALL).await;
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.collect_pre_order(&mut visited, &mut order);
        for group in order {
            group.wait_stop().await;
        }
    }

    /// Joins this group's workers and forwarder, then drops the inbound
    /// senders so the channels close.
    async fn wait_stop(&self) {
        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in workers {
            let _ = handle.await;
        }
        self.inbound.lock().unwrap().clear();
    }

    /// Collects this group before its successors (teardown-wait order).
    ///
    /// The DAG is acyclic by construction (only `then` creates edges, and
    /// it always produces a fresh node); the visited set guards traversal
    /// anyway so a malformed graph cannot recurse forever.
    fn collect_pre_order(
        self: &Arc<Self>,
        visited: &mut HashSet<usize>,
        out: &mut Vec<Arc<HandlerGroup>>,
    ) {
        if !visited.insert(Arc::as_ptr(self) as usize) {
            return;
        }
        out.push(self.clone());
        let successors = self.next_groups.lock().unwrap().clone();
        for next in &successors {
            next.collect_pre_order(visited, out);
        }
    }

    /// Collects successors before this group (start order: leaves first,
    /// so downstream channels exist before upstream forwarders send).
    pub(crate) fn collect_post_order(
        self: &Arc<Self>,
        visited: &mut HashSet<usize>,
        out: &mut Vec<Arc<HandlerGroup>>,
    ) {
        if !visited.insert(Arc::as_ptr(self) as usize) {
            return;
        }
        let successors = self.next_groups.lock().unwrap().clone();
        for next in &successors {
            next.collect_post_order(visited, out);
        }
        out.push(self.clone());
    }

    /// Collects the terminal groups of this sub-DAG (groups with no
    /// successors); their `last_processed` gates slot reuse.
    pub(crate) fn collect_terminals(
        self: &Arc<Self>,
        visited: &mut HashSet<usize>,
        out: &mut Vec<Arc<HandlerGroup>>,
    ) {
        if !visited.insert(Arc::as_ptr(self) as usize) {
            return;
        }
        let successors = self.next_groups.lock().unwrap().clone();
        if successors.is_empty() {
            out.push(self.clone());
            return;
        }
        for next in &successors {
            next.collect_terminals(visited, out);
        }
    }
}
