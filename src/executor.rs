//! # Bounded executor: capped concurrency with per-job result futures.
//!
//! [`BoundedExecutor`] runs at most `max` jobs at a time. Admission is a
//! free-index channel pre-populated with the slot indices `0..max`:
//! [`BoundedExecutor::execute`] takes an index (waiting when every slot is
//! busy), parks the job in that slot, and hands the index to a worker
//! through the dispatch channel. The worker sends back a freshly
//! constructed [`JobFuture`] on the slot's result channel before running
//! the job, so the submitter always holds the handle for its own job.
//!
//! ## Architecture
//! ```text
//!  execute(job)                               worker pool (max tasks)
//!      │ recv free index                               │
//!      ▼                                               │
//!  jobs[idx] = job ── dispatch idx ──► recv idx ───────┤
//!      │                                   │           │
//!      ◄──── JobFuture ── result[idx] ◄── pair()       │
//!                                          │           │
//!                                     run jobs[idx]    │
//!                                          │           │
//!                                     complete(outcome)│
//!                                          │           │
//!                                     free index ──────┘
//! ```
//!
//! Unlike the pipeline's single-producer `submit`, `execute` takes
//! `&self` and is safe to call from many tasks: all reservation state
//! lives in channels, which serialise the handoff.
//!
//! Shares only the slot/index-channel idiom with the pipeline; the two
//! are otherwise independent.

use std::{future::Future, sync::Arc};

use futures::future::BoxFuture;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};

use crate::{
    error::{JobError, RuntimeError},
    future::JobFuture,
};

/// Type-erased job parked in a slot between `execute` and its worker.
type BoxJob<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, JobError>> + Send + 'static>;

/// Worker pool bounded by a free-index channel.
///
/// # Example
/// ```no_run
/// use seqpipe::{BoundedExecutor, JobError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ex: BoundedExecutor<u64> = BoundedExecutor::new(2);
///
/// let mut fut = ex.execute(|| async { Ok::<_, JobError>(21 * 2) }).await?;
/// assert_eq!(fut.result().await, Ok(42));
/// // Idempotent: same pair, no re-execution, no re-waiting.
/// assert_eq!(fut.result().await, Ok(42));
///
/// ex.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct BoundedExecutor<T> {
    max: usize,
    free_rx: Mutex<mpsc::Receiver<usize>>,
    dispatch_tx: Mutex<Option<mpsc::Sender<usize>>>,
    jobs: Arc<Vec<Mutex<Option<BoxJob<T>>>>>,
    result_rx: Vec<Mutex<mpsc::Receiver<JobFuture<T>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Clone + Send + Sync + 'static> BoundedExecutor<T> {
    /// Creates an executor running at most `max` jobs concurrently.
    ///
    /// `max` is clamped to at least 1. Workers are spawned immediately.
    pub fn new(max: usize) -> Self {
        let max = max.max(1);

        let (free_tx, free_rx) = mpsc::channel(max);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(1);
        let dispatch_rx = Arc::new(Mutex::new(dispatch_rx));

        let jobs: Arc<Vec<Mutex<Option<BoxJob<T>>>>> =
            Arc::new((0..max).map(|_| Mutex::new(None)).collect());

        let mut result_tx = Vec::with_capacity(max);
        let mut result_rx = Vec::with_capacity(max);
        for _ in 0..max {
            let (tx, rx) = mpsc::channel(1);
            result_tx.push(tx);
            result_rx.push(Mutex::new(rx));
        }
        let result_tx = Arc::new(result_tx);

        let mut workers = Vec::with_capacity(max);
        for index in 0..max {
            // Capacity equals the index count, so pre-fill cannot fail.
            let _ = free_tx.try_send(index);
            workers.push(tokio::spawn(worker(
                dispatch_rx.clone(),
                jobs.clone(),
                result_tx.clone(),
                free_tx.clone(),
            )));
        }

        Self {
            max,
            free_rx: Mutex::new(free_rx),
            dispatch_tx: Mutex::new(Some(dispatch_tx)),
            jobs,
            result_rx,
            workers: Mutex::new(workers),
        }
    }

    /// Maximum number of concurrently running jobs.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Submits a job, waiting while every slot is busy, and returns its
    /// result handle.
    ///
    /// Safe to call concurrently from many tasks. After
    /// [`stop`](BoundedExecutor::stop) returns
    /// [`RuntimeError::ExecutorClosed`].
    pub async fn execute<F, Fut>(&self, job: F) -> Result<JobFuture<T>, RuntimeError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, JobError>> + Send + 'static,
    {
        let index = {
            let mut rx = self.free_rx.lock().await;
            rx.recv().await
        }
        .ok_or(RuntimeError::ExecutorClosed)?;

        {
            let boxed: BoxJob<T> = Box::new(move || {
                let fut: BoxFuture<'static, Result<T, JobError>> = Box::pin(job());
                fut
            });
            // The slot is exclusively ours until the index re-enters the
            // free channel.
            *self.jobs[index].lock().await = Some(boxed);
        }

        let dispatch = self
            .dispatch_tx
            .lock()
            .await
            .clone()
            .ok_or(RuntimeError::ExecutorClosed)?;
        if dispatch.send(index).await.is_err() {
            return Err(RuntimeError::ExecutorClosed);
        }

        let future = {
            let mut rx = self.result_rx[index].lock().await;
            rx.recv().await
        }
        .ok_or(RuntimeError::ExecutorClosed)?;
        Ok(future)
    }

    /// Stops the executor: closes the dispatch channel so every worker
    /// drains and exits, then joins them.
    ///
    /// Jobs already running finish and fulfil their futures. Idempotent;
    /// later `execute` calls fail with [`RuntimeError::ExecutorClosed`].
    pub async fn stop(&self) {
        self.dispatch_tx.lock().await.take();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for handle in workers {
            let _ = handle.await;
        }
    }
}

/// Executor worker loop.
///
/// Workers share the dispatch receiver; whichever worker picks an index
/// up serves that slot for this round. The result channel is indexed by
/// the slot, not the worker, so the submitter that reserved the slot is
/// the one that receives the handle.
async fn worker<T: Clone + Send + 'static>(
    dispatch_rx: Arc<Mutex<mpsc::Receiver<usize>>>,
    jobs: Arc<Vec<Mutex<Option<BoxJob<T>>>>>,
    result_tx: Arc<Vec<mpsc::Sender<JobFuture<T>>>>,
    free_tx: mpsc::Sender<usize>,
) {
    loop {
        let index = {
            let mut rx = dispatch_rx.lock().await;
            rx.recv().await
        };
        let Some(index) = index else {
            // Dispatch channel closed: executor stop.
            break;
        };

        let job = jobs[index].lock().await.take();
        let (future, completion) = JobFuture::pair();
        let _ = result_tx[index].send(future).await;

        match job {
            Some(job) => completion.complete(job().await),
            None => completion.complete(Err(JobError::Canceled)),
        }

        if free_tx.send(index).await.is_err() {
            break;
        }
    }
}
