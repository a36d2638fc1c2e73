//! # Single-fire result handle for executor jobs.
//!
//! A [`JobFuture`] is returned by
//! [`BoundedExecutor::execute`](crate::BoundedExecutor::execute) and
//! resolves exactly once with the job's outcome. Reads are idempotent:
//! repeated [`JobFuture::result`] calls return the same pair without
//! re-waiting and never re-execute the job.
//!
//! The handle is backed by a [`tokio::sync::watch`] channel: the worker
//! publishes the outcome once, the watch retains it for every later read.

use tokio::sync::watch;

use crate::error::JobError;

/// Result handle for one submitted job.
///
/// Single-producer (the worker that ran the job), single result. If the
/// worker vanishes before publishing an outcome — executor teardown
/// mid-handoff, or a panic inside the job — the future resolves to
/// [`JobError::Canceled`].
#[derive(Debug)]
pub struct JobFuture<T> {
    rx: watch::Receiver<Option<Result<T, JobError>>>,
}

/// The fulfilling side of a [`JobFuture`]; owned by the worker.
pub(crate) struct Completion<T> {
    tx: watch::Sender<Option<Result<T, JobError>>>,
}

impl<T> JobFuture<T> {
    /// Creates a connected future/completion pair.
    pub(crate) fn pair() -> (JobFuture<T>, Completion<T>) {
        let (tx, rx) = watch::channel(None);
        (JobFuture { rx }, Completion { tx })
    }
}

impl<T: Clone> JobFuture<T> {
    /// Waits for the job to complete and returns its outcome.
    ///
    /// Blocks until the worker publishes the result; repeat calls return
    /// the same pair immediately.
    pub async fn result(&mut self) -> Result<T, JobError> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => match value.as_ref() {
                Some(outcome) => outcome.clone(),
                None => Err(JobError::Canceled),
            },
            Err(_) => Err(JobError::Canceled),
        }
    }

    /// Non-blocking probe: `None` while the job is still running.
    pub fn try_result(&self) -> Option<Result<T, JobError>> {
        self.rx.borrow().clone()
    }
}

impl<T> Completion<T> {
    /// Publishes the job outcome. Consumes the completion: one fire only.
    pub(crate) fn complete(self, outcome: Result<T, JobError>) {
        let _ = self.tx.send(Some(outcome));
    }
}
