//! # Error types used by the seqpipe runtime, handlers and executor jobs.
//!
//! This module defines three error enums:
//!
//! - [`RuntimeError`] errors raised by the pipeline orchestration itself.
//! - [`HandlerError`] errors returned by individual handlers.
//! - [`JobError`] errors produced by executor jobs and stored in futures.
//!
//! All types provide an `as_label` helper returning a short stable
//! snake_case label for logs.
//!
//! No error crosses handlers or stages: a failing handler is reported on
//! the event bus and the identifier still flows downstream, because
//! ordered cross-stage delivery depends on every handler completing every
//! identifier. Executor job errors are stored verbatim in the returned
//! [`JobFuture`](crate::JobFuture) and never reach a global channel.

use thiserror::Error;

/// # Errors produced by the pipeline runtime.
///
/// These represent contract violations and lifecycle misuse detected where
/// detection is cheap; anything else stays documented behavior.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Ring size passed to the manager is not a power of two.
    #[error("ring size {size} is not a power of two")]
    SizeNotPowerOfTwo {
        /// The rejected size.
        size: usize,
    },

    /// Handler, successor or subscriber mutation attempted after `start`.
    #[error("pipeline topology is frozen after start")]
    NotConfigurable,

    /// `submit` called while the pipeline is not running.
    #[error("pipeline is not running")]
    NotRunning,

    /// `start` called more than once.
    #[error("pipeline already started")]
    AlreadyStarted,

    /// A handler group was given an empty handler list.
    #[error("handler group must contain at least one handler")]
    NoHandlers,

    /// Stage-local stop attempted on a group that has successors.
    #[error("group has successors; only a terminal group can stop on its own")]
    NotTerminal,

    /// `execute` called on a stopped executor.
    #[error("executor is stopped")]
    ExecutorClosed,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::SizeNotPowerOfTwo { .. } => "runtime_size_not_power_of_two",
            RuntimeError::NotConfigurable => "runtime_not_configurable",
            RuntimeError::NotRunning => "runtime_not_running",
            RuntimeError::AlreadyStarted => "runtime_already_started",
            RuntimeError::NoHandlers => "runtime_no_handlers",
            RuntimeError::NotTerminal => "runtime_not_terminal",
            RuntimeError::ExecutorClosed => "runtime_executor_closed",
        }
    }
}

/// # Errors returned by handler executions.
///
/// The framework absorbs these: the worker publishes a
/// [`HandlerFailed`](crate::EventKind::HandlerFailed) event and keeps
/// going. They exist so handler code has a typed way to report failure to
/// the event stream instead of panicking.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Handler failed for this identifier; later identifiers may succeed.
    #[error("handler failed: {reason}")]
    Fail { reason: String },

    /// Non-recoverable handler error.
    #[error("fatal handler error: {reason}")]
    Fatal { reason: String },
}

impl HandlerError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Fatal { .. } => "handler_fatal",
        }
    }

    /// Indicates whether the error is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HandlerError::Fatal { .. })
    }
}

/// # Errors produced by executor jobs.
///
/// Stored verbatim in the [`JobFuture`](crate::JobFuture); `Clone` so
/// repeated `result()` calls yield the same pair.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The job itself failed.
    #[error("job failed: {reason}")]
    Fail { reason: String },

    /// The worker vanished before fulfilling the result handle.
    ///
    /// Seen when the executor is torn down mid-handoff or the job panicked
    /// inside its worker.
    #[error("job canceled")]
    Canceled,
}

impl JobError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Fail { .. } => "job_failed",
            JobError::Canceled => "job_canceled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_labels_are_stable() {
        assert_eq!(
            RuntimeError::SizeNotPowerOfTwo { size: 3 }.as_label(),
            "runtime_size_not_power_of_two"
        );
        assert_eq!(RuntimeError::NotRunning.as_label(), "runtime_not_running");
        assert_eq!(RuntimeError::NotTerminal.as_label(), "runtime_not_terminal");
        assert_eq!(
            RuntimeError::ExecutorClosed.as_label(),
            "runtime_executor_closed"
        );
    }

    #[test]
    fn handler_fatal_flag() {
        let fatal = HandlerError::Fatal {
            reason: "boom".into(),
        };
        let fail = HandlerError::Fail {
            reason: "boom".into(),
        };
        assert!(fatal.is_fatal());
        assert!(!fail.is_fatal());
    }

    #[test]
    fn job_errors_compare_equal_after_clone() {
        let e = JobError::Fail { reason: "io".into() };
        assert_eq!(e.clone(), e);
        assert_eq!(JobError::Canceled.as_label(), "job_canceled");
    }
}
