//! # Handler abstraction and function-backed handler implementation.
//!
//! This module defines the [`Handler`] trait (async, per-identifier) and a
//! convenient function-backed implementation [`HandlerFn`]. The common
//! handle type is [`HandlerRef`], an `Arc<dyn Handler>` suitable for
//! sharing across groups.
//!
//! A handler receives the sequence identifier and the slot index it maps
//! to. It must complete every identifier it is given: the framework
//! absorbs handler errors (they only feed the event stream) because
//! ordered cross-stage delivery depends on each handler finishing each
//! identifier.

use std::{borrow::Cow, future::Future, sync::Mutex};

use async_trait::async_trait;

use crate::{error::HandlerError, sequence::SequenceId};

/// # Shared handle to a handler object.
///
/// This is the primary type used by groups and the manager.
pub type HandlerRef = std::sync::Arc<dyn Handler>;

/// # One parallel consumer inside a handler group.
///
/// A `Handler` has a stable [`name`](Handler::name) and an async
/// [`handle`](Handler::handle) method that receives `(id, index)` where
/// `index = index_fn(id)` is the slot the identifier occupies.
///
/// Handlers must absorb their own failures: a returned error is published
/// as a [`HandlerFailed`](crate::EventKind::HandlerFailed) event and the
/// identifier still flows to the next stage. A handler that never returns
/// starves every successor stage; timeouts are the handler's
/// responsibility.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use seqpipe::{Handler, HandlerError, SequenceId};
///
/// struct Demo;
///
/// #[async_trait]
/// impl Handler for Demo {
///     fn name(&self) -> &str { "demo" }
///
///     async fn handle(&self, id: SequenceId, index: usize) -> Result<(), HandlerError> {
///         let _ = (id, index);
///         // do work keyed by the slot index...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Returns a stable, human-readable handler name.
    fn name(&self) -> &str;

    /// Processes one identifier.
    ///
    /// `index` is the slot index the identifier maps to; it is safe to
    /// read slot-keyed state here, and it stays safe until the producer
    /// reuses the slot after every terminal group has drained it.
    async fn handle(&self, id: SequenceId, index: usize) -> Result<(), HandlerError>;
}

/// # Function-backed handler implementation.
///
/// [`HandlerFn`] wraps a closure `Fnc: FnMut(SequenceId, usize) -> Fut`.
/// The closure is protected by a [`Mutex`] to allow calling
/// `handle(&self, ...)` even though the closure is `FnMut`; the mutex is
/// held only while creating the future, not during its execution.
///
/// Use [`HandlerFn::arc`] for a one-liner that returns a [`HandlerRef`].
///
/// ### Note:
/// If your closure captures mutable state that is accessed INSIDE the
/// returned future, you must add your own synchronization; the mutex only
/// protects the future's creation.
///
/// # Example
/// ```
/// use seqpipe::{HandlerFn, HandlerRef, HandlerError, SequenceId};
///
/// let h: HandlerRef = HandlerFn::arc("worker", |id: SequenceId, index: usize| async move {
///     let _ = (id, index);
///     Ok::<_, HandlerError>(())
/// });
///
/// assert_eq!(h.name(), "worker");
/// ```
#[derive(Debug)]
pub struct HandlerFn<Fnc, Fut>
where
    Fnc: FnMut(SequenceId, usize) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    /// Stable handler name.
    name: Cow<'static, str>,
    /// Underlying function (guarded by a mutex to allow `FnMut` with `&self`).
    func: Mutex<Fnc>,
}

impl<Fnc, Fut> HandlerFn<Fnc, Fut>
where
    Fnc: FnMut(SequenceId, usize) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a [`HandlerRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, func: Fnc) -> Self {
        Self {
            name: name.into(),
            func: Mutex::new(func),
        }
    }

    /// Creates the handler and returns it as a shared handle (`Arc<dyn Handler>`).
    pub fn arc(name: impl Into<Cow<'static, str>>, func: Fnc) -> HandlerRef {
        std::sync::Arc::new(Self::new(name, func))
    }
}

#[async_trait]
impl<Fnc, Fut> Handler for HandlerFn<Fnc, Fut>
where
    Fnc: FnMut(SequenceId, usize) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, id: SequenceId, index: usize) -> Result<(), HandlerError> {
        let fut = {
            let mut f = self.func.lock().map_err(|_| HandlerError::Fatal {
                reason: "mutex poisoned".into(),
            })?;
            (f)(id, index)
        };
        fut.await
    }
}
