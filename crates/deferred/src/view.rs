// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! [`View`], a read-only projection over a value source.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::deferred::{Deadline, Deferred};
use crate::executor::Executor;

/// Something that can be peeked, waited on, and subscribed to, without exposing a way to fill
/// it. Implemented by [`Deferred`] itself and by the lazy/constant sources `View` builds on top
/// of.
trait Source<T>: Send + Sync {
    fn peek(&self) -> Option<T>;
    fn wait(&self, deadline: Deadline) -> Option<T>;
    fn upon(&self, exec: Box<dyn Executor>, handler: Box<dyn FnOnce(T) + Send>);
}

impl<T: Clone + Send + Sync + 'static> Source<T> for Deferred<T> {
    fn peek(&self) -> Option<T> {
        Self::peek(self)
    }

    fn wait(&self, deadline: Deadline) -> Option<T> {
        Self::wait(self, deadline)
    }

    fn upon(&self, exec: Box<dyn Executor>, handler: Box<dyn FnOnce(T) + Send>) {
        Self::upon(self, exec, handler);
    }
}

struct Always<T>(T);

impl<T: Clone + Send + Sync + 'static> Source<T> for Always<T> {
    fn peek(&self) -> Option<T> {
        Some(self.0.clone())
    }

    fn wait(&self, _deadline: Deadline) -> Option<T> {
        Some(self.0.clone())
    }

    fn upon(&self, exec: Box<dyn Executor>, handler: Box<dyn FnOnce(T) + Send>) {
        let value = self.0.clone();
        exec.submit(Box::new(move || handler(value)));
    }
}

struct Never<T>(PhantomData<fn() -> T>);

// Safety: `Never<T>` holds no `T` at all (the `PhantomData` is over a function pointer, which is
// always `Send`/`Sync`), so it imposes no bound on `T`.
unsafe impl<T> Send for Never<T> {}
unsafe impl<T> Sync for Never<T> {}

impl<T: Send + Sync + 'static> Source<T> for Never<T> {
    fn peek(&self) -> Option<T> {
        None
    }

    fn wait(&self, _deadline: Deadline) -> Option<T> {
        // A view that never resolves legitimately blocks `Deadline::Forever` forever; callers
        // asking a `never()` view to wait without a deadline get exactly what they asked for.
        None
    }

    fn upon(&self, _exec: Box<dyn Executor>, handler: Box<dyn FnOnce(T) + Send>) {
        // The handler can never run, so there is nothing useful to hold onto; drop it rather
        // than leak it for the view's lifetime.
        drop(handler);
    }
}

struct Lazy<T, U> {
    base: Deferred<T>,
    transform: Arc<dyn Fn(T) -> U + Send + Sync>,
}

impl<T, U> Source<U> for Lazy<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    fn peek(&self) -> Option<U> {
        self.base.peek().map(|value| (self.transform)(value))
    }

    fn wait(&self, deadline: Deadline) -> Option<U> {
        self.base.wait(deadline).map(|value| (self.transform)(value))
    }

    fn upon(&self, exec: Box<dyn Executor>, handler: Box<dyn FnOnce(U) + Send>) {
        let transform = Arc::clone(&self.transform);
        self.base.upon(exec, move |value| handler(transform(value)));
    }
}

/// A read-only projection over a value: either a [`Deferred`], a constant, a value that never
/// arrives, or a lazy transform of another `View`.
///
/// `View` deliberately does not implement [`std::future::Future`]: this crate has no async
/// runtime integration in scope, and `View` is a synchronous, thread-based notification
/// primitive rather than a poll-driven one. Use [`Deferred::upon`] or [`View::upon`] to attach
/// continuations, and [`View::wait`] to block a thread.
pub struct View<T> {
    source: Arc<dyn Source<T>>,
}

impl<T> Clone for View<T> {
    fn clone(&self) -> Self {
        Self { source: Arc::clone(&self.source) }
    }
}

impl<T> fmt::Debug for View<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View").finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> View<T> {
    /// Wraps a [`Deferred`] as a read-only view over it.
    pub fn wrap(deferred: Deferred<T>) -> Self
    where
        T: Clone,
    {
        Self { source: Arc::new(deferred) }
    }

    /// A view that is already resolved to `value`.
    pub fn always(value: T) -> Self
    where
        T: Clone,
    {
        Self { source: Arc::new(Always(value)) }
    }

    /// A view that never resolves.
    #[must_use]
    pub fn never() -> Self {
        Self { source: Arc::new(Never(PhantomData)) }
    }

    /// A lazily transformed view over `base`: `transform` is applied fresh on every read rather
    /// than being cached in a new `Deferred`.
    pub fn every<U>(base: &Deferred<U>, transform: impl Fn(U) -> T + Send + Sync + 'static) -> Self
    where
        U: Clone + Send + Sync + 'static,
    {
        Self {
            source: Arc::new(Lazy {
                base: base.clone(),
                transform: Arc::new(transform),
            }),
        }
    }

    /// Returns a clone of the current value, if any, without blocking.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.source.peek()
    }

    /// Blocks the calling thread until a value is present or `deadline` passes.
    pub fn wait(&self, deadline: Deadline) -> Option<T> {
        self.source.wait(deadline)
    }

    /// Subscribes `handler` to run (via `exec`) once a value is available.
    pub fn upon<E: Executor>(&self, exec: E, handler: impl FnOnce(T) + Send + 'static) {
        self.source.upon(Box::new(exec), Box::new(handler));
    }
}
