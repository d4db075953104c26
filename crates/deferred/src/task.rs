// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! [`Task`], a fallible [`Deferred`] paired with cancellation and progress.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::deferred::{Deadline, Deferred};
use crate::executor::{Executor, Immediate};
use crate::progress::Progress;

type CancelFn = Box<dyn FnOnce() + Send>;

struct Control {
    cancel_requested: AtomicBool,
    cancel_fn: Mutex<Option<CancelFn>>,
}

impl Control {
    fn new(cancel_fn: Option<CancelFn>) -> Arc<Self> {
        Arc::new(Self {
            cancel_requested: AtomicBool::new(false),
            cancel_fn: Mutex::new(cancel_fn),
        })
    }
}

/// A [`Deferred<Result<T, E>>`] paired with a cooperative cancellation request and a
/// [`Progress`] handle.
///
/// Cancelling a `Task` does not itself fill it: cancellation only sets a flag and (at most once)
/// runs the producer's cancellation closure. It is the producer's responsibility to observe
/// [`Task::is_cancelled`] and fill with whatever failure value makes sense for it - typically
/// (but not necessarily) [`crate::Error::cancelled`].
///
/// Composed tasks (via `map`, `and_then`, `recover`, `fallback`) share their base's cancellation
/// flag and `Progress`: cancelling any task in a chain marks the whole chain cancelled, so every
/// not-yet-started downstream step can observe it before choosing to run. Already-completed
/// upstream steps are unaffected, since there is nothing left in them to cancel.
pub struct Task<T, E> {
    deferred: Deferred<Result<T, E>>,
    progress: Progress,
    control: Arc<Control>,
}

impl<T, E> Clone for Task<T, E> {
    fn clone(&self) -> Self {
        Self {
            deferred: self.deferred.clone(),
            progress: self.progress.clone(),
            control: Arc::clone(&self.control),
        }
    }
}

impl<T, E> Task<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Builds an origin task around `deferred`, synthesizing an indeterminate `Progress` (weight
    /// 1) that completes when `deferred` fills. `cancel` (if given) runs at most once, dispatched
    /// through an executor rather than inline, when [`Task::cancel`] is first called.
    pub fn from_deferred(deferred: Deferred<Result<T, E>>, cancel: Option<impl FnOnce() + Send + 'static>) -> Self {
        let progress = Progress::synthetic_origin();
        let watcher = progress.clone();
        deferred.upon(Immediate, move |_| watcher.mark_origin_done());
        Self {
            deferred,
            progress,
            control: Control::new(cancel.map(|f| Box::new(f) as CancelFn)),
        }
    }

    /// Builds an origin task around `deferred`, adopting `external_progress` (weight 20) rather
    /// than synthesizing one.
    pub fn from_deferred_with_progress(
        deferred: Deferred<Result<T, E>>,
        external_progress: Progress,
        cancel: Option<impl FnOnce() + Send + 'static>,
    ) -> Self {
        Self {
            deferred,
            progress: Progress::adopting(external_progress),
            control: Control::new(cancel.map(|f| Box::new(f) as CancelFn)),
        }
    }

    /// An already-succeeded task.
    #[must_use]
    pub fn from_success(value: T) -> Self {
        let progress = Progress::synthetic_origin();
        progress.mark_origin_done();
        Self {
            deferred: Deferred::filled(Ok(value)),
            progress,
            control: Control::new(None),
        }
    }

    /// An already-failed task.
    #[must_use]
    pub fn from_failure(error: E) -> Self {
        let progress = Progress::synthetic_origin();
        progress.mark_origin_done();
        Self {
            deferred: Deferred::filled(Err(error)),
            progress,
            control: Control::new(None),
        }
    }

    /// This task's progress handle.
    #[must_use]
    pub const fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Returns whether cancellation has been requested anywhere in this task's chain.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.control.cancel_requested.load(Ordering::Relaxed)
    }

    /// Requests cancellation. Idempotent across the whole chain: only the first call (from any
    /// clone, or any task sharing this chain) runs the cancellation closure, and it runs via
    /// `exec` rather than synchronously on the caller's thread.
    pub fn cancel<Exec: Executor>(&self, exec: Exec) {
        if self.control.cancel_requested.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("task cancelled");
        self.progress.cancel();
        let cancel_fn = self.control.cancel_fn.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(cancel_fn) = cancel_fn {
            exec.submit(Box::new(cancel_fn));
        }
    }

    /// Returns a clone of the current result, if any, without blocking.
    #[must_use]
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.deferred.peek()
    }

    /// Returns whether this task has settled (succeeded or failed).
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.deferred.is_filled()
    }

    /// Blocks the calling thread until this task settles or `deadline` passes.
    pub fn wait(&self, deadline: Deadline) -> Option<Result<T, E>> {
        self.deferred.wait(deadline)
    }

    /// Subscribes `handler` to run once this task settles, whether it succeeds or fails.
    pub fn upon<Exec: Executor>(&self, exec: Exec, handler: impl FnOnce(Result<T, E>) + Send + 'static) {
        self.deferred.upon(exec, handler);
    }

    /// Subscribes `handler` to run only if this task succeeds.
    pub fn upon_success<Exec: Executor>(&self, exec: Exec, handler: impl FnOnce(T) + Send + 'static) {
        self.deferred.upon(exec, move |result| {
            if let Ok(value) = result {
                handler(value);
            }
        });
    }

    /// Subscribes `handler` to run only if this task fails.
    pub fn upon_failure<Exec: Executor>(&self, exec: Exec, handler: impl FnOnce(E) + Send + 'static) {
        self.deferred.upon(exec, move |result| {
            if let Err(error) = result {
                handler(error);
            }
        });
    }

    /// Transforms a successful value with `f`; failures pass through unchanged. Contributes one
    /// unit to the chain's progress at registration, and one more on completion.
    pub fn map<U, Exec, F>(&self, exec: Exec, f: F) -> Task<U, E>
    where
        U: Clone + Send + Sync + 'static,
        Exec: Executor,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.progress.register_map();
        let out = Deferred::new();
        let out2 = out.clone();
        let progress = self.progress.clone();
        self.deferred.upon(exec, move |result| {
            let mapped = result.map(f);
            progress.complete_map();
            out2.fill(mapped);
        });
        Task {
            deferred: out,
            progress: self.progress.clone(),
            control: Arc::clone(&self.control),
        }
    }

    /// Transforms a failure value with `f`, replacing it with a success; successes pass through
    /// unchanged.
    pub fn recover<Exec, F>(&self, exec: Exec, f: F) -> Task<T, E>
    where
        Exec: Executor,
        F: FnOnce(E) -> T + Send + 'static,
    {
        let out = Deferred::new();
        let out2 = out.clone();
        self.deferred.upon(exec, move |result| {
            out2.fill(result.or_else(|error| Ok(f(error))));
        });
        Task {
            deferred: out,
            progress: self.progress.clone(),
            control: Arc::clone(&self.control),
        }
    }

    /// Chains a successful value into a new task produced by `f`, flattening the result.
    /// Failures pass through unchanged. Reserves an 8-unit placeholder at registration, resolved
    /// to the continuation's own weight (1 or 20) on completion.
    pub fn and_then<U, Exec, F>(&self, exec: Exec, f: F) -> Task<U, E>
    where
        U: Clone + Send + Sync + 'static,
        Exec: Executor + Clone,
        F: FnOnce(T) -> Task<U, E> + Send + 'static,
    {
        self.progress.register_and_then();
        let out = Deferred::new();
        let out2 = out.clone();
        let progress = self.progress.clone();
        let exec2 = exec.clone();
        self.deferred.upon(exec, move |result| match result {
            Ok(value) => {
                let inner = f(value);
                let continuation_is_external = inner.progress.is_external();
                let out3 = out2.clone();
                let progress2 = progress.clone();
                inner.deferred.upon(exec2, move |inner_result| {
                    progress2.complete_and_then(continuation_is_external);
                    out3.fill(inner_result);
                });
            }
            Err(error) => {
                progress.complete_and_then(false);
                out2.fill(Err(error));
            }
        });
        Task {
            deferred: out,
            progress: self.progress.clone(),
            control: Arc::clone(&self.control),
        }
    }

    /// Chains a failure into a new task produced by `h`, flattening the result; successes pass
    /// through unchanged.
    pub fn fallback<Exec, F>(&self, exec: Exec, h: F) -> Task<T, E>
    where
        Exec: Executor + Clone,
        F: FnOnce(E) -> Task<T, E> + Send + 'static,
    {
        let out = Deferred::new();
        let out2 = out.clone();
        let exec2 = exec.clone();
        self.deferred.upon(exec, move |result| match result {
            Ok(value) => out2.fill(Ok(value)),
            Err(error) => {
                let inner = h(error);
                let out3 = out2.clone();
                inner.deferred.upon(exec2, move |inner_result| {
                    out3.fill(inner_result);
                });
            }
        });
        Task {
            deferred: out,
            progress: self.progress.clone(),
            control: Arc::clone(&self.control),
        }
    }

    /// Drops the success payload, keeping only success/failure.
    pub fn ignored<Exec: Executor>(&self, exec: Exec) -> Task<(), E> {
        self.map(exec, |_| ())
    }
}

/// Pairs two tasks' successes, failing with whichever fails first.
pub fn and_success<A, B, E, Exec>(a: &Task<A, E>, b: &Task<B, E>, exec: Exec) -> Task<(A, B), E>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    Exec: Executor + Clone,
{
    let b = b.clone();
    a.and_then(exec.clone(), move |av| b.map(exec, move |bv| (av, bv)))
}

/// Waits for every task in `tasks` to succeed, collecting their values in input order; fails
/// with the first failure observed. An empty `tasks` succeeds immediately with an empty `Vec`.
pub fn all_succeeded<T, E, Exec>(tasks: Vec<Task<T, E>>, exec: Exec) -> Task<Vec<T>, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    Exec: Executor + Clone,
{
    if tasks.is_empty() {
        return Task::from_success(Vec::new());
    }

    let out: Deferred<Result<Vec<T>, E>> = Deferred::new();
    let remaining = Arc::new(AtomicUsize::new(tasks.len()));
    let slots: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new((0..tasks.len()).map(|_| None).collect()));

    for (index, task) in tasks.into_iter().enumerate() {
        let slots = Arc::clone(&slots);
        let remaining = Arc::clone(&remaining);
        let out = out.clone();
        task.upon(exec.clone(), move |result| match result {
            Ok(value) => {
                {
                    let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
                    slots[index] = Some(value);
                }
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
                    let values = slots
                        .iter_mut()
                        .map(|slot| slot.take().expect("every slot is filled once `remaining` reaches zero"))
                        .collect();
                    out.fill(Ok(values));
                }
            }
            Err(error) => {
                out.fill(Err(error));
            }
        });
    }

    let progress = Progress::synthetic_origin();
    let watcher = progress.clone();
    out.upon(Immediate, move |_| watcher.mark_origin_done());

    Task {
        deferred: out,
        progress,
        control: Control::new(None),
    }
}
