// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! [`Deferred`], the write-once value cell with multi-subscriber notification.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::cell::Cell;
use crate::executor::Executor;
use crate::queue::{Queue, Role};

/// How long [`Deferred::wait`] (and [`crate::view::View::wait`]) should block for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Return immediately with whatever value is already present, if any.
    Now,
    /// Block until the value is filled, however long that takes.
    Forever,
    /// Block until the value is filled or the given instant passes, whichever comes first.
    At(Instant),
}

impl Deadline {
    /// A deadline `duration` from now.
    #[must_use]
    pub fn after(duration: Duration) -> Self {
        Self::At(Instant::now() + duration)
    }
}

struct Inner<T> {
    cell: Cell<T>,
    queue: Queue<T>,
    // A dedicated condvar rather than busy-polling the cell.
    notify: (Mutex<bool>, Condvar),
}

/// A value cell that can be written at most once and read (or subscribed to) any number of
/// times.
///
/// Cloning a `Deferred` is cheap: clones share the same underlying cell and waiter queue, so
/// filling one clone fills all of them and wakes every subscriber.
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").field("filled", &self.inner.cell.is_filled()).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Deferred<T> {
    /// Creates a new, empty `Deferred`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: Cell::empty(),
                queue: Queue::new(),
                notify: (Mutex::new(false), Condvar::new()),
            }),
        }
    }

    /// Creates a `Deferred` that is already filled with `value`.
    #[must_use]
    pub fn filled(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: Cell::filled(value),
                queue: Queue::new(),
                notify: (Mutex::new(true), Condvar::new()),
            }),
        }
    }

    /// Publishes `value`, waking every subscriber.
    ///
    /// Returns `true` if this call won the race to fill the value; `false` if the `Deferred`
    /// was already filled, in which case `value` is dropped.
    pub fn fill(&self, value: T) -> bool {
        if !self.inner.cell.try_store(value) {
            return false;
        }

        if tracing::enabled!(tracing::Level::TRACE) {
            tracing::trace!("deferred filled");
        }

        {
            let mut filled = self.inner.notify.0.lock().unwrap_or_else(PoisonError::into_inner);
            *filled = true;
        }
        self.inner.notify.1.notify_all();

        let value = self
            .inner
            .cell
            .load_acquire()
            .expect("cell was just filled by try_store")
            .clone();
        self.inner.queue.drain(&value);
        true
    }

    /// Returns a clone of the current value, if any, without blocking.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.inner.cell.load_acquire().cloned()
    }

    /// Returns whether this `Deferred` has been filled.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.inner.cell.is_filled()
    }

    /// Subscribes `handler` to run (via `exec`) once this `Deferred` is filled.
    ///
    /// If a value is already present, `handler` is submitted to `exec` immediately and the
    /// waiter queue is bypassed entirely. Otherwise `handler` is queued and runs (via its own
    /// captured `exec`) whenever [`Deferred::fill`] drains the queue. `handler` always runs
    /// through an executor, never synchronously on `fill`'s caller's thread, unless `exec`
    /// itself chooses to run inline (as [`crate::executor::Immediate`] does).
    pub fn upon<E>(&self, exec: E, handler: impl FnOnce(T) + Send + 'static)
    where
        E: Executor,
    {
        if let Some(value) = self.inner.cell.load_acquire() {
            let value = value.clone();
            exec.submit(Box::new(move || handler(value)));
            return;
        }

        let role = self.inner.queue.push(Box::new(exec), Box::new(handler));

        if matches!(role, Role::First) {
            // We may have just established a chain that no in-flight `fill` will ever come back
            // to drain: if `fill` raced us and already swept the previous chain before we
            // linked in, it is never coming back. If the cell is filled now, sweep it ourselves;
            // `drain` is safe to call redundantly.
            if let Some(value) = self.inner.cell.load_acquire() {
                let value = value.clone();
                self.inner.queue.drain(&value);
            }
        }
    }

    /// Blocks the calling thread until a value is present or `deadline` passes, returning a
    /// clone of the value if one was observed.
    pub fn wait(&self, deadline: Deadline) -> Option<T> {
        if let Some(value) = self.peek() {
            return Some(value);
        }

        match deadline {
            Deadline::Now => None,
            Deadline::Forever => {
                let mut filled = self.inner.notify.0.lock().unwrap_or_else(PoisonError::into_inner);
                while !*filled {
                    filled = self
                        .inner
                        .notify
                        .1
                        .wait(filled)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                self.peek()
            }
            Deadline::At(instant) => {
                let mut filled = self.inner.notify.0.lock().unwrap_or_else(PoisonError::into_inner);
                while !*filled {
                    let Some(remaining) = instant.checked_duration_since(Instant::now()) else {
                        break;
                    };
                    let (guard, result) = self
                        .inner
                        .notify
                        .1
                        .wait_timeout(filled, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    filled = guard;
                    if result.timed_out() && !*filled {
                        break;
                    }
                }
                self.peek()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Deadline, Deferred};
    use crate::executor::Immediate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fill_then_peek() {
        let d = Deferred::new();
        assert_eq!(d.peek(), None);
        assert!(d.fill(1));
        assert_eq!(d.peek(), Some(1));
        assert!(d.is_filled());
    }

    #[test]
    fn second_fill_is_rejected() {
        let d = Deferred::new();
        assert!(d.fill(1));
        assert!(!d.fill(2));
        assert_eq!(d.peek(), Some(1));
    }

    #[test]
    fn upon_before_fill_runs_once_filled() {
        let d = Deferred::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        d.upon(Immediate, move |v: i32| seen2.store(v as usize, Ordering::Relaxed));
        assert_eq!(seen.load(Ordering::Relaxed), 0);
        d.fill(42);
        assert_eq!(seen.load(Ordering::Relaxed), 42);
    }

    #[test]
    fn upon_after_fill_runs_immediately_bypassing_queue() {
        let d = Deferred::new();
        d.fill(7);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        d.upon(Immediate, move |v: i32| seen2.store(v as usize, Ordering::Relaxed));
        assert_eq!(seen.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn many_subscribers_each_run_exactly_once() {
        let d: Deferred<i32> = Deferred::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..32 {
            let calls = Arc::clone(&calls);
            d.upon(Immediate, move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
            });
        }
        d.fill(1);
        assert_eq!(calls.load(Ordering::Relaxed), 32);
    }

    #[test]
    fn wait_now_without_value_returns_none() {
        let d: Deferred<i32> = Deferred::new();
        assert_eq!(d.wait(Deadline::Now), None);
    }

    #[test]
    fn wait_forever_blocks_until_filled_from_another_thread() {
        let d: Deferred<i32> = Deferred::new();
        let writer = d.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.fill(9);
        });
        assert_eq!(d.wait(Deadline::Forever), Some(9));
        handle.join().unwrap();
    }

    #[test]
    fn wait_with_deadline_times_out_if_never_filled() {
        let d: Deferred<i32> = Deferred::new();
        let start = std::time::Instant::now();
        let result = d.wait(Deadline::after(Duration::from_millis(20)));
        assert_eq!(result, None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_with_deadline_returns_value_filled_before_expiry() {
        let d: Deferred<i32> = Deferred::new();
        let writer = d.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            writer.fill(3);
        });
        assert_eq!(d.wait(Deadline::after(Duration::from_secs(5))), Some(3));
        handle.join().unwrap();
    }

    #[test]
    fn dropping_unfilled_deferred_drops_queued_waiters_without_invoking() {
        let d: Deferred<i32> = Deferred::new();
        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked2 = Arc::clone(&invoked);
        d.upon(Immediate, move |_| {
            invoked2.fetch_add(1, Ordering::Relaxed);
        });
        drop(d);
        assert_eq!(invoked.load(Ordering::Relaxed), 0);
    }
}
