// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The lock-free MPSC waiter list underlying [`crate::deferred::Deferred::upon`].

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::executor::Executor;

/// A subscriber's handler, paired with the executor it should run on.
struct Waiter<T> {
    executor: Box<dyn Executor>,
    handler: Box<dyn FnOnce(T) + Send>,
}

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    waiter: Option<Waiter<T>>,
}

/// Which side of the queue a [`Queue::push`] call landed on.
///
/// `First` means this call just established a brand-new head - either because the queue was
/// genuinely empty, or because a previous [`Queue::drain`] already swept the old chain away.
/// Either way, nobody else is guaranteed to come looking for this node, so the caller is
/// responsible for checking whether a drain has since become due.
pub(crate) enum Role {
    First,
    Subsequent,
}

/// A singly linked, lock-free multi-producer list of waiters, drained by a single consumer.
pub(crate) struct Queue<T> {
    head: AtomicPtr<Node<T>>,
    tail: AtomicPtr<Node<T>>,
}

impl<T> Queue<T> {
    pub(crate) const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            tail: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Links a new waiter onto the tail of the queue.
    pub(crate) fn push(&self, executor: Box<dyn Executor>, handler: Box<dyn FnOnce(T) + Send>) -> Role {
        let node = Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            waiter: Some(Waiter { executor, handler }),
        }));

        let prev = self.tail.swap(node, Ordering::AcqRel);
        if prev.is_null() {
            self.head.store(node, Ordering::SeqCst);
            Role::First
        } else {
            // Safety: `prev` is the value a previous `push` stored into `tail` via `swap`; nodes
            // are only ever freed by `drain`, which never frees a node before observing it
            // through a predecessor's `next`, so `prev` is still live.
            unsafe { &*prev }.next.store(node, Ordering::Release);
            Role::Subsequent
        }
    }

    /// Invokes every waiter currently linked (and any still being linked as this call starts)
    /// with a clone of `value`, submitting each through its own executor.
    ///
    /// Safe to call more than once: a sweep only ever touches nodes it can reach from the
    /// `head`/`tail` pair it captures, and each node is freed by exactly one sweep. A sweep over
    /// an empty queue is a no-op.
    pub(crate) fn drain(&self, value: &T)
    where
        T: Clone,
    {
        let mut current = self.head.swap(ptr::null_mut(), Ordering::Acquire);
        let tail_snapshot = self.tail.swap(ptr::null_mut(), Ordering::AcqRel);

        if current.is_null() {
            return;
        }
        if tracing::enabled!(tracing::Level::TRACE) {
            tracing::trace!("queue drained");
        }

        while !current.is_null() {
            // Safety: `current` was linked by `push` and has not been freed; this sweep is the
            // only one that can reach it (see the method doc), so it is safe to take ownership.
            let mut node = unsafe { Box::from_raw(current) };

            let next = loop {
                let candidate = node.next.load(Ordering::Acquire);
                if !candidate.is_null() || ptr::eq(current, tail_snapshot) {
                    break candidate;
                }
                // `current` was linked before `tail_snapshot` was captured, so it has a
                // successor; that successor's `push` call has returned from its `tail.swap` but
                // has not yet published `next`. It will, imminently - there is no blocking work
                // in between.
                std::hint::spin_loop();
            };

            if let Some(Waiter { executor, handler }) = node.waiter.take() {
                let value = value.clone();
                executor.submit(Box::new(move || handler(value)));
            }
            current = next;
        }
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        let mut current = *self.head.get_mut();
        while !current.is_null() {
            // Safety: `&mut self` guarantees no concurrent push or drain is in flight.
            let node = unsafe { Box::from_raw(current) };
            current = node.next.load(Ordering::Relaxed);
        }
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("empty", &self.head.load(Ordering::Relaxed).is_null())
            .finish()
    }
}

// Safety: pushing a waiter moves its handler (and captured value) to whichever thread calls
// `drain`, so `Send` is required of `T`; nothing here reads `T` through a shared reference from
// multiple threads at once, so no `Sync` bound is needed on `T` itself.
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

#[cfg(test)]
mod tests {
    use super::{Queue, Role};
    use crate::executor::Immediate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn first_push_on_empty_queue_is_first() {
        let queue: Queue<i32> = Queue::new();
        assert!(matches!(queue.push(Box::new(Immediate), Box::new(|_| {})), Role::First));
    }

    #[test]
    fn second_push_is_subsequent() {
        let queue: Queue<i32> = Queue::new();
        let _ = queue.push(Box::new(Immediate), Box::new(|_| {}));
        assert!(matches!(queue.push(Box::new(Immediate), Box::new(|_| {})), Role::Subsequent));
    }

    #[test]
    fn drain_invokes_every_waiter_exactly_once() {
        let queue: Queue<i32> = Queue::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..16 {
            let calls = Arc::clone(&calls);
            let _ = queue.push(Box::new(Immediate), Box::new(move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
            }));
        }

        queue.drain(&7);
        assert_eq!(calls.load(Ordering::Relaxed), 16);

        // A second sweep over the now-empty queue must be a harmless no-op.
        queue.drain(&7);
        assert_eq!(calls.load(Ordering::Relaxed), 16);
    }

    #[test]
    fn drop_without_drain_frees_nodes_silently() {
        let queue: Queue<i32> = Queue::new();
        let invoked = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let invoked = Arc::clone(&invoked);
            let _ = queue.push(Box::new(Immediate), Box::new(move |_| {
                invoked.fetch_add(1, Ordering::Relaxed);
            }));
        }
        drop(queue);
        assert_eq!(invoked.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn concurrent_push_and_drain_invokes_all_waiters() {
        use std::thread;

        testing_aids::execute_or_abandon(|| {
            let queue = Arc::new(Queue::<i32>::new());
            let calls = Arc::new(AtomicUsize::new(0));

            let pushers: Vec<_> = (0..8)
                .map(|_| {
                    let queue = Arc::clone(&queue);
                    let calls = Arc::clone(&calls);
                    thread::spawn(move || {
                        let calls = Arc::clone(&calls);
                        let _ = queue.push(Box::new(Immediate), Box::new(move |_| {
                            calls.fetch_add(1, Ordering::Relaxed);
                        }));
                    })
                })
                .collect();

            for handle in pushers {
                handle.join().unwrap();
            }

            queue.drain(&1);
            assert_eq!(calls.load(Ordering::Relaxed), 8);
        })
        .expect("test should complete within the watchdog timeout");
    }
}
