// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The single-assignment slot underlying [`crate::deferred::Deferred`].

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// A slot that can be written at most once and read any number of times.
///
/// `Cell` is the innermost primitive of this crate: wait-free, ordered publication of one value
/// to any number of readers. It has no notion of subscribers; that is
/// [`crate::queue::Queue`]'s job, one layer up.
pub(crate) struct Cell<T> {
    slot: AtomicPtr<T>,
}

impl<T> Cell<T> {
    /// Creates an empty cell.
    pub(crate) const fn empty() -> Self {
        Self {
            slot: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Creates a cell pre-populated with `value`.
    pub(crate) fn filled(value: T) -> Self {
        Self {
            slot: AtomicPtr::new(Box::into_raw(Box::new(value))),
        }
    }

    /// Reads the current value, if any, without ordering guarantees.
    pub(crate) fn load_relaxed(&self) -> Option<&T> {
        let ptr = self.slot.load(Ordering::Relaxed);
        // Safety: `ptr` is either null or was produced by `Box::into_raw` in `filled`/`try_store`
        // and is never freed while `self` is alive (only `Drop` frees it, which requires unique
        // access).
        unsafe { ptr.as_ref() }
    }

    /// Reads the current value, if any, synchronising with the publishing `try_store`.
    pub(crate) fn load_acquire(&self) -> Option<&T> {
        let ptr = self.slot.load(Ordering::Acquire);
        // Safety: see `load_relaxed`.
        unsafe { ptr.as_ref() }
    }

    /// Attempts to publish `value`. Returns `true` if this call won the race to fill the cell.
    ///
    /// On failure, `value` is dropped before returning.
    pub(crate) fn try_store(&self, value: T) -> bool {
        let boxed = Box::into_raw(Box::new(value));
        match self
            .slot
            .compare_exchange(ptr::null_mut(), boxed, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(_) => {
                // Safety: `boxed` was just allocated above and has not been published to any
                // other thread, so we still have unique ownership of it.
                drop(unsafe { Box::from_raw(boxed) });
                false
            }
        }
    }

    /// Returns whether this cell has been filled.
    pub(crate) fn is_filled(&self) -> bool {
        !self.slot.load(Ordering::Acquire).is_null()
    }
}

impl<T> Drop for Cell<T> {
    fn drop(&mut self) {
        let ptr = *self.slot.get_mut();
        if !ptr.is_null() {
            // Safety: `&mut self` guarantees no concurrent access, and `ptr` was produced by
            // `Box::into_raw`.
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

impl<T> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell").field("filled", &self.is_filled()).finish()
    }
}

// Safety: `Cell<T>` behaves like a `Box<T>` guarded by an atomic pointer. It is sound to share
// across threads under the same bounds `Box<T>` would require: `Sync` needs `T: Sync` (shared
// references to the value may be read from any thread) and `Send` needs `T: Send` (the value may
// be dropped on whichever thread drops the last handle).
unsafe impl<T: Send> Send for Cell<T> {}
unsafe impl<T: Sync> Sync for Cell<T> {}

#[cfg(test)]
mod tests {
    use super::Cell;

    #[test]
    fn empty_cell_has_no_value() {
        let cell: Cell<i32> = Cell::empty();
        assert!(!cell.is_filled());
        assert_eq!(cell.load_acquire(), None);
        assert_eq!(cell.load_relaxed(), None);
    }

    #[test]
    fn filled_constructor_is_immediately_observable() {
        let cell = Cell::filled(42);
        assert!(cell.is_filled());
        assert_eq!(cell.load_acquire(), Some(&42));
    }

    #[test]
    fn try_store_wins_exactly_once() {
        let cell = Cell::empty();
        assert!(cell.try_store(1));
        assert!(!cell.try_store(2));
        assert_eq!(cell.load_acquire(), Some(&1));
    }

    #[test]
    fn concurrent_try_store_has_exactly_one_winner() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::thread;

        testing_aids::execute_or_abandon(|| {
            let cell = Arc::new(Cell::empty());
            let wins = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let cell = Arc::clone(&cell);
                    let wins = Arc::clone(&wins);
                    thread::spawn(move || {
                        if cell.try_store(i) {
                            wins.fetch_add(1, Ordering::Relaxed);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(wins.load(Ordering::Relaxed), 1);
            assert!(cell.is_filled());
        })
        .expect("test should complete within the watchdog timeout");
    }

    #[test]
    fn drop_releases_value() {
        use std::sync::Arc;

        let marker = Arc::new(());
        let cell = Cell::filled(Arc::clone(&marker));
        assert_eq!(Arc::strong_count(&marker), 2);
        drop(cell);
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
