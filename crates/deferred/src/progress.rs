// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! [`Progress`], the weighted unit-counter a [`Task`](crate::task::Task) chain reports through.
//!
//! Composing a task (`map`, `and_then`, ...) extends the same root `Progress` rather than
//! building a sibling node, so a chain of any length reports through a single shared counter
//! pair. The weighting policy below (origin weight, per-step contribution) is stable API
//! behavior, not an implementation detail subject to change.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// An origin task's own weight in the root's total, depending on whether it adopted an
/// externally supplied progress source or synthesized an indeterminate one.
const EXTERNAL_ORIGIN_WEIGHT: u64 = 20;
const SYNTHETIC_ORIGIN_WEIGHT: u64 = 1;

/// `and_then`'s placeholder weight before its continuation's nature is known.
const AND_THEN_PLACEHOLDER_WEIGHT: u64 = 8;

/// `map`'s fixed weight.
const MAP_WEIGHT: u64 = 1;

enum Origin {
    /// No externally supplied progress: a single indeterminate unit that completes when the
    /// underlying `Deferred` fills.
    Synthetic { done: AtomicBool },
    /// Adopts a caller-supplied `Progress`; this node's own fraction is read live from `source`
    /// and scaled by its reserved weight.
    External { source: Progress },
}

struct Inner {
    // Guards the read-modify-write pair in `complete_and_then` (subtract the placeholder,
    // add the resolved weight) so a concurrent `fraction()` read never observes a torn total.
    // Plain reads of `total`/`completed` never take this lock.
    growth: Mutex<()>,
    total: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicBool,
    paused: AtomicBool,
    origin_weight: u64,
    origin: Origin,
}

/// A node tracking completed/total work units for a [`Task`](crate::task::Task) chain.
///
/// `Progress` is cheap to clone: clones share the same counters. See the module docs for the
/// weighting policy.
pub struct Progress {
    inner: Arc<Inner>,
}

impl Clone for Progress {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("completed", &self.completed())
            .field("total", &self.total())
            .field("fraction", &self.fraction())
            .field("cancelled", &self.is_cancelled())
            .field("paused", &self.is_paused())
            .finish()
    }
}

impl Progress {
    /// An origin node with no externally supplied progress: a single indeterminate unit that
    /// completes when the underlying `Deferred` fills (weight 1).
    #[must_use]
    pub(crate) fn synthetic_origin() -> Self {
        Self {
            inner: Arc::new(Inner {
                growth: Mutex::new(()),
                total: AtomicU64::new(SYNTHETIC_ORIGIN_WEIGHT),
                completed: AtomicU64::new(0),
                cancelled: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                origin_weight: SYNTHETIC_ORIGIN_WEIGHT,
                origin: Origin::Synthetic { done: AtomicBool::new(false) },
            }),
        }
    }

    /// Adopts `external` as the origin of a new chain, reserving its policy weight (20) in the
    /// root's total.
    #[must_use]
    pub fn adopting(external: Progress) -> Self {
        Self {
            inner: Arc::new(Inner {
                growth: Mutex::new(()),
                total: AtomicU64::new(EXTERNAL_ORIGIN_WEIGHT),
                completed: AtomicU64::new(0),
                cancelled: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                origin_weight: EXTERNAL_ORIGIN_WEIGHT,
                origin: Origin::External { source: external },
            }),
        }
    }

    pub(crate) fn mark_origin_done(&self) {
        if let Origin::Synthetic { done } = &self.inner.origin {
            done.store(true, Ordering::Release);
            tracing::debug!("progress origin completed");
        }
    }

    pub(crate) fn is_external(&self) -> bool {
        matches!(self.inner.origin, Origin::External { .. })
    }

    /// Reserves `map`'s fixed unit at registration time.
    pub(crate) fn register_map(&self) {
        self.inner.total.fetch_add(MAP_WEIGHT, Ordering::AcqRel);
    }

    /// Marks a registered `map` step as complete.
    pub(crate) fn complete_map(&self) {
        self.inner.completed.fetch_add(MAP_WEIGHT, Ordering::AcqRel);
        tracing::debug!("progress map step completed");
    }

    /// Reserves `and_then`'s undetermined 8-unit placeholder at registration time.
    pub(crate) fn register_and_then(&self) {
        self.inner.total.fetch_add(AND_THEN_PLACEHOLDER_WEIGHT, Ordering::AcqRel);
    }

    /// Resolves a registered `and_then` step's placeholder to its final weight (20 if its
    /// continuation adopted external progress, 1 otherwise) and marks it complete.
    pub(crate) fn complete_and_then(&self, continuation_is_external: bool) {
        let resolved = if continuation_is_external { EXTERNAL_ORIGIN_WEIGHT } else { SYNTHETIC_ORIGIN_WEIGHT };
        {
            let _guard = self.inner.growth.lock();
            self.inner.total.fetch_sub(AND_THEN_PLACEHOLDER_WEIGHT, Ordering::AcqRel);
            self.inner.total.fetch_add(resolved, Ordering::AcqRel);
        }
        self.inner.completed.fetch_add(resolved, Ordering::AcqRel);
        tracing::debug!(continuation_is_external, "progress and_then step completed");
    }

    /// The sum of completed-step weights, not counting the origin's own contribution.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// The chain's total reserved weight.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.inner.total.load(Ordering::Acquire)
    }

    /// The chain's completion fraction in `[0.0, 1.0]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }

        let origin_contribution = match &self.inner.origin {
            Origin::Synthetic { done } => {
                if done.load(Ordering::Acquire) {
                    self.inner.origin_weight as f64
                } else {
                    0.0
                }
            }
            Origin::External { source } => source.fraction() * self.inner.origin_weight as f64,
        };

        ((self.completed() as f64 + origin_contribution) / total as f64).min(1.0)
    }

    /// Returns whether this node (or an ancestor) has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Returns whether this node (or an ancestor) is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Relaxed)
    }

    /// Marks this node cancelled and, if it adopted an externally supplied source, forwards the
    /// cancellation to it.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
        if let Origin::External { source } = &self.inner.origin {
            source.cancel();
        }
    }

    /// Marks this node paused and, if it adopted an externally supplied source, forwards the
    /// pause to it.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Relaxed);
        if let Origin::External { source } = &self.inner.origin {
            source.pause();
        }
    }

    /// Clears the paused flag, forwarding to an adopted external source if present.
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Relaxed);
        if let Origin::External { source } = &self.inner.origin {
            source.resume();
        }
    }
}
