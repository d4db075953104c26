// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Composition combinators over [`Deferred`].
//!
//! These are free functions rather than methods so that ordinary `Deferred<T>` stays a plain
//! value cell; composition is a separate concern layered on top, exactly as it is for
//! [`Task`](crate::task::Task) in `task.rs`. Every combinator here takes an explicit
//! [`Executor`] except [`ignored`], which has no user-supplied work to schedule and always uses
//! [`Immediate`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::sync::Arc;

use crate::deferred::Deferred;
use crate::executor::{Executor, Immediate};

/// Transforms the value of `base` with `f`, once filled.
pub fn map<T, U, E, F>(base: &Deferred<T>, exec: E, f: F) -> Deferred<U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    E: Executor,
    F: FnOnce(T) -> U + Send + 'static,
{
    let result = Deferred::new();
    let out = result.clone();
    base.upon(exec, move |value| {
        out.fill(f(value));
    });
    result
}

/// Transforms the value of `base` into a new `Deferred` with `f`, then flattens it: the
/// returned `Deferred` fills with the eventual value of `f`'s result, not with the intermediate
/// `Deferred<U>` itself.
pub fn and_then<T, U, E, F>(base: &Deferred<T>, exec: E, f: F) -> Deferred<U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    E: Executor + Clone,
    F: FnOnce(T) -> Deferred<U> + Send + 'static,
{
    let result = Deferred::new();
    let out = result.clone();
    let exec2 = exec.clone();
    base.upon(exec, move |value| {
        let inner = f(value);
        let out2 = out.clone();
        inner.upon(exec2, move |inner_value| {
            out2.fill(inner_value);
        });
    });
    result
}

/// Drops the payload of `base`, keeping only the fact that it filled.
pub fn ignored<T>(base: &Deferred<T>) -> Deferred<()>
where
    T: Clone + Send + Sync + 'static,
{
    map(base, Immediate, |_| ())
}

/// Pairs two `Deferred`s, filling once both have.
pub fn and<A, B>(a: &Deferred<A>, b: &Deferred<B>) -> Deferred<(A, B)>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    let b = b.clone();
    and_then(a, Immediate, move |av| map(&b, Immediate, move |bv| (av, bv)))
}

/// Waits for every `Deferred` in `items` to fill, collecting their values in input order.
///
/// An empty `items` resolves immediately to an empty `Vec`.
pub fn all_filled<T>(items: Vec<Deferred<T>>) -> Deferred<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let result = Deferred::new();

    if items.is_empty() {
        result.fill(Vec::new());
        return result;
    }

    let remaining = Arc::new(AtomicUsize::new(items.len()));
    let slots: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new((0..items.len()).map(|_| None).collect()));

    for (index, item) in items.into_iter().enumerate() {
        let slots = Arc::clone(&slots);
        let remaining = Arc::clone(&remaining);
        let result = result.clone();
        item.upon(Immediate, move |value| {
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
                result.fill(values);
            }
        });
    }

    result
}

/// Fills with the value of whichever `Deferred` in `items` fills first; later fills are
/// dropped.
///
/// An empty `items` never resolves.
pub fn first_filled<T>(items: Vec<Deferred<T>>) -> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    let result = Deferred::new();
    for item in items {
        let result = result.clone();
        item.upon(Immediate, move |value| {
            result.fill(value);
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::{all_filled, and, and_then, first_filled, ignored, map};
    use crate::deferred::Deferred;
    use crate::executor::Immediate;

    #[test]
    fn map_transforms_value() {
        let base = Deferred::new();
        let mapped = map(&base, Immediate, |v: i32| v * 10);
        base.fill(4);
        assert_eq!(mapped.peek(), Some(40));
    }

    #[test]
    fn and_then_flattens_nested_deferred() {
        let base = Deferred::new();
        let chained = and_then(&base, Immediate, |v: i32| Deferred::filled(v + 1));
        base.fill(1);
        assert_eq!(chained.peek(), Some(2));
    }

    #[test]
    fn ignored_drops_payload() {
        let base = Deferred::new();
        let done = ignored(&base);
        base.fill("hello");
        assert_eq!(done.peek(), Some(()));
    }

    #[test]
    fn and_pairs_both_values_regardless_of_fill_order() {
        let a = Deferred::new();
        let b = Deferred::new();
        let paired = and(&a, &b);
        b.fill("right");
        assert_eq!(paired.peek(), None);
        a.fill("left");
        assert_eq!(paired.peek(), Some(("left", "right")));
    }

    #[test]
    fn all_filled_preserves_input_order() {
        let items: Vec<Deferred<i32>> = (0..5).map(|_| Deferred::new()).collect();
        let combined = all_filled(items.clone());

        for (index, item) in items.iter().enumerate().rev() {
            item.fill(index as i32);
        }

        assert_eq!(combined.peek(), Some(vec![0, 1, 2, 3, 4]));
    }

    #[test]
    fn all_filled_of_empty_collection_resolves_immediately() {
        let combined: Deferred<Vec<i32>> = all_filled(Vec::new());
        assert_eq!(combined.peek(), Some(Vec::new()));
    }

    #[test]
    fn first_filled_takes_the_first_winner() {
        let items: Vec<Deferred<i32>> = (0..4).map(|_| Deferred::new()).collect();
        let winner = first_filled(items.clone());
        items[2].fill(99);
        items[0].fill(1);
        assert_eq!(winner.peek(), Some(99));
    }

    #[test]
    fn first_filled_of_empty_collection_never_resolves() {
        let winner: Deferred<i32> = first_filled(Vec::new());
        assert_eq!(winner.peek(), None);
    }
}
