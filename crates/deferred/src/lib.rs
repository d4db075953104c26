// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A lock-free single-assignment future/promise core, with task cancellation and progress.
//!
//! # Why?
//!
//! Most futures libraries couple three separate concerns into one generic type: write-once
//! value publication, composition (`map`/`and_then`/...), and async executor integration. This
//! crate keeps them apart on purpose:
//!
//! - [`Deferred<T>`] is the value cell: a write-once slot with multi-subscriber notification. It
//!   has no opinion on *how* work runs.
//! - [`Executor`] is the scheduling capability: "run this closure somewhere, eventually". This
//!   crate ships only [`Immediate`], a synchronous reference implementation; thread pools,
//!   serial queues, and run-loop integration belong in downstream adapter crates.
//! - [`Task<T, E>`] layers cancellation and [`Progress`] reporting on top of a
//!   `Deferred<Result<T, E>>`, for the common case of a long-running, fallible, cancellable
//!   unit of work.
//!
//! None of these types implement [`std::future::Future`]. This is a thread-and-callback
//! notification primitive, not an async/await integration; see [`View`] for why that is a
//! deliberate boundary rather than an oversight.
//!
//! # Overview
//!
//! ```
//! use deferred::{Deferred, Immediate};
//!
//! let d: Deferred<i32> = Deferred::new();
//! d.upon(Immediate, |value| println!("got {value}"));
//! d.fill(42); // prints "got 42"
//! ```
//!
//! Composing values:
//!
//! ```
//! use deferred::{combinators, Deferred, Immediate};
//!
//! let base: Deferred<i32> = Deferred::new();
//! let doubled = combinators::map(&base, Immediate, |v| v * 2);
//! base.fill(21);
//! assert_eq!(doubled.peek(), Some(42));
//! ```
//!
//! Fallible, cancellable work with progress:
//!
//! ```
//! use deferred::{Deferred, Immediate, Task};
//!
//! let deferred: Deferred<Result<i32, String>> = Deferred::new();
//! let task = Task::from_deferred(deferred.clone(), Some(|| println!("cancelled")));
//! let doubled = task.map(Immediate, |v| v * 2);
//! deferred.fill(Ok(21));
//! assert_eq!(doubled.peek(), Some(Ok(42)));
//! ```
//!
//! # Testing
//!
//! Each module carries its own `#[cfg(test)]` unit tests; cross-module scenarios live under
//! `tests/`. Concurrency-sensitive tests spawn real threads rather than mocking the scheduler -
//! see `queue.rs`'s `concurrent_push_and_drain_invokes_all_waiters` for an example.

#![doc(html_logo_url = "https://media.githubusercontent.com/media/microsoft/oxidizer/refs/heads/main/crates/deferred/logo.png")]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod cell;
mod combinators;
mod deferred;
mod error;
mod executor;
mod progress;
mod queue;
mod result;
mod task;
mod view;

pub use crate::deferred::{Deadline, Deferred};
pub use crate::error::Error;
pub use crate::executor::{Executor, Immediate};
pub use crate::progress::Progress;
pub use crate::result::catching;
pub use crate::task::{all_succeeded, and_success, Task};
pub use crate::view::View;

/// Free-function composition combinators over [`Deferred`]: `map`, `and_then`, `ignored`,
/// `and`, `all_filled`, `first_filled`.
pub mod combinators {
    pub use crate::combinators::{all_filled, and, and_then, first_filled, ignored, map};
}
