// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The `Executor` capability and the crate's single bundled implementation.

use std::fmt;

/// A capability that can run a submitted closure.
///
/// `Executor` is intentionally narrow: the only contract the rest of this crate relies on is
/// that a submitted job eventually runs, exactly once. Everything beyond that - thread pools,
/// serial queues, platform run loops, priority scheduling - is left to downstream adapter
/// crates; this crate ships only [`Immediate`].
pub trait Executor: Send + Sync + 'static {
    /// Submits `job` for execution.
    fn submit(&self, job: Box<dyn FnOnce() + Send>);
}

impl Executor for Box<dyn Executor> {
    fn submit(&self, job: Box<dyn FnOnce() + Send>) {
        (**self).submit(job);
    }
}

/// An [`Executor`] that runs every job synchronously on the thread calling [`Executor::submit`].
///
/// This is the reference executor the core ships so the crate is usable stand-alone. Handlers
/// submitted through `Immediate` run inline, which means they may run on whatever thread called
/// [`crate::deferred::Deferred::fill`] (if the cell was still empty at subscribe time) or
/// inline on the subscriber's own thread (if the cell was already filled).
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl Executor for Immediate {
    fn submit(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Immediate")
    }
}
