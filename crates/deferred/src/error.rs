// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! This crate's own opaque error type.

use std::fmt;

/// This crate's own error type.
///
/// `Error` exists for exactly two purposes: the conventional failure payload for a cancelled
/// [`Task`](crate::task::Task), via [`Error::cancelled`], and the payload
/// [`crate::result::catching`] produces when a wrapped closure panics. Application failure
/// types are never forced through `Error` - [`Task`](crate::task::Task) is generic over its
/// failure type precisely so callers keep using their own.
#[derive(Debug)]
pub struct Error(ErrorKind);

#[derive(Debug)]
enum ErrorKind {
    Cancelled,
    Panicked(String),
}

impl Error {
    /// The conventional failure payload for a task whose producer observed
    /// [`Task::is_cancelled`](crate::task::Task::is_cancelled) and chose to fill with a failure
    /// rather than a success.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self(ErrorKind::Cancelled)
    }

    pub(crate) fn from_panic_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panicked with a non-string payload".to_owned());
        Self(ErrorKind::Panicked(message))
    }

    /// Returns whether this error represents a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.0, ErrorKind::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ErrorKind::Cancelled => f.write_str("operation was cancelled"),
            ErrorKind::Panicked(message) => write!(f, "operation panicked: {message}"),
        }
    }
}

impl std::error::Error for Error {}
