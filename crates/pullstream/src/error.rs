//! Error types for pullstream operations.

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by a [`PullStream`](crate::PullStream) or its [`Writer`](crate::Writer).
///
/// The type is `Clone` because a single termination outcome is reported to
/// every read issued after the stream closed.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// A second `read()` was issued while the previous one was still pending.
    #[error("only one pending read is allowed")]
    ConcurrentRead,

    /// The producer called `write()` without a pending read.
    #[error("backpressure protocol was violated by the producer")]
    Backpressure,

    /// The stream was closed by its consumer.
    #[error("stream is closed")]
    Closed,

    /// A settlement was abandoned, or the producer task was cancelled or panicked.
    #[error("operation was aborted")]
    Aborted,

    /// The stream was read outside of a tokio runtime, so the producer could not start.
    #[error("no tokio runtime available to run the producer")]
    NoRuntime,

    /// An error raised by the producer routine.
    #[error(transparent)]
    Producer(Arc<dyn StdError + Send + Sync + 'static>),
}

impl StreamError {
    /// Wraps an arbitrary error raised inside a producer routine.
    pub fn producer<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Producer(Arc::new(err))
    }

    /// Returns the producer error as `E`, if this is a producer error of that type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Producer(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Returns `true` if a producer or consumer broke the read/write protocol.
    #[inline]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ConcurrentRead | Self::Backpressure)
    }

    /// Returns `true` if this error means the stream will never yield again.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::ConcurrentRead)
    }
}
