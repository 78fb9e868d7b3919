//! Error types for adapter operations.

use pullstream::StreamError;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Which side of an adapter a native resource sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// A readable push source.
    Source,
    /// A writable push sink.
    Sink,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("readable source"),
            Self::Sink => f.write_str("writable sink"),
        }
    }
}

/// Errors that can occur while bridging streams and native resources.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// A native resource reported an I/O error.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// A native resource closed without ending or finishing first.
    #[error("{0} was closed")]
    UnexpectedClose(Endpoint),

    /// `buffer` received more bytes than its configured limit.
    #[error("buffer limit of {limit} bytes exceeded")]
    LimitExceeded {
        /// The configured limit.
        limit: usize,
    },

    /// The requested text encoding label is not known.
    #[error("unknown text encoding: {0}")]
    UnknownEncoding(String),

    /// The stream being adapted failed.
    #[error(transparent)]
    Stream(StreamError),
}

impl AdapterError {
    /// Returns `true` if a native resource failed or closed unexpectedly.
    #[inline]
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Io(_) | Self::UnexpectedClose(_))
    }
}

impl From<io::Error> for AdapterError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Recovers an adapter error that travelled through a stream as a producer error.
impl From<StreamError> for AdapterError {
    fn from(err: StreamError) -> Self {
        match err.downcast_ref::<AdapterError>() {
            Some(adapter) => adapter.clone(),
            None => Self::Stream(err),
        }
    }
}

/// Lets adapter errors be raised with `?` inside producer routines.
impl From<AdapterError> for StreamError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Stream(inner) => inner,
            other => StreamError::producer(other),
        }
    }
}
