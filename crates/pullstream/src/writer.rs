//! Producer-side write capability implementing `futures::Sink`.

use crate::error::StreamError;
use crate::settlement::Settlement;
use crate::state::{Lifecycle, Shared};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Future;
use futures_sink::Sink;
use tracing::trace;

/// The `write` capability handed to a producer routine.
///
/// Every successful [`write`](Writer::write) returns a gate that settles when
/// the consumer issues its next read. The producer must await the gate before
/// writing again; writing early fails with [`StreamError::Backpressure`].
///
/// # Note
///
/// `Writer` does NOT implement `Clone`. A stream has exactly one producer.
pub struct Writer<T> {
    shared: Arc<Shared<T>>,
    /// Gate of the last item sent through the `Sink` impl.
    gate: Option<Settlement<()>>,
}

impl<T> Writer<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared, gate: None }
    }

    /// Hands `value` to the pending read.
    ///
    /// Returns the backpressure gate. Fails synchronously with
    /// [`StreamError::Backpressure`] if no read is pending, or with
    /// [`StreamError::Closed`] if the consumer closed the stream.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let stream = PullStream::new(|write| async move {
    ///     write.write(1)?.await?;
    ///     write.write(2)?.await?;
    ///     Ok(())
    /// });
    /// ```
    pub fn write(&self, value: T) -> Result<Settlement<()>, StreamError> {
        trace!("producer write");
        self.shared.lock().accept_write(value)
    }

    /// Returns `true` once the stream is closed.
    ///
    /// A producer that does expensive work between writes can poll this to
    /// stop early.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().lifecycle() == Lifecycle::Closed
    }
}

impl<T> Sink<T> for Writer<T> {
    type Error = StreamError;

    /// Ready once the gate of the previous item has settled, i.e. once the
    /// consumer asked for the next value.
    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        if let Some(gate) = this.gate.as_mut() {
            match Pin::new(gate).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(outcome) => {
                    this.gate = None;
                    outcome?;
                }
            }
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        let this = self.get_mut();
        this.gate = Some(this.write(item)?);
        Ok(())
    }

    /// The item is handed over in `start_send`, so there is nothing to flush.
    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    /// Closing the writer does not end the stream; the stream ends when the
    /// producer routine returns.
    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
