//! Consumer-side pull stream implementing `futures::Stream`.

use crate::error::StreamError;
use crate::settlement::{Outcome, Settlement};
use crate::state::{Lifecycle, ReadRegistration, Shared};
use crate::writer::Writer;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use futures_core::{ready, Future, Stream};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, warn};

type Producer<T> = Box<dyn FnOnce(Writer<T>) -> BoxFuture<'static, Outcome<()>> + Send>;

/// A pull-based stream driven by a producer routine.
///
/// The producer is started lazily by the first [`read`](PullStream::read) and
/// runs as a tokio task. Reads and writes strictly alternate: the producer's
/// `write` hands a value to the pending read, then waits until the consumer
/// asks for the next one. At most one value is ever in flight.
///
/// # Shutdown
///
/// [`close`](PullStream::close) aborts the producer task, so its cleanup
/// (`Drop` impls of everything it owns) runs. Dropping the stream closes it.
pub struct PullStream<T> {
    shared: Arc<Shared<T>>,
    producer: Option<Producer<T>>,
    task: Option<JoinHandle<()>>,
    /// Read issued by `poll_next`, kept across polls.
    inflight: Option<Settlement<Option<T>>>,
    exhausted: bool,
}

impl<T: Send + 'static> PullStream<T> {
    /// Creates a stream around `producer`.
    ///
    /// The producer is not invoked until the first read.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use pullstream::PullStream;
    ///
    /// let mut numbers = PullStream::new(|write| async move {
    ///     for n in 0..3 {
    ///         write.write(n)?.await?;
    ///     }
    ///     Ok(())
    /// });
    ///
    /// while let Some(n) = numbers.read().await? {
    ///     println!("{n}");
    /// }
    /// ```
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(Writer<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Outcome<()>> + Send + 'static,
    {
        Self {
            shared: Shared::new(),
            producer: Some(Box::new(move |writer| producer(writer).boxed())),
            task: None,
            inflight: None,
            exhausted: false,
        }
    }

    /// Requests the next value.
    ///
    /// The returned settlement resolves with `Ok(Some(value))`, `Ok(None)` at
    /// the end of the stream, or an error. Issuing a second read before the
    /// first settled resolves the second one with
    /// [`StreamError::ConcurrentRead`]. Once the stream is closed every read
    /// resolves with the termination outcome.
    pub fn read(&mut self) -> Settlement<Option<T>> {
        let registration = self.shared.lock().register_read();
        match registration {
            ReadRegistration::Start(settlement) => {
                self.start();
                settlement
            }
            ReadRegistration::Immediate(settlement) | ReadRegistration::Resumed(settlement) => {
                settlement
            }
        }
    }

    fn start(&mut self) {
        let Some(producer) = self.producer.take() else {
            return;
        };

        let Ok(runtime) = Handle::try_current() else {
            warn!("stream read outside of a tokio runtime");
            self.shared.lock().terminate(Err(StreamError::NoRuntime));
            return;
        };

        debug!("starting producer");
        let guard = TerminationGuard {
            shared: Some(Arc::clone(&self.shared)),
        };
        let routine = producer(Writer::new(Arc::clone(&self.shared)));
        self.task = Some(runtime.spawn(async move {
            let outcome = routine.await;
            guard.finish(outcome);
        }));
    }
}

impl<T> PullStream<T> {
    /// Closes the stream.
    ///
    /// Any pending read resolves with [`StreamError::Closed`], and so does
    /// every later read. A running producer is aborted. Closing a stream that
    /// already terminated keeps its outcome: later reads still report the end
    /// marker or the producer's error.
    ///
    /// This method is idempotent.
    pub fn close(&mut self) {
        self.shared.lock().close();
        self.producer = None;
        self.inflight = None;
        self.exhausted = true;
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Waits until the producer task is gone, whether it finished or was aborted.
    ///
    /// Returns immediately if the producer was never started.
    pub async fn terminated(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if let Err(err) = task.await {
                if err.is_panic() {
                    warn!("producer task panicked");
                }
            }
            self.task = None;
        }
    }

    /// Returns the current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lock().lifecycle()
    }

    /// Returns `true` once the stream is closed.
    pub fn is_closed(&self) -> bool {
        self.lifecycle() == Lifecycle::Closed
    }

    /// Returns a guard that closes the stream when dropped.
    ///
    /// Combinators use this to close their input on every exit path,
    /// including cancellation of the combinator's future.
    pub fn close_on_drop(&mut self) -> CloseGuard<'_, T> {
        CloseGuard { stream: self }
    }
}

impl<T> Drop for PullStream<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> fmt::Debug for PullStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullStream")
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Stream for PullStream<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.exhausted {
            return Poll::Ready(None);
        }

        if this.inflight.is_none() {
            let read = this.read();
            this.inflight = Some(read);
        }
        let Some(read) = this.inflight.as_mut() else {
            return Poll::Ready(None);
        };

        let outcome = ready!(Pin::new(read).poll(cx));
        this.inflight = None;

        match outcome {
            Ok(Some(value)) => Poll::Ready(Some(Ok(value))),
            Ok(None) => {
                this.exhausted = true;
                Poll::Ready(None)
            }
            Err(err) => {
                this.exhausted = true;
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

/// Closes the borrowed stream when dropped.
///
/// Derefs to the stream, so it can be read through directly.
pub struct CloseGuard<'a, T> {
    stream: &'a mut PullStream<T>,
}

impl<T> Deref for CloseGuard<'_, T> {
    type Target = PullStream<T>;

    fn deref(&self) -> &Self::Target {
        self.stream
    }
}

impl<T> DerefMut for CloseGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.stream
    }
}

impl<T> Drop for CloseGuard<'_, T> {
    fn drop(&mut self) {
        self.stream.close();
    }
}

/// Records the producer's outcome when its task ends.
///
/// If the task is aborted or panics, the guard is dropped without `finish`
/// and terminates the stream with [`StreamError::Aborted`].
struct TerminationGuard<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> TerminationGuard<T> {
    fn finish(mut self, outcome: Outcome<()>) {
        if let Some(shared) = self.shared.take() {
            shared.lock().terminate(outcome);
        }
    }
}

impl<T> Drop for TerminationGuard<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            debug!("producer task dropped before finishing");
            shared.lock().terminate(Err(StreamError::Aborted));
        }
    }
}
