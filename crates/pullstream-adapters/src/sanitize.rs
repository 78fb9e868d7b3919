//! Push source to pull stream.

use crate::error::{AdapterError, Endpoint};
use crate::push::{Flow, PushSource, SourceEvent};
use bytes::Bytes;
use parking_lot::Mutex;
use pullstream::{settlement, PullStream, Settlement, Settler, StreamError, Writer};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// One event as seen by the producer: a chunk, the end marker, or a failure.
type Received = Result<Option<Bytes>, AdapterError>;

/// Wraps a push source in a [`PullStream`].
///
/// The source is resumed only while a read is waiting, and paused again as
/// soon as it delivers a chunk, so at most one chunk is held at a time.
/// `End` ends the stream; `Error` and `Close` terminate it with
/// [`AdapterError::Io`] and [`AdapterError::UnexpectedClose`].
///
/// Closing the stream before the source ended destroys the source.
pub fn sanitize<S: PushSource>(source: S) -> PullStream<Bytes> {
    PullStream::new(move |write| pump(source, write))
}

async fn pump<S: PushSource>(source: S, write: Writer<Bytes>) -> Result<(), StreamError> {
    let inbox = Arc::new(Mutex::new(Inbox::default()));
    let mut subscription = Subscription::new(source, Arc::clone(&inbox));

    loop {
        let (received, idle) = inbox.lock().next();
        if idle {
            subscription.resume();
        }

        match received.await?? {
            Some(chunk) => {
                trace!(bytes = chunk.len(), "forwarding chunk");
                write.write(chunk)?.await?;
            }
            None => {
                subscription.ended();
                return Ok(());
            }
        }
    }
}

/// Hands source events to the producer.
#[derive(Default)]
struct Inbox {
    waiting: Option<Settler<Received>>,
    /// An event that arrived while nothing was waiting.
    early: Option<Received>,
}

impl Inbox {
    /// Returns the settlement for the next event, and whether the source must
    /// be resumed to produce it.
    fn next(&mut self) -> (Settlement<Received>, bool) {
        if let Some(received) = self.early.take() {
            return (Settlement::settled(Ok(received)), false);
        }
        let (settler, settlement) = settlement();
        self.waiting = Some(settler);
        (settlement, true)
    }

    fn deliver(&mut self, received: Received) {
        match self.waiting.take() {
            Some(waiting) => {
                // The producer may be gone already; teardown follows.
                let _ = waiting.settle(Ok(received));
            }
            None if self.early.is_none() => self.early = Some(received),
            None => warn!("push source emitted while paused, event dropped"),
        }
    }
}

/// The listener registration, detached on drop.
struct Subscription<S: PushSource> {
    source: S,
    ended: bool,
}

impl<S: PushSource> Subscription<S> {
    fn new(mut source: S, inbox: Arc<Mutex<Inbox>>) -> Self {
        source.listen(Box::new(move |event| {
            let received = match event {
                SourceEvent::Data(chunk) => Ok(Some(chunk)),
                SourceEvent::End => Ok(None),
                SourceEvent::Error(err) => Err(AdapterError::from(err)),
                SourceEvent::Close => Err(AdapterError::UnexpectedClose(Endpoint::Source)),
            };
            inbox.lock().deliver(received);
            Flow::Pause
        }));
        debug!("subscribed to push source");
        Self {
            source,
            ended: false,
        }
    }

    fn resume(&mut self) {
        self.source.resume();
    }

    fn ended(&mut self) {
        self.ended = true;
    }
}

impl<S: PushSource> Drop for Subscription<S> {
    fn drop(&mut self) {
        self.source.unlisten();
        if !self.ended {
            debug!("destroying push source that did not end");
            self.source.destroy();
        }
    }
}
