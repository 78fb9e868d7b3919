//! Push source straight into push sink.

use crate::error::{AdapterError, Endpoint};
use crate::push::{Flow, PushSink, PushSource, SinkEvent, SourceEvent};
use parking_lot::Mutex;
use pullstream::{settlement, Settler};
use std::sync::Arc;
use tracing::{debug, trace};

type Completion = Arc<Mutex<Option<Settler<Result<(), AdapterError>>>>>;

/// Pipes a push source into a push sink without an intermediate stream.
///
/// The source pauses whenever the sink refuses a chunk and resumes on the
/// sink's `Drain`. The source's `End` ends the sink, and the pipe resolves on
/// the sink's `Finish`.
///
/// The first error or unexpected close on either side fails the pipe; both
/// sides are then destroyed. Listeners are detached on every exit.
pub async fn pipe<S: PushSource, K: PushSink>(source: S, sink: K) -> Result<(), AdapterError> {
    let source = Arc::new(Mutex::new(source));
    let sink = Arc::new(Mutex::new(sink));
    let (settler, done) = settlement();
    let completion: Completion = Arc::new(Mutex::new(Some(settler)));

    let mut teardown = Teardown {
        source: Arc::clone(&source),
        sink: Arc::clone(&sink),
        clean: false,
    };

    sink.lock().listen(Box::new({
        let source = Arc::clone(&source);
        let completion = Arc::clone(&completion);
        move |event| match event {
            SinkEvent::Drain => {
                trace!("sink drained, resuming source");
                source.lock().resume();
            }
            SinkEvent::Finish => complete(&completion, Ok(())),
            SinkEvent::Error(err) => complete(&completion, Err(err.into())),
            SinkEvent::Close => complete(
                &completion,
                Err(AdapterError::UnexpectedClose(Endpoint::Sink)),
            ),
        }
    }));

    source.lock().listen(Box::new({
        let sink = Arc::clone(&sink);
        let completion = Arc::clone(&completion);
        move |event| match event {
            SourceEvent::Data(chunk) => {
                if sink.lock().write(chunk) {
                    Flow::Continue
                } else {
                    trace!("sink is full, pausing source");
                    Flow::Pause
                }
            }
            SourceEvent::End => {
                sink.lock().end();
                Flow::Pause
            }
            SourceEvent::Error(err) => {
                complete(&completion, Err(err.into()));
                Flow::Pause
            }
            SourceEvent::Close => {
                complete(
                    &completion,
                    Err(AdapterError::UnexpectedClose(Endpoint::Source)),
                );
                Flow::Pause
            }
        }
    }));

    debug!("pipe started");
    source.lock().resume();

    let outcome = done.await?;
    match &outcome {
        Ok(()) => {
            debug!("pipe finished");
            teardown.clean = true;
        }
        Err(err) => debug!(error = %err, "pipe failed, destroying both ends"),
    }
    drop(teardown);
    outcome
}

/// Settles the pipe's result; later outcomes are ignored.
fn complete(completion: &Completion, outcome: Result<(), AdapterError>) {
    if let Some(settler) = completion.lock().take() {
        let _ = settler.settle(Ok(outcome));
    }
}

struct Teardown<S: PushSource, K: PushSink> {
    source: Arc<Mutex<S>>,
    sink: Arc<Mutex<K>>,
    clean: bool,
}

impl<S: PushSource, K: PushSink> Drop for Teardown<S, K> {
    fn drop(&mut self) {
        // Listeners hold the opposite side; detaching them breaks the cycle.
        // Never hold both locks: each listener takes the other one.
        {
            let mut source = self.source.lock();
            source.unlisten();
            if !self.clean {
                source.destroy();
            }
        }
        let mut sink = self.sink.lock();
        sink.unlisten();
        if !self.clean {
            sink.destroy();
        }
    }
}
