//! Pull stream to push sink.

use crate::error::{AdapterError, Endpoint};
use crate::push::{PushSink, SinkEvent};
use bytes::Bytes;
use parking_lot::Mutex;
use pullstream::{settlement, PullStream, Settlement, Settler};
use std::sync::Arc;
use tracing::{debug, trace};

type Signal = Result<(), AdapterError>;

/// Drains `stream` into a push sink.
///
/// Every chunk is written to the sink; when the sink refuses more data the
/// next read waits for `Drain`. Once the stream ends the sink is ended and
/// this resolves after `Finish`.
///
/// If the sink fails or closes early, the stream is closed, the sink is
/// destroyed, and the failure is returned. The sink is never written to after
/// it failed.
pub async fn sink<K: PushSink>(stream: &mut PullStream<Bytes>, sink: K) -> Result<(), AdapterError> {
    let mut stream = stream.close_on_drop();

    let signals = Arc::new(Mutex::new(Signals::default()));
    let (finish, finished) = settlement();
    signals.lock().finish = Some(finish);
    let mut attachment = Attachment::new(sink, Arc::clone(&signals));

    let outcome = forward(&mut stream, &mut attachment, &signals, finished).await;
    match &outcome {
        Ok(()) => {
            debug!("sink finished");
            attachment.finished = true;
        }
        Err(err) => {
            debug!(error = %err, "sink failed, closing stream");
            stream.close();
        }
    }
    outcome
}

async fn forward<K: PushSink>(
    stream: &mut PullStream<Bytes>,
    sink: &mut Attachment<K>,
    signals: &Mutex<Signals>,
    finished: Settlement<Signal>,
) -> Result<(), AdapterError> {
    while let Some(chunk) = stream.read().await? {
        let accepted = {
            let mut signals = signals.lock();
            signals.check()?;
            signals.drained = false;
            sink.sink.write(chunk)
        };

        if !accepted {
            trace!("sink is full, waiting for drain");
            let drain = signals.lock().wait_for_drain();
            drain.await??;
        }
    }

    signals.lock().check()?;
    sink.sink.end();
    finished.await?
}

/// Sink events as the adapter tracks them.
#[derive(Default)]
struct Signals {
    drain: Option<Settler<Signal>>,
    /// A `Drain` that fired before anyone waited for it.
    drained: bool,
    finish: Option<Settler<Signal>>,
    failure: Option<AdapterError>,
}

impl Signals {
    fn on_event(&mut self, event: SinkEvent) {
        match event {
            SinkEvent::Drain => match self.drain.take() {
                Some(waiting) => {
                    let _ = waiting.settle(Ok(Ok(())));
                }
                None => self.drained = true,
            },
            SinkEvent::Finish => {
                if let Some(finish) = self.finish.take() {
                    let _ = finish.settle(Ok(Ok(())));
                }
            }
            SinkEvent::Error(err) => self.fail(err.into()),
            // Closing after `Finish` is the normal end of a sink.
            SinkEvent::Close if self.finish.is_some() => {
                self.fail(AdapterError::UnexpectedClose(Endpoint::Sink));
            }
            SinkEvent::Close => {}
        }
    }

    /// Records a sink failure and wakes any drain or finish waiter.
    ///
    /// A failure that arrives while `forward` is blocked on a read is only
    /// observed once that read yields the next chunk.
    fn fail(&mut self, err: AdapterError) {
        if self.failure.is_none() {
            self.failure = Some(err.clone());
        }
        if let Some(waiting) = self.drain.take() {
            let _ = waiting.settle(Ok(Err(err.clone())));
        }
        if let Some(finish) = self.finish.take() {
            let _ = finish.settle(Ok(Err(err)));
        }
    }

    fn check(&self) -> Result<(), AdapterError> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn wait_for_drain(&mut self) -> Settlement<Signal> {
        if let Some(err) = &self.failure {
            return Settlement::settled(Ok(Err(err.clone())));
        }
        if std::mem::take(&mut self.drained) {
            return Settlement::settled(Ok(Ok(())));
        }
        let (waiting, drain) = settlement();
        self.drain = Some(waiting);
        drain
    }
}

/// The listener registration, detached on drop.
struct Attachment<K: PushSink> {
    sink: K,
    finished: bool,
}

impl<K: PushSink> Attachment<K> {
    fn new(mut sink: K, signals: Arc<Mutex<Signals>>) -> Self {
        sink.listen(Box::new(move |event| signals.lock().on_event(event)));
        Self {
            sink,
            finished: false,
        }
    }
}

impl<K: PushSink> Drop for Attachment<K> {
    fn drop(&mut self) {
        self.sink.unlisten();
        if !self.finished {
            self.sink.destroy();
        }
    }
}
