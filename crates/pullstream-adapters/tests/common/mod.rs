//! Scripted push resources for adapter tests.

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use pullstream_adapters::push::{SinkListener, SourceListener};
use pullstream_adapters::{Flow, PullStream, PushSink, PushSource, SinkEvent, SourceEvent};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

pub fn data(text: &'static str) -> SourceEvent {
    SourceEvent::Data(Bytes::from_static(text.as_bytes()))
}

pub fn failure(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, message)
}

/// A stream of the given chunks.
pub fn chunks(values: Vec<&'static str>) -> PullStream<Bytes> {
    PullStream::new(move |write| async move {
        for value in values {
            write.write(Bytes::from_static(value.as_bytes()))?.await?;
        }
        Ok(())
    })
}

// ============================================================================
// MockSource
// ============================================================================

#[derive(Default)]
struct SourceInner {
    script: VecDeque<SourceEvent>,
    paused: bool,
    destroyed: bool,
    resumes: usize,
}

/// Emits its script synchronously from `resume()` until the listener pauses it.
pub struct MockSource {
    inner: Arc<Mutex<SourceInner>>,
    listener: Arc<Mutex<Option<SourceListener>>>,
}

/// Observes a [`MockSource`] after it was handed to an adapter.
#[derive(Clone)]
pub struct SourceProbe {
    inner: Arc<Mutex<SourceInner>>,
    listener: Arc<Mutex<Option<SourceListener>>>,
}

impl MockSource {
    /// Creates a paused source. A script without a terminal event stalls.
    pub fn new(script: Vec<SourceEvent>) -> (Self, SourceProbe) {
        let inner = Arc::new(Mutex::new(SourceInner {
            script: script.into(),
            paused: true,
            ..SourceInner::default()
        }));
        let listener = Arc::new(Mutex::new(None));
        let probe = SourceProbe {
            inner: Arc::clone(&inner),
            listener: Arc::clone(&listener),
        };
        (Self { inner, listener }, probe)
    }
}

impl PushSource for MockSource {
    fn listen(&mut self, listener: SourceListener) {
        *self.listener.lock() = Some(listener);
    }

    fn unlisten(&mut self) {
        *self.listener.lock() = None;
    }

    fn pause(&mut self) {
        self.inner.lock().paused = true;
    }

    fn resume(&mut self) {
        self.inner.lock().resumes += 1;
        loop {
            let event = {
                let mut inner = self.inner.lock();
                if inner.destroyed || self.listener.lock().is_none() {
                    return;
                }
                inner.paused = false;
                match inner.script.pop_front() {
                    Some(event) => event,
                    None => return,
                }
            };

            let terminal = !matches!(event, SourceEvent::Data(_));
            let flow = match self.listener.lock().as_mut() {
                Some(listener) => listener(event),
                None => Flow::Pause,
            };
            if terminal {
                return;
            }
            if flow == Flow::Pause {
                self.inner.lock().paused = true;
                return;
            }
        }
    }

    fn destroy(&mut self) {
        let mut inner = self.inner.lock();
        inner.destroyed = true;
        inner.script.clear();
        *self.listener.lock() = None;
    }
}

impl SourceProbe {
    pub fn destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    pub fn paused(&self) -> bool {
        self.inner.lock().paused
    }

    pub fn resumes(&self) -> usize {
        self.inner.lock().resumes
    }

    pub fn listening(&self) -> bool {
        self.listener.lock().is_some()
    }
}

// ============================================================================
// MockSink
// ============================================================================

#[derive(Default)]
struct SinkInner {
    written: Vec<u8>,
    writes: usize,
    ended: bool,
    destroyed: bool,
    written_after_destroy: bool,
}

/// Records writes. Events are emitted from spawned tasks, never from inside
/// `write` or `end`.
pub struct MockSink {
    inner: Arc<Mutex<SinkInner>>,
    listener: Arc<Mutex<Option<SinkListener>>>,
    refuse_every: Option<usize>,
    fail_at: Option<usize>,
    fail_after: Option<usize>,
    close_early: bool,
}

/// Observes a [`MockSink`] after it was handed to an adapter.
#[derive(Clone)]
pub struct SinkProbe {
    inner: Arc<Mutex<SinkInner>>,
    listener: Arc<Mutex<Option<SinkListener>>>,
}

impl MockSink {
    pub fn new() -> (Self, SinkProbe) {
        let inner = Arc::new(Mutex::new(SinkInner::default()));
        let listener = Arc::new(Mutex::new(None));
        let probe = SinkProbe {
            inner: Arc::clone(&inner),
            listener: Arc::clone(&listener),
        };
        let sink = Self {
            inner,
            listener,
            refuse_every: None,
            fail_at: None,
            fail_after: None,
            close_early: false,
        };
        (sink, probe)
    }

    /// Refuses every `n`th write, emitting `Drain` shortly after.
    pub fn refuse_every(mut self, n: usize) -> Self {
        self.refuse_every = Some(n);
        self
    }

    /// Fails on the `n`th write (1-based).
    pub fn fail_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Accepts the `n`th write (1-based), then fails shortly after.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Emits `Close` instead of `Finish` when ended.
    pub fn close_early(mut self) -> Self {
        self.close_early = true;
        self
    }

    fn emit_later(&self, events: Vec<SinkEvent>) {
        let listener = Arc::clone(&self.listener);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            for event in events {
                if let Some(listener) = listener.lock().as_mut() {
                    listener(event);
                }
            }
        });
    }
}

impl PushSink for MockSink {
    fn listen(&mut self, listener: SinkListener) {
        *self.listener.lock() = Some(listener);
    }

    fn unlisten(&mut self) {
        *self.listener.lock() = None;
    }

    fn write(&mut self, chunk: Bytes) -> bool {
        let writes = {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                inner.written_after_destroy = true;
            }
            inner.writes += 1;
            inner.written.extend_from_slice(&chunk);
            inner.writes
        };

        if self.fail_at == Some(writes) {
            self.emit_later(vec![SinkEvent::Error(failure("disk full")), SinkEvent::Close]);
            return false;
        }
        if self.fail_after == Some(writes) {
            self.emit_later(vec![SinkEvent::Error(failure("device lost")), SinkEvent::Close]);
            return true;
        }
        match self.refuse_every {
            Some(n) if writes % n == 0 => {
                self.emit_later(vec![SinkEvent::Drain]);
                false
            }
            _ => true,
        }
    }

    fn end(&mut self) {
        self.inner.lock().ended = true;
        if self.close_early {
            self.emit_later(vec![SinkEvent::Close]);
        } else {
            self.emit_later(vec![SinkEvent::Finish, SinkEvent::Close]);
        }
    }

    fn destroy(&mut self) {
        self.inner.lock().destroyed = true;
        *self.listener.lock() = None;
    }
}

impl SinkProbe {
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().written.clone()
    }

    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }

    pub fn ended(&self) -> bool {
        self.inner.lock().ended
    }

    pub fn destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    pub fn written_after_destroy(&self) -> bool {
        self.inner.lock().written_after_destroy
    }

    pub fn listening(&self) -> bool {
        self.listener.lock().is_some()
    }
}
