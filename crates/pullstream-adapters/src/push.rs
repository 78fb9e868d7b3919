//! Contracts for push-based native resources.
//!
//! A push resource emits events on its own schedule and reports them to a
//! single registered listener. Adapters translate these events into
//! settlements; they subscribe once and detach on teardown.
//!
//! # Listener rules
//!
//! - A listener never calls back into the resource that invokes it.
//! - Sources may invoke their listener synchronously from inside `resume()`.
//! - Sinks never invoke their listener from inside `write()` or `end()`.
//! - Every resource emits exactly one terminal event.

use bytes::Bytes;
use std::io;

/// Events emitted by a [`PushSource`].
#[derive(Debug)]
pub enum SourceEvent {
    /// A chunk of data.
    Data(Bytes),
    /// The source is exhausted (terminal).
    End,
    /// The source failed (terminal).
    Error(io::Error),
    /// The source closed without ending (terminal).
    Close,
}

/// Whether a source may keep emitting after delivering an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep emitting.
    Continue,
    /// Pause until the next `resume()`.
    Pause,
}

/// Listener registered on a [`PushSource`].
pub type SourceListener = Box<dyn FnMut(SourceEvent) -> Flow + Send>;

/// A readable push-based resource.
///
/// Sources start paused: nothing is emitted before the first `resume()`.
/// A listener returning [`Flow::Pause`] pauses the source before it emits
/// anything else.
pub trait PushSource: Send + 'static {
    /// Registers the listener, replacing any previous one.
    fn listen(&mut self, listener: SourceListener);

    /// Removes the listener. Events emitted afterwards are dropped.
    fn unlisten(&mut self);

    /// Stops emitting `Data` until `resume()`.
    ///
    /// The adapters in this crate pause through the listener's [`Flow`]
    /// return value instead; this is for callers driving a source directly.
    fn pause(&mut self);

    /// Starts or continues emitting.
    fn resume(&mut self);

    /// Tears the source down, releasing the underlying resource.
    fn destroy(&mut self);
}

/// Events emitted by a [`PushSink`].
#[derive(Debug)]
pub enum SinkEvent {
    /// A previously refused write has been flushed; the sink accepts more.
    Drain,
    /// All data was flushed after `end()` (terminal).
    Finish,
    /// The sink failed (terminal).
    Error(io::Error),
    /// The sink closed without finishing (terminal).
    Close,
}

/// Listener registered on a [`PushSink`].
pub type SinkListener = Box<dyn FnMut(SinkEvent) + Send>;

/// A writable push-based resource with buffered writes.
pub trait PushSink: Send + 'static {
    /// Registers the listener, replacing any previous one.
    fn listen(&mut self, listener: SinkListener);

    /// Removes the listener. Events emitted afterwards are dropped.
    fn unlisten(&mut self);

    /// Queues `chunk`.
    ///
    /// Returns `false` if the caller should wait for [`SinkEvent::Drain`]
    /// before writing more. The chunk is accepted either way.
    fn write(&mut self, chunk: Bytes) -> bool;

    /// Signals that no more data follows. The sink emits `Finish` once flushed.
    fn end(&mut self);

    /// Tears the sink down, discarding queued data.
    fn destroy(&mut self);
}
