//! [`PushSink`] over a tokio `AsyncWrite`.

use crate::config::IoConfig;
use crate::push::{PushSink, SinkEvent, SinkListener};
use bytes::Bytes;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A push sink writing queued chunks to an [`AsyncWrite`] on a background task.
///
/// `write` queues the chunk and returns `false` once the queued byte count
/// reaches [`IoConfig::high_water_mark`]; `Drain` follows when the queue has
/// been written out. `end` flushes and shuts the writer down, then emits
/// `Finish`. A failed write, flush or shutdown emits `Error` and stops the task.
///
/// # Panics
///
/// [`WriterSink::new`] spawns the writer task and panics outside a tokio
/// runtime.
pub struct WriterSink {
    commands: Option<mpsc::UnboundedSender<Command>>,
    shared: Arc<WriterShared>,
    task: Option<JoinHandle<()>>,
    high_water_mark: usize,
}

enum Command {
    Write(Bytes),
    End,
}

struct WriterShared {
    /// Kept apart from `queue` so writes never wait on a running listener.
    listener: Mutex<Option<SinkListener>>,
    queue: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    buffered: usize,
    /// A write was refused; emit `Drain` once the queue is empty.
    need_drain: bool,
}

impl WriterSink {
    /// Creates a sink over `writer` with the default configuration.
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_config(writer, &IoConfig::default())
    }

    /// Creates a sink over `writer`.
    pub fn with_config<W>(writer: W, config: &IoConfig) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(WriterShared {
            listener: Mutex::new(None),
            queue: Mutex::new(QueueState::default()),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_loop(writer, rx, Arc::clone(&shared)));
        Self {
            commands: Some(tx),
            shared,
            task: Some(task),
            high_water_mark: config.high_water_mark,
        }
    }

    /// Returns the number of queued bytes not yet written.
    pub fn buffered(&self) -> usize {
        self.shared.queue.lock().buffered
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shared: Arc<WriterShared>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = commands.recv().await {
        match command {
            Command::Write(chunk) => {
                if let Err(err) = writer.write_all(&chunk).await {
                    debug!(error = %err, "write failed");
                    shared.emit(SinkEvent::Error(err));
                    return;
                }
                trace!(bytes = chunk.len(), "wrote chunk");
                if shared.written(chunk.len()) {
                    shared.emit(SinkEvent::Drain);
                }
            }
            Command::End => {
                match finish(&mut writer).await {
                    Ok(()) => {
                        debug!("writer finished");
                        shared.emit(SinkEvent::Finish);
                    }
                    Err(err) => {
                        debug!(error = %err, "finishing writer failed");
                        shared.emit(SinkEvent::Error(err));
                    }
                }
                return;
            }
        }
    }
}

async fn finish<W: AsyncWrite + Unpin>(writer: &mut W) -> io::Result<()> {
    writer.flush().await?;
    writer.shutdown().await
}

impl WriterShared {
    fn emit(&self, event: SinkEvent) {
        if let Some(listener) = self.listener.lock().as_mut() {
            listener(event);
        }
    }

    /// Accounts for written bytes; returns `true` if `Drain` is due.
    fn written(&self, len: usize) -> bool {
        let mut queue = self.queue.lock();
        queue.buffered = queue.buffered.saturating_sub(len);
        if queue.buffered == 0 && queue.need_drain {
            queue.need_drain = false;
            true
        } else {
            false
        }
    }
}

impl PushSink for WriterSink {
    fn listen(&mut self, listener: SinkListener) {
        *self.shared.listener.lock() = Some(listener);
    }

    fn unlisten(&mut self) {
        *self.shared.listener.lock() = None;
    }

    fn write(&mut self, chunk: Bytes) -> bool {
        let Some(commands) = &self.commands else {
            return false;
        };

        let len = chunk.len();
        let mut queue = self.shared.queue.lock();
        if commands.send(Command::Write(chunk)).is_err() {
            // The writer task stopped after an error it already reported.
            return false;
        }
        queue.buffered += len;
        let accepted = queue.buffered < self.high_water_mark;
        if !accepted {
            queue.need_drain = true;
        }
        accepted
    }

    fn end(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::End);
        }
    }

    fn destroy(&mut self) {
        self.commands = None;
        if let Some(task) = self.task.take() {
            debug!("destroying writer sink");
            task.abort();
        }
        *self.shared.listener.lock() = None;
    }
}

impl Drop for WriterSink {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
