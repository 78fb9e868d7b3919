//! [`PushSource`] over a tokio `AsyncRead`.

use crate::config::IoConfig;
use crate::push::{Flow, PushSource, SourceEvent, SourceListener};
use bytes::BytesMut;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A push source reading chunks from an [`AsyncRead`] on a background task.
///
/// The task reads only while the source is flowing. Chunks are at most
/// [`IoConfig::chunk_size`] bytes. A zero-length read emits `End`, a failed
/// read emits `Error`, and both stop the task.
///
/// # Panics
///
/// [`ReaderSource::new`] spawns the reader task and panics outside a tokio
/// runtime.
pub struct ReaderSource {
    shared: Arc<ReaderShared>,
    task: Option<JoinHandle<()>>,
}

struct ReaderShared {
    state: Mutex<ReaderState>,
    resumed: Notify,
}

struct ReaderState {
    listener: Option<SourceListener>,
    flowing: bool,
}

impl ReaderSource {
    /// Creates a paused source over `reader` with the default configuration.
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self::with_config(reader, &IoConfig::default())
    }

    /// Creates a paused source over `reader`.
    pub fn with_config<R>(reader: R, config: &IoConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let shared = Arc::new(ReaderShared {
            state: Mutex::new(ReaderState {
                listener: None,
                flowing: false,
            }),
            resumed: Notify::new(),
        });
        let task = tokio::spawn(read_loop(reader, config.chunk_size, Arc::clone(&shared)));
        Self {
            shared,
            task: Some(task),
        }
    }
}

async fn read_loop<R>(mut reader: R, chunk_size: usize, shared: Arc<ReaderShared>)
where
    R: AsyncRead + Unpin,
{
    loop {
        shared.wait_flowing().await;

        let mut chunk = BytesMut::with_capacity(chunk_size);
        match reader.read_buf(&mut chunk).await {
            Ok(0) => {
                debug!("reader exhausted");
                shared.emit(SourceEvent::End).await;
                return;
            }
            Ok(n) => {
                trace!(bytes = n, "read chunk");
                shared.emit(SourceEvent::Data(chunk.freeze())).await;
            }
            Err(err) => {
                debug!(error = %err, "read failed");
                shared.emit(SourceEvent::Error(err)).await;
                return;
            }
        }
    }
}

impl ReaderShared {
    async fn wait_flowing(&self) {
        // `notify_one` stores a permit, so a resume between the check and
        // the wait is not lost.
        while !self.state.lock().flowing {
            self.resumed.notified().await;
        }
    }

    /// Delivers `event` once the source is flowing.
    ///
    /// A chunk read before a `pause()` is held until the next `resume()`.
    async fn emit(&self, mut event: SourceEvent) {
        loop {
            self.wait_flowing().await;
            match self.try_emit(event) {
                Ok(()) => return,
                Err(held) => event = held,
            }
        }
    }

    fn try_emit(&self, event: SourceEvent) -> Result<(), SourceEvent> {
        let mut state = self.state.lock();
        if !state.flowing {
            return Err(event);
        }
        let flow = match state.listener.as_mut() {
            Some(listener) => listener(event),
            None => Flow::Pause,
        };
        if flow == Flow::Pause {
            state.flowing = false;
        }
        Ok(())
    }

    fn set_flowing(&self, flowing: bool) {
        self.state.lock().flowing = flowing;
        if flowing {
            self.resumed.notify_one();
        }
    }
}

impl PushSource for ReaderSource {
    fn listen(&mut self, listener: SourceListener) {
        self.shared.state.lock().listener = Some(listener);
    }

    fn unlisten(&mut self) {
        self.shared.state.lock().listener = None;
    }

    fn pause(&mut self) {
        self.shared.set_flowing(false);
    }

    fn resume(&mut self) {
        if self.task.is_some() {
            self.shared.set_flowing(true);
        }
    }

    fn destroy(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("destroying reader source");
            task.abort();
        }
        let mut state = self.shared.state.lock();
        state.listener = None;
        state.flowing = false;
    }
}

impl Drop for ReaderSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
