//! Adapters between pullstream and push-based native I/O
//!
//! Native resources (sockets, files, pipes) push data at their own pace and
//! signal backpressure through pause/resume and drain events. This crate
//! bridges them with [`PullStream`], where the consumer's reads drive
//! production.
//!
//! # Features
//!
//! - **sanitize**: wrap a [`PushSource`] in a pull stream
//! - **sink**: drain a pull stream into a [`PushSink`], honoring `Drain`
//! - **pipe**: connect a source directly to a sink
//! - **paste**: splice a child stream into a producer
//! - **buffer**: aggregate a stream into bytes or decoded text
//! - **Tokio I/O**: [`ReaderSource`] and [`WriterSink`] over `AsyncRead` / `AsyncWrite`
//!
//! Every adapter tears its resources down on all exit paths: streams are
//! closed, listeners detached, and failed resources destroyed.
//!
//! # Example
//!
//! ```ignore
//! use pullstream_adapters::{buffer, sanitize, BufferOptions, ReaderSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let file = tokio::fs::File::open("Cargo.toml").await?;
//!     let mut stream = sanitize(ReaderSource::new(file));
//!
//!     let text = buffer(&mut stream, BufferOptions::utf8().with_limit(1 << 20)).await?;
//!     println!("{}", text.as_text().unwrap_or_default());
//!     Ok(())
//! }
//! ```

mod buffer;
mod config;
mod error;
mod paste;
mod pipe;
pub mod push;
mod reader_source;
mod sanitize;
mod sink;
mod writer_sink;

pub use buffer::{buffer, Buffered};
pub use config::{BufferOptions, IoConfig};
pub use error::{AdapterError, Endpoint};
pub use paste::paste;
pub use pipe::pipe;
pub use push::{Flow, PushSink, PushSource, SinkEvent, SourceEvent};
pub use reader_source::ReaderSource;
pub use sanitize::sanitize;
pub use sink::sink;
pub use writer_sink::WriterSink;

pub use pullstream::{PullStream, StreamError, Writer};

// Re-export useful stream combinators
pub use tokio_stream::StreamExt;
