//! Pull-based Async Streams with Single-Slot Backpressure
//!
//! A [`PullStream`] wraps a producer routine: an async closure that receives a
//! [`Writer`] and calls [`Writer::write`] for every value it produces. The
//! consumer pulls values with [`PullStream::read`]. Reads and writes strictly
//! alternate, so at most one value is ever in flight and memory use is O(1)
//! regardless of how fast either side runs.
//!
//! # Features
//!
//! - **Lazy start**: the producer runs (as a tokio task) only once the first read arrives
//! - **Backpressure**: every `write` returns a gate that settles on the next read
//! - **Deterministic teardown**: `close()` aborts the producer so its `Drop` cleanup runs
//! - **Protocol checks**: overlapping reads and early writes fail loudly
//!
//! # Example
//!
//! ```ignore
//! use pullstream::PullStream;
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut stream = PullStream::new(|write| async move {
//!         write.write(1)?.await?;
//!         write.write(2)?.await?;
//!         Ok(())
//!     });
//!
//!     // Pull explicitly...
//!     assert_eq!(stream.read().await.unwrap(), Some(1));
//!
//!     // ...or through `futures::Stream`
//!     while let Some(item) = stream.next().await {
//!         println!("Received: {}", item.unwrap());
//!     }
//! }
//! ```

mod error;
mod invariants;
pub mod settlement;
mod state;
mod stream;
mod writer;

pub use error::StreamError;
pub use settlement::{settlement, Outcome, Settlement, Settler};
pub use state::Lifecycle;
pub use stream::{CloseGuard, PullStream};
pub use writer::Writer;
