//! Configuration for adapters and tokio-backed native resources.

use crate::error::AdapterError;
use encoding_rs::Encoding;

/// Options for [`buffer`](crate::buffer).
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferOptions {
    /// Text encoding of the input.
    ///
    /// `None` aggregates raw bytes; `Some` decodes incrementally into a `String`.
    ///
    /// Default: `None`
    pub encoding: Option<&'static Encoding>,

    /// Maximum number of input bytes accepted.
    ///
    /// Default: `None` (unlimited)
    pub limit: Option<usize>,
}

impl BufferOptions {
    /// Creates options for UTF-8 text aggregation.
    pub fn utf8() -> Self {
        Self {
            encoding: Some(encoding_rs::UTF_8),
            limit: None,
        }
    }

    /// Sets the text encoding.
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Sets the text encoding from a WHATWG label such as `"utf8"` or `"latin1"`.
    pub fn with_encoding_label(self, label: &str) -> Result<Self, AdapterError> {
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| AdapterError::UnknownEncoding(label.to_owned()))?;
        Ok(self.with_encoding(encoding))
    }

    /// Sets the size limit in bytes.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Configuration for [`ReaderSource`](crate::ReaderSource) and
/// [`WriterSink`](crate::WriterSink).
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Maximum size of a chunk read from the underlying reader.
    ///
    /// Default: 64 KiB
    pub chunk_size: usize,

    /// Queued byte count at which a sink starts refusing writes.
    ///
    /// Once reached, `write` returns `false` and the sink emits `Drain` after
    /// the queue has been flushed to the underlying writer.
    ///
    /// Default: 16 KiB
    pub high_water_mark: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            high_water_mark: 16 * 1024,
        }
    }
}

impl IoConfig {
    /// Creates a configuration with small chunks and an eager drain cycle.
    pub fn small_buffers() -> Self {
        Self {
            chunk_size: 4 * 1024,
            high_water_mark: 1024,
        }
    }

    /// Creates a configuration for bulk transfers.
    pub fn large_buffers() -> Self {
        Self {
            chunk_size: 256 * 1024,
            high_water_mark: 1024 * 1024,
        }
    }

    /// Sets the chunk size. Values below 1 are raised to 1.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Sets the high-water mark. Values below 1 are raised to 1.
    pub fn with_high_water_mark(mut self, mark: usize) -> Self {
        self.high_water_mark = mark.max(1);
        self
    }
}
