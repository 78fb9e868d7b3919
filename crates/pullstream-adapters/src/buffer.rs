//! Collecting a byte stream into one value.

use crate::config::BufferOptions;
use crate::error::AdapterError;
use bytes::{Bytes, BytesMut};
use encoding_rs::{CoderResult, Decoder, Encoding};
use pullstream::PullStream;
use tracing::debug;

/// The aggregated content of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Buffered {
    /// Raw bytes, when no encoding was requested.
    Bytes(Bytes),
    /// Decoded text.
    Text(String),
}

impl Buffered {
    /// Returns the content as bytes (UTF-8 for text).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Bytes(bytes) => bytes.as_ref(),
            Self::Text(text) => text.as_bytes(),
        }
    }

    /// Returns the decoded text, if an encoding was requested.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Bytes(_) => None,
            Self::Text(text) => Some(text.as_str()),
        }
    }

    /// Consumes `self`, returning the decoded text if there is one.
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Bytes(_) => None,
            Self::Text(text) => Some(text),
        }
    }
}

/// Reads `stream` to its end and aggregates everything it produced.
///
/// With an encoding the chunks are decoded incrementally, so multi-byte
/// sequences split across chunks decode correctly; malformed input becomes
/// U+FFFD. With a limit, the stream fails with
/// [`AdapterError::LimitExceeded`] as soon as the running total exceeds it.
///
/// The stream is closed on every exit path.
pub async fn buffer(
    stream: &mut PullStream<Bytes>,
    options: BufferOptions,
) -> Result<Buffered, AdapterError> {
    let mut stream = stream.close_on_drop();
    let mut aggregate = Aggregate::new(options.encoding);
    let mut total = 0usize;

    while let Some(chunk) = stream.read().await? {
        total = total.saturating_add(chunk.len());
        if let Some(limit) = options.limit {
            if total > limit {
                debug!(limit, total, "buffer limit exceeded");
                return Err(AdapterError::LimitExceeded { limit });
            }
        }
        aggregate.push(&chunk);
    }

    debug!(total, "stream buffered");
    Ok(aggregate.finish())
}

enum Aggregate {
    Binary(BytesMut),
    Text { decoder: Decoder, text: String },
}

impl Aggregate {
    fn new(encoding: Option<&'static Encoding>) -> Self {
        match encoding {
            None => Self::Binary(BytesMut::new()),
            Some(encoding) => Self::Text {
                decoder: encoding.new_decoder(),
                text: String::new(),
            },
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        match self {
            Self::Binary(buf) => buf.extend_from_slice(chunk),
            Self::Text { decoder, text } => decode_into(decoder, text, chunk, false),
        }
    }

    fn finish(self) -> Buffered {
        match self {
            Self::Binary(buf) => Buffered::Bytes(buf.freeze()),
            Self::Text {
                mut decoder,
                mut text,
            } => {
                // Flushes an incomplete trailing sequence as U+FFFD.
                decode_into(&mut decoder, &mut text, &[], true);
                Buffered::Text(text)
            }
        }
    }
}

fn decode_into(decoder: &mut Decoder, text: &mut String, mut input: &[u8], last: bool) {
    loop {
        let needed = decoder
            .max_utf8_buffer_length(input.len())
            .unwrap_or(4096);
        text.reserve(needed);

        let (result, read, _) = decoder.decode_to_string(input, text, last);
        input = &input[read..];
        match result {
            CoderResult::InputEmpty => return,
            CoderResult::OutputFull => {}
        }
    }
}
