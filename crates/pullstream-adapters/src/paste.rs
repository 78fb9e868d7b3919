//! Splicing one stream into another's producer.

use pullstream::{PullStream, StreamError, Writer};
use tracing::trace;

/// Forwards every value of `child` through `write`, then returns.
///
/// Each value waits for the outer consumer's next read, so the child is
/// pulled no faster than the outer stream. The child is closed when the
/// splice ends, whether it finished, failed, or the surrounding producer was
/// cancelled.
///
/// ```ignore
/// let outer = PullStream::new(|write| async move {
///     write.write(0)?.await?;
///     paste(&write, &mut inner).await?;
///     write.write(4)?.await?;
///     Ok(())
/// });
/// ```
pub async fn paste<T: Send + 'static>(
    write: &Writer<T>,
    child: &mut PullStream<T>,
) -> Result<(), StreamError> {
    let mut child = child.close_on_drop();
    let mut forwarded = 0usize;
    while let Some(value) = child.read().await? {
        write.write(value)?.await?;
        forwarded += 1;
    }
    trace!(forwarded, "child stream exhausted");
    Ok(())
}
