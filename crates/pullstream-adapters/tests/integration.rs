//! Integration tests for pullstream-adapters.

mod common;

use bytes::Bytes;
use common::{chunks, data, failure, MockSink, MockSource};
use pullstream_adapters::{
    buffer, paste, pipe, sanitize, sink, AdapterError, BufferOptions, Buffered, Endpoint,
    IoConfig, PullStream, ReaderSource, SourceEvent, StreamError, StreamExt, WriterSink,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Counts drops of a producer's state.
struct CountOnDrop(Arc<AtomicUsize>);

impl Drop for CountOnDrop {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Signals when a producer's state is dropped.
struct SignalOnDrop(Option<oneshot::Sender<()>>);

impl Drop for SignalOnDrop {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

fn counted(values: Vec<u32>, drops: Arc<AtomicUsize>) -> PullStream<u32> {
    PullStream::new(move |write| async move {
        let _guard = CountOnDrop(drops);
        for value in values {
            write.write(value)?.await?;
        }
        Ok(())
    })
}

fn repeat(chunk: &'static str) -> PullStream<Bytes> {
    PullStream::new(move |write| async move {
        while !write.is_closed() {
            write.write(Bytes::from_static(chunk.as_bytes()))?.await?;
        }
        Ok(())
    })
}

// ============================================================================
// sanitize
// ============================================================================

#[tokio::test]
async fn test_sanitize_reads_chunks_in_order() {
    let (source, probe) = MockSource::new(vec![data("a"), data("b"), data("c"), SourceEvent::End]);
    let mut stream = sanitize(source);

    assert_eq!(stream.read().await.unwrap().as_deref(), Some(&b"a"[..]));
    assert_eq!(stream.read().await.unwrap().as_deref(), Some(&b"b"[..]));
    assert_eq!(stream.read().await.unwrap().as_deref(), Some(&b"c"[..]));
    assert_eq!(stream.read().await.unwrap(), None);

    // Ended cleanly: detached but not destroyed.
    assert!(!probe.listening());
    assert!(!probe.destroyed());
}

#[tokio::test]
async fn test_sanitize_resumes_once_per_read() {
    let (source, probe) = MockSource::new(vec![data("a"), data("b"), data("c"), SourceEvent::End]);
    let mut stream = sanitize(source);
    assert_eq!(probe.resumes(), 0);

    stream.read().await.unwrap();
    assert_eq!(probe.resumes(), 1);
    assert!(probe.paused());

    stream.read().await.unwrap();
    assert_eq!(probe.resumes(), 2);
    assert!(probe.paused());
}

#[tokio::test]
async fn test_sanitize_source_error() {
    let (source, probe) = MockSource::new(vec![data("a"), SourceEvent::Error(failure("boom"))]);
    let mut stream = sanitize(source);

    assert!(stream.read().await.unwrap().is_some());
    let err = AdapterError::from(stream.read().await.unwrap_err());
    assert!(matches!(&err, AdapterError::Io(e) if e.to_string() == "boom"));
    assert!(err.is_native());

    // The error is sticky.
    assert!(stream.read().await.is_err());
    assert!(probe.destroyed());
    assert!(!probe.listening());
}

#[tokio::test]
async fn test_sanitize_unexpected_close() {
    let (source, _probe) = MockSource::new(vec![SourceEvent::Close]);
    let mut stream = sanitize(source);

    let err = AdapterError::from(stream.read().await.unwrap_err());
    assert!(matches!(err, AdapterError::UnexpectedClose(Endpoint::Source)));
}

#[tokio::test]
async fn test_sanitize_close_destroys_source() {
    // No terminal event: the source would stall forever.
    let (source, probe) = MockSource::new(vec![data("a"), data("b")]);
    let mut stream = sanitize(source);

    assert!(stream.read().await.unwrap().is_some());
    stream.close();
    stream.terminated().await;

    assert!(probe.destroyed());
    assert!(!probe.listening());
    assert!(matches!(stream.read().await, Err(StreamError::Closed)));
}

// ============================================================================
// sink
// ============================================================================

#[tokio::test]
async fn test_sink_writes_everything_and_finishes() {
    let mut stream = chunks(vec!["ab", "cd", "ef", "gh", "ij"]);
    let (target, probe) = MockSink::new();

    sink(&mut stream, target.refuse_every(2))
        .await
        .expect("sink failed");

    assert_eq!(probe.bytes(), b"abcdefghij");
    assert!(probe.ended());
    assert!(!probe.destroyed());
    assert!(!probe.listening());
}

#[tokio::test]
async fn test_sink_error_closes_stream_and_destroys_sink() {
    let mut stream = repeat("x");
    let (target, probe) = MockSink::new();

    let err = sink(&mut stream, target.fail_at(3)).await.unwrap_err();

    assert!(matches!(&err, AdapterError::Io(e) if e.to_string() == "disk full"));
    assert!(stream.is_closed());
    assert!(probe.destroyed());
    assert!(!probe.listening());
    // Nothing was written once the sink failed.
    assert_eq!(probe.writes(), 3);
    assert!(!probe.written_after_destroy());
}

#[tokio::test]
async fn test_sink_close_before_finish() {
    let mut stream = chunks(vec!["a"]);
    let (target, probe) = MockSink::new();

    let err = sink(&mut stream, target.close_early()).await.unwrap_err();

    assert!(matches!(err, AdapterError::UnexpectedClose(Endpoint::Sink)));
    assert!(probe.destroyed());
}

#[tokio::test]
async fn test_sink_propagates_stream_error() {
    let mut stream = PullStream::new(|write| async move {
        write.write(Bytes::from_static(b"a"))?.await?;
        Err(StreamError::from(AdapterError::from(failure("upstream"))))
    });
    let (target, probe) = MockSink::new();

    let err = sink(&mut stream, target).await.unwrap_err();

    // The adapter error survives the trip through the stream.
    assert!(matches!(&err, AdapterError::Io(e) if e.to_string() == "upstream"));
    assert_eq!(probe.bytes(), b"a");
    assert!(!probe.ended());
    assert!(probe.destroyed());
}

// ============================================================================
// pipe
// ============================================================================

#[tokio::test]
async fn test_pipe_moves_all_data() {
    let (source, source_probe) = MockSource::new(vec![
        data("a"),
        data("b"),
        data("c"),
        data("d"),
        SourceEvent::End,
    ]);
    let (target, sink_probe) = MockSink::new();

    pipe(source, target.refuse_every(2))
        .await
        .expect("pipe failed");

    assert_eq!(sink_probe.bytes(), b"abcd");
    assert!(sink_probe.ended());
    assert!(!source_probe.destroyed());
    assert!(!sink_probe.destroyed());
    assert!(!source_probe.listening());
    assert!(!sink_probe.listening());
}

#[tokio::test]
async fn test_pipe_source_error_destroys_both() {
    let (source, source_probe) =
        MockSource::new(vec![data("a"), SourceEvent::Error(failure("read failed"))]);
    let (target, sink_probe) = MockSink::new();

    let err = pipe(source, target).await.unwrap_err();

    assert!(matches!(&err, AdapterError::Io(e) if e.to_string() == "read failed"));
    assert!(source_probe.destroyed());
    assert!(sink_probe.destroyed());
    assert!(!sink_probe.ended());
}

#[tokio::test]
async fn test_pipe_sink_error_destroys_both() {
    let (source, source_probe) = MockSource::new(vec![data("a"), data("b"), SourceEvent::End]);
    let (target, sink_probe) = MockSink::new();

    let err = pipe(source, target.fail_at(1)).await.unwrap_err();

    assert!(matches!(err, AdapterError::Io(_)));
    assert_eq!(sink_probe.writes(), 1);
    assert!(source_probe.destroyed());
    assert!(sink_probe.destroyed());
}

#[tokio::test]
async fn test_pipe_source_close() {
    let (source, _source_probe) = MockSource::new(vec![data("a"), SourceEvent::Close]);
    let (target, _sink_probe) = MockSink::new();

    let err = pipe(source, target).await.unwrap_err();
    assert!(matches!(err, AdapterError::UnexpectedClose(Endpoint::Source)));
}

// ============================================================================
// paste
// ============================================================================

#[tokio::test]
async fn test_paste_splices_child() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut child = counted(vec![1, 2, 3], Arc::clone(&drops));

    let outer = PullStream::new(move |write| async move {
        write.write(0)?.await?;
        paste(&write, &mut child).await?;
        write.write(4)?.await?;
        Ok(())
    });

    let values: Vec<u32> = outer.map(|item| item.unwrap()).collect().await;
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_paste_propagates_child_error() {
    let mut child = PullStream::new(|write| async move {
        write.write(1)?.await?;
        Err(StreamError::producer(failure("child failed")))
    });

    let mut outer = PullStream::new(move |write| async move {
        paste(&write, &mut child).await?;
        write.write(99)?.await?;
        Ok(())
    });

    assert_eq!(outer.read().await.unwrap(), Some(1));
    let err = outer.read().await.unwrap_err();
    assert!(err.downcast_ref::<io::Error>().is_some());
}

#[tokio::test]
async fn test_paste_closes_child_when_outer_closes() {
    let (dropped_tx, dropped_rx) = oneshot::channel();
    let mut child = PullStream::new(move |write| async move {
        let _guard = SignalOnDrop(Some(dropped_tx));
        let mut n = 0u32;
        while !write.is_closed() {
            write.write(n)?.await?;
            n += 1;
        }
        Ok(())
    });

    let mut outer = PullStream::new(move |write| async move {
        paste(&write, &mut child).await?;
        Ok(())
    });

    assert_eq!(outer.read().await.unwrap(), Some(0));
    assert_eq!(outer.read().await.unwrap(), Some(1));
    outer.close();

    tokio::time::timeout(Duration::from_secs(1), dropped_rx)
        .await
        .expect("child producer was not unwound")
        .expect("guard dropped without signalling");
}

// ============================================================================
// buffer
// ============================================================================

#[tokio::test]
async fn test_buffer_binary() {
    let mut stream = chunks(vec!["hello", ", ", "world"]);

    let buffered = buffer(&mut stream, BufferOptions::default())
        .await
        .expect("buffer failed");

    assert_eq!(buffered, Buffered::Bytes(Bytes::from_static(b"hello, world")));
}

#[tokio::test]
async fn test_buffer_text_across_chunk_boundaries() {
    let mut stream = PullStream::new(|write| async move {
        write.write(Bytes::from_static(b"caf\xC3"))?.await?;
        write.write(Bytes::from_static(b"\xA9 \xE2\x82"))?.await?;
        write.write(Bytes::from_static(b"\xAC"))?.await?;
        Ok(())
    });

    let buffered = buffer(&mut stream, BufferOptions::utf8())
        .await
        .expect("buffer failed");

    assert_eq!(buffered.as_text(), Some("café €"));
}

#[tokio::test]
async fn test_buffer_limit_closes_stream() {
    let mut stream = repeat("0123456789");

    let err = buffer(&mut stream, BufferOptions::default().with_limit(25))
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::LimitExceeded { limit: 25 }));
    assert!(stream.is_closed());
    assert!(matches!(stream.read().await, Err(StreamError::Closed)));
}

#[tokio::test]
async fn test_buffer_within_limit() {
    let mut stream = chunks(vec!["0123456789", "0123456789"]);

    let buffered = buffer(&mut stream, BufferOptions::utf8().with_limit(20))
        .await
        .expect("exactly at the limit is fine");

    assert_eq!(buffered.as_bytes().len(), 20);
}

#[tokio::test]
async fn test_buffer_propagates_stream_error() {
    let mut stream = PullStream::new(|write| async move {
        write.write(Bytes::from_static(b"partial"))?.await?;
        Err(StreamError::producer(failure("truncated")))
    });

    let err = buffer(&mut stream, BufferOptions::utf8()).await.unwrap_err();

    match err {
        AdapterError::Stream(inner) => {
            assert_eq!(inner.downcast_ref::<io::Error>().unwrap().to_string(), "truncated");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// tokio I/O resources
// ============================================================================

#[tokio::test]
async fn test_reader_source_buffers_file() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/integration.rs");
    let file = tokio::fs::File::open(path).await.expect("open failed");
    let mut stream = sanitize(ReaderSource::with_config(file, &IoConfig::small_buffers()));

    let text = buffer(&mut stream, BufferOptions::utf8())
        .await
        .expect("buffer failed")
        .into_text()
        .expect("text requested");

    assert!(text.starts_with("//! Integration tests for pullstream-adapters."));
    assert!(text.contains("test_reader_source_buffers_file"));
}

#[tokio::test]
async fn test_reader_source_holds_data_while_paused() {
    use pullstream_adapters::{Flow, PushSource};
    use tokio::io::AsyncWriteExt;

    let (mut client, server) = tokio::io::duplex(64);
    let mut source = ReaderSource::new(server);
    let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    source.listen(Box::new(move |event| {
        let _ = events_tx.send(event);
        Flow::Continue
    }));

    source.resume();
    client.write_all(b"a").await.unwrap();
    let first = events.recv().await.unwrap();
    assert!(matches!(first, SourceEvent::Data(chunk) if chunk.as_ref() == b"a"));

    // The reader is already waiting on the pipe when the source pauses.
    source.pause();
    client.write_all(b"b").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());

    source.resume();
    let second = events.recv().await.unwrap();
    assert!(matches!(second, SourceEvent::Data(chunk) if chunk.as_ref() == b"b"));
    source.destroy();
}

#[tokio::test]
async fn test_sink_failure_during_slow_read_reported_on_next_chunk() {
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let mut stream = PullStream::new(move |write| async move {
        write.write(Bytes::from_static(b"a"))?.await?;
        let _ = go_rx.await;
        write.write(Bytes::from_static(b"b"))?.await?;
        Ok(())
    });
    let (target, probe) = MockSink::new();

    let draining = tokio::spawn(async move {
        let result = sink(&mut stream, target.fail_after(1)).await;
        (result, stream.is_closed())
    });
    // The sink fails while the producer is still holding back "b".
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!draining.is_finished());

    go_tx.send(()).unwrap();
    let (result, closed) = draining.await.unwrap();
    assert!(matches!(&result, Err(AdapterError::Io(e)) if e.to_string() == "device lost"));
    assert!(closed);
    assert_eq!(probe.bytes(), b"a");
    assert!(probe.destroyed());
}

#[tokio::test]
async fn test_writer_sink_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let path = dir.path().join("out.bin");

    let mut stream = PullStream::new(|write| async move {
        for i in 0..100u8 {
            write.write(Bytes::from(vec![i; 100]))?.await?;
        }
        Ok(())
    });
    let file = tokio::fs::File::create(&path).await.expect("create failed");
    let target = WriterSink::with_config(file, &IoConfig::small_buffers());

    sink(&mut stream, target).await.expect("sink failed");

    let written = tokio::fs::read(&path).await.expect("read failed");
    assert_eq!(written.len(), 100 * 100);
    assert!(written.chunks(100).enumerate().all(|(i, chunk)| chunk.iter().all(|b| usize::from(*b) == i)));
}

#[tokio::test]
async fn test_writer_sink_reports_broken_pipe() {
    let (writer, reader) = tokio::io::duplex(64);
    drop(reader);

    let mut stream = repeat("data");
    let err = sink(&mut stream, WriterSink::new(writer)).await.unwrap_err();

    assert!(matches!(&err, AdapterError::Io(e) if e.kind() == io::ErrorKind::BrokenPipe));
    assert!(stream.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pipe_file_to_file() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let from = dir.path().join("from.txt");
    let to = dir.path().join("to.txt");

    let content: Vec<u8> = (0..50_000u32).map(|i| b'a' + (i % 26) as u8).collect();
    tokio::fs::write(&from, &content).await.expect("write failed");

    let config = IoConfig::small_buffers();
    let source = ReaderSource::with_config(
        tokio::fs::File::open(&from).await.expect("open failed"),
        &config,
    );
    let target = WriterSink::with_config(
        tokio::fs::File::create(&to).await.expect("create failed"),
        &config,
    );

    pipe(source, target).await.expect("pipe failed");

    let copied = tokio::fs::read(&to).await.expect("read failed");
    assert_eq!(copied, content);
}

#[tokio::test]
async fn test_file_round_trip_through_stream() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let from = dir.path().join("from.bin");
    let to = dir.path().join("to.bin");

    let content: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    tokio::fs::write(&from, &content).await.expect("write failed");

    let config = IoConfig::default()
        .with_chunk_size(1000)
        .with_high_water_mark(1);
    let file = tokio::fs::File::open(&from).await.expect("open failed");
    let mut stream = sanitize(ReaderSource::with_config(file, &config));
    let file = tokio::fs::File::create(&to).await.expect("create failed");

    sink(&mut stream, WriterSink::with_config(file, &config))
        .await
        .expect("sink failed");

    let copied = tokio::fs::read(&to).await.expect("read failed");
    assert_eq!(copied, content);
}
