//! Demonstration of pullstream and its adapters.
//!
//! Run with: `cargo run -p pullstream-adapters --features demo --bin demo`
//! Set `RUST_LOG=debug` to see lifecycle and adapter logs.

use anyhow::Context;
use bytes::Bytes;
use pullstream_adapters::{
    buffer, paste, pipe, sanitize, sink, BufferOptions, IoConfig, PullStream, ReaderSource,
    StreamError, StreamExt, WriterSink,
};
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    println!("=== pullstream Demo ===\n");

    demo_basic_usage().await?;
    demo_backpressure().await?;
    demo_paste().await?;
    demo_buffer_file().await?;
    demo_sink_to_stdout().await?;
    demo_pipe_files().await?;
    demo_close().await?;

    println!("\n=== All demos completed successfully! ===");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(env_filter).try_init();
}

fn numbers(values: Vec<u32>) -> PullStream<u32> {
    PullStream::new(move |write| async move {
        for value in values {
            write.write(value)?.await?;
        }
        Ok(())
    })
}

/// Demo 1: Explicit reads until the end marker
async fn demo_basic_usage() -> anyhow::Result<()> {
    println!("--- Demo 1: Basic Usage ---");

    let mut stream = numbers(vec![1, 2, 3]);
    while let Some(value) = stream.read().await? {
        println!("  Received: {}", value);
    }
    println!("  Lifecycle after end: {:?}", stream.lifecycle());

    println!();
    Ok(())
}

/// Demo 2: The producer only advances when the consumer reads
async fn demo_backpressure() -> anyhow::Result<()> {
    println!("--- Demo 2: Backpressure ---");

    let stream = PullStream::new(|write| async move {
        for i in 0..3u32 {
            println!("  Producer: writing {}", i);
            write.write(i)?.await?;
            println!("  Producer: {} was consumed, continuing", i);
        }
        Ok(())
    });

    let mut stream = stream.map(|item| item.map(|value| value * 10));
    while let Some(item) = stream.next().await {
        println!("  Consumer: got {}", item?);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    println!();
    Ok(())
}

/// Demo 3: Splicing a child stream into a producer
async fn demo_paste() -> anyhow::Result<()> {
    println!("--- Demo 3: paste ---");

    let mut child = numbers(vec![1, 2, 3]);
    let outer = PullStream::new(move |write| async move {
        write.write(0)?.await?;
        paste(&write, &mut child).await?;
        write.write(4)?.await?;
        Ok(())
    });

    let values: Vec<u32> = outer
        .collect::<Result<Vec<_>, StreamError>>()
        .await?;
    println!("  Spliced: {:?}", values);

    println!();
    Ok(())
}

/// Demo 4: Reading a file as text through sanitize + buffer
async fn demo_buffer_file() -> anyhow::Result<()> {
    println!("--- Demo 4: sanitize + buffer ---");

    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;

    let mut stream = sanitize(ReaderSource::with_config(file, &IoConfig::small_buffers()));
    let options = BufferOptions::default()
        .with_encoding_label("utf-8")?
        .with_limit(1 << 20);
    let buffered = buffer(&mut stream, options).await?;

    let text = buffered.as_text().unwrap_or_default();
    println!("  Read {} bytes; first line: {:?}", text.len(), text.lines().next());

    // A limit smaller than the file fails and closes the stream.
    let file = tokio::fs::File::open(&path).await?;
    let mut stream = sanitize(ReaderSource::with_config(file, &IoConfig::small_buffers()));
    match buffer(&mut stream, BufferOptions::utf8().with_limit(16)).await {
        Ok(_) => println!("  Unexpectedly fit into 16 bytes"),
        Err(err) => println!("  With a 16 byte limit: {}", err),
    }

    println!();
    Ok(())
}

/// Demo 5: Draining a stream into stdout
async fn demo_sink_to_stdout() -> anyhow::Result<()> {
    println!("--- Demo 5: sink ---");

    let mut stream = PullStream::new(|write| async move {
        for line in ["  one\n", "  two\n", "  three\n"] {
            write.write(Bytes::from_static(line.as_bytes()))?.await?;
        }
        Ok(())
    });
    sink(&mut stream, WriterSink::new(tokio::io::stdout())).await?;

    println!();
    Ok(())
}

/// Demo 6: Copying a file with pipe
async fn demo_pipe_files() -> anyhow::Result<()> {
    println!("--- Demo 6: pipe ---");

    let from = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
    let to = std::env::temp_dir().join(format!("pullstream-demo-{}.toml", std::process::id()));

    let config = IoConfig::small_buffers();
    let source = ReaderSource::with_config(tokio::fs::File::open(&from).await?, &config);
    let target = WriterSink::with_config(tokio::fs::File::create(&to).await?, &config);
    pipe(source, target).await?;

    let copied = tokio::fs::metadata(&to).await?.len();
    let original = tokio::fs::metadata(&from).await?.len();
    println!("  Copied {} of {} bytes to {}", copied, original, to.display());
    tokio::fs::remove_file(&to).await?;

    println!();
    Ok(())
}

/// Demo 7: Closing a stream unwinds its producer
async fn demo_close() -> anyhow::Result<()> {
    println!("--- Demo 7: close ---");

    let mut stream = PullStream::new(|write| async move {
        let mut n = 0u64;
        while !write.is_closed() {
            write.write(n)?.await?;
            n += 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(())
    });

    let mut received = 0;
    while let Ok(item) = timeout(Duration::from_millis(100), stream.read()).await {
        if item?.is_some() {
            received += 1;
        }
        if received == 3 {
            break;
        }
    }
    stream.close();
    stream.terminated().await;

    println!("  Received {} values, then closed", received);
    match stream.read().await {
        Err(err) => println!("  Reading after close: {}", err),
        Ok(value) => println!("  Reading after close: {:?}", value),
    }

    println!("\n--- All features demonstrated ---");
    Ok(())
}
