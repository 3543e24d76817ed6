//! Destinations for flushed blocks.
//!
//! # Sink Trait
//!
//! The [`Sink`] trait defines where a flushed block goes.
//! Custom sinks can be implemented by providing an implementation of this trait, and any
//! `Fn(&str) -> Result<(), SinkError>` closure is a sink.
//!
//! # Built-in Sinks
//!
//! - [`WriterSink`] - Writes blocks to an [`AsyncWrite`], e.g. stdout or a file
//! - [`MemorySink`] - Collects blocks in memory, for tests and embedding

use std::fmt;
use std::future::{self, Future};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::SinkError;

/// Performs the output of a flushed block.
///
/// A sink may suspend while writing; the buffer is not locked in the meantime, so producers
/// keep appending to the next batch.
///
/// # Examples
///
/// ```rust
/// use logbatch::SinkError;
/// use logbatch::sink::Sink;
///
/// #[derive(Debug)]
/// struct Stderr;
///
/// impl Sink for Stderr {
///     async fn write(&self, block: &str) -> Result<(), SinkError> {
///         eprintln!("{block}");
///         Ok(())
///     }
/// }
/// ```
pub trait Sink: Send + Sync + 'static {
    /// Writes one flushed block.
    fn write(&self, block: &str) -> impl Future<Output = Result<(), SinkError>> + Send;
}

impl<F> Sink for F
where
    F: Fn(&str) -> Result<(), SinkError> + Send + Sync + 'static,
{
    fn write(&self, block: &str) -> impl Future<Output = Result<(), SinkError>> + Send {
        future::ready(self(block))
    }
}

/// A sink writing each block, terminated by a newline, to an [`AsyncWrite`].
///
/// The writer is flushed after every block.
pub struct WriterSink<W> {
    writer: tokio::sync::Mutex<W>,
}

impl<W> fmt::Debug for WriterSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterSink").finish_non_exhaustive()
    }
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
        }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl WriterSink<tokio::io::Stdout> {
    /// A sink writing to the standard output of the process.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> Sink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write(&self, block: &str) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(block.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

/// A sink that stores every block in memory.
///
/// # Examples
///
/// ```rust
/// use logbatch::sink::MemorySink;
///
/// let (sink, blocks) = MemorySink::new();
/// // Hand `sink` to a buffer, then inspect `blocks`.
/// assert!(blocks.lock().unwrap().is_empty());
/// ```
#[derive(Debug)]
pub struct MemorySink {
    /// Every block written so far, in order.
    pub blocks: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    /// Creates a sink and returns it together with a handle to the stored blocks.
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let blocks = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                blocks: blocks.clone(),
            },
            blocks,
        )
    }
}

impl Sink for MemorySink {
    fn write(&self, block: &str) -> impl Future<Output = Result<(), SinkError>> + Send {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(block.to_owned());
        future::ready(Ok(()))
    }
}
