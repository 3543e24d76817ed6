//! The shared buffer producers append to.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, mpsc, watch};
use tokio::time::Instant;

use crate::config::Config;
use crate::error::{AlreadyClosedError, ClosedError, ConfigError, FlushFailure, SinkError};
use crate::flush_loop::{FlushLoop, LoopState};
use crate::format::{Format, Verbatim};
use crate::policy::{FlushPolicy, Snapshot};
use crate::sink::Sink;

/// Buffer contents, only ever touched with the lock held and never across an `await`.
#[derive(Debug)]
struct State {
    /// Formatted messages in append order.
    pending: Vec<String>,

    /// Sum of the byte lengths of `pending`.
    pending_size: usize,

    last_flush: Instant,

    closed: bool,
}

/// Everything a [`LogBuffer`] and its [`FlushLoop`] share.
pub(crate) struct Shared<S, F> {
    sink: S,
    formatter: F,
    policy: FlushPolicy,
    separator: String,

    state: Mutex<State>,

    /// Wakes the flush loop early, on reaching the size threshold or on close.
    pub(crate) wake: Notify,

    /// Serializes flushes so that blocks reach the sink in the order they were drained.
    flush_lock: tokio::sync::Mutex<()>,

    loop_state: watch::Sender<LoopState>,

    failures: Option<mpsc::UnboundedSender<FlushFailure>>,
}

impl<S, F> Shared<S, F> {
    fn lock(&self) -> MutexGuard<'_, State> {
        // The state is consistent after every statement, a panicking holder cannot corrupt it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn policy(&self) -> &FlushPolicy {
        &self.policy
    }

    /// Returns whether the buffer is closed, and what the policy needs to know otherwise.
    pub(crate) fn snapshot(&self) -> (bool, Snapshot) {
        let state = self.lock();
        let snapshot = Snapshot {
            pending_size: state.pending_size,
            since_last_flush: state.last_flush.elapsed(),
        };
        (state.closed, snapshot)
    }

    pub(crate) fn set_loop_state(&self, state: LoopState) {
        self.loop_state.send_replace(state);
    }

    pub(crate) fn report(&self, failure: FlushFailure) {
        if let Some(failures) = &self.failures {
            // Nobody listening any more is fine, the failure has been logged already.
            let _ = failures.send(failure);
        }
    }
}

impl<S, F> Shared<S, F>
where
    S: Sink,
{
    /// Drains the pending messages and writes them as one block.
    ///
    /// Returns the number of messages written. The batch is gone either way.
    pub(crate) async fn flush(&self) -> Result<usize, FlushFailure> {
        let _serialized = self.flush_lock.lock().await;

        let batch = {
            let mut state = self.lock();
            state.pending_size = 0;
            state.last_flush = Instant::now();
            mem::take(&mut state.pending)
        };

        if batch.is_empty() {
            return Ok(0);
        }

        let messages = batch.len();
        let block = batch.join(&self.separator);
        self.sink
            .write(&block)
            .await
            .map_err(|error| FlushFailure { messages, error })?;

        tracing::trace!(messages, bytes = block.len(), "wrote block");
        Ok(messages)
    }
}

impl<S, F> Drop for Shared<S, F> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.pending.is_empty() {
            tracing::warn!(
                messages = state.pending.len(),
                "log buffer dropped with messages not yet flushed"
            );
        }
    }
}

/// A handle to a buffer of log messages that are flushed to a [`Sink`] in batches.
///
/// Handles are cheap to clone, every producer gets its own. The buffer is flushed by the
/// [`FlushLoop`] returned alongside the first handle from [`Builder::build`], which has to be
/// driven until it stops.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use logbatch::LogBuffer;
/// use logbatch::sink::MemorySink;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let (sink, blocks) = MemorySink::new();
/// let (buffer, flush_loop) = LogBuffer::builder(sink)
///     .buffer_time(Duration::from_millis(50))
///     .build()?;
/// let flush_loop = tokio::spawn(flush_loop.run());
///
/// buffer.append("hello")?;
/// buffer.append("world")?;
/// buffer.close()?;
///
/// let summary = flush_loop.await?;
/// assert_eq!(summary.messages, 2);
/// assert_eq!(*blocks.lock().unwrap(), ["hello\nworld"]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # }).unwrap();
/// ```
pub struct LogBuffer<S, F = Verbatim> {
    shared: Arc<Shared<S, F>>,
}

impl<S, F> Clone for LogBuffer<S, F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S, F> fmt::Debug for LogBuffer<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("LogBuffer")
            .field("policy", &self.shared.policy)
            .field("pending", &state.pending.len())
            .field("pending_size", &state.pending_size)
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

impl<S> LogBuffer<S>
where
    S: Sink,
{
    /// Starts configuring a buffer that flushes into `sink`.
    pub fn builder(sink: S) -> Builder<S> {
        Builder {
            sink,
            formatter: Verbatim,
            config: Config::default(),
            failures: None,
        }
    }
}

impl<S, F> LogBuffer<S, F>
where
    S: Sink,
    F: Format,
{
    /// Formats `message` and adds it to the pending batch.
    ///
    /// Wakes the flush loop when the batch reaches the size threshold, but never flushes or
    /// waits for I/O itself.
    ///
    /// Fails, returning the message, if the buffer has been closed.
    pub fn append(&self, message: impl Into<String>) -> Result<(), ClosedError> {
        let message = message.into();
        let formatted = self.shared.formatter.format(&message);

        let size_exceeded = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(ClosedError::new(message));
            }
            state.pending_size += formatted.len();
            state.pending.push(formatted);
            self.shared.policy.size_exceeded(state.pending_size)
        };

        if size_exceeded {
            self.shared.wake.notify_one();
        }

        Ok(())
    }

    /// Writes all pending messages to the sink now, as one block.
    ///
    /// Does not call the sink if nothing is pending, but still restarts the buffer time.
    /// When the sink fails the batch is dropped, not buffered again.
    pub async fn flush(&self) -> Result<(), SinkError> {
        self.shared
            .flush()
            .await
            .map(drop)
            .map_err(|failure| failure.error)
    }

    /// Closes the buffer.
    ///
    /// Further appends fail. The flush loop drains what is still pending and stops, await
    /// [`LogBuffer::stopped`] or the flush loop itself to know when that happened.
    pub fn close(&self) -> Result<(), AlreadyClosedError> {
        {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(AlreadyClosedError);
            }
            state.closed = true;
        }

        tracing::debug!("log buffer closed");
        self.shared.wake.notify_one();

        Ok(())
    }
}

impl<S, F> LogBuffer<S, F> {
    /// Whether [`LogBuffer::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Number of messages waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Formatted size in bytes of the messages waiting for the next flush.
    pub fn pending_size(&self) -> usize {
        self.shared.lock().pending_size
    }

    /// The flush policy in use.
    pub fn policy(&self) -> &FlushPolicy {
        self.shared.policy()
    }

    /// The current state of the flush loop.
    pub fn loop_state(&self) -> LoopState {
        *self.shared.loop_state.borrow()
    }

    /// Waits until the flush loop has drained the closed buffer and stopped.
    ///
    /// Never completes if the flush loop is not being run.
    pub async fn stopped(&self) {
        let mut loop_state = self.shared.loop_state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = loop_state
            .wait_for(|state| *state == LoopState::Stopped)
            .await;
    }
}

/// Configures and creates a [`LogBuffer`] together with its [`FlushLoop`].
pub struct Builder<S, F = Verbatim> {
    sink: S,
    formatter: F,
    config: Config,
    failures: Option<mpsc::UnboundedSender<FlushFailure>>,
}

impl<S, F> fmt::Debug for Builder<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("config", &self.config)
            .field("reports_failures", &self.failures.is_some())
            .finish_non_exhaustive()
    }
}

impl<S, F> Builder<S, F>
where
    S: Sink,
    F: Format,
{
    /// Formats every appended message with `formatter`.
    pub fn formatter<G>(self, formatter: G) -> Builder<S, G>
    where
        G: Format,
    {
        Builder {
            sink: self.sink,
            formatter,
            config: self.config,
            failures: self.failures,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the interval between flushes.
    pub fn buffer_time(mut self, buffer_time: Duration) -> Self {
        self.config.buffer_time = buffer_time;
        self
    }

    /// Also flushes as soon as the pending messages occupy `max_size` bytes.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = Some(max_size);
        self
    }

    /// Sets the text inserted between the messages of a block.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.config.separator = separator.into();
        self
    }

    /// Sends every failed flush of the flush loop to `failures`.
    pub fn report_failures(mut self, failures: mpsc::UnboundedSender<FlushFailure>) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Validates the configuration and creates the buffer.
    pub fn build(self) -> Result<(LogBuffer<S, F>, FlushLoop<S, F>), ConfigError> {
        let policy = self.config.policy()?;
        let (loop_state, _) = watch::channel(LoopState::Idle);

        let shared = Arc::new(Shared {
            sink: self.sink,
            formatter: self.formatter,
            policy,
            separator: self.config.separator,
            state: Mutex::new(State {
                pending: Vec::new(),
                pending_size: 0,
                last_flush: Instant::now(),
                closed: false,
            }),
            wake: Notify::new(),
            flush_lock: tokio::sync::Mutex::new(()),
            loop_state,
            failures: self.failures,
        });

        tracing::debug!(?policy, "created log buffer");

        Ok((
            LogBuffer {
                shared: shared.clone(),
            },
            FlushLoop::new(shared),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::LogBuffer;
    use crate::error::{AlreadyClosedError, ConfigError, SinkError};
    use crate::flush_loop::LoopState;
    use crate::sink::MemorySink;

    #[test]
    fn build_rejects_invalid_config() {
        let (sink, _) = MemorySink::new();
        let error = LogBuffer::builder(sink)
            .buffer_time(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(error, ConfigError::ZeroBufferTime);

        let (sink, _) = MemorySink::new();
        let error = LogBuffer::builder(sink).max_size(0).build().unwrap_err();
        assert_eq!(error, ConfigError::ZeroMaxSize);
    }

    #[tokio::test]
    async fn flush_delivers_all_messages_in_order() {
        let (sink, blocks) = MemorySink::new();
        let (buffer, _flush_loop) = LogBuffer::builder(sink).build().unwrap();

        for message in ["one", "two", "three"] {
            buffer.append(message).unwrap();
        }
        assert_eq!(buffer.pending_len(), 3);
        assert_eq!(buffer.pending_size(), 11);

        buffer.flush().await.unwrap();

        assert_eq!(*blocks.lock().unwrap(), ["one\ntwo\nthree"]);
        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(buffer.pending_size(), 0);
    }

    #[tokio::test]
    async fn separator_and_formatter_are_applied() {
        let (sink, blocks) = MemorySink::new();
        let (buffer, _flush_loop) = LogBuffer::builder(sink)
            .formatter(|message: &str| format!("<{message}>"))
            .separator(", ")
            .build()
            .unwrap();

        buffer.append("a").unwrap();
        buffer.append("b").unwrap();
        assert_eq!(buffer.pending_size(), 6);

        buffer.flush().await.unwrap();
        assert_eq!(*blocks.lock().unwrap(), ["<a>, <b>"]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_flush_skips_the_sink() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = {
            let calls = calls.clone();
            move |_: &str| -> Result<(), SinkError> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };
        let (buffer, _flush_loop) = LogBuffer::builder(sink).build().unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        let (_, before) = buffer.shared.snapshot();
        buffer.flush().await.unwrap();
        let (_, after) = buffer.shared.snapshot();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(before.since_last_flush, Duration::from_secs(1));
        assert_eq!(after.since_last_flush, Duration::ZERO);
    }

    #[tokio::test]
    async fn failed_batch_is_not_requeued() {
        let sink = |_: &str| -> Result<(), SinkError> { Err(SinkError::Rejected("down".into())) };
        let (buffer, _flush_loop) = LogBuffer::builder(sink).build().unwrap();

        buffer.append("lost").unwrap();
        let error = buffer.flush().await.unwrap_err();

        assert!(matches!(error, SinkError::Rejected(_)));
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn append_after_close_is_rejected() {
        let (sink, _) = MemorySink::new();
        let (buffer, _flush_loop) = LogBuffer::builder(sink).build().unwrap();

        buffer.append("kept").unwrap();
        buffer.close().unwrap();

        let error = buffer.append("late").unwrap_err();
        assert_eq!(error.message(), "late");
        assert_eq!(buffer.pending_len(), 1);
        assert_eq!(buffer.pending_size(), 4);
        assert!(buffer.is_closed());
    }

    #[test]
    fn close_twice_is_rejected() {
        let (sink, _) = MemorySink::new();
        let (buffer, _flush_loop) = LogBuffer::builder(sink).build().unwrap();

        assert_eq!(buffer.close(), Ok(()));
        assert_eq!(buffer.close(), Err(AlreadyClosedError));
        assert!(buffer.is_closed());
    }

    #[test]
    fn clones_share_the_buffer() {
        let (sink, _) = MemorySink::new();
        let (buffer, _flush_loop) = LogBuffer::builder(sink).build().unwrap();
        let producer = buffer.clone();

        producer.append("from clone").unwrap();
        assert_eq!(buffer.pending_len(), 1);
        assert_eq!(buffer.loop_state(), LoopState::Idle);
    }

    #[test]
    #[tracing_test::traced_test]
    fn dropping_unflushed_messages_warns() {
        let (sink, _) = MemorySink::new();
        let (buffer, flush_loop) = LogBuffer::builder(sink).build().unwrap();

        buffer.append("forgotten").unwrap();
        drop(flush_loop);
        drop(buffer);

        assert!(logs_contain("log buffer dropped with messages not yet flushed"));
    }
}
