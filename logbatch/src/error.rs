//! Errors returned by the buffer, its configuration and its sinks.

/// A configuration value was rejected while building a buffer or formatter.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The buffer time must be longer than zero.
    #[error("buffer time must be greater than zero")]
    ZeroBufferTime,

    /// A size threshold was requested but set to zero bytes.
    #[error("maximum buffer size must be greater than zero")]
    ZeroMaxSize,

    /// The timestamp pattern contains an unknown or malformed `strftime` specifier.
    #[error("invalid timestamp format {0:?}")]
    InvalidTimestampFormat(String),
}

/// Returned by [`LogBuffer::append`][crate::LogBuffer::append] once the buffer has been closed.
///
/// The rejected message is handed back so the caller can decide where it goes instead.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("trying to write to a closed buffer")]
pub struct ClosedError {
    message: String,
}

impl ClosedError {
    pub(crate) fn new(message: String) -> Self {
        Self { message }
    }

    /// The message that was not buffered.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns ownership of the message that was not buffered.
    pub fn into_message(self) -> String {
        self.message
    }
}

/// Returned by [`LogBuffer::close`][crate::LogBuffer::close] when the buffer is already closed.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("the buffer has already been closed")]
pub struct AlreadyClosedError;

/// A sink failed to write a flushed block.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    /// Writing to the underlying I/O object failed.
    #[error("failed to write block")]
    Io(#[from] std::io::Error),

    /// The sink refused the block for a reason of its own.
    #[error("sink rejected block: {0}")]
    Rejected(String),
}

/// A failed flush, as sent to the failure reporting channel of a buffer.
///
/// The messages of the affected batch are not buffered again.
#[derive(thiserror::Error, Debug)]
#[error("lost a batch of {messages} messages")]
pub struct FlushFailure {
    /// Number of messages in the lost batch.
    pub messages: usize,

    /// Why the sink failed.
    #[source]
    pub error: SinkError,
}
