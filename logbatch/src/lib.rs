//! Batched log flushing.
//!
//! Producers append messages to a [`LogBuffer`]; a [`FlushLoop`] running next to them writes
//! the pending messages to a [`Sink`][sink::Sink] as one block whenever the [`FlushPolicy`]
//! says so:
//!
//! - [`FlushPolicy::Timed`] flushes every `buffer_time`.
//! - [`FlushPolicy::SizeOrTime`] additionally flushes as soon as the formatted pending messages
//!   reach `max_size` bytes.
//!
//! Closing the buffer rejects further appends, and the flush loop stops after writing what was
//! still pending, so no message appended before [`LogBuffer::close`] returned is lost.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use logbatch::LogBuffer;
//! use logbatch::format::{DEFAULT_TIMESTAMP_FORMAT, Timestamp};
//! use logbatch::sink::WriterSink;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let (buffer, flush_loop) = LogBuffer::builder(WriterSink::stdout())
//!     .formatter(Timestamp::new(DEFAULT_TIMESTAMP_FORMAT)?)
//!     .buffer_time(Duration::from_millis(200))
//!     .max_size(120)
//!     .build()?;
//! let flush_loop = tokio::spawn(flush_loop.run());
//!
//! for index in 0..10 {
//!     buffer.append(format!("event {index}"))?;
//! }
//!
//! buffer.close()?;
//! flush_loop.await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

#![forbid(unsafe_code)]

mod buffer;
mod config;
mod error;
mod flush_loop;
pub mod format;
mod policy;
pub mod sink;

pub use self::buffer::{Builder, LogBuffer};
pub use self::config::Config;
pub use self::error::{AlreadyClosedError, ClosedError, ConfigError, FlushFailure, SinkError};
pub use self::flush_loop::{FlushLoop, FlushSummary, LoopState};
pub use self::policy::{FlushPolicy, Snapshot, Trigger};
