//! Rendering of single messages before they are buffered.
//!
//! A [`LogBuffer`][crate::LogBuffer] formats each message as it is appended, so that for
//! instance a [`Timestamp`] records when the event happened rather than when it was flushed.
//!
//! Any `Fn(&str) -> String` closure is a formatter. [`Verbatim`] is the default and keeps
//! messages unchanged, [`PerLine`] applies a formatter to every line of a multi-line message,
//! and [`Timestamp`] prefixes every line with the current time.

use std::fmt;

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, NaiveDateTime};

use crate::error::ConfigError;

/// Renders one raw message into the text that gets buffered.
pub trait Format: Send + Sync + 'static {
    /// Formats `message`.
    fn format(&self, message: &str) -> String;
}

impl<F> Format for F
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    fn format(&self, message: &str) -> String {
        self(message)
    }
}

/// Leaves messages unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Verbatim;

impl Format for Verbatim {
    fn format(&self, message: &str) -> String {
        message.to_owned()
    }
}

/// Applies a line formatter to every `\n` separated line of a message.
///
/// ```rust
/// use logbatch::format::{Format, PerLine};
///
/// let quoted = PerLine::new(|line: &str| format!("> {line}"));
/// pretty_assertions::assert_eq!(quoted.format("first\nsecond"), "> first\n> second");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PerLine<F>(F);

impl<F> PerLine<F>
where
    F: Format,
{
    /// Wraps `line_formatter`.
    pub fn new(line_formatter: F) -> Self {
        Self(line_formatter)
    }
}

impl<F> Format for PerLine<F>
where
    F: Format,
{
    fn format(&self, message: &str) -> String {
        let mut formatted = String::with_capacity(message.len());
        for (index, line) in message.split('\n').enumerate() {
            if index > 0 {
                formatted.push('\n');
            }
            formatted.push_str(&self.0.format(line));
        }
        formatted
    }
}

/// Pattern used by [`Timestamp::default`].
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reads the wall clock in local time.
fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Prefixes every line of a message with `[<time>]: `.
///
/// The time is rendered with a `strftime` pattern, see [`chrono::format::strftime`].
///
/// ```rust
/// use chrono::NaiveDate;
/// use logbatch::format::{DEFAULT_TIMESTAMP_FORMAT, Format, Timestamp};
///
/// let at = NaiveDate::from_ymd_opt(2024, 5, 17)
///     .unwrap()
///     .and_hms_opt(9, 30, 0)
///     .unwrap();
/// let timestamp = Timestamp::with_clock(DEFAULT_TIMESTAMP_FORMAT, move || at)?;
///
/// pretty_assertions::assert_eq!(
///     timestamp.format("started\nready"),
///     "[2024-05-17 09:30:00]: started\n[2024-05-17 09:30:00]: ready"
/// );
/// # Ok::<(), logbatch::ConfigError>(())
/// ```
#[derive(Clone)]
pub struct Timestamp<C = fn() -> NaiveDateTime> {
    pattern: String,
    clock: C,
}

impl<C> fmt::Debug for Timestamp<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timestamp")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

impl Timestamp {
    /// Creates a formatter reading the local wall clock.
    ///
    /// Fails if `pattern` contains an invalid `strftime` specifier.
    pub fn new(pattern: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_clock(pattern, local_now as fn() -> NaiveDateTime)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_TIMESTAMP_FORMAT.to_owned(),
            clock: local_now,
        }
    }
}

impl<C> Timestamp<C>
where
    C: Fn() -> NaiveDateTime + Send + Sync + 'static,
{
    /// Creates a formatter reading the time from `clock`.
    ///
    /// Fails if `pattern` contains an invalid `strftime` specifier.
    pub fn with_clock(pattern: impl Into<String>, clock: C) -> Result<Self, ConfigError> {
        let pattern = pattern.into();
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidTimestampFormat(pattern));
        }
        Ok(Self { pattern, clock })
    }

    /// The `strftime` pattern in use.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl<C> Format for Timestamp<C>
where
    C: Fn() -> NaiveDateTime + Send + Sync + 'static,
{
    fn format(&self, message: &str) -> String {
        use std::fmt::Write;

        // One reading for all lines of the message. Zone specifiers cannot be rendered for a
        // naive time, they end the timestamp early rather than failing the append.
        let mut now = String::new();
        let _ = write!(now, "{}", (self.clock)().format(&self.pattern));
        PerLine::new(move |line: &str| format!("[{now}]: {line}")).format(message)
    }
}
