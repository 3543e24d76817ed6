//! Decides when buffered messages are due to be flushed.

use std::time::Duration;

/// The part of the buffer state a [`FlushPolicy`] looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Formatted size of the pending messages in bytes.
    pub pending_size: usize,

    /// Time elapsed since the previous flush, or since the buffer was created.
    pub since_last_flush: Duration,
}

/// Why a flush is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The pending messages reached the size threshold.
    Size,

    /// The buffer time elapsed.
    Time,
}

/// When to flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Flush every `buffer_time`.
    Timed {
        /// Interval between flushes.
        buffer_time: Duration,
    },

    /// Flush every `buffer_time`, or as soon as the pending messages occupy at least
    /// `max_size` bytes, whichever happens first.
    SizeOrTime {
        /// Longest time a message stays buffered.
        buffer_time: Duration,

        /// Size threshold in bytes of the formatted pending messages.
        max_size: usize,
    },
}

impl FlushPolicy {
    /// The configured interval between flushes.
    pub fn buffer_time(&self) -> Duration {
        match *self {
            Self::Timed { buffer_time } | Self::SizeOrTime { buffer_time, .. } => buffer_time,
        }
    }

    /// The size threshold, if this policy has one.
    pub fn max_size(&self) -> Option<usize> {
        match *self {
            Self::Timed { .. } => None,
            Self::SizeOrTime { max_size, .. } => Some(max_size),
        }
    }

    /// Whether `pending_size` bytes reach the size threshold.
    ///
    /// Always `false` for [`FlushPolicy::Timed`].
    pub fn size_exceeded(&self, pending_size: usize) -> bool {
        self.max_size()
            .is_some_and(|max_size| pending_size >= max_size)
    }

    /// Returns the reason a flush is due now, or `None` when it is not.
    ///
    /// The size threshold takes precedence when both conditions hold.
    pub fn trigger(&self, snapshot: &Snapshot) -> Option<Trigger> {
        if self.size_exceeded(snapshot.pending_size) {
            Some(Trigger::Size)
        } else if snapshot.since_last_flush >= self.buffer_time() {
            Some(Trigger::Time)
        } else {
            None
        }
    }

    /// Whether a flush is due now.
    pub fn should_flush_now(&self, snapshot: &Snapshot) -> bool {
        self.trigger(snapshot).is_some()
    }

    /// How long the flush loop may sleep before it has to check again.
    ///
    /// Zero when a flush is already due.
    pub fn next_wake_delay(&self, snapshot: &Snapshot) -> Duration {
        if self.size_exceeded(snapshot.pending_size) {
            return Duration::ZERO;
        }

        self.buffer_time()
            .saturating_sub(snapshot.since_last_flush)
    }
}
