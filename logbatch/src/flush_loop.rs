//! The task that flushes a buffer when its policy says so.

use std::fmt;
use std::sync::Arc;

use crate::buffer::Shared;
use crate::format::{Format, Verbatim};
use crate::sink::Sink;

/// Lifecycle of a [`FlushLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// [`FlushLoop::run`] has not been called yet.
    Idle,

    /// Flushing whenever the policy says so.
    Running,

    /// The buffer was closed, the final flush is in progress.
    Draining,

    /// The final flush completed, nothing will be flushed any more.
    Stopped,
}

/// What a [`FlushLoop`] did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Blocks written successfully.
    pub flushes: usize,

    /// Messages contained in the blocks written successfully.
    pub messages: usize,

    /// Blocks the sink failed to write.
    pub failures: usize,

    /// Messages contained in the failed blocks.
    pub lost: usize,
}

/// Flushes a [`LogBuffer`][crate::LogBuffer] according to its [`FlushPolicy`][crate::FlushPolicy].
///
/// Exactly one exists per buffer, returned by [`Builder::build`][crate::Builder::build].
/// It has to be driven concurrently with the producers, typically with [`tokio::spawn`].
pub struct FlushLoop<S, F = Verbatim> {
    shared: Arc<Shared<S, F>>,
}

impl<S, F> fmt::Debug for FlushLoop<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushLoop")
            .field("policy", self.shared.policy())
            .finish_non_exhaustive()
    }
}

impl<S, F> FlushLoop<S, F> {
    pub(crate) fn new(shared: Arc<Shared<S, F>>) -> Self {
        Self { shared }
    }
}

impl<S, F> FlushLoop<S, F>
where
    S: Sink,
    F: Format,
{
    /// Runs until the buffer is closed and drained.
    ///
    /// Sleeps until the policy asks for a flush, waking early when an append reaches the size
    /// threshold or the buffer is closed. Once closed, flushes whatever is still pending and
    /// returns.
    ///
    /// A failing sink never stops the loop: the failure is logged, counted, and sent to the
    /// channel registered with [`Builder::report_failures`][crate::Builder::report_failures].
    #[tracing::instrument(name = "flush_loop", skip_all, fields(policy = ?self.shared.policy()))]
    pub async fn run(self) -> FlushSummary {
        let shared = &*self.shared;
        let mut summary = FlushSummary::default();

        shared.set_loop_state(LoopState::Running);
        let stopped = StopOnDrop(shared);

        loop {
            let (closed, snapshot) = shared.snapshot();
            if closed {
                break;
            }

            if let Some(trigger) = shared.policy().trigger(&snapshot) {
                tracing::debug!(?trigger, pending_size = snapshot.pending_size, "flushing");
                flush(shared, &mut summary).await;
                continue;
            }

            let delay = shared.policy().next_wake_delay(&snapshot);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shared.wake.notified() => {}
            }
        }

        shared.set_loop_state(LoopState::Draining);
        tracing::debug!("draining closed buffer");
        flush(shared, &mut summary).await;
        drop(stopped);

        tracing::info!(
            flushes = summary.flushes,
            messages = summary.messages,
            failures = summary.failures,
            lost = summary.lost,
            "flush loop stopped"
        );

        summary
    }
}

/// Publishes [`LoopState::Stopped`] however `run` ends, including when it is aborted or the
/// sink panics.
struct StopOnDrop<'a, S, F>(&'a Shared<S, F>);

impl<S, F> Drop for StopOnDrop<'_, S, F> {
    fn drop(&mut self) {
        self.0.set_loop_state(LoopState::Stopped);
    }
}

async fn flush<S, F>(shared: &Shared<S, F>, summary: &mut FlushSummary)
where
    S: Sink,
{
    match shared.flush().await {
        Ok(0) => {}
        Ok(messages) => {
            summary.flushes += 1;
            summary.messages += messages;
        }
        Err(failure) => {
            tracing::error!(
                error = &failure.error as &dyn std::error::Error,
                messages = failure.messages,
                "sink failed, dropping batch"
            );
            summary.failures += 1;
            summary.lost += failure.messages;
            shared.report(failure);
        }
    }
}
