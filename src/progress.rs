//! Advisory progress reporting for long-running pipeline stages.
//!
//! The pipeline pushes `ProgressUpdate`s through the [`ProgressObserver`]
//! trait; rendering happens on indicatif's background ticker, decoupled from
//! the producing thread. Observers are purely cosmetic: updates may be
//! dropped or rendered late without affecting correctness.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// A single progress update. Fields left as `None` keep their previous value.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    /// Items processed so far.
    pub count: Option<u64>,
    /// Expected total, when known (e.g. from a COUNT pre-query).
    pub total: Option<u64>,
    /// Free-form status line (current country, retry notice, pass name).
    pub message: Option<String>,
}

impl ProgressUpdate {
    /// Update carrying only a new count.
    pub fn count(count: u64) -> Self {
        Self {
            count: Some(count),
            ..Self::default()
        }
    }

    /// Update carrying only a new status message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Update carrying a new expected total.
    pub fn total(total: u64) -> Self {
        Self {
            total: Some(total),
            ..Self::default()
        }
    }
}

/// Receiver side of the progress channel.
///
/// Implementations must tolerate stale or dropped updates; nothing in the
/// pipeline depends on an observer for correctness.
pub trait ProgressObserver: Send + Sync {
    /// Receives one update.
    fn update(&self, update: ProgressUpdate);

    /// Called once when the stage completes; clears any live rendering.
    fn finish(&self);
}

/// Observer that discards every update. Used for batch/no-spinner runs.
pub struct NullProgress;

impl ProgressObserver for NullProgress {
    fn update(&self, _update: ProgressUpdate) {}
    fn finish(&self) {}
}

/// Console spinner backed by an indicatif progress bar.
///
/// The bar ticks on its own background thread (~10 Hz), so the pipeline
/// thread never blocks on terminal I/O.
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    /// Creates a spinner with a `count/total message` layout.
    pub fn spinner() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {pos}/{len} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl ProgressObserver for ConsoleProgress {
    fn update(&self, update: ProgressUpdate) {
        if let Some(total) = update.total {
            self.bar.set_length(total);
        }
        if let Some(count) = update.count {
            self.bar.set_position(count);
        }
        if let Some(message) = update.message {
            self.bar.set_message(message);
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
