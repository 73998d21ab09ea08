//! Progress indicators
//!
//! Thin wrappers over `indicatif` with kiln's styling. Bars are hidden when the
//! caller disables progress (`--no-progress`, quiet mode) or when
//! `KILN_NO_PROGRESS` is set, so scripted runs get clean output.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Environment variable disabling every progress indicator.
pub const NO_PROGRESS_ENV: &str = "KILN_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV).is_ok()
}

fn default_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("=>-")
}

/// A progress bar with kiln styling.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// A visible bar of `len` steps, unless progress is disabled globally.
    pub fn new(len: u64) -> Self {
        if is_progress_disabled() {
            return Self::hidden();
        }
        let bar = IndicatifBar::new(len);
        bar.set_style(default_style());
        Self {
            inner: bar,
        }
    }

    /// A bar that draws nothing.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    /// Replace the prefix shown before the bar.
    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.inner.set_prefix(prefix.into());
    }

    /// Set the absolute position.
    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    /// Finish, leaving `msg` on screen.
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Finish and erase the bar.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

/// Counts completions of a fixed number of concurrent tasks.
///
/// Shared by reference between the tasks of one fan-out; every completed task
/// calls [`increment`](Self::increment) exactly once.
pub struct CompletionCounter {
    completed: AtomicUsize,
    total: usize,
    progress_bar: Option<ProgressBar>,
}

impl CompletionCounter {
    /// Counter expecting `total` completions, drawing a bar when requested.
    pub fn new(total: usize, with_progress_bar: bool) -> Self {
        let progress_bar = (with_progress_bar && total > 0).then(|| ProgressBar::new(total as u64));
        Self {
            completed: AtomicUsize::new(0),
            total,
            progress_bar,
        }
    }

    /// Record one completion and return the new count.
    pub fn increment(&self) -> usize {
        let current = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(pb) = &self.progress_bar {
            pb.set_position(current as u64);
        }
        current
    }

    /// Completions recorded so far.
    pub fn current(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Completions expected.
    pub const fn total(&self) -> usize {
        self.total
    }

    /// True when exactly the expected number of completions was recorded.
    pub fn is_complete(&self) -> bool {
        self.current() == self.total
    }

    /// Label the bar.
    pub fn set_prefix(&self, prefix: impl Into<String>) {
        if let Some(pb) = &self.progress_bar {
            pb.set_prefix(prefix);
        }
    }

    /// Finish the bar with a summary.
    pub fn finish(&self) {
        if let Some(pb) = &self.progress_bar {
            pb.finish_with_message(format!("{} files", self.total));
        }
    }

    /// Remove the bar without a summary, e.g. after a failure.
    pub fn abandon(&self) {
        if let Some(pb) = &self.progress_bar {
            pb.finish_and_clear();
        }
    }
}
