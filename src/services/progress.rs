//! Progress reporting.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::utils::log::progress_line;

/// Receives `(processed, total)` after each batch. Fire-and-forget.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, processed: usize, total: usize);
}

impl<F> ProgressReporter for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn report(&self, processed: usize, total: usize) {
        self(processed, total)
    }
}

/// Writes progress lines through the logger.
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: String,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressReporter for LogProgress {
    fn report(&self, processed: usize, total: usize) {
        log::info!("{}", progress_line(&self.label, processed, total));
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _processed: usize, _total: usize) {}
}

/// Keeps only the most recent report, for pollers.
#[derive(Debug, Default)]
pub struct LatestProgress {
    processed: AtomicUsize,
    total: AtomicUsize,
    reports: AtomicUsize,
}

impl LatestProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(processed, total)` of the last report.
    pub fn latest(&self) -> (usize, usize) {
        (
            self.processed.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    pub fn report_count(&self) -> usize {
        self.reports.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for LatestProgress {
    fn report(&self, processed: usize, total: usize) {
        self.processed.store(processed, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        self.reports.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn latest_value_wins() {
        let progress = LatestProgress::new();
        progress.report(5, 100);
        progress.report(10, 100);
        assert_eq!(progress.latest(), (10, 100));
        assert_eq!(progress.report_count(), 2);
    }

    #[test]
    fn closures_are_reporters() {
        let seen = Mutex::new(Vec::new());
        let reporter = |p: usize, t: usize| seen.lock().unwrap().push((p, t));
        reporter.report(1, 2);
        let dyn_reporter: &dyn ProgressReporter = &reporter;
        dyn_reporter.report(2, 2);
        assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }
}
