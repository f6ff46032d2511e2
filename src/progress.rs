//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring a pipeline run,
//! [`CancellationToken`] for cooperative cancellation, and [`ProgressInfo`]
//! for progress snapshots.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use stillcut::{
//!     ClassifierOptions, Pipeline, PipelineOptions, ProgressCallback, ProgressInfo,
//!     StillcutError,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("{pct:.1}% complete, {} frames kept", info.frames_kept);
//!         }
//!     }
//! }
//!
//! let options = PipelineOptions::new().with_progress(Arc::new(PrintProgress));
//! let report = Pipeline::new("input.mp4", "output.mp4", options)?
//!     .run(&ClassifierOptions::default())?;
//! # Ok::<(), StillcutError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// A snapshot of pipeline progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Frames classified so far.
    pub frames_processed: u64,
    /// Total frames expected, if the stream reported a count.
    pub total_frames: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total_frames` is known.
    pub percentage: Option<f32>,
    /// Frames kept so far.
    pub frames_kept: u64,
    /// Seconds of footage dropped so far.
    pub skipped_duration: f64,
    /// Wall-clock time elapsed since the run started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
}

/// Trait for receiving progress updates during a pipeline run.
///
/// Progress callbacks are **infallible**: they observe but cannot halt the
/// run. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals while frames are being classified.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any thread to stop the
/// associated pipeline before its next pull.
///
/// # Example
///
/// ```
/// use stillcut::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks throughput and fires the callback every `interval` frames.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: Option<u64>,
    interval: u64,
    processed: u64,
    kept: u64,
    skipped_duration: f64,
    since_last_report: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        total: Option<u64>,
        interval: u64,
    ) -> Self {
        Self {
            callback,
            total: total.filter(|&t| t > 0),
            interval: interval.max(1),
            processed: 0,
            kept: 0,
            skipped_duration: 0.0,
            since_last_report: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one classified batch.
    pub(crate) fn advance(&mut self, frames: u64, kept: u64, skipped_duration: f64) {
        self.processed += frames;
        self.kept += kept;
        self.skipped_duration = skipped_duration;
        self.since_last_report += frames;

        if self.since_last_report >= self.interval {
            self.report();
            self.since_last_report = 0;
        }
    }

    /// Unconditionally emit a final report.
    pub(crate) fn finish(&mut self) {
        self.report();
    }

    fn report(&self) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .map(|t| (self.processed.min(t) as f32 / t as f32) * 100.0);

        let estimated_remaining = if self.processed > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.processed);
                elapsed.mul_f64(remaining as f64 / self.processed as f64)
            })
        } else {
            None
        };

        let info = ProgressInfo {
            frames_processed: self.processed,
            total_frames: self.total,
            percentage,
            frames_kept: self.kept,
            skipped_duration: self.skipped_duration,
            elapsed,
            estimated_remaining,
        };

        self.callback.on_progress(&info);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressInfo>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(info.clone());
        }
    }

    #[test]
    fn reports_on_interval_and_finish() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(recorder.clone(), Some(10), 4);
        tracker.advance(3, 3, 0.0);
        tracker.advance(3, 1, 0.2);
        tracker.advance(4, 2, 0.4);
        tracker.finish();

        let reports = recorder.0.lock().unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].frames_processed, 6);
        assert_eq!(reports[2].frames_processed, 10);
        assert_eq!(reports[2].frames_kept, 6);
        assert_eq!(reports[2].percentage, Some(100.0));
    }

    #[test]
    fn unknown_total_has_no_percentage() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(recorder.clone(), Some(0), 1);
        tracker.advance(1, 1, 0.0);
        let reports = recorder.0.lock().unwrap();
        assert_eq!(reports[0].percentage, None);
        assert!(reports[0].estimated_remaining.is_none());
    }
}
