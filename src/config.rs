//! Classifier and pipeline configuration.
//!
//! [`ClassifierOptions`] holds the tuning knobs of the static-frame test and
//! [`PipelineOptions`] the operational settings (batching, queue sizes,
//! progress, cancellation, compute device). Both are builders; both are
//! validated before any stage starts so that a bad value never reaches a
//! running thread.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use stillcut::{
//!     CancellationToken, ClassifierOptions, PipelineOptions, ProgressCallback, ProgressInfo,
//! };
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{} frames, {} kept", info.frames_processed, info.frames_kept);
//!     }
//! }
//!
//! let classifier = ClassifierOptions::denoised().with_block_size(32);
//! let token = CancellationToken::new();
//! let options = PipelineOptions::new()
//!     .with_batch_size(64)
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::device::ComputeDevice;
use crate::encode::VideoCodec;
use crate::error::StillcutError;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// How the first frame of each batch is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeamPolicy {
    /// Compare the first frame of a batch with the last frame of the
    /// previous batch, so batch boundaries are invisible in the output.
    #[default]
    Compare,
    /// Always keep the first frame of every batch.
    AlwaysKeep,
}

impl Display for SeamPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SeamPolicy::Compare => write!(f, "compare"),
            SeamPolicy::AlwaysKeep => write!(f, "always-keep"),
        }
    }
}

impl FromStr for SeamPolicy {
    type Err = StillcutError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "compare" => Ok(SeamPolicy::Compare),
            "always-keep" | "keep" => Ok(SeamPolicy::AlwaysKeep),
            other => Err(StillcutError::invalid(
                "seam_policy",
                format!("unknown policy '{other}' (expected compare or always-keep)"),
            )),
        }
    }
}

/// Tuning parameters for the static-frame classifier.
///
/// Defaults: kernel 7, sigma 3.0, block 16, high threshold 400, low
/// threshold 100, fraction 0.1, [`SeamPolicy::Compare`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOptions {
    /// Side length of the Gaussian blur kernel.
    pub kernel_size: usize,
    /// Standard deviation of the Gaussian.
    pub sigma: f64,
    /// Side length of the square blocks compared between frames.
    pub block_size: u32,
    /// A single block whose SAD exceeds this makes the frame significant.
    pub hi_threshold: f64,
    /// Per-block SAD threshold for the fractional rule.
    pub lo_threshold: f64,
    /// Fraction of blocks that must exceed `lo_threshold`.
    pub frac_threshold: f64,
    /// Treatment of batch-initial frames.
    pub seam_policy: SeamPolicy,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            kernel_size: 7,
            sigma: 3.0,
            block_size: 16,
            hi_threshold: 400.0,
            lo_threshold: 100.0,
            frac_threshold: 0.1,
            seam_policy: SeamPolicy::Compare,
        }
    }
}

impl ClassifierOptions {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Heavier denoising (kernel 15, sigma 7.0) for grainy sources.
    pub fn denoised() -> Self {
        Self {
            kernel_size: 15,
            sigma: 7.0,
            ..Self::default()
        }
    }

    /// Set the blur kernel size.
    #[must_use]
    pub fn with_kernel_size(mut self, size: usize) -> Self {
        self.kernel_size = size;
        self
    }

    /// Set the blur standard deviation.
    #[must_use]
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    /// Set the block size.
    #[must_use]
    pub fn with_block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }

    /// Set the high (single block) threshold.
    #[must_use]
    pub fn with_hi_threshold(mut self, threshold: f64) -> Self {
        self.hi_threshold = threshold;
        self
    }

    /// Set the low (fractional rule) threshold.
    #[must_use]
    pub fn with_lo_threshold(mut self, threshold: f64) -> Self {
        self.lo_threshold = threshold;
        self
    }

    /// Set the fraction of blocks required by the fractional rule.
    #[must_use]
    pub fn with_frac_threshold(mut self, fraction: f64) -> Self {
        self.frac_threshold = fraction;
        self
    }

    /// Set the seam policy.
    #[must_use]
    pub fn with_seam_policy(mut self, policy: SeamPolicy) -> Self {
        self.seam_policy = policy;
        self
    }

    /// Check every value is in range.
    pub fn validate(&self) -> Result<(), StillcutError> {
        if self.kernel_size == 0 {
            return Err(StillcutError::invalid("kernel_size", "must be at least 1"));
        }
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(StillcutError::invalid(
                "sigma",
                format!("must be positive, got {}", self.sigma),
            ));
        }
        if self.block_size == 0 {
            return Err(StillcutError::invalid("block_size", "must be at least 1"));
        }
        for (name, value) in [
            ("hi_threshold", self.hi_threshold),
            ("lo_threshold", self.lo_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(StillcutError::invalid(
                    name,
                    format!("must be a non-negative number, got {value}"),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.frac_threshold) {
            return Err(StillcutError::invalid(
                "frac_threshold",
                format!("must lie in [0, 1], got {}", self.frac_threshold),
            ));
        }
        Ok(())
    }
}

/// Operational settings for a [`Pipeline`](crate::Pipeline) run.
///
/// Defaults: batch size 32, input and output queues of 1024 batches, a
/// one-second pull timeout, MPEG-4 output, a parallel compute device, no
/// progress callback, and no cancellation.
#[derive(Clone)]
pub struct PipelineOptions {
    pub(crate) batch_size: usize,
    pub(crate) input_queue: usize,
    pub(crate) output_queue: usize,
    pub(crate) pull_timeout: Duration,
    pub(crate) codec: VideoCodec,
    pub(crate) device: ComputeDevice,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) progress_interval: u64,
}

impl Debug for PipelineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineOptions")
            .field("batch_size", &self.batch_size)
            .field("input_queue", &self.input_queue)
            .field("output_queue", &self.output_queue)
            .field("pull_timeout", &self.pull_timeout)
            .field("codec", &self.codec)
            .field("device", &self.device)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            batch_size: 32,
            input_queue: 1024,
            output_queue: 1024,
            pull_timeout: Duration::from_secs(1),
            codec: VideoCodec::default(),
            device: ComputeDevice::default(),
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            progress_interval: 1,
        }
    }

    /// Frames per batch.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Capacity, in batches, of the queue between decoder and classifier.
    #[must_use]
    pub fn with_input_queue(mut self, capacity: usize) -> Self {
        self.input_queue = capacity;
        self
    }

    /// Capacity, in batches, of the queue between classifier and encoder.
    #[must_use]
    pub fn with_output_queue(mut self, capacity: usize) -> Self {
        self.output_queue = capacity;
        self
    }

    /// How long one pull on the input queue waits before reporting a timeout.
    #[must_use]
    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    /// Output codec.
    #[must_use]
    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Where classification work runs.
    #[must_use]
    pub fn with_device(mut self, device: ComputeDevice) -> Self {
        self.device = device;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// The run loop checks the token before every pull and returns
    /// [`StillcutError::Cancelled`] once it is set.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Fire the progress callback every `frames` frames (minimum 1).
    #[must_use]
    pub fn with_progress_interval(mut self, frames: u64) -> Self {
        self.progress_interval = frames.max(1);
        self
    }

    /// Frames per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Output codec.
    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    /// Check every value is in range.
    pub fn validate(&self) -> Result<(), StillcutError> {
        if self.batch_size == 0 {
            return Err(StillcutError::invalid("batch_size", "must be at least 1"));
        }
        if self.input_queue == 0 {
            return Err(StillcutError::invalid("input_queue", "must be at least 1"));
        }
        if self.output_queue == 0 {
            return Err(StillcutError::invalid("output_queue", "must be at least 1"));
        }
        if self.pull_timeout.is_zero() {
            return Err(StillcutError::invalid("pull_timeout", "must be non-zero"));
        }
        if let ComputeDevice::Parallel { threads: Some(0) } = self.device {
            return Err(StillcutError::invalid("threads", "must be at least 1"));
        }
        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ClassifierOptions::default().validate().is_ok());
        assert!(ClassifierOptions::denoised().validate().is_ok());
        assert!(PipelineOptions::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        let options = ClassifierOptions::new().with_frac_threshold(1.5);
        assert!(matches!(
            options.validate(),
            Err(StillcutError::InvalidParameter { name: "frac_threshold", .. })
        ));
    }

    #[test]
    fn rejects_zero_batch() {
        let options = PipelineOptions::new().with_batch_size(0);
        assert!(matches!(
            options.validate(),
            Err(StillcutError::InvalidParameter { name: "batch_size", .. })
        ));
    }

    #[test]
    fn seam_policy_parses() {
        assert_eq!("compare".parse::<SeamPolicy>().unwrap(), SeamPolicy::Compare);
        assert_eq!("Always-Keep".parse::<SeamPolicy>().unwrap(), SeamPolicy::AlwaysKeep);
        assert!("sometimes".parse::<SeamPolicy>().is_err());
    }
}
