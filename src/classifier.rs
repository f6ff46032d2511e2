//! Static-frame classification.
//!
//! [`BatchClassifier::classify`] turns a batch of frames into keep/drop
//! decisions:
//!
//! 1. each frame is reduced to BT.601 luminance and blurred
//!    ([`FrequencyBlur`]) to suppress sensor noise and compression grain;
//! 2. each blurred frame is compared with its predecessor block by block,
//!    using the sum of absolute differences (SAD) over
//!    `block_size × block_size` tiles (partial tiles at the right and bottom
//!    edges are ignored);
//! 3. a frame is *significant*, and kept, if any tile's SAD exceeds
//!    `hi_threshold`, or if more than `frac_threshold` of all tiles exceed
//!    `lo_threshold`.
//!
//! Running totals travel in a [`ProcessingState`] that each call consumes
//! and replaces.

use crate::blur::{FrequencyBlur, GaussianKernel};
use crate::config::{ClassifierOptions, SeamPolicy};
use crate::device::{ComputeDevice, Executor};
use crate::error::StillcutError;
use crate::frame::{FrameBatch, InclusionMask};
use crate::metadata::{FrameRate, StreamMetadata};

/// Running statistics carried from one batch to the next.
///
/// The state is never mutated in place; [`BatchClassifier::classify`]
/// consumes it and returns its successor. `skipped_duration` never exceeds
/// `total_duration`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingState {
    total_duration: f64,
    skipped_duration: f64,
    frames_seen: u64,
    frames_kept: u64,
    previous_frame: Option<Vec<f32>>,
}

impl ProcessingState {
    /// State before the first batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds of footage classified so far.
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Seconds of footage dropped so far.
    pub fn skipped_duration(&self) -> f64 {
        self.skipped_duration
    }

    /// Seconds of footage kept so far.
    pub fn kept_duration(&self) -> f64 {
        self.total_duration - self.skipped_duration
    }

    /// Frames classified so far.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Frames kept so far.
    pub fn frames_kept(&self) -> u64 {
        self.frames_kept
    }

    /// Blurred luminance of the last classified frame.
    pub fn previous_frame(&self) -> Option<&[f32]> {
        self.previous_frame.as_deref()
    }
}

/// Output of one [`BatchClassifier::classify`] call.
#[derive(Debug)]
pub struct ClassifiedBatch {
    /// Updated running statistics.
    pub state: ProcessingState,
    /// One decision per frame of `batch`.
    pub mask: InclusionMask,
    /// The batch that was classified, unchanged.
    pub batch: FrameBatch,
}

/// Decides which frames of a stream are static.
#[derive(Debug)]
pub struct BatchClassifier {
    options: ClassifierOptions,
    metadata: StreamMetadata,
    blur: FrequencyBlur,
    executor: Executor,
    blocks_x: usize,
    blocks_y: usize,
}

impl BatchClassifier {
    /// Build a classifier for frames of the given stream.
    ///
    /// # Errors
    ///
    /// - [`StillcutError::InvalidParameter`] if an option is out of range,
    ///   the block size exceeds the frame, or the device cannot be built.
    pub fn new(
        options: ClassifierOptions,
        metadata: &StreamMetadata,
        device: ComputeDevice,
    ) -> Result<Self, StillcutError> {
        options.validate()?;
        if options.block_size > metadata.width || options.block_size > metadata.height {
            return Err(StillcutError::invalid(
                "block_size",
                format!(
                    "{} does not fit in a {}x{} frame",
                    options.block_size, metadata.width, metadata.height
                ),
            ));
        }

        let kernel = GaussianKernel::new(options.kernel_size, options.sigma)?;
        let blur = FrequencyBlur::new(&kernel, metadata.width, metadata.height);
        let executor = Executor::new(device)?;
        let block = options.block_size as usize;

        log::info!(
            "Classifier ready: {}x{} frames, kernel {} (sigma {}), {} blocks of {block}px, seam {}",
            metadata.width,
            metadata.height,
            options.kernel_size,
            options.sigma,
            (metadata.width as usize / block) * (metadata.height as usize / block),
            options.seam_policy,
        );

        Ok(Self {
            blocks_x: metadata.width as usize / block,
            blocks_y: metadata.height as usize / block,
            options,
            metadata: metadata.clone(),
            blur,
            executor,
        })
    }

    /// The options this classifier was built with.
    pub fn options(&self) -> &ClassifierOptions {
        &self.options
    }

    /// Classify one batch.
    ///
    /// A batch of exactly one frame is always kept, as is the very first
    /// frame of a stream. An empty batch returns `state` unchanged.
    ///
    /// # Errors
    ///
    /// - [`StillcutError::FrameMismatch`] if a frame's dimensions differ from
    ///   the stream metadata.
    /// - [`StillcutError::InvariantViolation`] if the updated totals would
    ///   be inconsistent.
    pub fn classify(
        &self,
        batch: FrameBatch,
        state: ProcessingState,
        frame_rate: FrameRate,
    ) -> Result<ClassifiedBatch, StillcutError> {
        if batch.is_empty() {
            return Ok(ClassifiedBatch {
                state,
                mask: InclusionMask::default(),
                batch,
            });
        }
        for frame in batch.frames() {
            frame.check_dimensions(&self.metadata)?;
        }

        let blur = &self.blur;
        let mut blurred = self
            .executor
            .map(batch.frames(), |frame| blur.apply(&frame.luminance()));

        let mask = if blurred.len() == 1 {
            InclusionMask::keep_all(1)
        } else {
            let first = match (self.options.seam_policy, state.previous_frame()) {
                (SeamPolicy::Compare, Some(previous)) => self.is_significant(previous, &blurred[0]),
                _ => true,
            };
            let pairs: Vec<usize> = (1..blurred.len()).collect();
            let frames = &blurred;
            let rest = self
                .executor
                .map(&pairs, |&i| self.is_significant(&frames[i - 1], &frames[i]));
            InclusionMask::new(std::iter::once(first).chain(rest).collect())
        };

        if mask.len() != batch.len() {
            return Err(StillcutError::MaskLengthMismatch {
                mask_len: mask.len(),
                batch_len: batch.len(),
            });
        }

        let next = ProcessingState {
            total_duration: state.total_duration + frame_rate.frames_to_seconds(batch.len()),
            skipped_duration: state.skipped_duration
                + frame_rate.frames_to_seconds(mask.dropped()),
            frames_seen: state.frames_seen + batch.len() as u64,
            frames_kept: state.frames_kept + mask.kept() as u64,
            previous_frame: blurred.pop(),
        };
        if !(0.0 <= next.skipped_duration && next.skipped_duration <= next.total_duration) {
            return Err(StillcutError::InvariantViolation(format!(
                "skipped duration {:.6}s outside [0, {:.6}s]",
                next.skipped_duration, next.total_duration
            )));
        }

        log::debug!(
            "Batch of {} frames starting at {}: kept {}, dropped {}",
            batch.len(),
            batch.frames()[0].index(),
            mask.kept(),
            mask.dropped(),
        );

        Ok(ClassifiedBatch {
            state: next,
            mask,
            batch,
        })
    }

    /// Per-block SAD between two blurred luminance planes, row-major over
    /// blocks.
    fn block_sads(&self, previous: &[f32], current: &[f32]) -> Vec<f64> {
        let width = self.metadata.width as usize;
        let block = self.options.block_size as usize;
        let mut sads = vec![0.0f64; self.blocks_x * self.blocks_y];

        for row in 0..self.blocks_y * block {
            let offset = row * width;
            let block_row = row / block;
            for col in 0..self.blocks_x * block {
                let diff = (current[offset + col] - previous[offset + col]).abs();
                sads[block_row * self.blocks_x + col / block] += diff as f64;
            }
        }
        sads
    }

    fn is_significant(&self, previous: &[f32], current: &[f32]) -> bool {
        let sads = self.block_sads(previous, current);
        if sads.iter().any(|&sad| sad > self.options.hi_threshold) {
            return true;
        }
        let changed = sads
            .iter()
            .filter(|&&sad| sad > self.options.lo_threshold)
            .count();
        changed as f64 > self.options.frac_threshold * sads.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, PixelFormat};

    fn metadata(width: u32, height: u32) -> StreamMetadata {
        StreamMetadata::new(0, FrameRate::new(10, 1).unwrap(), width, height).unwrap()
    }

    #[test]
    fn block_sads_ignore_partial_tiles() {
        let options = ClassifierOptions::new().with_kernel_size(1).with_block_size(2);
        let classifier =
            BatchClassifier::new(options, &metadata(5, 3), ComputeDevice::Serial).unwrap();
        let previous = vec![0.0f32; 15];
        let current = vec![1.0f32; 15];
        // 2x1 full tiles; the fifth column and third row are trimmed.
        assert_eq!(classifier.block_sads(&previous, &current), vec![4.0, 4.0]);
    }

    #[test]
    fn rejects_block_larger_than_frame() {
        let options = ClassifierOptions::new().with_block_size(32);
        let result = BatchClassifier::new(options, &metadata(16, 64), ComputeDevice::Serial);
        assert!(matches!(
            result,
            Err(StillcutError::InvalidParameter { name: "block_size", .. })
        ));
    }

    #[test]
    fn empty_batch_keeps_state() {
        let options = ClassifierOptions::new().with_kernel_size(1).with_block_size(2);
        let classifier =
            BatchClassifier::new(options, &metadata(4, 4), ComputeDevice::Serial).unwrap();
        let rate = FrameRate::new(10, 1).unwrap();

        let first = classifier
            .classify(
                FrameBatch::new(vec![Frame::filled(4, 4, PixelFormat::Gray8, 3).unwrap()]),
                ProcessingState::new(),
                rate,
            )
            .unwrap();
        let state = first.state.clone();
        let empty = classifier.classify(FrameBatch::default(), first.state, rate).unwrap();
        assert!(empty.mask.is_empty());
        assert_eq!(empty.state, state);
    }
}
