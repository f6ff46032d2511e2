//! Classifier integration tests.
//!
//! All streams are synthetic; no fixtures are needed. Most tests use a
//! kernel of size 1 (no blur) on grayscale frames so that block differences
//! are exact integers.

use stillcut::{
    BatchClassifier, ClassifierOptions, ComputeDevice, Frame, FrameBatch, FrameRate,
    FrequencyBlur, GaussianKernel, PixelFormat, ProcessingState, SeamPolicy, StillcutError,
    StreamMetadata,
};

fn ten_fps() -> FrameRate {
    FrameRate::new(10, 1).expect("rate")
}

fn metadata(width: u32, height: u32) -> StreamMetadata {
    StreamMetadata::new(0, ten_fps(), width, height).expect("metadata")
}

fn unblurred() -> ClassifierOptions {
    ClassifierOptions::new().with_kernel_size(1)
}

fn gray(width: u32, height: u32, value: u8) -> Frame {
    Frame::filled(width, height, PixelFormat::Gray8, value).expect("frame")
}

/// An 8x8 black frame with `count` pixels of the top-left 4x4 block set to 1.
fn with_changed_pixels(count: usize) -> Frame {
    let mut data = vec![0u8; 64];
    for position in 0..count {
        let (y, x) = (position / 4, position % 4);
        data[y * 8 + x] = 1;
    }
    Frame::new(8, 8, PixelFormat::Gray8, data).expect("frame")
}

/// An 8x8 black frame where the first `count` 2x2 blocks each have one
/// pixel set to 1.
fn with_changed_blocks(count: usize) -> Frame {
    let mut data = vec![0u8; 64];
    for block in 0..count {
        let (by, bx) = (block / 4, block % 4);
        data[by * 2 * 8 + bx * 2] = 1;
    }
    Frame::new(8, 8, PixelFormat::Gray8, data).expect("frame")
}

fn classify_fresh(classifier: &BatchClassifier, frames: Vec<Frame>) -> Vec<bool> {
    classifier
        .classify(FrameBatch::new(frames), ProcessingState::new(), ten_fps())
        .expect("classify")
        .mask
        .as_slice()
        .to_vec()
}

// ── Edge cases ─────────────────────────────────────────────────────

#[test]
fn single_frame_batch_is_always_kept() {
    let classifier = BatchClassifier::new(
        unblurred().with_block_size(4),
        &metadata(8, 8),
        ComputeDevice::Serial,
    )
    .expect("classifier");

    let first = classifier
        .classify(
            FrameBatch::new(vec![gray(8, 8, 10), gray(8, 8, 10)]),
            ProcessingState::new(),
            ten_fps(),
        )
        .expect("classify");
    assert_eq!(first.mask.as_slice(), &[true, false]);

    // Identical to the carried frame, but alone in its batch.
    let second = classifier
        .classify(FrameBatch::new(vec![gray(8, 8, 10)]), first.state, ten_fps())
        .expect("classify");
    assert_eq!(second.mask.as_slice(), &[true]);
}

#[test]
fn first_frame_of_stream_is_kept() {
    let classifier = BatchClassifier::new(
        unblurred().with_block_size(4),
        &metadata(8, 8),
        ComputeDevice::Serial,
    )
    .expect("classifier");
    assert_eq!(
        classify_fresh(&classifier, vec![gray(8, 8, 0), gray(8, 8, 0), gray(8, 8, 0)]),
        vec![true, false, false]
    );
}

#[test]
fn mismatched_frame_dimensions_fail_fast() {
    let classifier = BatchClassifier::new(
        unblurred().with_block_size(4),
        &metadata(8, 8),
        ComputeDevice::Serial,
    )
    .expect("classifier");
    let result = classifier.classify(
        FrameBatch::new(vec![gray(8, 8, 0), gray(16, 8, 0)]),
        ProcessingState::new(),
        ten_fps(),
    );
    assert!(matches!(
        result,
        Err(StillcutError::FrameMismatch { got_width: 16, expected_width: 8, .. })
    ));
}

#[test]
fn invalid_options_are_rejected() {
    let result = BatchClassifier::new(
        ClassifierOptions::new().with_sigma(-1.0),
        &metadata(32, 32),
        ComputeDevice::Serial,
    );
    assert!(matches!(result, Err(StillcutError::InvalidParameter { name: "sigma", .. })));
}

// ── Threshold boundaries ───────────────────────────────────────────

#[test]
fn single_block_above_hi_threshold_is_significant() {
    let options = unblurred()
        .with_block_size(4)
        .with_hi_threshold(10.5)
        .with_lo_threshold(1000.0)
        .with_frac_threshold(0.0);
    let classifier =
        BatchClassifier::new(options, &metadata(8, 8), ComputeDevice::Serial).expect("classifier");

    assert_eq!(
        classify_fresh(&classifier, vec![gray(8, 8, 0), with_changed_pixels(11)]),
        vec![true, true]
    );
    assert_eq!(
        classify_fresh(&classifier, vec![gray(8, 8, 0), with_changed_pixels(10)]),
        vec![true, false]
    );
}

#[test]
fn fractional_rule_boundary() {
    // 16 blocks of 2x2; more than a quarter (4) must change.
    let options = unblurred()
        .with_block_size(2)
        .with_hi_threshold(1000.0)
        .with_lo_threshold(0.5)
        .with_frac_threshold(0.25);
    let classifier =
        BatchClassifier::new(options, &metadata(8, 8), ComputeDevice::Serial).expect("classifier");

    assert_eq!(
        classify_fresh(&classifier, vec![gray(8, 8, 0), with_changed_blocks(4)]),
        vec![true, false]
    );
    assert_eq!(
        classify_fresh(&classifier, vec![gray(8, 8, 0), with_changed_blocks(5)]),
        vec![true, true]
    );
}

// ── Running state ──────────────────────────────────────────────────

#[test]
fn masks_match_batches_and_totals_stay_consistent() {
    let classifier = BatchClassifier::new(
        ClassifierOptions::default().with_block_size(8),
        &metadata(16, 16),
        ComputeDevice::with_threads(2),
    )
    .expect("classifier");

    let shades = [0u8, 0, 0, 90, 90, 30, 30, 30, 30, 200, 0, 0, 0];
    let mut frames = shades.iter().map(|&shade| gray(16, 16, shade));
    let mut state = ProcessingState::new();
    let mut previous_skipped = 0.0;

    for batch_len in [1usize, 4, 3, 5] {
        let batch: Vec<Frame> = frames.by_ref().take(batch_len).collect();
        let classified = classifier
            .classify(FrameBatch::new(batch), state, ten_fps())
            .expect("classify");

        assert_eq!(classified.mask.len(), classified.batch.len());
        state = classified.state;
        assert!(state.skipped_duration() >= previous_skipped);
        assert!(state.skipped_duration() <= state.total_duration());
        previous_skipped = state.skipped_duration();
    }

    assert_eq!(state.frames_seen(), 13);
    assert!((state.total_duration() - 1.3).abs() < 1e-9);
    // Kept: 0, 90, 30, 200, 0 (the first of each run).
    assert_eq!(state.frames_kept(), 5);
    assert!((state.skipped_duration() - 0.8).abs() < 1e-9);
}

#[test]
fn seam_policy_controls_batch_initial_frames() {
    let base = unblurred().with_block_size(4);
    let compare = BatchClassifier::new(base.clone(), &metadata(8, 8), ComputeDevice::Serial)
        .expect("classifier");
    let always = BatchClassifier::new(
        base.with_seam_policy(SeamPolicy::AlwaysKeep),
        &metadata(8, 8),
        ComputeDevice::Serial,
    )
    .expect("classifier");

    for (classifier, expected) in [(&compare, [false, false]), (&always, [true, false])] {
        let first = classifier
            .classify(
                FrameBatch::new(vec![gray(8, 8, 5), gray(8, 8, 5)]),
                ProcessingState::new(),
                ten_fps(),
            )
            .expect("classify");
        let second = classifier
            .classify(
                FrameBatch::new(vec![gray(8, 8, 5), gray(8, 8, 5)]),
                first.state,
                ten_fps(),
            )
            .expect("classify");
        assert_eq!(second.mask.as_slice(), &expected);
    }
}

#[test]
fn serial_and_parallel_devices_agree() {
    let options = ClassifierOptions::default().with_block_size(4);
    let serial = BatchClassifier::new(options.clone(), &metadata(12, 12), ComputeDevice::Serial)
        .expect("classifier");
    let parallel =
        BatchClassifier::new(options, &metadata(12, 12), ComputeDevice::with_threads(4))
            .expect("classifier");

    let frames: Vec<Frame> = (0..12u8)
        .map(|i| {
            let data = (0..144u32).map(|p| ((p * (i as u32 % 3)) % 256) as u8).collect();
            Frame::new(12, 12, PixelFormat::Gray8, data).expect("frame")
        })
        .collect();

    assert_eq!(
        classify_fresh(&serial, frames.clone()),
        classify_fresh(&parallel, frames)
    );
}

// ── Blur ───────────────────────────────────────────────────────────

#[test]
fn blur_of_uniform_frame_is_uniform() {
    let kernel = GaussianKernel::new(15, 7.0).expect("kernel");
    let blur = FrequencyBlur::new(&kernel, 40, 24);
    let frame = Frame::filled(40, 24, PixelFormat::Rgb8, 123).expect("frame");

    for value in blur.apply(&frame.luminance()) {
        assert!((value - 123.0).abs() < 0.05, "blurred value {value}");
    }
}
