//! Source and sink stage integration tests.

use std::thread;
use std::time::{Duration, Instant};

use stillcut::{
    CollectingEncoder, Frame, FrameBatch, FrameDecoder, FrameEncoder, FrameRate, FrameSink,
    FrameSource, InclusionMask, PixelFormat, SinkOptions, SourceItem, SourceOptions,
    StillcutError, StreamMetadata, VecDecoder,
};

fn metadata() -> StreamMetadata {
    StreamMetadata::new(0, FrameRate::new(25, 1).expect("rate"), 4, 4).expect("metadata")
}

fn frames(count: usize) -> Vec<Frame> {
    (0..count)
        .map(|i| Frame::filled(4, 4, PixelFormat::Gray8, i as u8).expect("frame"))
        .collect()
}

fn source_options(batch_size: usize) -> SourceOptions {
    SourceOptions {
        batch_size,
        queue_capacity: 4,
        pull_timeout: Duration::from_millis(500),
    }
}

/// Collect batch lengths until end of stream.
fn drain(source: &mut FrameSource) -> Vec<Vec<u64>> {
    let mut batches = Vec::new();
    loop {
        match source.next_batch().expect("next batch") {
            SourceItem::Batch(batch) => {
                batches.push(batch.frames().iter().map(Frame::index).collect());
            }
            SourceItem::TimedOut => continue,
            SourceItem::EndOfStream => return batches,
        }
    }
}

/// Waits before producing its first frame.
struct LateDecoder {
    delay: Option<Duration>,
    frames: VecDecoder,
}

impl FrameDecoder for LateDecoder {
    fn read_frame(&mut self) -> Result<Option<Frame>, StillcutError> {
        if let Some(delay) = self.delay.take() {
            thread::sleep(delay);
        }
        self.frames.read_frame()
    }
}

/// Fails on the write with the given position.
struct FailingEncoder {
    inner: CollectingEncoder,
    fail_at: usize,
    written: usize,
}

impl FrameEncoder for FailingEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StillcutError> {
        if self.written == self.fail_at {
            return Err(StillcutError::VideoWriteError("disk full".to_string()));
        }
        self.written += 1;
        self.inner.write_frame(frame)
    }

    fn finish(&mut self) -> Result<(), StillcutError> {
        self.inner.finish()
    }
}

// ── FrameSource ────────────────────────────────────────────────────

#[test]
fn source_batches_in_order_and_flushes_the_tail() {
    let input = frames(10);
    let mut source =
        FrameSource::start(move || Ok(VecDecoder::new(input)), metadata(), source_options(4))
            .expect("source");

    assert_eq!(
        drain(&mut source),
        vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]
    );
    // End of stream is sticky.
    assert!(matches!(source.next_batch(), Ok(SourceItem::EndOfStream)));
}

#[test]
fn source_reports_timeout_while_decoder_is_slow() {
    let options = SourceOptions {
        pull_timeout: Duration::from_millis(10),
        ..source_options(2)
    };
    let input = frames(2);
    let mut source = FrameSource::start(
        move || {
            Ok(LateDecoder {
                delay: Some(Duration::from_millis(300)),
                frames: VecDecoder::new(input),
            })
        },
        metadata(),
        options,
    )
    .expect("source");

    assert!(matches!(source.next_batch(), Ok(SourceItem::TimedOut)));
    assert_eq!(drain(&mut source), vec![vec![0, 1]]);
}

#[test]
fn source_stop_is_idempotent_and_unblocks_a_full_queue() {
    let options = SourceOptions {
        batch_size: 1,
        queue_capacity: 1,
        pull_timeout: Duration::from_millis(50),
    };
    let input = frames(200);
    let mut source = FrameSource::start(move || Ok(VecDecoder::new(input)), metadata(), options)
        .expect("source");

    // Give the producer time to fill the queue and block.
    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    source.stop();
    source.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(source.next_batch(), Ok(SourceItem::EndOfStream)));
}

#[test]
fn source_rejects_zero_batch_size() {
    let result = FrameSource::start(
        || Ok(VecDecoder::new(Vec::new())),
        metadata(),
        source_options(0),
    );
    assert!(matches!(
        result,
        Err(StillcutError::InvalidParameter { name: "batch_size", .. })
    ));
}

#[test]
fn source_open_error_is_returned_from_start() {
    let result = FrameSource::start(
        || -> Result<VecDecoder, StillcutError> { Err(StillcutError::NoVideoStream) },
        metadata(),
        source_options(2),
    );
    assert!(matches!(result, Err(StillcutError::NoVideoStream)));
}

// ── FrameSink ──────────────────────────────────────────────────────

#[test]
fn sink_writes_kept_frames_in_submission_order() {
    let encoder = CollectingEncoder::new();
    let written = encoder.handle();
    let mut sink = FrameSink::start(move || Ok(encoder), SinkOptions { queue_capacity: 1 })
        .expect("sink");

    let stamped: Vec<Frame> = frames(6)
        .into_iter()
        .enumerate()
        .map(|(i, frame)| frame.with_index(i as u64))
        .collect();
    let (first, second) = stamped.split_at(3);

    let kept = sink
        .submit_batch(
            FrameBatch::new(first.to_vec()),
            &InclusionMask::new(vec![true, false, true]),
        )
        .expect("submit");
    assert_eq!(kept, 2);
    sink.submit(Vec::new()).expect("empty submit");
    sink.submit(second.to_vec()).expect("submit");

    let report = sink.stop().expect("stop");
    assert_eq!(report.frames_written, 5);
    assert_eq!(written.indices(), vec![0, 2, 3, 4, 5]);
    assert!(written.is_finished());

    // A second stop reports the same totals.
    assert_eq!(sink.stop().expect("second stop"), report);
}

#[test]
fn sink_rejects_mask_of_wrong_length() {
    let mut sink = FrameSink::start(|| Ok(CollectingEncoder::new()), SinkOptions::default())
        .expect("sink");
    let result = sink.submit_batch(FrameBatch::new(frames(3)), &InclusionMask::new(vec![true]));
    assert!(matches!(
        result,
        Err(StillcutError::MaskLengthMismatch {
            mask_len: 1,
            batch_len: 3
        })
    ));
}

#[test]
fn sink_write_error_is_reported_once_and_output_is_finalized() {
    let collecting = CollectingEncoder::new();
    let written = collecting.handle();
    let encoder = FailingEncoder {
        inner: collecting,
        fail_at: 2,
        written: 0,
    };
    let mut sink = FrameSink::start(move || Ok(encoder), SinkOptions::default()).expect("sink");

    // Submissions may succeed before the writer notices the failure.
    let _ = sink.submit(frames(4));
    let error = sink.stop();
    assert!(matches!(error, Err(StillcutError::VideoWriteError(_))));
    assert_eq!(written.frames().len(), 2);
    assert!(written.is_finished());

    let report = sink.stop().expect("later stop");
    assert_eq!(report.frames_written, 2);
}

#[test]
fn sink_open_error_is_returned_from_start() {
    let result = FrameSink::start(
        || -> Result<CollectingEncoder, StillcutError> {
            Err(StillcutError::VideoEncodeError("codec not found".to_string()))
        },
        SinkOptions::default(),
    );
    assert!(matches!(result, Err(StillcutError::VideoEncodeError(_))));
}
