//! The static-frame removal pipeline.
//!
//! Three activities run concurrently:
//!
//! ```text
//!  decode thread          calling thread                 writer thread
//! ┌─────────────┐ Q_in  ┌──────────────────────┐ Q_out  ┌─────────────┐
//! │ FrameSource │ ────▶ │ classify ▸ filter ▸  │ ─────▶ │  FrameSink  │
//! └─────────────┘       │ submit ▸ progress    │        └─────────────┘
//!                       └──────────────────────┘
//! ```
//!
//! Both queues are bounded, so a slow encoder stalls classification and a
//! slow classifier stalls decoding. Batches are classified strictly in
//! source order, one at a time.

use std::path::{Path, PathBuf};

use crate::classifier::{BatchClassifier, ClassifiedBatch, ProcessingState};
use crate::config::{ClassifierOptions, PipelineOptions};
use crate::decode::{FfmpegDecoder, FrameDecoder};
use crate::encode::{EncoderSettings, FfmpegEncoder, FrameEncoder};
use crate::error::StillcutError;
use crate::metadata::StreamMetadata;
use crate::probe::MediaProbe;
use crate::progress::ProgressTracker;
use crate::sink::{FrameSink, SinkOptions};
use crate::source::{FrameSource, SourceItem, SourceOptions};

/// Totals of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PipelineReport {
    /// Seconds of input footage.
    pub total_duration: f64,
    /// Seconds dropped as static.
    pub skipped_duration: f64,
    /// Seconds written, `total_duration - skipped_duration`.
    pub kept_duration: f64,
    /// Frames decoded and classified.
    pub frames_read: u64,
    /// Frames written to the output.
    pub frames_written: u64,
}

/// Removes static frames from one file, writing the result to another.
///
/// # Example
///
/// ```no_run
/// use stillcut::{ClassifierOptions, Pipeline, PipelineOptions};
///
/// let pipeline = Pipeline::new("lecture.mp4", "lecture-cut.mp4", PipelineOptions::new())?;
/// let report = pipeline.run(&ClassifierOptions::default())?;
/// println!("Skipped {:.2}s of {:.2}s", report.skipped_duration, report.total_duration);
/// # Ok::<(), stillcut::StillcutError>(())
/// ```
#[derive(Debug)]
pub struct Pipeline {
    input: PathBuf,
    output: PathBuf,
    metadata: StreamMetadata,
    options: PipelineOptions,
}

impl Pipeline {
    /// Probe `input` with FFmpeg and prepare a run.
    ///
    /// # Errors
    ///
    /// Any probing error, or [`StillcutError::InvalidParameter`] for invalid
    /// options.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        input: P,
        output: Q,
        options: PipelineOptions,
    ) -> Result<Self, StillcutError> {
        options.validate()?;
        let metadata = MediaProbe::probe(input.as_ref())?;
        Ok(Self::from_metadata(input, output, metadata, options))
    }

    /// Prepare a run with metadata obtained elsewhere (for example from
    /// [`MediaProbe::probe_with_ffprobe`]).
    pub fn from_metadata<P: AsRef<Path>, Q: AsRef<Path>>(
        input: P,
        output: Q,
        metadata: StreamMetadata,
        options: PipelineOptions,
    ) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            metadata,
            options,
        }
    }

    /// Metadata of the input stream.
    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    /// Decode, classify, and re-encode.
    ///
    /// On error, everything written before the failure is finalized and
    /// kept.
    pub fn run(
        &self,
        classifier_options: &ClassifierOptions,
    ) -> Result<PipelineReport, StillcutError> {
        let input = self.input.clone();
        let output = self.output.clone();
        let settings = EncoderSettings::new(
            self.metadata.frame_rate,
            self.metadata.width,
            self.metadata.height,
        )
        .with_codec(self.options.codec);

        run_pipeline(
            &self.metadata,
            move || FfmpegDecoder::open(input),
            move || FfmpegEncoder::create(output, &settings),
            classifier_options,
            &self.options,
        )
    }
}

/// Run the pipeline over any decoder and encoder.
///
/// `open_decoder` and `open_encoder` run on the decode and writer threads
/// respectively. Options are validated and the classifier is built before
/// either is called.
///
/// # Example
///
/// ```
/// use stillcut::{
///     ClassifierOptions, CollectingEncoder, Frame, FrameRate, PipelineOptions, PixelFormat,
///     StreamMetadata, VecDecoder, run_pipeline,
/// };
///
/// let metadata = StreamMetadata::new(4, FrameRate::new(2, 1)?, 16, 16)?;
/// let frames = vec![Frame::filled(16, 16, PixelFormat::Rgb8, 40)?; 4];
/// let encoder = CollectingEncoder::new();
/// let written = encoder.handle();
///
/// let report = run_pipeline(
///     &metadata,
///     move || Ok(VecDecoder::new(frames)),
///     move || Ok(encoder),
///     &ClassifierOptions::default(),
///     &PipelineOptions::new(),
/// )?;
/// assert_eq!(report.total_duration, 2.0);
/// assert_eq!(written.indices(), vec![0]);
/// # Ok::<(), stillcut::StillcutError>(())
/// ```
pub fn run_pipeline<D, E, OD, OE>(
    metadata: &StreamMetadata,
    open_decoder: OD,
    open_encoder: OE,
    classifier_options: &ClassifierOptions,
    options: &PipelineOptions,
) -> Result<PipelineReport, StillcutError>
where
    D: FrameDecoder + 'static,
    E: FrameEncoder + 'static,
    OD: FnOnce() -> Result<D, StillcutError> + Send + 'static,
    OE: FnOnce() -> Result<E, StillcutError> + Send + 'static,
{
    options.validate()?;
    let classifier = BatchClassifier::new(classifier_options.clone(), metadata, options.device)?;

    let mut source = FrameSource::start(
        open_decoder,
        metadata.clone(),
        SourceOptions {
            batch_size: options.batch_size,
            queue_capacity: options.input_queue,
            pull_timeout: options.pull_timeout,
        },
    )?;
    let mut sink = match FrameSink::start(
        open_encoder,
        SinkOptions {
            queue_capacity: options.output_queue,
        },
    ) {
        Ok(sink) => sink,
        Err(error) => {
            source.stop();
            return Err(error);
        }
    };

    match drive(&classifier, &mut source, &mut sink, metadata, options) {
        Ok(state) => {
            source.stop();
            let sink_report = sink.stop()?;
            let report = PipelineReport {
                total_duration: state.total_duration(),
                skipped_duration: state.skipped_duration(),
                kept_duration: state.kept_duration(),
                frames_read: state.frames_seen(),
                frames_written: sink_report.frames_written,
            };
            log::info!(
                "Done: {} of {} frames kept, {:.2}s of {:.2}s skipped",
                report.frames_written,
                report.frames_read,
                report.skipped_duration,
                report.total_duration,
            );
            Ok(report)
        }
        Err(error) => {
            log::warn!("Pipeline aborted: {error}");
            source.stop();
            if let Err(sink_error) = sink.stop() {
                log::warn!("Finalizing output after abort failed: {sink_error}");
            }
            Err(error)
        }
    }
}

fn drive(
    classifier: &BatchClassifier,
    source: &mut FrameSource,
    sink: &mut FrameSink,
    metadata: &StreamMetadata,
    options: &PipelineOptions,
) -> Result<ProcessingState, StillcutError> {
    let mut state = ProcessingState::new();
    let mut tracker = ProgressTracker::new(
        options.progress.clone(),
        Some(metadata.frame_count),
        options.progress_interval,
    );

    loop {
        if options.is_cancelled() {
            return Err(StillcutError::Cancelled);
        }

        let batch = match source.next_batch()? {
            SourceItem::Batch(batch) => batch,
            SourceItem::TimedOut => {
                log::debug!("No batch within {:?}, waiting", options.pull_timeout);
                continue;
            }
            SourceItem::EndOfStream => break,
        };

        let ClassifiedBatch {
            state: next,
            mask,
            batch,
        } = classifier.classify(batch, state, metadata.frame_rate)?;
        state = next;

        let frames = batch.len() as u64;
        let kept = sink.submit_batch(batch, &mask)?;
        tracker.advance(frames, kept as u64, state.skipped_duration());
    }

    tracker.finish();
    Ok(state)
}
