//! # stillcut
//!
//! Remove static frames from videos.
//!
//! `stillcut` decodes a video, decides which frames are visually redundant
//! with the frame before them, and re-encodes only the frames that change,
//! producing a shorter video plus duration statistics. Decoding, analysis,
//! and encoding overlap through bounded queues, powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stillcut::{ClassifierOptions, Pipeline, PipelineOptions};
//!
//! let pipeline = Pipeline::new("screencast.mp4", "screencast-cut.mp4", PipelineOptions::new())?;
//! let report = pipeline.run(&ClassifierOptions::default())?;
//!
//! println!("Original duration: {:.2} seconds", report.total_duration);
//! println!("Skipped duration: {:.2} seconds", report.skipped_duration);
//! println!("Processed duration: {:.2} seconds", report.kept_duration);
//! # Ok::<(), stillcut::StillcutError>(())
//! ```
//!
//! ## How frames are classified
//!
//! Each frame is converted to luminance and blurred with a Gaussian kernel
//! (computed in the frequency domain) to suppress noise. The blurred frame is
//! split into square blocks and compared with its predecessor using the sum
//! of absolute differences per block. A frame is kept if a single block
//! changed a lot (`hi_threshold`) or enough blocks changed a little
//! (`lo_threshold` and `frac_threshold`). See [`ClassifierOptions`].
//!
//! ## Custom decoders and encoders
//!
//! [`run_pipeline`] accepts any [`FrameDecoder`] and [`FrameEncoder`];
//! [`VecDecoder`] and [`CollectingEncoder`] run everything in memory.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

mod blur;
pub mod classifier;
pub mod config;
mod conversion;
pub mod decode;
pub mod device;
pub mod encode;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod memory;
pub mod metadata;
pub mod pipeline;
pub mod probe;
pub mod progress;
mod queue;
pub mod sink;
pub mod source;

pub use blur::{FrequencyBlur, GaussianKernel};
pub use classifier::{BatchClassifier, ClassifiedBatch, ProcessingState};
pub use config::{ClassifierOptions, PipelineOptions, SeamPolicy};
pub use decode::{FfmpegDecoder, FrameDecoder};
pub use device::ComputeDevice;
pub use encode::{EncoderSettings, FfmpegEncoder, FrameEncoder, VideoCodec};
pub use error::StillcutError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use frame::{Frame, FrameBatch, InclusionMask, PixelFormat};
pub use memory::{CollectedFrames, CollectingEncoder, VecDecoder};
pub use metadata::{FrameRate, StreamMetadata};
pub use pipeline::{Pipeline, PipelineReport, run_pipeline};
pub use probe::{MediaProbe, parse_ffprobe_csv};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use sink::{FrameSink, SinkOptions, SinkReport};
pub use source::{FrameSource, SourceItem, SourceOptions};
