//! Error types for the `stillcut` crate.
//!
//! [`StillcutError`] is the single error type returned by every fallible
//! operation. Variants follow the pipeline's failure taxonomy:
//!
//! - **configuration** errors are raised before any stage starts
//!   ([`InvalidParameter`](StillcutError::InvalidParameter),
//!   [`FileOpen`](StillcutError::FileOpen), probing failures);
//! - **fatal stream** errors end a running pipeline
//!   ([`VideoDecodeError`](StillcutError::VideoDecodeError),
//!   [`VideoWriteError`](StillcutError::VideoWriteError), ...);
//! - **logic** errors flag broken invariants
//!   ([`MaskLengthMismatch`](StillcutError::MaskLengthMismatch),
//!   [`InvariantViolation`](StillcutError::InvariantViolation)).
//!
//! A queue wait that times out is not an error; see
//! [`SourceItem::TimedOut`](crate::SourceItem::TimedOut).

use std::{io::Error as IoError, path::PathBuf};

use thiserror::Error;

/// The unified error type for all `stillcut` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StillcutError {
    /// The media file could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to the probe or decoder.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// Stream metadata could not be determined or parsed.
    #[error("Failed to probe stream metadata: {0}")]
    MetadataProbe(String),

    /// A frame rate string or value was not a positive rational number.
    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(String),

    /// A tuning or pipeline parameter is out of range.
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// The encoder could not be created or rejected a frame.
    #[error("Video encoding error: {0}")]
    VideoEncodeError(String),

    /// Writing the output container failed.
    #[error("Video write error: {0}")]
    VideoWriteError(String),

    /// A frame does not match the stream it claims to belong to.
    #[error(
        "Frame {index} is {got_width}x{got_height} but the stream is {expected_width}x{expected_height}"
    )]
    FrameMismatch {
        /// Source index of the offending frame.
        index: u64,
        /// Width announced by the stream metadata.
        expected_width: u32,
        /// Height announced by the stream metadata.
        expected_height: u32,
        /// Width of the frame that was received.
        got_width: u32,
        /// Height of the frame that was received.
        got_height: u32,
    },

    /// An inclusion mask does not have one entry per frame.
    #[error("Inclusion mask has {mask_len} entries but the batch has {batch_len} frames")]
    MaskLengthMismatch {
        /// Number of mask entries.
        mask_len: usize,
        /// Number of frames in the batch.
        batch_len: usize,
    },

    /// An internal invariant was broken; the output would be corrupt.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// A background stage terminated without reporting a result.
    #[error("Pipeline stage `{stage}` failed: {reason}")]
    StageFailed {
        /// Which stage died (`"source"` or `"sink"`).
        stage: &'static str,
        /// What is known about the failure.
        reason: String,
    },

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),
}

impl StillcutError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        StillcutError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
