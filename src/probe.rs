//! Stream metadata probing.
//!
//! [`MediaProbe`] reads the dimensions, frame rate, and frame count of a
//! file's video stream before any pipeline stage starts. Two back ends are
//! available: in-process through FFmpeg's demuxer
//! ([`probe`](MediaProbe::probe)), and the external `ffprobe` tool
//! ([`probe_with_ffprobe`](MediaProbe::probe_with_ffprobe)), which counts
//! packets and therefore gives an exact frame count for containers that do
//! not record one.

use std::path::Path;
use std::process::Command;

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::media::Type;

use crate::error::StillcutError;
use crate::metadata::{FrameRate, StreamMetadata};

/// Video stream metadata probe.
///
/// # Example
///
/// ```no_run
/// use stillcut::MediaProbe;
///
/// let metadata = MediaProbe::probe("input.mp4")?;
/// println!("{}x{} @ {} fps", metadata.width, metadata.height, metadata.frame_rate);
/// # Ok::<(), stillcut::StillcutError>(())
/// ```
pub struct MediaProbe;

impl MediaProbe {
    /// Probe the best video stream of `path` with FFmpeg.
    ///
    /// The frame count comes from the container when it records one and is
    /// otherwise estimated from the stream (or container) duration.
    ///
    /// # Errors
    ///
    /// - [`StillcutError::FileOpen`] if the file cannot be opened.
    /// - [`StillcutError::NoVideoStream`] if there is no video stream.
    /// - [`StillcutError::InvalidFrameRate`] if no usable rate is recorded.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<StreamMetadata, StillcutError> {
        let path = path.as_ref();
        log::debug!("Probing {}", path.display());

        ffmpeg_next::init().map_err(|error| StillcutError::FileOpen {
            path: path.to_path_buf(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| StillcutError::FileOpen {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(StillcutError::NoVideoStream)?;

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| {
                StillcutError::MetadataProbe(format!("cannot read video parameters: {error}"))
            })?;

        // Fallback: the stream's real base rate when no average is recorded.
        let frame_rate = FrameRate::from_rational(stream.avg_frame_rate())
            .or_else(|_| FrameRate::from_rational(stream.rate()))?;

        let frame_count = match stream.frames() {
            frames if frames > 0 => frames as u64,
            _ => {
                let time_base = stream.time_base();
                let seconds = if stream.duration() > 0 && time_base.denominator() != 0 {
                    stream.duration() as f64 * time_base.numerator() as f64
                        / time_base.denominator() as f64
                } else if input.duration() > 0 {
                    input.duration() as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)
                } else {
                    0.0
                };
                (seconds * frame_rate.as_f64()).round() as u64
            }
        };

        let mut metadata =
            StreamMetadata::new(frame_count, frame_rate, decoder.width(), decoder.height())?;
        if let Some(codec) = decoder.codec() {
            metadata = metadata.with_codec(codec.name());
        }

        log::info!(
            "Probed {}: {}x{} @ {} fps, {} frames",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.frame_rate,
            metadata.frame_count,
        );
        Ok(metadata)
    }

    /// Probe the first video stream of `path` by running `ffprobe`.
    ///
    /// Runs `ffprobe -v error -select_streams v:0 -count_packets
    /// -show_entries stream=nb_read_packets,r_frame_rate,width,height
    /// -of csv=p=0` and parses its output with [`parse_ffprobe_csv`].
    ///
    /// # Errors
    ///
    /// [`StillcutError::MetadataProbe`] if `ffprobe` cannot be run, exits
    /// with an error, or prints something unparseable.
    pub fn probe_with_ffprobe<P: AsRef<Path>>(path: P) -> Result<StreamMetadata, StillcutError> {
        let path = path.as_ref();
        log::debug!("Running ffprobe on {}", path.display());

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-count_packets",
                "-show_entries",
                "stream=nb_read_packets,r_frame_rate,width,height",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .output()
            .map_err(|error| StillcutError::MetadataProbe(format!("cannot run ffprobe: {error}")))?;

        if !output.status.success() {
            return Err(StillcutError::MetadataProbe(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_ffprobe_csv(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `ffprobe -of csv=p=0` output of the form
/// `width,height,rate,packet_count`.
///
/// Only the first non-empty line is read; extra trailing fields are ignored.
///
/// ```
/// let metadata = stillcut::parse_ffprobe_csv("1920,1080,30000/1001,900\n")?;
/// assert_eq!((metadata.width, metadata.height, metadata.frame_count), (1920, 1080, 900));
/// # Ok::<(), stillcut::StillcutError>(())
/// ```
pub fn parse_ffprobe_csv(text: &str) -> Result<StreamMetadata, StillcutError> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| StillcutError::MetadataProbe("ffprobe printed nothing".to_string()))?;

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let &[width, height, rate, count, ..] = fields.as_slice() else {
        return Err(StillcutError::MetadataProbe(format!(
            "expected width,height,rate,count but got '{line}'"
        )));
    };

    let number = |name: &str, value: &str| {
        value.parse::<u64>().map_err(|_| {
            StillcutError::MetadataProbe(format!("{name} '{value}' is not a number in '{line}'"))
        })
    };
    let width = u32::try_from(number("width", width)?)
        .map_err(|_| StillcutError::MetadataProbe(format!("width {width} out of range")))?;
    let height = u32::try_from(number("height", height)?)
        .map_err(|_| StillcutError::MetadataProbe(format!("height {height} out of range")))?;
    let frame_count = number("frame count", count)?;
    let frame_rate: FrameRate = rate.parse()?;

    StreamMetadata::new(frame_count, frame_rate, width, height)
}
