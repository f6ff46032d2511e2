//! Frame encoding.
//!
//! [`FrameEncoder`] is the seam between the pipeline and whatever persists
//! frames. [`FfmpegEncoder`] writes a single video stream into a container
//! whose format is inferred from the output file extension (MP4, MKV, AVI,
//! ...). Frames are converted from their packed layout to YUV420P with
//! swscale and timestamped at the stream's exact frame rate.
//!
//! # Example
//!
//! ```no_run
//! use stillcut::{EncoderSettings, FfmpegEncoder, Frame, FrameEncoder, FrameRate, PixelFormat};
//!
//! let settings = EncoderSettings::new(FrameRate::new(25, 1)?, 320, 240);
//! let mut encoder = FfmpegEncoder::create("out.mp4", &settings)?;
//! for shade in 0..50u8 {
//!     encoder.write_frame(&Frame::filled(320, 240, PixelFormat::Rgb8, shade * 5)?)?;
//! }
//! encoder.finish()?;
//! # Ok::<(), stillcut::StillcutError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::encoder::video::Encoder as VideoEncoder;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Packet, Rational};

use crate::conversion::buffer_to_frame;
use crate::error::StillcutError;
use crate::frame::Frame;
use crate::metadata::FrameRate;

/// A sink for frames, in output order.
pub trait FrameEncoder {
    /// Encode one frame.
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StillcutError>;

    /// Flush buffered data and finalize the output. Calling `finish` more
    /// than once has no further effect.
    fn finish(&mut self) -> Result<(), StillcutError>;
}

impl<E: FrameEncoder + ?Sized> FrameEncoder for Box<E> {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StillcutError> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<(), StillcutError> {
        (**self).finish()
    }
}

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    /// MPEG-4 Part 2. This is the default.
    #[default]
    Mpeg4,
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    H265,
}

impl VideoCodec {
    fn to_codec_id(self) -> Id {
        match self {
            VideoCodec::Mpeg4 => Id::MPEG4,
            VideoCodec::H264 => Id::H264,
            VideoCodec::H265 => Id::HEVC,
        }
    }
}

impl Display for VideoCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VideoCodec::Mpeg4 => write!(f, "mpeg4"),
            VideoCodec::H264 => write!(f, "h264"),
            VideoCodec::H265 => write!(f, "h265"),
        }
    }
}

impl FromStr for VideoCodec {
    type Err = StillcutError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "mpeg4" | "mp4v" => Ok(VideoCodec::Mpeg4),
            "h264" | "avc" => Ok(VideoCodec::H264),
            "h265" | "hevc" => Ok(VideoCodec::H265),
            other => Err(StillcutError::invalid(
                "codec",
                format!("unknown codec '{other}' (expected mpeg4, h264 or h265)"),
            )),
        }
    }
}

/// Parameters of the output stream.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    /// Output codec.
    pub codec: VideoCodec,
    /// Exact output frame rate.
    pub frame_rate: FrameRate,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl EncoderSettings {
    /// Settings for the default codec.
    pub fn new(frame_rate: FrameRate, width: u32, height: u32) -> Self {
        Self {
            codec: VideoCodec::default(),
            frame_rate,
            width,
            height,
        }
    }

    /// Set the codec.
    #[must_use]
    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }
}

const TARGET_PIXEL: Pixel = Pixel::YUV420P;

/// Encodes frames into a video file with FFmpeg.
pub struct FfmpegEncoder {
    path: PathBuf,
    output: Output,
    encoder: VideoEncoder,
    scaler: ScalingContext,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    width: u32,
    height: u32,
    next_pts: i64,
    finished: bool,
}

impl FfmpegEncoder {
    /// Create the output file, open the encoder, and write the container
    /// header. The container format is inferred from the file extension.
    ///
    /// # Errors
    ///
    /// - [`StillcutError::VideoWriteError`] if the file or stream cannot be
    ///   set up.
    /// - [`StillcutError::VideoEncodeError`] if the codec is unavailable or
    ///   cannot be opened.
    pub fn create<P: AsRef<Path>>(
        path: P,
        settings: &EncoderSettings,
    ) -> Result<Self, StillcutError> {
        let path = path.as_ref().to_path_buf();
        let (width, height) = (settings.width, settings.height);
        log::info!(
            "Writing {} ({width}x{height}, codec={}, fps={})",
            path.display(),
            settings.codec,
            settings.frame_rate,
        );

        ffmpeg_next::init().map_err(|e| {
            StillcutError::VideoWriteError(format!("FFmpeg initialisation failed: {e}"))
        })?;

        let codec_id = settings.codec.to_codec_id();
        let encoder_time_base = settings.frame_rate.time_base();

        let mut output = ffmpeg_next::format::output(&path)
            .map_err(|e| StillcutError::VideoWriteError(format!("cannot open output: {e}")))?;

        // Read before add_stream borrows the context mutably.
        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let encoder_codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            StillcutError::VideoEncodeError(format!("codec {codec_id:?} not available"))
        })?;

        let (stream_index, encoder) = {
            let mut stream = output
                .add_stream(encoder_codec)
                .map_err(|e| StillcutError::VideoWriteError(format!("cannot add stream: {e}")))?;

            let mut encoder = CodecContext::from_parameters(stream.parameters())
                .and_then(|context| context.encoder().video())
                .map_err(|e| {
                    StillcutError::VideoEncodeError(format!("cannot create codec context: {e}"))
                })?;

            encoder.set_width(width);
            encoder.set_height(height);
            encoder.set_format(TARGET_PIXEL);
            encoder.set_time_base(encoder_time_base);
            encoder.set_frame_rate(Some(settings.frame_rate.to_rational()));

            if needs_global_header {
                unsafe {
                    (*encoder.as_mut_ptr()).flags |=
                        ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
                }
            }

            let opened = encoder.open_as(encoder_codec).map_err(|e| {
                StillcutError::VideoEncodeError(format!("cannot open encoder: {e}"))
            })?;

            stream.set_time_base(encoder_time_base);
            stream.set_parameters(&opened);
            (stream.index(), opened)
        };

        output
            .write_header()
            .map_err(|e| StillcutError::VideoWriteError(format!("cannot write header: {e}")))?;

        // The muxer may have replaced the time base while writing the header.
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| StillcutError::VideoWriteError("output stream vanished".to_string()))?;

        let scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            TARGET_PIXEL,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|e| StillcutError::VideoWriteError(format!("cannot create scaler: {e}")))?;

        Ok(Self {
            path,
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width,
            height,
            next_pts: 0,
            finished: false,
        })
    }

    /// Move every packet the encoder has ready into the container.
    fn drain_packets(&mut self) -> Result<(), StillcutError> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| StillcutError::VideoWriteError(format!("write packet failed: {e}")))?;
        }
        Ok(())
    }
}

impl FrameEncoder for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StillcutError> {
        if self.finished {
            return Err(StillcutError::VideoWriteError(format!(
                "{} is already finalized",
                self.path.display()
            )));
        }
        if frame.width() != self.width || frame.height() != self.height {
            return Err(StillcutError::FrameMismatch {
                index: frame.index(),
                expected_width: self.width,
                expected_height: self.height,
                got_width: frame.width(),
                got_height: frame.height(),
            });
        }

        let mut source = VideoFrame::new(Pixel::RGB24, self.width, self.height);
        buffer_to_frame(&frame.rgb_bytes(), &mut source, self.width, self.height, 3);

        let mut scaled = VideoFrame::empty();
        self.scaler
            .run(&source, &mut scaled)
            .map_err(|e| StillcutError::VideoWriteError(format!("scaling failed: {e}")))?;

        scaled.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&scaled)
            .map_err(|e| StillcutError::VideoEncodeError(format!("send_frame failed: {e}")))?;
        self.drain_packets()
    }

    fn finish(&mut self) -> Result<(), StillcutError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let flushed = self
            .encoder
            .send_eof()
            .map_err(|e| StillcutError::VideoEncodeError(format!("send_eof failed: {e}")))
            .and_then(|()| self.drain_packets());

        let output = &mut self.output;
        finalize(flushed, || {
            output
                .write_trailer()
                .map_err(|e| StillcutError::VideoWriteError(format!("cannot write trailer: {e}")))
        })?;

        log::info!("Wrote {} frames to {}", self.next_pts, self.path.display());
        Ok(())
    }
}

/// Write the trailer even when flushing failed, so the container stays
/// readable. The flush error wins when both steps fail.
fn finalize(
    flushed: Result<(), StillcutError>,
    write_trailer: impl FnOnce() -> Result<(), StillcutError>,
) -> Result<(), StillcutError> {
    let trailer = write_trailer();
    match (flushed, trailer) {
        (Err(flush_error), Err(trailer_error)) => {
            log::warn!("Trailer not written after failed flush: {trailer_error}");
            Err(flush_error)
        }
        (Err(error), Ok(())) | (Ok(()), Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}
