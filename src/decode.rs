//! Frame decoding.
//!
//! [`FrameDecoder`] is the seam between the pipeline and whatever produces
//! frames. [`FfmpegDecoder`] is the production implementation: it demuxes
//! the best video stream of a file, decodes it, and converts every picture to
//! a packed pixel format with swscale. Other streams (audio, subtitles) are
//! skipped.

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Error as FfmpegError, Packet,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::context::Input,
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};

use crate::conversion::frame_to_buffer;
use crate::error::StillcutError;
use crate::frame::{Frame, PixelFormat};

/// A pull-based source of decoded frames, in presentation order.
pub trait FrameDecoder {
    /// Decode the next frame. `Ok(None)` marks the end of the stream.
    ///
    /// An error is terminal; callers must not call `read_frame` again.
    fn read_frame(&mut self) -> Result<Option<Frame>, StillcutError>;
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn read_frame(&mut self) -> Result<Option<Frame>, StillcutError> {
        (**self).read_frame()
    }
}

/// Decodes the best video stream of a media file with FFmpeg.
pub struct FfmpegDecoder {
    path: PathBuf,
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    stream_index: usize,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    decoded_frame: VideoFrame,
    scaled_frame: VideoFrame,
    frames_decoded: u64,
    eof_sent: bool,
    done: bool,
}

impl FfmpegDecoder {
    /// Open `path` and decode to packed RGB24.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StillcutError> {
        Self::open_with_format(path, PixelFormat::Rgb8)
    }

    /// Open `path` and decode to `pixel_format`.
    ///
    /// # Errors
    ///
    /// - [`StillcutError::FileOpen`] if the file cannot be opened.
    /// - [`StillcutError::NoVideoStream`] if it has no video stream.
    /// - [`StillcutError::VideoDecodeError`] if no decoder can be set up.
    pub fn open_with_format<P: AsRef<Path>>(
        path: P,
        pixel_format: PixelFormat,
    ) -> Result<Self, StillcutError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening decoder for {}", path.display());

        ffmpeg_next::init().map_err(|error| StillcutError::FileOpen {
            path: path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| StillcutError::FileOpen {
            path: path.clone(),
            reason: error.to_string(),
        })?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(StillcutError::NoVideoStream)?;
        let stream_index = stream.index();

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| {
                StillcutError::VideoDecodeError(format!("cannot open video decoder: {error}"))
            })?;

        let (width, height) = (decoder.width(), decoder.height());
        let scaler = ScalingContext::get(
            decoder.format(),
            width,
            height,
            pixel_format.to_ffmpeg_pixel(),
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| {
            StillcutError::VideoDecodeError(format!("cannot create scaler: {error}"))
        })?;

        log::info!(
            "Decoding {} ({width}x{height}, stream {stream_index})",
            path.display()
        );

        Ok(Self {
            path,
            input,
            decoder,
            scaler,
            stream_index,
            pixel_format,
            width,
            height,
            decoded_frame: VideoFrame::empty(),
            scaled_frame: VideoFrame::empty(),
            frames_decoded: 0,
            eof_sent: false,
            done: false,
        })
    }

    /// Scale and copy the current decoded picture into a [`Frame`].
    fn convert_current_frame(&mut self) -> Result<Frame, StillcutError> {
        if self.decoded_frame.width() != self.width || self.decoded_frame.height() != self.height {
            return Err(StillcutError::FrameMismatch {
                index: self.frames_decoded,
                expected_width: self.width,
                expected_height: self.height,
                got_width: self.decoded_frame.width(),
                got_height: self.decoded_frame.height(),
            });
        }

        self.scaler
            .run(&self.decoded_frame, &mut self.scaled_frame)
            .map_err(|error| StillcutError::VideoDecodeError(format!("scaling failed: {error}")))?;

        let buffer = frame_to_buffer(
            &self.scaled_frame,
            self.width,
            self.height,
            self.pixel_format.channels(),
        );
        let frame = Frame::new(self.width, self.height, self.pixel_format, buffer)?
            .with_index(self.frames_decoded);
        self.frames_decoded += 1;
        Ok(frame)
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn read_frame(&mut self) -> Result<Option<Frame>, StillcutError> {
        if self.done {
            return Ok(None);
        }

        loop {
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                return match self.convert_current_frame() {
                    Ok(frame) => Ok(Some(frame)),
                    Err(error) => {
                        self.done = true;
                        Err(error)
                    }
                };
            }

            if self.eof_sent {
                log::debug!(
                    "Decoder drained after {} frames from {}",
                    self.frames_decoded,
                    self.path.display()
                );
                self.done = true;
                return Ok(None);
            }

            let mut packet = Packet::empty();
            let result = match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => {
                    self.decoder.send_packet(&packet)
                }
                Ok(()) => Ok(()),
                Err(FfmpegError::Eof) => {
                    self.eof_sent = true;
                    self.decoder.send_eof()
                }
                Err(error) => Err(error),
            };

            if let Err(error) = result {
                self.done = true;
                return Err(StillcutError::VideoDecodeError(format!(
                    "after frame {} of {}: {error}",
                    self.frames_decoded,
                    self.path.display()
                )));
            }
        }
    }
}
