//! Typed frames, batches, and inclusion masks.
//!
//! A [`Frame`] is a tightly-packed 8-bit image tagged with its position in
//! the source stream. Its buffer length always matches
//! `width × height × channels`; the constructor refuses anything else, so
//! downstream stages never re-check shapes.

use ffmpeg_next::format::Pixel;

use crate::error::StillcutError;
use crate::metadata::StreamMetadata;

/// Pixel layout of a [`Frame`]'s data buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit RGB (24 bpp). This is the default.
    #[default]
    Rgb8,
    /// 8-bit RGBA (32 bpp). Alpha is ignored by the classifier.
    Rgba8,
    /// 8-bit grayscale (8 bpp).
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Map to the corresponding FFmpeg pixel format constant.
    pub(crate) fn to_ffmpeg_pixel(self) -> Pixel {
        match self {
            PixelFormat::Rgb8 => Pixel::RGB24,
            PixelFormat::Rgba8 => Pixel::RGBA,
            PixelFormat::Gray8 => Pixel::GRAY8,
        }
    }
}

/// A single decoded video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: u64,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a packed pixel buffer.
    ///
    /// The frame index starts at 0; the source stamps the real index on
    /// ingestion (see [`with_index`](Frame::with_index)).
    ///
    /// # Errors
    ///
    /// Returns [`StillcutError::InvalidParameter`] if either dimension is zero
    /// or `data` is not exactly `width × height × channels` bytes.
    pub fn new(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, StillcutError> {
        if width == 0 || height == 0 {
            return Err(StillcutError::invalid(
                "frame",
                format!("dimensions must be non-zero, got {width}x{height}"),
            ));
        }
        let expected = width as usize * height as usize * pixel_format.channels();
        if data.len() != expected {
            return Err(StillcutError::invalid(
                "frame",
                format!(
                    "{width}x{height} {pixel_format:?} needs {expected} bytes, got {}",
                    data.len()
                ),
            ));
        }
        Ok(Self {
            index: 0,
            width,
            height,
            pixel_format,
            data,
        })
    }

    /// A frame where every pixel has the same value in every channel.
    pub fn filled(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        value: u8,
    ) -> Result<Self, StillcutError> {
        let len = width as usize * height as usize * pixel_format.channels();
        Self::new(width, height, pixel_format, vec![value; len])
    }

    /// Set the source index.
    pub fn with_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }

    /// Position of the frame in the source stream.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Layout of [`data`](Frame::data).
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Packed pixel bytes, row-major, no padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Check the frame's dimensions against the stream it belongs to.
    pub fn check_dimensions(&self, metadata: &StreamMetadata) -> Result<(), StillcutError> {
        if self.width != metadata.width || self.height != metadata.height {
            return Err(StillcutError::FrameMismatch {
                index: self.index,
                expected_width: metadata.width,
                expected_height: metadata.height,
                got_width: self.width,
                got_height: self.height,
            });
        }
        Ok(())
    }

    /// BT.601 luminance (`0.299 R + 0.587 G + 0.114 B`), one value per pixel.
    pub fn luminance(&self) -> Vec<f32> {
        match self.pixel_format {
            PixelFormat::Gray8 => self.data.iter().map(|&v| v as f32).collect(),
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => self
                .data
                .chunks_exact(self.pixel_format.channels())
                .map(|px| 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32)
                .collect(),
        }
    }

    /// Pixel data converted to packed RGB24, borrowing when already RGB.
    pub(crate) fn rgb_bytes(&self) -> std::borrow::Cow<'_, [u8]> {
        match self.pixel_format {
            PixelFormat::Rgb8 => std::borrow::Cow::Borrowed(&self.data),
            PixelFormat::Rgba8 => std::borrow::Cow::Owned(
                self.data
                    .chunks_exact(4)
                    .flat_map(|px| [px[0], px[1], px[2]])
                    .collect(),
            ),
            PixelFormat::Gray8 => std::borrow::Cow::Owned(
                self.data.iter().flat_map(|&v| [v, v, v]).collect(),
            ),
        }
    }
}

/// Per-frame keep/drop decisions for one batch; `true` keeps the frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InclusionMask(Vec<bool>);

impl InclusionMask {
    /// Wrap a list of decisions.
    pub fn new(decisions: Vec<bool>) -> Self {
        Self(decisions)
    }

    /// A mask that keeps all `len` frames.
    pub fn keep_all(len: usize) -> Self {
        Self(vec![true; len])
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the mask has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of frames kept.
    pub fn kept(&self) -> usize {
        self.0.iter().filter(|&&keep| keep).count()
    }

    /// Number of frames dropped.
    pub fn dropped(&self) -> usize {
        self.len() - self.kept()
    }

    /// The decisions as a slice.
    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }
}

impl From<Vec<bool>> for InclusionMask {
    fn from(decisions: Vec<bool>) -> Self {
        Self(decisions)
    }
}

/// An ordered group of consecutive frames.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameBatch {
    frames: Vec<Frame>,
}

impl FrameBatch {
    /// Wrap frames that are already in source order.
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// `true` when the batch holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The frames, in order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Keep only the frames whose mask entry is `true`, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`StillcutError::MaskLengthMismatch`] unless the mask has
    /// exactly one entry per frame.
    pub fn filter(self, mask: &InclusionMask) -> Result<Vec<Frame>, StillcutError> {
        if mask.len() != self.frames.len() {
            return Err(StillcutError::MaskLengthMismatch {
                mask_len: mask.len(),
                batch_len: self.frames.len(),
            });
        }
        Ok(self
            .frames
            .into_iter()
            .zip(mask.as_slice())
            .filter_map(|(frame, &keep)| keep.then_some(frame))
            .collect())
    }
}

impl From<Vec<Frame>> for FrameBatch {
    fn from(frames: Vec<Frame>) -> Self {
        Self::new(frames)
    }
}
