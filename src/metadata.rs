//! Stream metadata types.
//!
//! [`StreamMetadata`] is derived once from the input before any stage
//! starts (see [`MediaProbe`](crate::MediaProbe)) and is immutable for the
//! lifetime of a pipeline. Frame rates are kept as exact rationals so that
//! NTSC rates such as `30000/1001` survive the trip to the encoder unchanged.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use ffmpeg_next::Rational;

use crate::error::StillcutError;

/// An exact, strictly positive frame rate.
///
/// # Example
///
/// ```
/// use stillcut::FrameRate;
///
/// let ntsc: FrameRate = "30000/1001".parse().unwrap();
/// assert!((ntsc.as_f64() - 29.97).abs() < 0.01);
///
/// let pal: FrameRate = "25".parse().unwrap();
/// assert_eq!(pal, FrameRate::new(25, 1).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    numerator: u32,
    denominator: u32,
}

impl FrameRate {
    /// Create a frame rate of `numerator / denominator` frames per second.
    ///
    /// # Errors
    ///
    /// Returns [`StillcutError::InvalidFrameRate`] if either part is zero
    /// or does not fit the signed 32-bit rationals FFmpeg uses.
    pub fn new(numerator: u32, denominator: u32) -> Result<Self, StillcutError> {
        let limit = i32::MAX as u32;
        if numerator == 0 || denominator == 0 || numerator > limit || denominator > limit {
            return Err(StillcutError::InvalidFrameRate(format!(
                "{numerator}/{denominator}"
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Convert an FFmpeg rational, rejecting zero or negative rates.
    pub fn from_rational(rational: Rational) -> Result<Self, StillcutError> {
        let numerator = u32::try_from(rational.numerator()).map_err(|_| {
            StillcutError::InvalidFrameRate(format!("{rational}"))
        })?;
        let denominator = u32::try_from(rational.denominator()).map_err(|_| {
            StillcutError::InvalidFrameRate(format!("{rational}"))
        })?;
        Self::new(numerator, denominator)
    }

    /// Numerator of the rate.
    pub fn numerator(self) -> u32 {
        self.numerator
    }

    /// Denominator of the rate.
    pub fn denominator(self) -> u32 {
        self.denominator
    }

    /// Frames per second as a float.
    pub fn as_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Duration of a single frame, in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        self.denominator as f64 / self.numerator as f64
    }

    /// Duration of `frames` frames, in seconds.
    pub fn frames_to_seconds(self, frames: usize) -> f64 {
        frames as f64 * self.denominator as f64 / self.numerator as f64
    }

    /// The rate as an FFmpeg rational (frames per second).
    pub fn to_rational(self) -> Rational {
        // Both parts are bounded by i32::MAX in `new`.
        Rational::new(self.numerator as i32, self.denominator as i32)
    }

    /// The per-frame time base (`1 / rate`) as an FFmpeg rational.
    pub fn time_base(self) -> Rational {
        Rational::new(self.denominator as i32, self.numerator as i32)
    }
}

impl Display for FrameRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

impl FromStr for FrameRate {
    type Err = StillcutError;

    /// Accepts `"num/den"`, integers (`"25"`), and decimals (`"29.97"`,
    /// converted with millisecond-level precision).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let invalid = || StillcutError::InvalidFrameRate(trimmed.to_string());

        if let Some((numerator, denominator)) = trimmed.split_once('/') {
            let numerator = numerator.trim().parse::<u32>().map_err(|_| invalid())?;
            let denominator = denominator.trim().parse::<u32>().map_err(|_| invalid())?;
            return Self::new(numerator, denominator);
        }

        if let Ok(whole) = trimmed.parse::<u32>() {
            return Self::new(whole, 1);
        }

        let decimal = trimmed.parse::<f64>().map_err(|_| invalid())?;
        if !decimal.is_finite() || decimal <= 0.0 || decimal > i32::MAX as f64 / 1000.0 {
            return Err(invalid());
        }
        Self::new((decimal * 1000.0).round() as u32, 1000)
    }
}

/// Metadata for the video stream being filtered.
///
/// # Example
///
/// ```no_run
/// use stillcut::MediaProbe;
///
/// let metadata = MediaProbe::probe("input.mp4")?;
/// println!(
///     "{}x{} @ {} fps, {} frames",
///     metadata.width, metadata.height, metadata.frame_rate, metadata.frame_count,
/// );
/// # Ok::<(), stillcut::StillcutError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct StreamMetadata {
    /// Number of frames in the stream (exact when the container records it,
    /// otherwise estimated from the duration). Zero when unknown.
    pub frame_count: u64,
    /// Exact frame rate.
    pub frame_rate: FrameRate,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Codec name (e.g. `"h264"`), when known.
    pub codec: Option<String>,
}

impl StreamMetadata {
    /// Build metadata for a stream, validating the dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`StillcutError::MetadataProbe`] if either dimension is zero.
    pub fn new(
        frame_count: u64,
        frame_rate: FrameRate,
        width: u32,
        height: u32,
    ) -> Result<Self, StillcutError> {
        if width == 0 || height == 0 {
            return Err(StillcutError::MetadataProbe(format!(
                "stream reports invalid dimensions {width}x{height}"
            )));
        }
        Ok(Self {
            frame_count,
            frame_rate,
            width,
            height,
            codec: None,
        })
    }

    /// Attach a codec name.
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    /// Nominal duration of the whole stream in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frame_rate.frames_to_seconds(self.frame_count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rational_rates() {
        let rate: FrameRate = "30000/1001".parse().unwrap();
        assert_eq!(rate.numerator(), 30000);
        assert_eq!(rate.denominator(), 1001);
        assert_eq!(rate.to_string(), "30000/1001");
    }

    #[test]
    fn parses_decimal_rates() {
        let rate: FrameRate = "29.97".parse().unwrap();
        assert_eq!(rate, FrameRate::new(29970, 1000).unwrap());
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!("0/1".parse::<FrameRate>().is_err());
        assert!("30/0".parse::<FrameRate>().is_err());
        assert!("fast".parse::<FrameRate>().is_err());
        assert!("-5".parse::<FrameRate>().is_err());
    }

    #[test]
    fn rejects_rates_beyond_signed_rationals() {
        assert!(FrameRate::new(u32::MAX, 1).is_err());
        assert!(FrameRate::new(25, i32::MAX as u32 + 1).is_err());
        assert!("3000000000/1".parse::<FrameRate>().is_err());
        assert!("3000000.5".parse::<FrameRate>().is_err());

        let largest = FrameRate::new(i32::MAX as u32, 1).unwrap();
        assert_eq!(largest.to_rational().numerator(), i32::MAX);
        assert_eq!(largest.time_base().denominator(), i32::MAX);
    }

    #[test]
    fn frames_to_seconds_is_exact_for_integer_rates() {
        let rate = FrameRate::new(10, 1).unwrap();
        assert_eq!(rate.frames_to_seconds(5), 0.5);
    }

    #[test]
    fn metadata_rejects_empty_dimensions() {
        let rate = FrameRate::new(25, 1).unwrap();
        assert!(StreamMetadata::new(10, rate, 0, 480).is_err());
        assert!(StreamMetadata::new(10, rate, 640, 480).is_ok());
    }
}
