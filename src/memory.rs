//! In-memory decoder and encoder.
//!
//! [`VecDecoder`] replays a list of frames and [`CollectingEncoder`] stores
//! whatever it is given. Together they run the full pipeline on synthetic
//! streams without touching the file system.
//!
//! # Example
//!
//! ```
//! use stillcut::{CollectingEncoder, Frame, FrameDecoder, FrameEncoder, PixelFormat, VecDecoder};
//!
//! let frames = vec![Frame::filled(4, 4, PixelFormat::Gray8, 0)?; 3];
//! let mut decoder = VecDecoder::new(frames);
//! let mut encoder = CollectingEncoder::new();
//! let written = encoder.handle();
//!
//! while let Some(frame) = decoder.read_frame()? {
//!     encoder.write_frame(&frame)?;
//! }
//! encoder.finish()?;
//! assert_eq!(written.frames().len(), 3);
//! assert!(written.is_finished());
//! # Ok::<(), stillcut::StillcutError>(())
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::decode::FrameDecoder;
use crate::encode::FrameEncoder;
use crate::error::StillcutError;
use crate::frame::Frame;

/// Yields a fixed list of frames, then end of stream.
#[derive(Debug, Clone, Default)]
pub struct VecDecoder {
    frames: VecDeque<Frame>,
}

impl VecDecoder {
    /// Replay `frames` in order.
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// Frames not yet read.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameDecoder for VecDecoder {
    fn read_frame(&mut self) -> Result<Option<Frame>, StillcutError> {
        Ok(self.frames.pop_front())
    }
}

#[derive(Debug, Default)]
struct Collected {
    frames: Vec<Frame>,
    finished: bool,
}

/// Shared view of what a [`CollectingEncoder`] has received.
///
/// Stays valid after the encoder has moved to another thread.
#[derive(Debug, Clone, Default)]
pub struct CollectedFrames {
    inner: Arc<Mutex<Collected>>,
}

impl CollectedFrames {
    fn lock(&self) -> MutexGuard<'_, Collected> {
        // A panicking writer leaves the data intact; keep reading it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of every frame written so far, in order.
    pub fn frames(&self) -> Vec<Frame> {
        self.lock().frames.clone()
    }

    /// Source indices of the frames written so far.
    pub fn indices(&self) -> Vec<u64> {
        self.lock().frames.iter().map(Frame::index).collect()
    }

    /// Whether [`FrameEncoder::finish`] has been called.
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }
}

/// Stores every frame it is given.
#[derive(Debug, Default)]
pub struct CollectingEncoder {
    collected: CollectedFrames,
}

impl CollectingEncoder {
    /// An empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle for inspecting the written frames.
    pub fn handle(&self) -> CollectedFrames {
        self.collected.clone()
    }
}

impl FrameEncoder for CollectingEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StillcutError> {
        let mut collected = self.collected.lock();
        if collected.finished {
            return Err(StillcutError::VideoWriteError(
                "encoder is already finalized".to_string(),
            ));
        }
        collected.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StillcutError> {
        self.collected.lock().finished = true;
        Ok(())
    }
}
