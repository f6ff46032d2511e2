//! Background encoding of filtered frames.
//!
//! [`FrameSink`] owns a writer thread that encodes submitted frames strictly
//! in submission order. Submissions wait in a bounded queue, so a slow
//! encoder pushes back on the classifier instead of growing memory. The
//! encoder is opened on the writer thread and is always finalized there,
//! even after a write error, so that whatever was written stays playable.

use std::sync::mpsc::sync_channel;
use std::thread::{self, JoinHandle};

use crate::encode::FrameEncoder;
use crate::error::StillcutError;
use crate::frame::{Frame, FrameBatch, InclusionMask};
use crate::queue::{self, QueueReceiver, QueueSender};

/// Settings for a [`FrameSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct SinkOptions {
    /// Frame groups buffered ahead of the writer.
    pub queue_capacity: usize,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// What a [`FrameSink`] wrote before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkReport {
    /// Frames handed to the encoder successfully.
    pub frames_written: u64,
}

enum Message {
    Frames(Vec<Frame>),
    Stop,
}

struct WriterOutcome {
    frames_written: u64,
    error: Option<StillcutError>,
}

/// A running encode stage.
pub struct FrameSink {
    sender: Option<QueueSender<Message>>,
    worker: Option<JoinHandle<WriterOutcome>>,
    report: Option<SinkReport>,
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("running", &self.worker.is_some())
            .field("report", &self.report)
            .finish()
    }
}

impl FrameSink {
    /// Spawn the writer thread and open the encoder on it.
    ///
    /// Returns once the encoder is open.
    ///
    /// # Errors
    ///
    /// - Whatever `opener` returns if the encoder cannot be opened.
    /// - [`StillcutError::InvalidParameter`] for a zero queue capacity.
    pub fn start<E, F>(opener: F, options: SinkOptions) -> Result<Self, StillcutError>
    where
        E: FrameEncoder + 'static,
        F: FnOnce() -> Result<E, StillcutError> + Send + 'static,
    {
        if options.queue_capacity == 0 {
            return Err(StillcutError::invalid("output_queue", "must be at least 1"));
        }

        let (sender, receiver) = queue::bounded(options.queue_capacity);
        let (opened_tx, opened_rx) = sync_channel::<Result<(), StillcutError>>(1);

        let worker = thread::Builder::new()
            .name("stillcut-sink".to_string())
            .spawn(move || {
                let encoder = match opener() {
                    Ok(encoder) => {
                        let _ = opened_tx.send(Ok(()));
                        encoder
                    }
                    Err(error) => {
                        let _ = opened_tx.send(Err(error));
                        return WriterOutcome {
                            frames_written: 0,
                            error: None,
                        };
                    }
                };
                write_all(encoder, receiver)
            })?;

        match opened_rx.recv() {
            Ok(Ok(())) => {
                log::debug!("Sink started (queue {})", options.queue_capacity);
                Ok(Self {
                    sender: Some(sender),
                    worker: Some(worker),
                    report: None,
                })
            }
            Ok(Err(error)) => {
                let _ = worker.join();
                Err(error)
            }
            Err(_) => {
                let _ = worker.join();
                Err(StillcutError::StageFailed {
                    stage: "sink",
                    reason: "writer thread exited while opening the encoder".to_string(),
                })
            }
        }
    }

    /// Queue an ordered group of frames for writing, blocking while the
    /// queue is full. Empty groups are ignored.
    ///
    /// # Errors
    ///
    /// Returns the encoder error if the writer has already failed, or
    /// [`StillcutError::StageFailed`] if the sink is stopped.
    pub fn submit(&mut self, frames: Vec<Frame>) -> Result<(), StillcutError> {
        if frames.is_empty() {
            return Ok(());
        }
        let Some(sender) = &self.sender else {
            return Err(StillcutError::StageFailed {
                stage: "sink",
                reason: "sink is already stopped".to_string(),
            });
        };
        if sender.push(Message::Frames(frames)).is_ok() {
            return Ok(());
        }

        // The writer hung up, which it only does after a failure.
        self.sender.take();
        self.join_writer().map(|_| ())
    }

    /// Filter `batch` through `mask` and queue the kept frames.
    ///
    /// Returns how many frames were queued.
    pub fn submit_batch(
        &mut self,
        batch: FrameBatch,
        mask: &InclusionMask,
    ) -> Result<usize, StillcutError> {
        let frames = batch.filter(mask)?;
        let kept = frames.len();
        self.submit(frames)?;
        Ok(kept)
    }

    /// Write everything still queued, finalize the encoder, and join the
    /// writer thread.
    ///
    /// Calling `stop` again returns the same report. A write or finalize
    /// error is returned once, by the first call that observes it.
    pub fn stop(&mut self) -> Result<SinkReport, StillcutError> {
        if let Some(sender) = self.sender.take() {
            // Fails only if the writer is already gone; joining tells why.
            let _ = sender.push(Message::Stop);
        }
        self.join_writer()
    }

    fn join_writer(&mut self) -> Result<SinkReport, StillcutError> {
        let Some(worker) = self.worker.take() else {
            return Ok(self.report.unwrap_or_default());
        };

        let outcome = worker.join().map_err(|_| StillcutError::StageFailed {
            stage: "sink",
            reason: "writer thread panicked".to_string(),
        });
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => {
                self.report = Some(SinkReport::default());
                return Err(error);
            }
        };

        let report = SinkReport {
            frames_written: outcome.frames_written,
        };
        self.report = Some(report);
        log::debug!("Sink stopped after {} frames", report.frames_written);
        match outcome.error {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            log::warn!("Sink dropped with error: {error}");
        }
    }
}

fn write_all<E: FrameEncoder>(mut encoder: E, receiver: QueueReceiver<Message>) -> WriterOutcome {
    let mut frames_written: u64 = 0;
    let mut error = None;

    'receive: while let Some(message) = receiver.pull() {
        match message {
            Message::Frames(frames) => {
                for frame in &frames {
                    if let Err(write_error) = encoder.write_frame(frame) {
                        log::warn!("Writing frame {} failed: {write_error}", frame.index());
                        error = Some(write_error);
                        break 'receive;
                    }
                    frames_written += 1;
                }
            }
            Message::Stop => break,
        }
    }
    // Unblock any submitter before the possibly slow finalize.
    drop(receiver);

    if let Err(finish_error) = encoder.finish() {
        match &error {
            None => error = Some(finish_error),
            Some(_) => log::warn!("Finalizing after a write error also failed: {finish_error}"),
        }
    }

    WriterOutcome {
        frames_written,
        error,
    }
}
