//! Background decoding into fixed-size batches.
//!
//! [`FrameSource`] owns a decode thread that reads frames, stamps them with
//! their source index, checks them against the stream metadata, and groups
//! them into [`FrameBatch`]es of `batch_size` frames. Batches wait in a
//! bounded queue; when it is full the decode thread blocks, so memory stays
//! bounded no matter how far decoding runs ahead of classification.
//!
//! The decoder is opened *on* the decode thread, so decoder types never need
//! to be [`Send`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::decode::FrameDecoder;
use crate::error::StillcutError;
use crate::frame::{Frame, FrameBatch};
use crate::metadata::StreamMetadata;
use crate::queue::{self, Pulled, QueueReceiver, QueueSender};

/// Result of one [`FrameSource::next_batch`] call.
#[derive(Debug)]
pub enum SourceItem {
    /// The next batch, in source order.
    Batch(FrameBatch),
    /// Nothing arrived within the pull timeout; ask again.
    TimedOut,
    /// Every frame has been delivered.
    EndOfStream,
}

/// Settings for a [`FrameSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOptions {
    /// Frames per batch.
    pub batch_size: usize,
    /// Batches buffered ahead of the consumer.
    pub queue_capacity: usize,
    /// Longest single wait in [`FrameSource::next_batch`].
    pub pull_timeout: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            queue_capacity: 1024,
            pull_timeout: Duration::from_secs(1),
        }
    }
}

enum Message {
    Batch(FrameBatch),
    Failed(StillcutError),
    End,
}

/// A running decode stage.
pub struct FrameSource {
    receiver: Option<QueueReceiver<Message>>,
    stop_requested: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    pull_timeout: Duration,
    finished: bool,
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("running", &self.worker.is_some())
            .field("finished", &self.finished)
            .field("pull_timeout", &self.pull_timeout)
            .finish()
    }
}

impl FrameSource {
    /// Spawn the decode thread and open the decoder on it.
    ///
    /// Returns once the decoder is open.
    ///
    /// # Errors
    ///
    /// - Whatever `opener` returns if the decoder cannot be opened.
    /// - [`StillcutError::InvalidParameter`] for a zero batch size or queue
    ///   capacity.
    pub fn start<D, F>(
        opener: F,
        metadata: StreamMetadata,
        options: SourceOptions,
    ) -> Result<Self, StillcutError>
    where
        D: FrameDecoder + 'static,
        F: FnOnce() -> Result<D, StillcutError> + Send + 'static,
    {
        if options.batch_size == 0 {
            return Err(StillcutError::invalid("batch_size", "must be at least 1"));
        }
        if options.queue_capacity == 0 {
            return Err(StillcutError::invalid("input_queue", "must be at least 1"));
        }

        let (sender, receiver) = queue::bounded(options.queue_capacity);
        let (opened_tx, opened_rx) = sync_channel::<Result<(), StillcutError>>(1);
        let stop_requested = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop_requested);
        let batch_size = options.batch_size;

        let worker = thread::Builder::new()
            .name("stillcut-source".to_string())
            .spawn(move || {
                let decoder = match opener() {
                    Ok(decoder) => {
                        let _ = opened_tx.send(Ok(()));
                        decoder
                    }
                    Err(error) => {
                        let _ = opened_tx.send(Err(error));
                        return;
                    }
                };
                produce(decoder, sender, &metadata, batch_size, &stop_flag);
            })?;

        match opened_rx.recv() {
            Ok(Ok(())) => {
                log::debug!(
                    "Source started (batch size {batch_size}, queue {})",
                    options.queue_capacity
                );
                Ok(Self {
                    receiver: Some(receiver),
                    stop_requested,
                    worker: Some(worker),
                    pull_timeout: options.pull_timeout,
                    finished: false,
                })
            }
            Ok(Err(error)) => {
                let _ = worker.join();
                Err(error)
            }
            Err(_) => {
                let _ = worker.join();
                Err(StillcutError::StageFailed {
                    stage: "source",
                    reason: "decode thread exited while opening the decoder".to_string(),
                })
            }
        }
    }

    /// Wait up to the pull timeout for the next batch.
    ///
    /// # Errors
    ///
    /// Returns the decode error that ended the stream, after every batch
    /// decoded before it has been delivered, or
    /// [`StillcutError::StageFailed`] if the decode thread died.
    pub fn next_batch(&mut self) -> Result<SourceItem, StillcutError> {
        if self.finished {
            return Ok(SourceItem::EndOfStream);
        }
        let Some(receiver) = &self.receiver else {
            return Ok(SourceItem::EndOfStream);
        };

        match receiver.pull_timeout(self.pull_timeout) {
            Pulled::Item(Message::Batch(batch)) => Ok(SourceItem::Batch(batch)),
            Pulled::Item(Message::End) => {
                self.finished = true;
                Ok(SourceItem::EndOfStream)
            }
            Pulled::Item(Message::Failed(error)) => {
                self.finished = true;
                Err(error)
            }
            Pulled::TimedOut => Ok(SourceItem::TimedOut),
            Pulled::Closed => {
                self.finished = true;
                Err(StillcutError::StageFailed {
                    stage: "source",
                    reason: "decode thread exited without signalling end of stream".to_string(),
                })
            }
        }
    }

    /// Stop decoding and release the decoder.
    ///
    /// Safe to call at any point and more than once.
    pub fn stop(&mut self) {
        self.stop_requested.store(true, Ordering::Release);
        // Disconnecting the queue wakes a producer blocked on a full queue.
        self.receiver.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Decode thread panicked");
            } else {
                log::debug!("Source stopped");
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn produce<D: FrameDecoder>(
    mut decoder: D,
    sender: QueueSender<Message>,
    metadata: &StreamMetadata,
    batch_size: usize,
    stop_requested: &AtomicBool,
) {
    let mut pending = Vec::with_capacity(batch_size);
    let mut next_index: u64 = 0;

    loop {
        if stop_requested.load(Ordering::Acquire) {
            log::debug!("Decode thread stopping after {next_index} frames");
            return;
        }

        match decoder.read_frame() {
            Ok(Some(frame)) => {
                let frame = frame.with_index(next_index);
                next_index += 1;
                if let Err(error) = frame.check_dimensions(metadata) {
                    flush_then(&sender, &mut pending, Message::Failed(error));
                    return;
                }
                pending.push(frame);
                if pending.len() == batch_size {
                    let batch = FrameBatch::new(std::mem::replace(
                        &mut pending,
                        Vec::with_capacity(batch_size),
                    ));
                    if sender.push(Message::Batch(batch)).is_err() {
                        return;
                    }
                }
            }
            Ok(None) => {
                log::debug!("Decoded {next_index} frames");
                flush_then(&sender, &mut pending, Message::End);
                return;
            }
            Err(error) => {
                log::warn!("Decoding stopped at frame {next_index}: {error}");
                flush_then(&sender, &mut pending, Message::Failed(error));
                return;
            }
        }
    }
}

/// Send any partial batch, then `last`. Gives up quietly once the consumer
/// has gone away.
fn flush_then(sender: &QueueSender<Message>, pending: &mut Vec<Frame>, last: Message) {
    if !pending.is_empty() {
        let batch = FrameBatch::new(std::mem::take(pending));
        if sender.push(Message::Batch(batch)).is_err() {
            return;
        }
    }
    let _ = sender.push(last);
}
