//! Bounded blocking queue with explicit wait limits.
//!
//! A thin layer over [`std::sync::mpsc::sync_channel`]: a full queue blocks
//! [`QueueSender::push`] (backpressure), and [`QueueReceiver::pull_timeout`]
//! distinguishes "nothing arrived in time" from "the other side hung up".

use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::time::Duration;

/// Result of a bounded wait on a [`QueueReceiver`].
#[derive(Debug)]
pub(crate) enum Pulled<T> {
    /// An item arrived.
    Item(T),
    /// The wait limit elapsed with the queue still empty.
    TimedOut,
    /// Every sender is gone and the queue is drained.
    Closed,
}

/// Producer half of a bounded queue.
#[derive(Debug)]
pub(crate) struct QueueSender<T> {
    inner: SyncSender<T>,
}

/// Consumer half of a bounded queue.
#[derive(Debug)]
pub(crate) struct QueueReceiver<T> {
    inner: Receiver<T>,
}

/// Create a queue holding at most `capacity` items (minimum 1).
pub(crate) fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (sender, receiver) = sync_channel(capacity.max(1));
    (
        QueueSender { inner: sender },
        QueueReceiver { inner: receiver },
    )
}

impl<T> QueueSender<T> {
    /// Enqueue `item`, blocking while the queue is full.
    ///
    /// Hands the item back if the receiver has been dropped.
    pub(crate) fn push(&self, item: T) -> Result<(), T> {
        self.inner.send(item).map_err(|error| error.0)
    }
}

impl<T> QueueReceiver<T> {
    /// Wait up to `timeout` for the next item.
    pub(crate) fn pull_timeout(&self, timeout: Duration) -> Pulled<T> {
        match self.inner.recv_timeout(timeout) {
            Ok(item) => Pulled::Item(item),
            Err(RecvTimeoutError::Timeout) => Pulled::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Pulled::Closed,
        }
    }

    /// Wait without limit for the next item; `None` once closed and drained.
    pub(crate) fn pull(&self) -> Option<T> {
        self.inner.recv().ok()
    }
}
