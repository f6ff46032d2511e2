//! Compute device selection.
//!
//! Blurring and block scoring are data-parallel across the frames of a
//! batch. [`ComputeDevice`] says where that work runs; it is resolved once
//! into an [`Executor`] that the classifier owns for its whole lifetime, so
//! no global device state exists.

use rayon::ThreadPool;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::error::StillcutError;

/// Where per-frame analysis work is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    /// Run everything on the calling thread.
    Serial,
    /// Run on a dedicated rayon thread pool.
    Parallel {
        /// Worker count; `None` lets rayon pick (one per logical CPU).
        threads: Option<usize>,
    },
}

impl Default for ComputeDevice {
    fn default() -> Self {
        ComputeDevice::Parallel { threads: None }
    }
}

impl ComputeDevice {
    /// A parallel device with `threads` workers; `0` means "let rayon pick".
    pub fn with_threads(threads: usize) -> Self {
        ComputeDevice::Parallel {
            threads: (threads > 0).then_some(threads),
        }
    }
}

/// A resolved [`ComputeDevice`].
pub(crate) struct Executor {
    pool: Option<ThreadPool>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field(
                "threads",
                &self.pool.as_ref().map(ThreadPool::current_num_threads),
            )
            .finish()
    }
}

impl Executor {
    pub(crate) fn new(device: ComputeDevice) -> Result<Self, StillcutError> {
        let pool = match device {
            ComputeDevice::Serial => None,
            ComputeDevice::Parallel { threads } => {
                let mut builder = rayon::ThreadPoolBuilder::new()
                    .thread_name(|index| format!("stillcut-compute-{index}"));
                if let Some(threads) = threads {
                    builder = builder.num_threads(threads);
                }
                let pool = builder.build().map_err(|error| {
                    StillcutError::invalid("threads", format!("cannot build thread pool: {error}"))
                })?;
                log::debug!("Compute pool ready with {} threads", pool.current_num_threads());
                Some(pool)
            }
        };
        Ok(Self { pool })
    }

    /// Apply `operation` to every item, returning results in input order.
    pub(crate) fn map<T, R, F>(&self, items: &[T], operation: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(|| items.par_iter().map(operation).collect()),
            None => items.iter().map(operation).collect(),
        }
    }
}
