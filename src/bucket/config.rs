// src/bucket/config.rs

use derive_builder::Builder;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WORKER_NUM: usize = 1;

/// Batching configuration for a [`Bucket`](super::Bucket).
///
/// Zero values are never used as-is: [`Config::new`] and `Bucket::new` both
/// replace them with the defaults (100 items, 5 seconds, 1 worker).
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(setter(into))]
pub struct Config {
    /// Maximum number of items in a batch before processing
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    pub(crate) batch_size: usize,

    /// Interval at which a worker flushes whatever it has buffered
    #[builder(default = "DEFAULT_TIMEOUT")]
    pub(crate) timeout: Duration,

    /// Number of concurrent worker tasks
    #[builder(default = "DEFAULT_WORKER_NUM")]
    pub(crate) worker_num: usize,
}

impl Config {
    pub fn new(batch_size: usize, timeout: Duration, worker_num: usize) -> Self {
        Config {
            batch_size,
            timeout,
            worker_num,
        }
        .normalized()
    }

    /// Returns a copy with every zero field replaced by its default.
    pub fn normalized(&self) -> Self {
        Config {
            batch_size: if self.batch_size == 0 {
                DEFAULT_BATCH_SIZE
            } else {
                self.batch_size
            },
            timeout: if self.timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                self.timeout
            },
            worker_num: if self.worker_num == 0 {
                DEFAULT_WORKER_NUM
            } else {
                self.worker_num
            },
        }
    }

    /// Returns the batch size for processing
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the flush interval for partial batches
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the number of worker tasks
    #[inline]
    pub fn worker_num(&self) -> usize {
        self.worker_num
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT,
            worker_num: DEFAULT_WORKER_NUM,
        }
    }
}
