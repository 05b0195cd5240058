//! Generic batching with concurrent workers.
//!
//! A [`Bucket`] owns a bounded intake. Items go in through
//! [`Bucket::consume`]; [`Bucket::run`] fans them out to `worker_num`
//! workers that each build their own batches and flush them on size, on a
//! fixed ticker, or when the intake is closed and drained.

pub mod bucket;
pub mod config;
pub mod processor;
pub mod types;


pub use bucket::Bucket;
pub use config::{Config, ConfigBuilder, ConfigBuilderError};
pub use processor::Processor;
pub use types::{BoxError, BucketError};
