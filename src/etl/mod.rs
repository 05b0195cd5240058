//! Extract-transform-load pipelines on top of [`crate::bucket`].
//!
//! - [`ETLPipeline`] is the five-step contract a concrete migration implements.
//! - [`ETL`] runs one pipeline through a fresh [`Bucket`](crate::bucket::Bucket).
//! - [`ETLPipelineManager`] runs many pipelines under a concurrency limit.

pub mod manager;
pub mod processor;
pub mod types;


pub use manager::{ETLPipelineAdapter, ETLPipelineManager, ETLRunner};
pub use processor::{ETL, ETLPipeline, Payload};
pub use types::ETLError;
