//! # batch-etl
//!
//! A concurrent ETL (Extract-Transform-Load) engine built on Tokio.
//!
//! ## Features
//!
//! - **Concurrent batch processing** with configurable workers
//! - **Backpressure handling** via a bounded intake
//! - **Size and time flush triggers** per worker
//! - **Graceful cancellation** through shared cancellation tokens
//! - **Pipeline manager** that runs many pipelines under a concurrency limit
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_etl::bucket::{Bucket, BucketError, Config};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), BucketError> {
//! let config = Arc::new(Config::new(100, Duration::from_secs(5), 4));
//! let bucket: Bucket<i32> = Bucket::new(config);
//! let cancel = CancellationToken::new();
//!
//! let feeder = bucket.clone();
//! let feed_cancel = cancel.clone();
//! tokio::spawn(async move {
//!     for i in 0..1_000 {
//!         if feeder.consume(&feed_cancel, i).await.is_err() {
//!             break;
//!         }
//!     }
//!     feeder.close();
//! });
//!
//! bucket
//!     .run(&cancel, |_ctx: &CancellationToken, items: Vec<i32>| async move {
//!         println!("got {} items", items.len());
//!         Ok::<(), BucketError>(())
//!     })
//!     .await
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`bucket`] - Generic batching and concurrent processing
//! - [`etl`] - ETL pipeline abstraction and the multi-pipeline manager

pub mod bucket;
pub mod etl;
