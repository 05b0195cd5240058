//! Simple bucket example showing concurrent batch processing.
//!
//! Run with: cargo run --example simple_bucket

use async_trait::async_trait;
use batch_etl::bucket::{Bucket, BucketError, ConfigBuilder, Processor};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Simple processor that logs batch information
struct PrintingProcessor;

#[async_trait]
impl Processor<i32> for PrintingProcessor {
    async fn process(&self, _ctx: &CancellationToken, items: Vec<i32>) -> Result<(), BucketError> {
        info!(size = items.len(), ?items, "processing batch");
        // Simulate some work
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Arc::new(
        ConfigBuilder::default()
            .batch_size(10usize)
            .timeout(Duration::from_secs(1))
            .worker_num(2usize)
            .build()?,
    );

    let bucket: Bucket<i32> = Bucket::new(config);
    let bucket_clone = bucket.clone();
    let cancel = CancellationToken::new();

    info!(batch_size = 10, workers = 2, items = 50, "starting bucket processor");

    // Producer: send items
    let cancel_clone = cancel.clone();
    let producer = tokio::spawn(async move {
        for i in 0..50 {
            if let Err(e) = bucket_clone.consume(&cancel_clone, i).await {
                tracing::warn!(item = i, error = %e, "failed to consume item");
                break;
            }
        }
        bucket_clone.close();
    });

    // Consumer: process batches
    let processor = bucket.run(&cancel, PrintingProcessor);

    let (prod_result, proc_result) = tokio::join!(producer, processor);

    prod_result?;
    proc_result?;

    info!("bucket processing completed");
    Ok(())
}
