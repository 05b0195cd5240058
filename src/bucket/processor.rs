// src/bucket/processor.rs

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::types::BucketError;

/// Handles one flushed batch.
///
/// The batch is handed over by value and is never redelivered, whether the
/// call succeeds or fails.
#[async_trait]
pub trait Processor<T>: Send + Sync {
    async fn process(&self, cancel: &CancellationToken, items: Vec<T>) -> Result<(), BucketError>;
}

#[async_trait]
impl<T, F, Fut> Processor<T> for F
where
    F: Fn(&CancellationToken, Vec<T>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), BucketError>> + Send + 'static,
    T: Send + 'static,
{
    async fn process(&self, ctx: &CancellationToken, items: Vec<T>) -> Result<(), BucketError> {
        self(ctx, items).await
    }
}
