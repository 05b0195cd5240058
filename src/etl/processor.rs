use async_trait::async_trait;
use futures::StreamExt;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::types::ETLError;
use crate::bucket::{self, BoxError, Bucket, BucketError, Config};

/// One extraction result: an item, or the error that ends the stream.
pub type Payload<E> = Result<E, BoxError>;

/// Which side of a run failed first: the feeder or a batch load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailedStage {
    Extract,
    Load,
}

/// Defines an ETL (Extract-Transform-Load) pipeline.
///
/// # Type Parameters
///
/// * `E` - Type of items extracted from the source
/// * `T` - Type of items after transformation
///
/// # Lifecycle
///
/// 1. `pre_process()` - Setup before extraction
/// 2. `extract()` - Produce items from source
/// 3. `transform()` - Convert each extracted item
/// 4. `load()` - Persist batches of transformed items
/// 5. `post_process()` - Cleanup after processing
#[async_trait]
pub trait ETLPipeline<E, T>: Send + Sync {
    /// Pre-processing hook called before extraction starts.
    async fn pre_process(&self, _cancel: &CancellationToken) -> Result<(), BoxError> {
        Ok(())
    }

    /// Starts extraction and returns the stream of results.
    ///
    /// The stream ends when the sender is dropped. An `Err` payload ends it
    /// early and fails the run.
    async fn extract(&self, cancel: &CancellationToken) -> Result<Receiver<Payload<E>>, BoxError>;

    /// Transforms a single extracted item.
    ///
    /// Cannot fail. Pipelines with fallible conversions should transform
    /// into a `Result` and reject bad items in [`load`](Self::load).
    async fn transform(&self, cancel: &CancellationToken, item: E) -> T;

    /// Loads a batch of transformed items to the destination.
    ///
    /// Called once per batch after all transforms complete.
    async fn load(&self, cancel: &CancellationToken, items: Vec<T>) -> Result<(), BoxError>;

    /// Post-processing hook called after all items are loaded.
    async fn post_process(&self, _cancel: &CancellationToken) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Executor for ETL pipelines with concurrent batch processing.
///
/// Wraps an [`ETLPipeline`] implementation and runs it using a [`Bucket`]
/// for efficient batch processing.
pub struct ETL<E, T> {
    etl: Arc<dyn ETLPipeline<E, T>>,
}

impl<E, T> ETL<E, T>
where
    E: Send + 'static,
    T: Send + 'static,
{
    /// Creates a new ETL from a shared pipeline implementation.
    pub fn new(etl: Arc<dyn ETLPipeline<E, T>>) -> Self {
        ETL { etl }
    }

    /// Creates a new ETL from a boxed pipeline implementation.
    pub fn from_box(etl: Box<dyn ETLPipeline<E, T>>) -> Self {
        ETL {
            etl: Arc::from(etl),
        }
    }

    /// Runs setup, extraction, batched transform and load, then teardown.
    ///
    /// Returns the first failure, tagged with its stage. `post_process` only
    /// runs when everything before it succeeded and `cancel` did not fire.
    pub async fn run(&self, config: Arc<Config>, cancel: &CancellationToken) -> Result<(), ETLError> {
        self.etl
            .pre_process(cancel)
            .await
            .map_err(ETLError::PreProcess)?;

        let receiver = self.etl.extract(cancel).await.map_err(ETLError::Extract)?;

        let bucket = Bucket::new(config);
        let first_failure = Arc::new(OnceLock::new());
        let feed_cancel = cancel.child_token();
        let feeder = tokio::spawn(Self::feed(
            receiver,
            bucket.clone(),
            feed_cancel.clone(),
            Arc::clone(&first_failure),
        ));

        let loader = BatchLoader {
            etl: Arc::clone(&self.etl),
            concurrency: std::cmp::max(10, num_cpus::get() * 2),
            first_failure: Arc::clone(&first_failure),
        };
        let processed = bucket.run(cancel, loader).await.map_err(ETLError::Load);

        // Workers are gone; the feeder has nobody left to feed.
        feed_cancel.cancel();
        let fed = feeder.await?.map_err(ETLError::Extract);

        // An extraction error still lets queued items drain into `load`, so
        // both sides can fail. Report whichever failed first.
        if first_failure.get() == Some(&FailedStage::Extract) {
            fed?;
            processed?;
        } else {
            processed?;
            fed?;
        }

        if cancel.is_cancelled() {
            return Err(ETLError::Cancelled);
        }

        self.etl
            .post_process(cancel)
            .await
            .map_err(ETLError::PostProcess)
    }

    async fn feed(
        mut receiver: Receiver<Payload<E>>,
        bucket: Bucket<E>,
        cancel: CancellationToken,
        first_failure: Arc<OnceLock<FailedStage>>,
    ) -> Result<(), BoxError> {
        let mut outcome = Ok(());

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break;
                },
                payload = receiver.recv() => {
                    match payload {
                        Some(Ok(item)) => {
                            if let Err(err) = bucket.consume(&cancel, item).await {
                                debug!(error = %err, "feeder stopped");
                                break;
                            }
                        },
                        Some(Err(err)) => {
                            warn!(error = %err, "extraction failed");
                            let _ = first_failure.set(FailedStage::Extract);
                            outcome = Err(err);
                            break;
                        },
                        None => {
                            break;
                        },
                    }
                }
            }
        }

        // Signal bucket that no more items will be produced
        bucket.close();
        outcome
    }
}

/// Batch processor that transforms every item, then loads the batch.
struct BatchLoader<E, T> {
    etl: Arc<dyn ETLPipeline<E, T>>,
    /// Upper bound on in-flight transforms per batch.
    concurrency: usize,
    first_failure: Arc<OnceLock<FailedStage>>,
}

#[async_trait]
impl<E, T> bucket::Processor<E> for BatchLoader<E, T>
where
    E: Send + 'static,
    T: Send + 'static,
{
    async fn process(&self, cancel: &CancellationToken, items: Vec<E>) -> Result<(), BucketError> {
        let concurrency = items.len().min(self.concurrency).max(1);

        // `buffered` keeps the batch order intact.
        let etl = &self.etl;
        let transforms: Vec<T> = futures::stream::iter(items)
            .map(move |item| etl.transform(cancel, item))
            .buffered(concurrency)
            .collect()
            .await;

        self.etl.load(cancel, transforms).await.map_err(|err| {
            let _ = self.first_failure.set(FailedStage::Load);
            BucketError::ProcessorError(err)
        })
    }
}
