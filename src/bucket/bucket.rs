use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::Config;
use super::processor::Processor;
use super::types::BucketError;

/// Bounded intake shared by a pool of batching workers.
///
/// Clones share the same intake, so one clone can feed items while another
/// drives [`Bucket::run`].
pub struct Bucket<T> {
    config: Arc<Config>,
    sender: Arc<StdMutex<Option<mpsc::Sender<T>>>>,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
    halt: CancellationToken,
}

impl<T> Clone for Bucket<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            halt: self.halt.clone(),
        }
    }
}

impl<T> Bucket<T>
where
    T: Send + 'static,
{
    pub fn new(config: Arc<Config>) -> Self {
        let config = Arc::new(config.normalized());
        let (sender, receiver) = mpsc::channel(config.batch_size);

        Self {
            config,
            sender: Arc::new(StdMutex::new(Some(sender))),
            receiver: Arc::new(Mutex::new(receiver)),
            halt: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Queues one item, waiting while the intake is full.
    ///
    /// Fails with [`BucketError::ChannelClosed`] once [`close`](Self::close)
    /// was called, and with [`BucketError::Cancelled`] if `cancel` fires or a
    /// worker failure halted the bucket while waiting for room.
    pub async fn consume(&self, cancel: &CancellationToken, item: T) -> Result<(), BucketError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sender) = sender else {
            return Err(BucketError::ChannelClosed);
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BucketError::Cancelled),
            _ = self.halt.cancelled() => Err(BucketError::Cancelled),
            sent = sender.send(item) => sent.map_err(|_| BucketError::ChannelClosed),
        }
    }

    /// Signals that no more items will arrive. Calling it again is a no-op.
    ///
    /// Items already queued are still delivered; workers exit once the intake
    /// is drained.
    pub fn close(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            debug!("bucket closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// True once a worker failure has stopped the bucket.
    pub fn is_halted(&self) -> bool {
        self.halt.is_cancelled()
    }

    /// Runs `worker_num` workers until the intake is closed and drained,
    /// `cancel` fires, or a processor call fails.
    ///
    /// The first worker error is returned; later ones are logged and dropped.
    /// External cancellation is not an error.
    pub async fn run<P>(&self, cancel: &CancellationToken, process: P) -> Result<(), BucketError>
    where
        P: Processor<T> + 'static,
    {
        let process = Arc::new(process);
        let mut workers = JoinSet::new();

        for worker_id in 0..self.config.worker_num {
            let receiver = self.receiver.clone();
            let process = process.clone();
            let cancel_token = cancel.clone();
            let halt_token = self.halt.clone();
            let batch_size = self.config.batch_size;
            let timeout = self.config.timeout;

            workers.spawn(async move {
                Self::worker(
                    worker_id,
                    receiver,
                    process,
                    &cancel_token,
                    &halt_token,
                    batch_size,
                    timeout,
                )
                .await
            });
        }

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(BucketError::Join(e)));
            if let Err(err) = result {
                self.halt.cancel();
                match first_error {
                    None => first_error = Some(err),
                    Some(_) => debug!(error = %err, "discarding later worker error"),
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn worker<P>(
        worker_id: usize,
        receiver: Arc<Mutex<mpsc::Receiver<T>>>,
        process: Arc<P>,
        cancel_token: &CancellationToken,
        halt_token: &CancellationToken,
        batch_size: usize,
        timeout_duration: Duration,
    ) -> Result<(), BucketError>
    where
        P: Processor<T>,
    {
        let mut queue: Vec<T> = Vec::with_capacity(batch_size);
        let mut ticker = interval_at(Instant::now() + timeout_duration, timeout_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    debug!(worker = worker_id, dropped = queue.len(), "worker cancelled");
                    return Ok(());
                }

                _ = halt_token.cancelled() => {
                    debug!(worker = worker_id, dropped = queue.len(), "worker halted by sibling failure");
                    return Ok(());
                }

                _ = ticker.tick() => {
                    if !queue.is_empty() {
                        debug!(worker = worker_id, batch_size = queue.len(), "timeout flush");
                        Self::flush(worker_id, &*process, cancel_token, halt_token, &mut queue, batch_size).await?;
                    }
                }

                item = Self::next_item(&receiver) => {
                    match item {
                        Some(item) => {
                            queue.push(item);

                            if queue.len() >= batch_size {
                                Self::flush(worker_id, &*process, cancel_token, halt_token, &mut queue, batch_size).await?;
                            }
                        }
                        None => {
                            debug!(worker = worker_id, remaining = queue.len(), "intake drained");
                            return Self::flush(worker_id, &*process, cancel_token, halt_token, &mut queue, batch_size).await;
                        }
                    }
                }
            }
        }
    }

    async fn next_item(receiver: &Mutex<mpsc::Receiver<T>>) -> Option<T> {
        let mut rx = receiver.lock().await;
        rx.recv().await
    }

    async fn flush<P>(
        worker_id: usize,
        process: &P,
        cancel_token: &CancellationToken,
        halt_token: &CancellationToken,
        queue: &mut Vec<T>,
        batch_size: usize,
    ) -> Result<(), BucketError>
    where
        P: Processor<T>,
    {
        if queue.is_empty() {
            return Ok(());
        }

        // The queue is reset before the call so a failed batch is never retried.
        let batch = std::mem::replace(queue, Vec::with_capacity(batch_size));
        let len = batch.len();

        process.process(cancel_token, batch).await.map_err(|err| {
            warn!(worker = worker_id, batch_size = len, error = %err, "batch processing failed");
            halt_token.cancel();
            BucketError::Worker {
                id: worker_id,
                source: Box::new(err),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    // Processor that collects items into a shared vector
    struct CollectingProcessor {
        items: Arc<Mutex<Vec<i32>>>,
    }

    #[async_trait]
    impl Processor<i32> for CollectingProcessor {
        async fn process(&self, _ctx: &CancellationToken, items: Vec<i32>) -> Result<(), BucketError> {
            self.items.lock().await.extend(items);
            Ok(())
        }
    }

    const ITEM_NUMS: usize = 100;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_process_full() {
        let config = Arc::new(Config::new(4, Duration::from_millis(100), 4));

        let bucket: Bucket<i32> = Bucket::new(config);
        let bucket_clone = bucket.clone();
        let cancel = CancellationToken::new();
        let feeder_cancel = cancel.clone();

        let result = Arc::new(Mutex::new(Vec::with_capacity(ITEM_NUMS)));
        let processor = CollectingProcessor {
            items: Arc::clone(&result),
        };

        tokio::spawn(async move {
            for i in 0..ITEM_NUMS {
                bucket_clone.consume(&feeder_cancel, i as i32).await.unwrap();
            }
            bucket_clone.close();
        });

        let run_result = bucket.run(&cancel, processor).await;
        assert!(run_result.is_ok());

        let mut items = result.lock().await;
        items.sort();
        assert_eq!(items.len(), ITEM_NUMS);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(*item, i as i32);
        }
    }

    #[test]
    fn test_new_normalizes_config() {
        let config = Arc::new(Config {
            batch_size: 0,
            timeout: Duration::ZERO,
            worker_num: 0,
        });

        let bucket: Bucket<i32> = Bucket::new(config);
        assert_eq!(bucket.config().batch_size(), 100);
        assert_eq!(bucket.config().timeout(), Duration::from_secs(5));
        assert_eq!(bucket.config().worker_num(), 1);
    }
}
