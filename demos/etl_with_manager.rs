//! Example demonstrating how to use ETLPipelineManager with multiple ETL pipelines
//!
//! This example shows how to:
//! 1. Create custom ETL pipelines with specific types
//! 2. Give one pipeline its own batching config
//! 3. Run several pipelines concurrently under a concurrency limit
//! 4. Mix ETLPipeline and ETLRunner implementations
//!
//! Run with: RUST_LOG=info cargo run --example etl_with_manager

use async_trait::async_trait;
use batch_etl::bucket::{self, BoxError};
use batch_etl::etl::manager::Config as ManagerConfig;
use batch_etl::etl::{ETLError, ETLPipeline, ETLPipelineManager, ETLRunner, Payload};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Pipeline 1: Processes integers to strings
struct NumberToStringPipeline {
    max_number: i32,
}

#[async_trait]
impl ETLPipeline<i32, String> for NumberToStringPipeline {
    async fn extract(
        &self,
        cancel: &CancellationToken,
    ) -> Result<mpsc::Receiver<Payload<i32>>, BoxError> {
        let (tx, rx) = mpsc::channel(100);
        let max = self.max_number;
        let cancel = cancel.clone();

        tokio::spawn(async move {
            for i in 1..=max {
                if cancel.is_cancelled() || tx.send(Ok(i)).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        Ok(rx)
    }

    async fn transform(&self, _cancel: &CancellationToken, item: i32) -> String {
        format!("Number: {} (squared: {})", item, item * item)
    }

    async fn load(&self, _cancel: &CancellationToken, items: Vec<String>) -> Result<(), BoxError> {
        info!(pipeline = "numbers", ?items, "loaded batch");
        Ok(())
    }

    async fn pre_process(&self, _cancel: &CancellationToken) -> Result<(), BoxError> {
        info!(pipeline = "numbers", "preparing destination");
        Ok(())
    }

    async fn post_process(&self, _cancel: &CancellationToken) -> Result<(), BoxError> {
        info!(pipeline = "numbers", "destination synced");
        Ok(())
    }
}

/// Pipeline 2: Processes strings to uppercase
struct StringToUpperPipeline {
    items: Vec<String>,
}

#[async_trait]
impl ETLPipeline<String, String> for StringToUpperPipeline {
    async fn extract(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<mpsc::Receiver<Payload<String>>, BoxError> {
        let (tx, rx) = mpsc::channel(50);
        let items = self.items.clone();

        tokio::spawn(async move {
            for item in items {
                if tx.send(Ok(item)).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(15)).await;
            }
        });

        Ok(rx)
    }

    async fn transform(&self, _cancel: &CancellationToken, item: String) -> String {
        item.to_uppercase()
    }

    async fn load(&self, _cancel: &CancellationToken, items: Vec<String>) -> Result<(), BoxError> {
        info!(pipeline = "strings", ?items, "loaded batch");
        Ok(())
    }
}

/// Pipeline 3: Parses raw rows; bad rows fail the batch in `load`
struct ParsingPipeline {
    rows: Vec<&'static str>,
}

#[async_trait]
impl ETLPipeline<&'static str, Result<f64, String>> for ParsingPipeline {
    async fn extract(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<mpsc::Receiver<Payload<&'static str>>, BoxError> {
        let (tx, rx) = mpsc::channel(10);
        let rows = self.rows.clone();

        tokio::spawn(async move {
            for row in rows {
                if tx.send(Ok(row)).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn transform(&self, _cancel: &CancellationToken, item: &'static str) -> Result<f64, String> {
        item.parse::<f64>().map_err(|e| format!("{item:?}: {e}"))
    }

    async fn load(
        &self,
        _cancel: &CancellationToken,
        items: Vec<Result<f64, String>>,
    ) -> Result<(), BoxError> {
        let values = items.into_iter().collect::<Result<Vec<f64>, String>>()?;
        info!(pipeline = "parsing", total = values.iter().sum::<f64>(), "loaded batch");
        Ok(())
    }
}

/// Custom ETLRunner that doesn't use ETLPipeline trait
struct CustomTaskRunner {
    task_count: usize,
}

#[async_trait]
impl ETLRunner for CustomTaskRunner {
    fn name(&self) -> &str {
        "custom_tasks"
    }

    async fn run(
        &self,
        config: Arc<bucket::Config>,
        cancel: &CancellationToken,
    ) -> Result<(), ETLError> {
        info!(batch_size = config.batch_size(), "running custom task");

        for i in 0..self.task_count {
            if cancel.is_cancelled() {
                return Err(ETLError::Cancelled);
            }
            info!(task = i + 1, of = self.task_count, "custom task step");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let manager_config = ManagerConfig::new(2);
    let bucket_config = bucket::ConfigBuilder::default()
        .batch_size(3usize)
        .timeout(Duration::from_millis(100))
        .build()?;

    let mut manager = ETLPipelineManager::new(&manager_config, bucket_config);

    manager.add_pipeline(
        "number_pipeline",
        Arc::new(NumberToStringPipeline { max_number: 10 }) as Arc<dyn ETLPipeline<i32, String>>,
    );
    manager.add_pipeline_with_config(
        "string_pipeline",
        Arc::new(StringToUpperPipeline {
            items: ["hello", "world", "rust", "etl"].map(String::from).to_vec(),
        }) as Arc<dyn ETLPipeline<String, String>>,
        bucket::Config::new(2, Duration::from_millis(20), 1),
    );
    manager.add_pipeline(
        "parsing_pipeline",
        Arc::new(ParsingPipeline {
            rows: vec!["1.5", "2.25", "oops", "4"],
        }) as Arc<dyn ETLPipeline<&'static str, Result<f64, String>>>,
    );
    manager.add_runner(Arc::new(CustomTaskRunner { task_count: 5 }));

    info!(pipelines = ?manager.pipeline_names(), "starting pipelines");

    let cancel = CancellationToken::new();

    // Set up graceful shutdown
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received");
        cancel_clone.cancel();
    });

    let start = std::time::Instant::now();
    match manager.run_all(&cancel).await {
        Ok(()) => {
            info!(elapsed = ?start.elapsed(), "all pipelines completed");
            Ok(())
        }
        Err(e) => {
            // The parsing pipeline is expected to end up here.
            tracing::error!(pipeline = e.pipeline(), error = %e, "run finished with an error");
            Err(e.into())
        }
    }
}
