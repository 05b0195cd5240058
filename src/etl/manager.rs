use std::sync::Arc;

use derive_builder::Builder;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bucket;
use crate::etl::{ETL, ETLError, ETLPipeline};

pub const DEFAULT_WORKER_NUM: usize = 4;

/// Configuration for ETL pipeline execution
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct Config {
    /// Maximum number of pipelines running at the same time
    #[builder(default = "DEFAULT_WORKER_NUM")]
    pub worker_num: usize,
}

impl Config {
    /// Creates a new Config; zero falls back to the default of 4.
    pub fn new(worker_num: usize) -> Self {
        Config { worker_num }.normalized()
    }

    pub fn normalized(&self) -> Self {
        Config {
            worker_num: if self.worker_num == 0 {
                DEFAULT_WORKER_NUM
            } else {
                self.worker_num
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            worker_num: DEFAULT_WORKER_NUM,
        }
    }
}

/// Type-erased pipeline the manager can schedule.
#[async_trait::async_trait]
pub trait ETLRunner: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, config: Arc<bucket::Config>, cancel: &CancellationToken) -> Result<(), ETLError>;
}

/// Runs registered pipelines concurrently, at most `worker_num` at a time.
pub struct ETLPipelineManager {
    etl_runners: Vec<Arc<dyn ETLRunner>>,
    cfg: Config,
    bucket_config: Arc<bucket::Config>,
}

impl ETLPipelineManager {
    /// `bucket_config` is used by every pipeline that has no config of its own.
    pub fn new(cfg: &Config, bucket_config: bucket::Config) -> Self {
        ETLPipelineManager {
            etl_runners: Vec::new(),
            cfg: cfg.normalized(),
            bucket_config: Arc::new(bucket_config),
        }
    }

    /// Registers a pipeline under `name`. Names are not checked for
    /// uniqueness; they only show up in logs and errors.
    pub fn add_pipeline<E, T>(&mut self, name: impl Into<String>, pipeline: Arc<dyn ETLPipeline<E, T>>)
    where
        E: Send + 'static,
        T: Send + 'static,
    {
        let adapter = ETLPipelineAdapter::new(pipeline, name, None);
        self.etl_runners.push(Arc::new(adapter));
    }

    /// Registers a pipeline that batches with its own `config` instead of
    /// the manager's default.
    pub fn add_pipeline_with_config<E, T>(
        &mut self,
        name: impl Into<String>,
        pipeline: Arc<dyn ETLPipeline<E, T>>,
        config: bucket::Config,
    ) where
        E: Send + 'static,
        T: Send + 'static,
    {
        let adapter = ETLPipelineAdapter::new(pipeline, name, Some(config));
        self.etl_runners.push(Arc::new(adapter));
    }

    /// Add an ETLRunner directly to the manager
    pub fn add_runner(&mut self, runner: Arc<dyn ETLRunner>) {
        self.etl_runners.push(runner);
    }

    pub fn len(&self) -> usize {
        self.etl_runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.etl_runners.is_empty()
    }

    pub fn pipeline_names(&self) -> Vec<&str> {
        self.etl_runners.iter().map(|runner| runner.name()).collect()
    }

    /// Runs every registered pipeline and waits for all of them.
    ///
    /// A failing pipeline does not stop the others. Once all are done, the
    /// first failure (in completion order) is returned, wrapped with the
    /// pipeline name.
    pub async fn run_all(&self, cancel: &CancellationToken) -> Result<(), ETLError> {
        if self.etl_runners.is_empty() {
            return Err(ETLError::NoPipelines);
        }

        let semaphore = Arc::new(Semaphore::new(self.cfg.worker_num));
        let mut tasks = JoinSet::new();

        for runner in &self.etl_runners {
            let runner = Arc::clone(runner);
            let config = Arc::clone(&self.bucket_config);
            let cancel = cancel.clone();
            let sem = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let result = Self::run_one(runner.as_ref(), sem, config, &cancel).await;
                result.map_err(|source| ETLError::Pipeline {
                    name: runner.name().to_string(),
                    source: Box::new(source),
                })
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined.unwrap_or_else(|e| Err(ETLError::Join(e))) {
                match first_error {
                    None => first_error = Some(err),
                    Some(_) => debug!(error = %err, "discarding later pipeline error"),
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn run_one(
        runner: &dyn ETLRunner,
        sem: Arc<Semaphore>,
        config: Arc<bucket::Config>,
        cancel: &CancellationToken,
    ) -> Result<(), ETLError> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ETLError::Cancelled),
            permit = sem.acquire_owned() => permit.map_err(|_| ETLError::Cancelled)?,
        };

        info!(pipeline = runner.name(), "pipeline started");
        let result = runner.run(config, cancel).await;
        match &result {
            Ok(()) => info!(pipeline = runner.name(), "pipeline finished"),
            Err(err) => error!(pipeline = runner.name(), error = %err, "pipeline failed"),
        }
        result
    }
}

/// Adapter to make ETLPipeline<E, T> work with ETLRunner trait
pub struct ETLPipelineAdapter<E, T> {
    etl: ETL<E, T>,
    name: String,
    config: Option<Arc<bucket::Config>>,
}

impl<E, T> ETLPipelineAdapter<E, T>
where
    E: Send + 'static,
    T: Send + 'static,
{
    pub fn new(
        pipeline: Arc<dyn ETLPipeline<E, T>>,
        name: impl Into<String>,
        config: Option<bucket::Config>,
    ) -> Self {
        ETLPipelineAdapter {
            etl: ETL::new(pipeline),
            name: name.into(),
            config: config.map(Arc::new),
        }
    }
}

#[async_trait::async_trait]
impl<E, T> ETLRunner for ETLPipelineAdapter<E, T>
where
    E: Send + 'static,
    T: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, config: Arc<bucket::Config>, cancel: &CancellationToken) -> Result<(), ETLError> {
        let config = self.config.clone().unwrap_or(config);
        self.etl.run(config, cancel).await
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
