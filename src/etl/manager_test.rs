use super::*;
use crate::bucket::BoxError;
use crate::etl::Payload;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

// Helper function to create test config
fn test_config(worker_num: usize) -> Config {
    Config { worker_num }
}

// Helper function to create test bucket config
fn test_bucket_config() -> bucket::Config {
    bucket::ConfigBuilder::default()
        .batch_size(2usize)
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap()
}

#[derive(Default)]
struct Probe {
    loaded: AtomicUsize,
    post_called: AtomicBool,
    active: AtomicUsize,
    peak: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

struct CountingPipeline {
    items: i32,
    fail_load: bool,
    hold: Duration,
    probe: Arc<Probe>,
}

impl CountingPipeline {
    fn new(items: i32) -> (Arc<Self>, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let pipeline = CountingPipeline {
            items,
            fail_load: false,
            hold: Duration::ZERO,
            probe: Arc::clone(&probe),
        };
        (Arc::new(pipeline), probe)
    }

    fn failing(items: i32) -> (Arc<Self>, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let pipeline = CountingPipeline {
            items,
            fail_load: true,
            hold: Duration::ZERO,
            probe: Arc::clone(&probe),
        };
        (Arc::new(pipeline), probe)
    }

    fn holding(items: i32, hold: Duration, probe: Arc<Probe>) -> Arc<Self> {
        Arc::new(CountingPipeline {
            items,
            fail_load: false,
            hold,
            probe,
        })
    }
}

#[async_trait::async_trait]
impl ETLPipeline<i32, i64> for CountingPipeline {
    async fn pre_process(&self, _cancel: &CancellationToken) -> Result<(), BoxError> {
        let now = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        Ok(())
    }

    async fn extract(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<mpsc::Receiver<Payload<i32>>, BoxError> {
        let (tx, rx) = mpsc::channel(10);
        let count = self.items;

        tokio::spawn(async move {
            for i in 0..count {
                if tx.send(Ok(i)).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn transform(&self, _cancel: &CancellationToken, item: i32) -> i64 {
        i64::from(item) * 10
    }

    async fn load(&self, _cancel: &CancellationToken, items: Vec<i64>) -> Result<(), BoxError> {
        if self.fail_load {
            return Err("load exploded".into());
        }
        self.probe.loaded.fetch_add(items.len(), Ordering::SeqCst);
        self.probe.batch_sizes.lock().await.push(items.len());
        Ok(())
    }

    async fn post_process(&self, _cancel: &CancellationToken) -> Result<(), BoxError> {
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
        self.probe.post_called.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_config_creation() {
    let config = test_config(4);
    assert_eq!(config.worker_num, 4);

    let config2 = Config::new(5);
    assert_eq!(config2.worker_num, 5);

    let config3 = Config::default();
    assert_eq!(config3.worker_num, 4);

    assert_eq!(Config::new(0).worker_num, 4);
    assert_eq!(ConfigBuilder::default().build().unwrap(), Config::default());
}

#[test]
fn test_manager_creation() {
    let config = test_config(2);
    let bucket_config = test_bucket_config();
    let manager = ETLPipelineManager::new(&config, bucket_config);

    assert_eq!(manager.etl_runners.len(), 0);
    assert!(manager.is_empty());
}

#[test]
fn test_manager_normalizes_worker_num() {
    let manager = ETLPipelineManager::new(&test_config(0), test_bucket_config());
    assert_eq!(manager.cfg.worker_num, 4);
}

#[test]
fn test_registration_is_append_only() {
    let mut manager = ETLPipelineManager::new(&test_config(2), test_bucket_config());
    let (first, _) = CountingPipeline::new(1);
    let (second, _) = CountingPipeline::new(1);

    manager.add_pipeline("users", first as Arc<dyn ETLPipeline<i32, i64>>);
    manager.add_pipeline("users", second as Arc<dyn ETLPipeline<i32, i64>>);

    assert_eq!(manager.len(), 2);
    assert_eq!(manager.pipeline_names(), vec!["users", "users"]);
}

#[tokio::test]
async fn test_run_all_without_pipelines() {
    let manager = ETLPipelineManager::new(&test_config(2), test_bucket_config());

    let err = manager.run_all(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ETLError::NoPipelines));
    assert_eq!(err.to_string(), "no pipelines registered");
}

#[tokio::test]
async fn test_run_all_success() {
    let mut manager = ETLPipelineManager::new(&test_config(2), test_bucket_config());

    let mut probes = Vec::new();
    for (name, items) in [("a", 5), ("b", 8), ("c", 3)] {
        let (pipeline, probe) = CountingPipeline::new(items);
        manager.add_pipeline(name, pipeline as Arc<dyn ETLPipeline<i32, i64>>);
        probes.push((probe, items as usize));
    }

    manager.run_all(&CancellationToken::new()).await.unwrap();

    for (probe, items) in probes {
        assert_eq!(probe.loaded.load(Ordering::SeqCst), items);
        assert!(probe.post_called.load(Ordering::SeqCst));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_all_respects_concurrency_limit() {
    let mut manager = ETLPipelineManager::new(&test_config(2), test_bucket_config());
    let probe = Arc::new(Probe::default());

    for i in 0..6 {
        let pipeline = CountingPipeline::holding(4, Duration::from_millis(40), Arc::clone(&probe));
        manager.add_pipeline(format!("p{i}"), pipeline as Arc<dyn ETLPipeline<i32, i64>>);
    }

    manager.run_all(&CancellationToken::new()).await.unwrap();

    let peak = probe.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak concurrency was {peak}");
    assert_eq!(probe.active.load(Ordering::SeqCst), 0);
    assert_eq!(probe.loaded.load(Ordering::SeqCst), 24);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_pipeline_does_not_stop_siblings() {
    let mut manager = ETLPipelineManager::new(&test_config(3), test_bucket_config());

    let (a, probe_a) = CountingPipeline::new(6);
    let (b, probe_b) = CountingPipeline::failing(6);
    let (c, probe_c) = CountingPipeline::new(6);
    manager.add_pipeline("A", a as Arc<dyn ETLPipeline<i32, i64>>);
    manager.add_pipeline("B", b as Arc<dyn ETLPipeline<i32, i64>>);
    manager.add_pipeline("C", c as Arc<dyn ETLPipeline<i32, i64>>);

    let err = manager.run_all(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.pipeline(), Some("B"));
    assert!(matches!(err.stage(), ETLError::Load(_)));
    assert!(err.to_string().contains("load exploded"));

    assert!(probe_a.post_called.load(Ordering::SeqCst));
    assert!(probe_c.post_called.load(Ordering::SeqCst));
    assert!(!probe_b.post_called.load(Ordering::SeqCst));
    assert_eq!(probe_a.loaded.load(Ordering::SeqCst), 6);
    assert_eq!(probe_c.loaded.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_pipeline_config_overrides_default() {
    let default_config = bucket::Config::new(100, Duration::from_secs(10), 1);
    let mut manager = ETLPipelineManager::new(&test_config(2), default_config);

    let (small, small_probe) = CountingPipeline::new(7);
    let (large, large_probe) = CountingPipeline::new(7);
    manager.add_pipeline_with_config(
        "small",
        small as Arc<dyn ETLPipeline<i32, i64>>,
        bucket::Config::new(3, Duration::from_secs(10), 1),
    );
    manager.add_pipeline("large", large as Arc<dyn ETLPipeline<i32, i64>>);

    manager.run_all(&CancellationToken::new()).await.unwrap();

    assert_eq!(*small_probe.batch_sizes.lock().await, vec![3, 3, 1]);
    assert_eq!(*large_probe.batch_sizes.lock().await, vec![7]);
}

#[tokio::test]
async fn test_add_runner() {
    struct CustomTaskRunner {
        ran: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl ETLRunner for CustomTaskRunner {
        fn name(&self) -> &str {
            "custom"
        }

        async fn run(
            &self,
            config: Arc<bucket::Config>,
            _cancel: &CancellationToken,
        ) -> Result<(), ETLError> {
            assert_eq!(config.batch_size(), 2);
            self.ran.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    let ran = Arc::new(AtomicBool::new(false));
    let mut manager = ETLPipelineManager::new(&test_config(1), test_bucket_config());
    manager.add_runner(Arc::new(CustomTaskRunner {
        ran: Arc::clone(&ran),
    }));

    manager.run_all(&CancellationToken::new()).await.unwrap();
    assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let mut manager = ETLPipelineManager::new(&test_config(1), test_bucket_config());
    let (pipeline, probe) = CountingPipeline::new(3);
    manager.add_pipeline("idle", pipeline as Arc<dyn ETLPipeline<i32, i64>>);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = manager.run_all(&cancel).await.unwrap_err();
    assert_eq!(err.pipeline(), Some("idle"));
    assert!(matches!(err.stage(), ETLError::Cancelled));
    assert_eq!(probe.active.load(Ordering::SeqCst), 0);
}
