use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::blocking::{
    AutoBlockEngine, AutoBlockQueue, AutoBlockTrigger, FraudScheduler, QueueRetryPolicy,
};
use crate::config::StaticConfig;
use crate::detection::FraudThresholds;
use crate::ingestion::{ClickRateLimiter, IngestionPipeline, SlidingWindowCounter};
use crate::storage::{EventStore, SeaOrmStorage, StorageFactory};

/// 评分、封禁和接入所需的全部服务
///
/// 存储后端可替换：服务器使用 SeaORM，测试使用内存实现。
pub struct AppServices {
    pub store: Arc<dyn EventStore>,
    pub rate_limiter: Arc<dyn ClickRateLimiter>,
    pub engine: Arc<AutoBlockEngine>,
    pub queue: Arc<AutoBlockQueue>,
    pub queue_worker: JoinHandle<()>,
    pub pipeline: Arc<IngestionPipeline>,
    pub scheduler: Arc<FraudScheduler>,
}

impl AppServices {
    /// 组装服务并启动自动封禁队列 worker（需在 tokio runtime 内调用）
    pub fn build(store: Arc<dyn EventStore>, config: &StaticConfig) -> Self {
        let thresholds = FraudThresholds::from(&config.fraud);
        let rate_limiter: Arc<dyn ClickRateLimiter> = Arc::new(SlidingWindowCounter::default());

        let engine = Arc::new(AutoBlockEngine::new(
            Arc::clone(&store),
            config.auto_block.clone(),
            thresholds,
        ));

        let policy = QueueRetryPolicy {
            max_attempts: config.auto_block.max_attempts,
            ..QueueRetryPolicy::default()
        };
        let (queue, queue_worker) = AutoBlockQueue::start(
            Arc::clone(&engine),
            config.auto_block.queue_capacity,
            policy,
        );

        let trigger: Arc<dyn AutoBlockTrigger> = queue.clone();
        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&store),
            Arc::clone(&rate_limiter),
            trigger,
            thresholds,
            config.auto_block.trigger_min_clicks,
        ));

        let scheduler = Arc::new(FraudScheduler::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            Arc::clone(&rate_limiter),
            config.scheduler.clone(),
        ));

        debug!(
            "Services assembled (backend: {}, rules: {})",
            store.backend_name(),
            pipeline.rules_version()
        );

        Self {
            store,
            rate_limiter,
            engine,
            queue,
            queue_worker,
            pipeline,
            scheduler,
        }
    }
}

pub struct StartupContext {
    pub storage: Arc<SeaOrmStorage>,
    pub services: AppServices,
}

/// 准备服务器启动的上下文
/// 包括存储、评分服务和后台任务
pub async fn prepare_server_startup() -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    let config = crate::config::get_config();

    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    let store: Arc<dyn EventStore> = storage.clone();
    let sites = store
        .list_sites()
        .await
        .context("Failed to load sites")?;
    let active = sites.iter().filter(|s| s.is_active).count();
    if active == 0 {
        warn!("No active sites configured, use `clickguard site add` to register one");
    } else {
        info!("{} active sites loaded ({} total)", active, sites.len());
    }

    let services = AppServices::build(store, &config);
    Arc::clone(&services.scheduler).spawn_background_tasks();

    info!(
        "Pre-startup completed in {} ms",
        start_time.elapsed().as_millis()
    );

    Ok(StartupContext { storage, services })
}
