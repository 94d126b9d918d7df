//! 定时任务
//!
//! - 自动封禁：默认每小时遍历所有启用站点
//! - 清理：默认每天一次，先全局过期封禁，再按保留期删除事件
//! - 点击计数器 GC

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};

use super::engine::AutoBlockEngine;
use crate::config::SchedulerConfig;
use crate::ingestion::ClickRateLimiter;
use crate::storage::EventStore;

/// 自动封禁汇总
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub sites: usize,
    pub failed_sites: usize,
    pub blocked: usize,
    pub expired: u64,
}

/// 清理汇总
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub blocks_expired: u64,
    pub events_deleted: u64,
}

pub struct FraudScheduler {
    store: Arc<dyn EventStore>,
    engine: Arc<AutoBlockEngine>,
    rate_limiter: Arc<dyn ClickRateLimiter>,
    config: SchedulerConfig,
}

impl FraudScheduler {
    pub fn new(
        store: Arc<dyn EventStore>,
        engine: Arc<AutoBlockEngine>,
        rate_limiter: Arc<dyn ClickRateLimiter>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            engine,
            rate_limiter,
            config,
        }
    }

    /// 对所有启用的站点执行自动封禁，单个站点失败不影响其他站点
    pub async fn run_auto_block(&self, now: DateTime<Utc>) -> anyhow::Result<SweepReport> {
        let sites = self.store.list_sites().await?;
        let mut report = SweepReport::default();

        for site in sites.iter().filter(|s| s.is_active) {
            report.sites += 1;
            match self.engine.run_for_site(site, now).await {
                Ok(result) => {
                    report.blocked += result.blocked;
                    report.expired += result.expired;
                    if result.blocked > 0 {
                        info!("Auto-blocked {} IPs for site {}", result.blocked, site.name);
                    }
                }
                Err(e) => {
                    report.failed_sites += 1;
                    error!("Auto-block failed for site {}: {}", site.id, e);
                }
            }
        }

        info!(
            "Auto-block pass completed: {} sites, {} new blocks, {} expired",
            report.sites, report.blocked, report.expired
        );
        Ok(report)
    }

    /// 全局过期封禁 + 事件保留期清理
    pub async fn run_cleanup(&self, now: DateTime<Utc>) -> anyhow::Result<CleanupReport> {
        let mut report = CleanupReport::default();

        match self.engine.sweep_expired(now).await {
            Ok(expired) => report.blocks_expired = expired,
            Err(e) => error!("Block expiry sweep failed: {}", e),
        }

        let cutoff = now - Duration::days(self.config.event_retention_days as i64);
        match self.store.delete_events_before(cutoff).await {
            Ok(deleted) => report.events_deleted = deleted,
            Err(e) => error!("Event retention cleanup failed: {}", e),
        }

        info!(
            "Daily cleanup completed: {} blocks expired, {} events deleted",
            report.blocks_expired, report.events_deleted
        );
        Ok(report)
    }

    /// 启动所有后台任务
    pub fn spawn_background_tasks(self: Arc<Self>) {
        let auto_block_interval =
            StdDuration::from_secs(self.config.auto_block_interval_mins * 60);
        let cleanup_interval = StdDuration::from_secs(self.config.cleanup_interval_hours * 60 * 60);
        let gc_interval = StdDuration::from_secs(self.config.rate_limiter_gc_secs);

        let scheduler = Arc::clone(&self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(auto_block_interval).await;
                if let Err(e) = scheduler.run_auto_block(Utc::now()).await {
                    error!("Auto-block task failed: {}", e);
                }
            }
        });

        let scheduler = Arc::clone(&self);
        tokio::spawn(async move {
            // 首次运行延迟 5 分钟
            tokio::time::sleep(StdDuration::from_secs(300)).await;
            loop {
                if let Err(e) = scheduler.run_cleanup(Utc::now()).await {
                    error!("Cleanup task failed: {}", e);
                }
                tokio::time::sleep(cleanup_interval).await;
            }
        });

        let limiter = Arc::clone(&self.rate_limiter);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(gc_interval).await;
                let removed = limiter.gc(Utc::now());
                if removed > 0 {
                    info!(
                        "Rate limiter GC removed {} idle keys ({} tracked)",
                        removed,
                        limiter.tracked_keys()
                    );
                }
            }
        });

        info!(
            "Background tasks started (auto-block: {} min, cleanup: {} h, limiter gc: {} s)",
            self.config.auto_block_interval_mins,
            self.config.cleanup_interval_hours,
            self.config.rate_limiter_gc_secs
        );
    }
}
