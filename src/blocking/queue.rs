//! 自动封禁任务队列
//!
//! 接入流程只负责把站点 id 投递到有界队列，立即返回；
//! 后台 worker 逐个执行，失败按指数退避重试，最终失败记录日志和计数。
//! 同一站点在队列中最多只有一个待处理任务。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::engine::AutoBlockEngine;
use crate::errors::ClickGuardError;
use crate::storage::backend::retry::calculate_backoff;

/// 触发某个站点的自动封禁（不等待结果）
pub trait AutoBlockTrigger: Send + Sync {
    fn trigger(&self, site_id: i64);
}

/// 退避参数
#[derive(Debug, Clone, Copy)]
pub struct QueueRetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for QueueRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    enqueued: AtomicU64,
    deduplicated: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// 队列计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub enqueued: u64,
    pub deduplicated: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
}

pub struct AutoBlockQueue {
    sender: mpsc::Sender<i64>,
    pending: Arc<DashMap<i64, ()>>,
    counters: Arc<QueueCounters>,
}

impl AutoBlockQueue {
    /// 创建队列并启动 worker
    pub fn start(
        engine: Arc<AutoBlockEngine>,
        capacity: usize,
        policy: QueueRetryPolicy,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let pending = Arc::new(DashMap::new());
        let counters = Arc::new(QueueCounters::default());

        let handle = tokio::spawn(run_worker(
            receiver,
            engine,
            Arc::clone(&pending),
            Arc::clone(&counters),
            policy,
        ));

        info!(
            "Auto-block queue started (capacity: {}, max attempts: {})",
            capacity, policy.max_attempts
        );

        (
            Arc::new(Self {
                sender,
                pending,
                counters,
            }),
            handle,
        )
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            deduplicated: self.counters.deduplicated.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// 已入队但尚未处理完（含执行中）的任务数
    pub fn pending_jobs(&self) -> u64 {
        let stats = self.stats();
        stats
            .enqueued
            .saturating_sub(stats.completed + stats.failed)
    }
}

impl AutoBlockTrigger for AutoBlockQueue {
    fn trigger(&self, site_id: i64) {
        if self.pending.insert(site_id, ()).is_some() {
            self.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
            debug!("Auto-block for site {} already queued", site_id);
            return;
        }

        match self.sender.try_send(site_id) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.pending.remove(&site_id);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                let err = ClickGuardError::queue(format!("{}", e));
                warn!("Auto-block job for site {} dropped: {}", site_id, err);
            }
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<i64>,
    engine: Arc<AutoBlockEngine>,
    pending: Arc<DashMap<i64, ()>>,
    counters: Arc<QueueCounters>,
    policy: QueueRetryPolicy,
) {
    while let Some(site_id) = receiver.recv().await {
        // 先移出待处理集合，执行期间的新触发会重新入队
        pending.remove(&site_id);

        let attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match engine.run_for_site_id(site_id, Utc::now()).await {
                Ok(report) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    if report.blocked > 0 {
                        info!(
                            "Triggered auto-block for site {}: {} new blocks ({} candidates)",
                            site_id, report.blocked, report.analyzed
                        );
                    }
                    break;
                }
                Err(e @ ClickGuardError::SiteNotFound(_)) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Auto-block for site {} skipped: {}", site_id, e);
                    break;
                }
                Err(e) if attempt < attempts => {
                    let delay = calculate_backoff(attempt, policy.base_delay_ms, policy.max_delay_ms);
                    warn!(
                        "Auto-block for site {} failed (attempt {}/{}): {}; retrying in {} ms",
                        site_id, attempt, attempts, e, delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Auto-block for site {} failed after {} attempts: {}",
                        site_id, attempt, e
                    );
                    break;
                }
            }
        }
    }

    debug!("Auto-block queue closed, worker exiting");
}
