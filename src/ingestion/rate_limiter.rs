//! 点击频率计数
//!
//! 进程内滑动窗口：每个 key 保存窗口内的点击时间戳。
//! 重启后清零，也不在多个实例之间共享；持久化的事件表才是自动封禁的依据。

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::trace;

/// 点击计数器接口，可替换为分布式实现
pub trait ClickRateLimiter: Send + Sync {
    /// 记录一次点击，返回窗口内的点击数（含本次）
    fn record(&self, key: &str, now: DateTime<Utc>) -> u64;

    /// 清理过期时间戳和空 key，返回删除的 key 数
    fn gc(&self, now: DateTime<Utc>) -> usize;

    /// 当前跟踪的 key 数
    fn tracked_keys(&self) -> usize;
}

/// 计数 key：`site:ip`
pub fn rate_key(site_id: i64, ip: &str) -> String {
    format!("{}:{}", site_id, ip)
}

/// 基于 DashMap 的滑动窗口计数器
pub struct SlidingWindowCounter {
    window: Duration,
    /// 使用 Arc<str> 减少克隆开销
    buckets: DashMap<Arc<str>, VecDeque<DateTime<Utc>>>,
}

impl Default for SlidingWindowCounter {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}

impl SlidingWindowCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buckets: DashMap::new(),
        }
    }

    fn evict(timestamps: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
        while timestamps.front().is_some_and(|t| *t <= cutoff) {
            timestamps.pop_front();
        }
    }
}

impl ClickRateLimiter for SlidingWindowCounter {
    fn record(&self, key: &str, now: DateTime<Utc>) -> u64 {
        let cutoff = now - self.window;

        // 热点 key 走 get_mut，避免为已存在的 key 分配 Arc
        if let Some(mut entry) = self.buckets.get_mut(key) {
            Self::evict(&mut entry, cutoff);
            entry.push_back(now);
            return entry.len() as u64;
        }

        let mut entry = self.buckets.entry(Arc::from(key)).or_default();
        Self::evict(&mut entry, cutoff);
        entry.push_back(now);
        entry.len() as u64
    }

    fn gc(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let before = self.buckets.len();
        self.buckets.retain(|_, timestamps| {
            Self::evict(timestamps, cutoff);
            !timestamps.is_empty()
        });
        let removed = before.saturating_sub(self.buckets.len());
        trace!("Rate limiter GC removed {} keys", removed);
        removed
    }

    fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}
