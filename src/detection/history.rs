//! 历史信号
//!
//! 指纹复用、IP 欺诈记录、当前封禁状态三项查询并发执行。
//! 任一查询失败按 0 处理并计入 `degraded_lookups`，评分照常完成。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use super::rules::{Hit, Rule, RuleOutcome, RuleSet};
use super::types::HistoricalSignals;
use crate::storage::{EventFilter, EventStore};

/// 指纹复用统计窗口
pub const FINGERPRINT_REUSE_WINDOW_DAYS: i64 = 7;
/// IP 欺诈记录统计窗口
pub const IP_REPUTATION_WINDOW_DAYS: i64 = 30;
/// 超过该次数视为指纹复用
pub const FINGERPRINT_REUSE_LIMIT: u64 = 10;

pub static HISTORY_RULES_V1: RuleSet<HistoricalSignals> = RuleSet {
    version: "history-v1",
    rules: &[
        Rule {
            id: "fingerprint_reuse",
            points: 15,
            cap: None,
            check: fingerprint_reuse,
        },
        Rule {
            id: "prior_fraud",
            points: 5,
            cap: Some(20),
            check: prior_fraud,
        },
        Rule {
            id: "blacklisted",
            points: 30,
            cap: None,
            check: blacklisted,
        },
    ],
};

fn fingerprint_reuse(signals: &HistoricalSignals) -> Option<Hit> {
    (signals.fingerprint_reuse > FINGERPRINT_REUSE_LIMIT).then(|| {
        Hit::once(format!(
            "Fingerprint reused {} times",
            signals.fingerprint_reuse
        ))
    })
}

fn prior_fraud(signals: &HistoricalSignals) -> Option<Hit> {
    (signals.prior_fraud_count > 0).then(|| {
        Hit::times(
            u32::try_from(signals.prior_fraud_count).unwrap_or(u32::MAX),
            format!(
                "IP previously flagged as fraud ({} times)",
                signals.prior_fraud_count
            ),
        )
    })
}

fn blacklisted(signals: &HistoricalSignals) -> Option<Hit> {
    signals
        .has_active_block
        .then(|| Hit::once("IP is blacklisted"))
}

/// 历史信号评分
pub struct HistoryEvaluator {
    rules: &'static RuleSet<HistoricalSignals>,
}

impl Default for HistoryEvaluator {
    fn default() -> Self {
        Self::new(&HISTORY_RULES_V1)
    }
}

impl HistoryEvaluator {
    pub fn new(rules: &'static RuleSet<HistoricalSignals>) -> Self {
        Self { rules }
    }

    pub fn version(&self) -> &'static str {
        self.rules.version
    }

    pub fn evaluate(&self, signals: &HistoricalSignals) -> RuleOutcome {
        self.rules.evaluate(signals)
    }
}

/// HistoricalSignalProvider
pub struct HistoricalSignalProvider {
    store: Arc<dyn EventStore>,
}

impl HistoricalSignalProvider {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// 在写入当前事件之前调用；指纹次数会把当前事件算进去
    pub async fn collect(
        &self,
        site_id: i64,
        ip: &str,
        fingerprint_hash: &str,
        now: DateTime<Utc>,
    ) -> HistoricalSignals {
        let reuse_filter = EventFilter::by_fingerprint(fingerprint_hash);
        let fraud_filter = EventFilter::by_ip(ip).fraud_only();

        let (reuse, prior_fraud, active_block) = tokio::join!(
            self.store.count_events_since(
                site_id,
                &reuse_filter,
                now - Duration::days(FINGERPRINT_REUSE_WINDOW_DAYS),
            ),
            self.store.count_events_since(
                site_id,
                &fraud_filter,
                now - Duration::days(IP_REPUTATION_WINDOW_DAYS),
            ),
            self.store.query_active_block(site_id, ip, now),
        );

        let mut signals = HistoricalSignals::default();

        match reuse {
            Ok(prior) => signals.fingerprint_reuse = prior + 1,
            Err(e) => {
                warn!("Fingerprint reuse lookup failed, scoring without it: {}", e);
                signals.degraded_lookups += 1;
            }
        }

        match prior_fraud {
            Ok(count) => signals.prior_fraud_count = count,
            Err(e) => {
                warn!("IP reputation lookup failed for {}: {}", ip, e);
                signals.degraded_lookups += 1;
            }
        }

        match active_block {
            Ok(block) => signals.has_active_block = block.is_some(),
            Err(e) => {
                warn!("Block status lookup failed for {}: {}", ip, e);
                signals.degraded_lookups += 1;
            }
        }

        signals
    }
}
