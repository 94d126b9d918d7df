//! 事件接入流程
//!
//! 校验 -> 解析站点 -> 封禁检查 -> 点击计数 -> 历史信号 -> 评分 -> 写入 -> 触发自动封禁。
//! 任一步骤失败都直接返回错误，不会写入缺少评分的事件。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::rate_limiter::{ClickRateLimiter, rate_key};
use crate::blocking::AutoBlockTrigger;
use crate::detection::{
    BehaviorMetrics, Fingerprint, FraudScorer, FraudThresholds, HistoricalSignalProvider,
    ScoringInput, Verdict,
};
use crate::errors::{ClickGuardError, Result};
use crate::storage::{EventStore, NewClickEvent, UtmParams};

/// 站点标识：API key 或数字 id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SiteKey {
    Number(i64),
    Text(String),
}

impl SiteKey {
    pub fn as_key(&self) -> String {
        match self {
            SiteKey::Number(id) => id.to_string(),
            SiteKey::Text(s) => s.trim().to_string(),
        }
    }
}

/// tracker 上报的原始事件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    #[serde(default)]
    pub site_id: Option<SiteKey>,
    #[serde(default)]
    pub fingerprint_hash: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default)]
    pub behavior: Option<BehaviorMetrics>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub utm: Option<UtmParams>,
}

/// 接入结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub accepted: bool,
    pub event_id: i64,
    pub fraud_score: u8,
    pub verdict: Verdict,
    pub low_confidence: bool,
    pub click_count: u64,
}

/// IngestionPipeline
pub struct IngestionPipeline {
    store: Arc<dyn EventStore>,
    scorer: FraudScorer,
    history: HistoricalSignalProvider,
    rate_limiter: Arc<dyn ClickRateLimiter>,
    trigger: Arc<dyn AutoBlockTrigger>,
    thresholds: FraudThresholds,
    trigger_min_clicks: u64,
    /// 被封禁 IP 的请求次数（不落库）
    blocked_attempts: AtomicU64,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn EventStore>,
        rate_limiter: Arc<dyn ClickRateLimiter>,
        trigger: Arc<dyn AutoBlockTrigger>,
        thresholds: FraudThresholds,
        trigger_min_clicks: u64,
    ) -> Self {
        Self {
            history: HistoricalSignalProvider::new(Arc::clone(&store)),
            store,
            scorer: FraudScorer::default(),
            rate_limiter,
            trigger,
            thresholds,
            trigger_min_clicks,
            blocked_attempts: AtomicU64::new(0),
        }
    }

    pub fn with_scorer(mut self, scorer: FraudScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn blocked_attempts(&self) -> u64 {
        self.blocked_attempts.load(Ordering::Relaxed)
    }

    pub fn rules_version(&self) -> String {
        self.scorer.rules_version()
    }

    pub async fn ingest(
        &self,
        request: TrackRequest,
        ip: &str,
        header_user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        // 1. 必填字段
        let site_key = request
            .site_id
            .as_ref()
            .map(SiteKey::as_key)
            .filter(|k| !k.is_empty());
        let fingerprint_hash = request
            .fingerprint_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty());
        let (Some(site_key), Some(fingerprint_hash)) = (site_key, fingerprint_hash) else {
            return Err(ClickGuardError::validation("Missing required fields"));
        };
        let fingerprint_hash = fingerprint_hash.to_string();

        // 2. 站点
        let site = match self.store.resolve_site(&site_key).await? {
            Some(site) if site.is_active => site,
            _ => {
                return Err(ClickGuardError::site_not_found(format!(
                    "Site not found: {}",
                    site_key
                )));
            }
        };

        // 3. 封禁检查，被封禁的请求不评分也不落库
        if let Some(block) = self.store.query_active_block(site.id, ip, now).await? {
            let attempts = self.blocked_attempts.fetch_add(1, Ordering::Relaxed) + 1;
            info!(
                "Rejected blocked IP: site={} ip={} reason={} (total blocked attempts: {})",
                site.id,
                ip,
                block.reason.as_deref().unwrap_or("-"),
                attempts
            );
            return Err(ClickGuardError::blocked("Access denied"));
        }

        // 4. 点击计数
        let click_count = self.rate_limiter.record(&rate_key(site.id, ip), now);

        // 5. 评分
        let thresholds = self.thresholds.with_site_overrides(&site.overrides());
        let signals = self
            .history
            .collect(site.id, ip, &fingerprint_hash, now)
            .await;
        let input = ScoringInput {
            fingerprint: request.fingerprint.as_ref(),
            behavior: request.behavior.as_ref(),
            click_count,
        };
        let assessment = self.scorer.score(&input, &signals, &thresholds);

        // 6. 写入
        let user_agent = request
            .fingerprint
            .as_ref()
            .and_then(|fp| fp.text("userAgent"))
            .filter(|ua| !ua.is_empty())
            .or_else(|| header_user_agent.map(str::to_string));
        let fingerprint_data = match request.fingerprint.as_ref() {
            Some(fp) => Some(serde_json::to_string(fp)?),
            None => None,
        };

        let event = NewClickEvent {
            site_id: site.id,
            ip_address: ip.to_string(),
            fingerprint_hash,
            user_agent,
            url: request.url,
            referrer: request.referrer,
            behavior: request.behavior.unwrap_or_default(),
            utm: request.utm.unwrap_or_default(),
            fraud_score: assessment.score,
            verdict: assessment.verdict,
            fraud_reason: assessment.reason_text(),
            low_confidence: assessment.low_confidence,
            fingerprint_data,
            created_at: now,
        };
        let event_id = self.store.insert_event(event).await?;

        info!(
            "Tracked event {}: site={} ip={} score={} verdict={}{}",
            event_id,
            site.id,
            ip,
            assessment.score,
            assessment.verdict,
            if assessment.low_confidence {
                " (low confidence)"
            } else {
                ""
            }
        );
        if signals.degraded_lookups > 0 {
            warn!(
                "Event {} scored with {} degraded history lookups",
                event_id, signals.degraded_lookups
            );
        }

        // 7. 异步自动封禁
        if assessment.verdict == Verdict::Fraud
            && click_count >= self.trigger_min_clicks
            && thresholds.auto_block_enabled
        {
            debug!("Queueing auto-block for site {} after event {}", site.id, event_id);
            self.trigger.trigger(site.id);
        }

        Ok(IngestOutcome {
            accepted: true,
            event_id,
            fraud_score: assessment.score,
            verdict: assessment.verdict,
            low_confidence: assessment.low_confidence,
            click_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_request_accepts_numeric_site_id() {
        let req: TrackRequest = serde_json::from_str(
            r#"{"siteId": 7, "fingerprintHash": "abc", "behavior": {"timeOnPage": 4.5}}"#,
        )
        .unwrap();
        assert_eq!(req.site_id.unwrap().as_key(), "7");
        assert_eq!(req.behavior.unwrap().time_on_page, Some(4.5));
    }

    #[test]
    fn test_track_request_utm_fields() {
        let req: TrackRequest = serde_json::from_str(
            r#"{"siteId": "key", "fingerprintHash": "abc",
                "utm": {"utm_source": "yandex", "yclid": "991"}}"#,
        )
        .unwrap();
        let utm = req.utm.unwrap();
        assert_eq!(utm.utm_source.as_deref(), Some("yandex"));
        assert_eq!(utm.yclid.as_deref(), Some("991"));
        assert!(utm.utm_medium.is_none());
    }
}
