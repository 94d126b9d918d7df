use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::detection::{BehaviorMetrics, SiteOverrides, Verdict};
use crate::errors::{ClickGuardError, Result};

/// 接入站点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    pub id: i64,
    pub name: String,
    pub domain: String,
    pub api_key: String,
    pub is_active: bool,
    pub max_clicks_per_hour: Option<i64>,
    pub min_time_on_site: Option<f64>,
    pub fraud_score_threshold: Option<i32>,
    pub auto_block_enabled: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl SiteRecord {
    pub fn overrides(&self) -> SiteOverrides {
        SiteOverrides {
            max_clicks_per_hour: self.max_clicks_per_hour,
            min_time_on_site: self.min_time_on_site,
            fraud_score_threshold: self.fraud_score_threshold,
            auto_block_enabled: self.auto_block_enabled,
        }
    }
}

/// 新建站点
#[derive(Debug, Clone, Default)]
pub struct NewSite {
    pub name: String,
    pub domain: String,
    /// 为空时自动生成
    pub api_key: Option<String>,
    pub overrides: SiteOverrides,
}

/// UTM 与广告点击参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UtmParams {
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub utm_term: Option<String>,
    #[serde(default)]
    pub utm_content: Option<String>,
    /// Yandex Direct 点击 id
    #[serde(default)]
    pub yclid: Option<String>,
}

/// 待写入的点击事件（评分已完成）
#[derive(Debug, Clone, PartialEq)]
pub struct NewClickEvent {
    pub site_id: i64,
    pub ip_address: String,
    pub fingerprint_hash: String,
    pub user_agent: Option<String>,
    pub url: Option<String>,
    pub referrer: Option<String>,
    pub behavior: BehaviorMetrics,
    pub utm: UtmParams,
    pub fraud_score: u8,
    pub verdict: Verdict,
    pub fraud_reason: String,
    pub low_confidence: bool,
    pub fingerprint_data: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 已存储的点击事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEventRecord {
    pub id: i64,
    pub site_id: i64,
    pub ip_address: String,
    pub fingerprint_hash: String,
    pub user_agent: Option<String>,
    pub url: Option<String>,
    pub referrer: Option<String>,
    pub behavior: BehaviorMetrics,
    pub utm: UtmParams,
    pub fraud_score: u8,
    pub verdict: Verdict,
    pub fraud_reason: String,
    pub low_confidence: bool,
    pub fingerprint_data: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ClickEventRecord {
    pub fn from_new(id: i64, event: NewClickEvent) -> Self {
        Self {
            id,
            site_id: event.site_id,
            ip_address: event.ip_address,
            fingerprint_hash: event.fingerprint_hash,
            user_agent: event.user_agent,
            url: event.url,
            referrer: event.referrer,
            behavior: event.behavior,
            utm: event.utm,
            fraud_score: event.fraud_score,
            verdict: event.verdict,
            fraud_reason: event.fraud_reason,
            low_confidence: event.low_confidence,
            fingerprint_data: event.fingerprint_data,
            created_at: event.created_at,
        }
    }
}

/// 事件查询条件（按 IP 或指纹）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub ip_address: Option<String>,
    pub fingerprint_hash: Option<String>,
    /// 只统计 verdict = fraud
    pub fraud_only: bool,
}

impl EventFilter {
    pub fn by_ip(ip: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip.into()),
            ..Default::default()
        }
    }

    pub fn by_fingerprint(hash: impl Into<String>) -> Self {
        Self {
            fingerprint_hash: Some(hash.into()),
            ..Default::default()
        }
    }

    pub fn fraud_only(mut self) -> Self {
        self.fraud_only = true;
        self
    }

    pub fn matches(&self, event: &ClickEventRecord) -> bool {
        self.ip_address
            .as_deref()
            .is_none_or(|ip| event.ip_address == ip)
            && self
                .fingerprint_hash
                .as_deref()
                .is_none_or(|fp| event.fingerprint_hash == fp)
            && (!self.fraud_only || event.verdict == Verdict::Fraud)
    }
}

/// 封禁记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedIpRecord {
    pub id: i64,
    pub site_id: i64,
    pub ip_address: String,
    pub reason: Option<String>,
    pub auto_blocked: bool,
    pub auto_unblock_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub blocked_at: DateTime<Utc>,
    pub unblocked_at: Option<DateTime<Utc>>,
}

impl BlockedIpRecord {
    /// 处于激活状态且未到解封时间
    pub fn is_in_force(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.auto_unblock_at.is_none_or(|at| at > now)
    }
}

/// 封禁（或刷新封禁）请求
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRequest {
    pub site_id: i64,
    pub ip_address: String,
    pub reason: Option<String>,
    pub auto_blocked: bool,
    /// None 表示永久封禁
    pub duration: Option<Duration>,
    pub now: DateTime<Utc>,
}

impl BlockRequest {
    /// 解封时间超出 chrono 可表示范围时返回 Validation 错误
    pub fn auto_unblock_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.duration
            .map(|d| {
                self.now
                    .checked_add_signed(d)
                    .ok_or_else(|| ClickGuardError::validation("Block duration out of range"))
            })
            .transpose()
    }
}

/// 自动封禁候选行：窗口内 fraud 或高分事件
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRow {
    pub ip_address: String,
    pub fraud_score: u8,
    pub fraud_reason: String,
    pub created_at: DateTime<Utc>,
}

/// 统计窗口内的汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub total_events: u64,
    pub fraud_events: u64,
    pub suspicious_events: u64,
    pub low_confidence_events: u64,
    pub unique_ips: u64,
    pub unique_fingerprints: u64,
    pub avg_fraud_score: f64,
    /// 百分比，保留两位小数
    pub fraud_rate: f64,
}

impl EventStats {
    pub fn compute_fraud_rate(&mut self) {
        self.fraud_rate = if self.total_events == 0 {
            0.0
        } else {
            let rate = self.fraud_events as f64 * 100.0 / self.total_events as f64;
            (rate * 100.0).round() / 100.0
        };
        self.avg_fraud_score = (self.avg_fraud_score * 100.0).round() / 100.0;
    }
}
