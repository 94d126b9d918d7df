//! 自动封禁引擎
//!
//! 状态机：unblocked -> active-block -> expired/unblocked。
//! 读取-判断-写入之间不加锁，依靠 (site_id, ip_address) 上的唯一约束做幂等 upsert。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, info};

use crate::config::{AD_NETWORK_EXPORT_CAP, AutoBlockConfig, MAX_BLOCK_DURATION_DAYS};
use crate::detection::FraudThresholds;
use crate::errors::{ClickGuardError, Result};
use crate::storage::{BlockRequest, BlockedIpRecord, CandidateRow, EventStore, SiteRecord};

/// 手动封禁的默认原因
pub const MANUAL_BLOCK_REASON: &str = "Manually blocked";

/// 手动封禁时长上限（小时）
pub const MAX_MANUAL_BLOCK_HOURS: u32 = MAX_BLOCK_DURATION_DAYS * 24;

/// 满足封禁条件的 IP
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockCandidate {
    pub ip_address: String,
    pub fraud_count: u64,
    pub avg_score: f64,
    /// 最近一次命中的原因
    pub reason: String,
    pub last_seen: DateTime<Utc>,
}

/// 单次执行结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoBlockReport {
    pub analyzed: usize,
    pub blocked: usize,
    /// 已经处于封禁状态而跳过的候选
    pub already_blocked: usize,
    pub expired: u64,
}

/// 导出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// 按 IP 聚合候选行，保留事件数 >= min_events 的 IP，
/// 按事件数、平均分降序排序后截取前 limit 个
pub fn rank_block_candidates(
    rows: &[CandidateRow],
    min_events: u32,
    limit: usize,
) -> Vec<BlockCandidate> {
    struct Acc<'a> {
        count: u64,
        score_sum: u64,
        reason: &'a str,
        last_seen: DateTime<Utc>,
    }

    let mut by_ip: HashMap<&str, Acc<'_>> = HashMap::new();
    for row in rows {
        let acc = by_ip.entry(row.ip_address.as_str()).or_insert(Acc {
            count: 0,
            score_sum: 0,
            reason: row.fraud_reason.as_str(),
            last_seen: row.created_at,
        });
        acc.count += 1;
        acc.score_sum += row.fraud_score as u64;
        if row.created_at > acc.last_seen {
            acc.last_seen = row.created_at;
            acc.reason = row.fraud_reason.as_str();
        }
    }

    let mut candidates: Vec<BlockCandidate> = by_ip
        .into_iter()
        .filter(|(_, acc)| acc.count >= min_events as u64)
        .map(|(ip, acc)| BlockCandidate {
            ip_address: ip.to_string(),
            fraud_count: acc.count,
            avg_score: acc.score_sum as f64 / acc.count as f64,
            reason: acc.reason.to_string(),
            last_seen: acc.last_seen,
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.fraud_count
            .cmp(&a.fraud_count)
            .then(b.avg_score.total_cmp(&a.avg_score))
            .then_with(|| a.ip_address.cmp(&b.ip_address))
    });
    candidates.truncate(limit);
    candidates
}

/// 将 IP 列表写成单列 CSV
pub fn render_csv(ips: &[String]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["ip_address"])
        .map_err(|e| ClickGuardError::serialization(format!("CSV 写入失败: {}", e)))?;
    for ip in ips {
        writer
            .write_record([ip.as_str()])
            .map_err(|e| ClickGuardError::serialization(format!("CSV 写入失败: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ClickGuardError::serialization(format!("CSV 写入失败: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| ClickGuardError::serialization(format!("CSV 编码失败: {}", e)))
}

/// AutoBlockEngine
pub struct AutoBlockEngine {
    store: Arc<dyn EventStore>,
    config: AutoBlockConfig,
    thresholds: FraudThresholds,
}

impl AutoBlockEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        config: AutoBlockConfig,
        thresholds: FraudThresholds,
    ) -> Self {
        Self {
            store,
            config,
            thresholds,
        }
    }

    pub fn config(&self) -> &AutoBlockConfig {
        &self.config
    }

    /// 查询窗口内应被封禁的 IP
    pub async fn find_candidates(
        &self,
        site_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<BlockCandidate>> {
        let since = now - Duration::hours(self.config.window_hours as i64);
        let rows = self
            .store
            .block_candidate_rows(site_id, since, self.config.score_floor)
            .await?;
        Ok(rank_block_candidates(
            &rows,
            self.config.min_events,
            self.config.max_candidates as usize,
        ))
    }

    /// 对单个站点执行一次自动封禁
    pub async fn run_for_site(
        &self,
        site: &SiteRecord,
        now: DateTime<Utc>,
    ) -> Result<AutoBlockReport> {
        let thresholds = self.thresholds.with_site_overrides(&site.overrides());
        if !thresholds.auto_block_enabled {
            debug!("Auto-block disabled for site {}", site.id);
            return Ok(AutoBlockReport::default());
        }

        let candidates = self.find_candidates(site.id, now).await?;
        let mut report = AutoBlockReport {
            analyzed: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            if self
                .store
                .query_active_block(site.id, &candidate.ip_address, now)
                .await?
                .is_some()
            {
                report.already_blocked += 1;
                continue;
            }

            self.store
                .upsert_block(BlockRequest {
                    site_id: site.id,
                    ip_address: candidate.ip_address.clone(),
                    reason: Some(candidate.reason.clone()),
                    auto_blocked: true,
                    duration: Some(Duration::days(self.config.block_duration_days as i64)),
                    now,
                })
                .await?;
            report.blocked += 1;

            info!(
                "Auto-blocked {} on site {} ({} events, avg score {:.1}): {}",
                candidate.ip_address,
                site.id,
                candidate.fraud_count,
                candidate.avg_score,
                candidate.reason
            );
        }

        report.expired = self.store.expire_stale_blocks(Some(site.id), now).await?;
        Ok(report)
    }

    /// 按 id 解析站点后执行；站点不存在或已停用时返回 SiteNotFound
    pub async fn run_for_site_id(
        &self,
        site_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AutoBlockReport> {
        let site = self.require_site(&site_id.to_string()).await?;
        self.run_for_site(&site, now).await
    }

    /// 全局过期清理
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.store.expire_stale_blocks(None, now).await
    }

    /// 手动封禁；duration_hours 为空时永久封禁
    pub async fn block_manual(
        &self,
        site_id: i64,
        ip: &str,
        reason: Option<String>,
        duration_hours: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<BlockedIpRecord> {
        let ip = ip.trim();
        if ip.is_empty() {
            return Err(ClickGuardError::validation("IP address is required"));
        }
        if duration_hours.is_some_and(|h| h > MAX_MANUAL_BLOCK_HOURS) {
            return Err(ClickGuardError::validation("autoDuration out of range"));
        }

        let record = self
            .store
            .upsert_block(BlockRequest {
                site_id,
                ip_address: ip.to_string(),
                reason: Some(
                    reason
                        .filter(|r| !r.trim().is_empty())
                        .unwrap_or_else(|| MANUAL_BLOCK_REASON.to_string()),
                ),
                auto_blocked: false,
                duration: duration_hours
                    .filter(|h| *h > 0)
                    .map(|h| Duration::hours(h as i64)),
                now,
            })
            .await?;

        info!("IP manually blocked: site={} ip={}", site_id, ip);
        Ok(record)
    }

    /// 返回 false 表示没有激活的封禁
    pub async fn unblock(&self, site_id: i64, ip: &str, now: DateTime<Utc>) -> Result<bool> {
        let removed = self.store.unblock(site_id, ip, now).await?;
        if removed {
            info!("IP unblocked: site={} ip={}", site_id, ip);
        }
        Ok(removed)
    }

    pub async fn list(&self, site_id: i64, active_only: bool) -> Result<Vec<BlockedIpRecord>> {
        self.store.list_blocks(site_id, active_only).await
    }

    /// 广告平台排除列表：生效中的 IP，最近封禁的在前，最多 25 个
    pub async fn export_ips(&self, site_id: i64, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.store
            .export_active_ips(
                site_id,
                self.config.export_limit.min(AD_NETWORK_EXPORT_CAP),
                now,
            )
            .await
    }

    /// 站点解析（停用站点视为不存在）
    pub async fn require_site(&self, key: &str) -> Result<SiteRecord> {
        match self.store.resolve_site(key).await? {
            Some(site) if site.is_active => Ok(site),
            _ => Err(ClickGuardError::site_not_found(format!(
                "Site not found: {}",
                key
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ip: &str, score: u8, reason: &str, minutes_ago: i64) -> CandidateRow {
        CandidateRow {
            ip_address: ip.to_string(),
            fraud_score: score,
            fraud_reason: reason.to_string(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_rank_filters_and_orders() {
        let rows = vec![
            row("10.0.0.1", 70, "latest", 1),
            row("10.0.0.1", 70, "older", 10),
            row("10.0.0.1", 70, "oldest", 20),
            row("10.0.0.2", 90, "b", 2),
            row("10.0.0.2", 90, "b", 3),
            row("10.0.0.2", 90, "b", 4),
            row("10.0.0.3", 100, "c", 5),
            row("10.0.0.3", 100, "c", 6),
            row("10.0.0.4", 60, "d", 1),
            row("10.0.0.4", 60, "d", 2),
            row("10.0.0.4", 60, "d", 3),
            row("10.0.0.4", 60, "d", 4),
        ];

        let ranked = rank_block_candidates(&rows, 3, 50);
        let ips: Vec<&str> = ranked.iter().map(|c| c.ip_address.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.4", "10.0.0.2", "10.0.0.1"]);
        assert_eq!(ranked[2].reason, "latest");
        assert_eq!(ranked[1].avg_score, 90.0);
    }

    #[test]
    fn test_rank_respects_limit() {
        let rows: Vec<CandidateRow> = (0..5)
            .flat_map(|i| (0..3).map(move |m| row(&format!("10.1.0.{}", i), 80, "x", m)))
            .collect();
        assert_eq!(rank_block_candidates(&rows, 3, 2).len(), 2);
    }

    #[test]
    fn test_render_csv() {
        let csv = render_csv(&["1.1.1.1".to_string(), "2.2.2.2".to_string()]).unwrap();
        assert_eq!(csv, "ip_address\n1.1.1.1\n2.2.2.2\n");
    }

    #[test]
    fn test_export_format_parse() {
        use std::str::FromStr;
        assert_eq!(ExportFormat::from_str("CSV").unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_str("json").unwrap(), ExportFormat::Json);
        assert!(ExportFormat::from_str("xml").is_err());
    }
}
