//! 内存存储
//!
//! 语义与 SeaORM 后端一致，用于单元测试、集成测试和基准。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::models::{
    BlockRequest, BlockedIpRecord, CandidateRow, ClickEventRecord, EventFilter, EventStats,
    NewClickEvent, NewSite, SiteRecord,
};
use super::{EventStore, generate_api_key};
use crate::detection::Verdict;
use crate::errors::{ClickGuardError, Result};

#[derive(Default)]
pub struct MemoryEventStore {
    sites: RwLock<Vec<SiteRecord>>,
    events: RwLock<Vec<ClickEventRecord>>,
    blocks: RwLock<HashMap<(i64, String), BlockedIpRecord>>,
    next_site_id: AtomicI64,
    next_event_id: AtomicI64,
    next_block_id: AtomicI64,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前事件总数
    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    /// 停用站点
    pub fn deactivate_site(&self, site_id: i64) -> bool {
        let mut sites = self.sites.write();
        match sites.iter_mut().find(|s| s.id == site_id) {
            Some(site) => {
                site.is_active = false;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn resolve_site(&self, key: &str) -> Result<Option<SiteRecord>> {
        let sites = self.sites.read();
        if let Some(site) = sites.iter().find(|s| s.api_key == key) {
            return Ok(Some(site.clone()));
        }
        Ok(key
            .parse::<i64>()
            .ok()
            .and_then(|id| sites.iter().find(|s| s.id == id).cloned()))
    }

    async fn list_sites(&self) -> Result<Vec<SiteRecord>> {
        Ok(self.sites.read().clone())
    }

    async fn create_site(&self, site: NewSite) -> Result<SiteRecord> {
        if site.name.trim().is_empty() || site.domain.trim().is_empty() {
            return Err(ClickGuardError::validation("站点名称和域名不能为空"));
        }
        let api_key = site
            .api_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(generate_api_key);

        let mut sites = self.sites.write();
        if sites.iter().any(|s| s.api_key == api_key) {
            return Err(ClickGuardError::database_operation(format!(
                "API key 已存在: {}",
                api_key
            )));
        }

        let record = SiteRecord {
            id: self.next_site_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: site.name.trim().to_string(),
            domain: site.domain.trim().to_string(),
            api_key,
            is_active: true,
            max_clicks_per_hour: site.overrides.max_clicks_per_hour,
            min_time_on_site: site.overrides.min_time_on_site,
            fraud_score_threshold: site.overrides.fraud_score_threshold,
            auto_block_enabled: site.overrides.auto_block_enabled,
            created_at: Utc::now(),
        };
        sites.push(record.clone());
        Ok(record)
    }

    async fn insert_event(&self, event: NewClickEvent) -> Result<i64> {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.events
            .write()
            .push(ClickEventRecord::from_new(id, event));
        Ok(id)
    }

    async fn count_events_since(
        &self,
        site_id: i64,
        filter: &EventFilter,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| e.site_id == site_id && e.created_at >= since && filter.matches(e))
            .count() as u64)
    }

    async fn query_events_since(
        &self,
        site_id: i64,
        filter: &EventFilter,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClickEventRecord>> {
        let mut events: Vec<ClickEventRecord> = self
            .events
            .read()
            .iter()
            .filter(|e| e.site_id == site_id && e.created_at >= since && filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(events)
    }

    async fn block_candidate_rows(
        &self,
        site_id: i64,
        since: DateTime<Utc>,
        score_floor: u8,
    ) -> Result<Vec<CandidateRow>> {
        let mut rows: Vec<CandidateRow> = self
            .events
            .read()
            .iter()
            .filter(|e| {
                e.site_id == site_id
                    && e.created_at >= since
                    && (e.verdict == Verdict::Fraud || e.fraud_score >= score_floor)
            })
            .map(|e| CandidateRow {
                ip_address: e.ip_address.clone(),
                fraud_score: e.fraud_score,
                fraud_reason: e.fraud_reason.clone(),
                created_at: e.created_at,
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn query_active_block(
        &self,
        site_id: i64,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockedIpRecord>> {
        Ok(self
            .blocks
            .read()
            .get(&(site_id, ip.to_string()))
            .filter(|b| b.is_in_force(now))
            .cloned())
    }

    async fn upsert_block(&self, request: BlockRequest) -> Result<BlockedIpRecord> {
        let auto_unblock_at = request.auto_unblock_at()?;
        let mut blocks = self.blocks.write();
        let key = (request.site_id, request.ip_address.clone());
        let id = match blocks.get(&key) {
            Some(existing) => existing.id,
            None => self.next_block_id.fetch_add(1, Ordering::SeqCst) + 1,
        };

        let record = BlockedIpRecord {
            id,
            site_id: request.site_id,
            ip_address: request.ip_address.clone(),
            reason: request.reason.clone(),
            auto_blocked: request.auto_blocked,
            auto_unblock_at,
            is_active: true,
            blocked_at: request.now,
            unblocked_at: None,
        };
        blocks.insert(key, record.clone());
        Ok(record)
    }

    async fn unblock(&self, site_id: i64, ip: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut blocks = self.blocks.write();
        match blocks.get_mut(&(site_id, ip.to_string())) {
            Some(block) if block.is_active => {
                block.is_active = false;
                block.unblocked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_blocks(&self, site_id: i64, active_only: bool) -> Result<Vec<BlockedIpRecord>> {
        let now = Utc::now();
        let mut blocks: Vec<BlockedIpRecord> = self
            .blocks
            .read()
            .values()
            .filter(|b| b.site_id == site_id && (!active_only || b.is_in_force(now)))
            .cloned()
            .collect();
        blocks.sort_by(|a, b| b.blocked_at.cmp(&a.blocked_at).then(b.id.cmp(&a.id)));
        Ok(blocks)
    }

    async fn export_active_ips(
        &self,
        site_id: i64,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut active: Vec<BlockedIpRecord> = self
            .blocks
            .read()
            .values()
            .filter(|b| b.site_id == site_id && b.is_in_force(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.blocked_at.cmp(&a.blocked_at).then(b.id.cmp(&a.id)));
        Ok(active
            .into_iter()
            .take(limit as usize)
            .map(|b| b.ip_address)
            .collect())
    }

    async fn expire_stale_blocks(&self, site_id: Option<i64>, now: DateTime<Utc>) -> Result<u64> {
        let mut expired = 0;
        for block in self.blocks.write().values_mut() {
            if site_id.is_some_and(|id| id != block.site_id) {
                continue;
            }
            if block.is_active && block.auto_unblock_at.is_some_and(|at| at <= now) {
                block.is_active = false;
                block.unblocked_at = Some(now);
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|e| e.created_at >= cutoff);
        Ok((before - events.len()) as u64)
    }

    async fn event_stats(&self, site_id: i64, since: DateTime<Utc>) -> Result<EventStats> {
        let events = self.events.read();
        let window: Vec<&ClickEventRecord> = events
            .iter()
            .filter(|e| e.site_id == site_id && e.created_at >= since)
            .collect();

        let total = window.len() as u64;
        let score_sum: u64 = window.iter().map(|e| e.fraud_score as u64).sum();
        let mut stats = EventStats {
            total_events: total,
            fraud_events: window.iter().filter(|e| e.verdict == Verdict::Fraud).count() as u64,
            suspicious_events: window
                .iter()
                .filter(|e| e.verdict == Verdict::Suspicious)
                .count() as u64,
            low_confidence_events: window.iter().filter(|e| e.low_confidence).count() as u64,
            unique_ips: window
                .iter()
                .map(|e| e.ip_address.as_str())
                .collect::<HashSet<_>>()
                .len() as u64,
            unique_fingerprints: window
                .iter()
                .map(|e| e.fingerprint_hash.as_str())
                .collect::<HashSet<_>>()
                .len() as u64,
            avg_fraud_score: if total == 0 {
                0.0
            } else {
                score_sum as f64 / total as f64
            },
            fraud_rate: 0.0,
        };
        stats.compute_fraud_rate();
        Ok(stats)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BehaviorMetrics;
    use crate::storage::UtmParams;
    use chrono::Duration;

    fn event(ip: &str, verdict: Verdict, score: u8, at: DateTime<Utc>) -> NewClickEvent {
        NewClickEvent {
            site_id: 1,
            ip_address: ip.to_string(),
            fingerprint_hash: format!("fp-{}", ip),
            user_agent: None,
            url: None,
            referrer: None,
            behavior: BehaviorMetrics::default(),
            utm: UtmParams::default(),
            fraud_score: score,
            verdict,
            fraud_reason: "test".to_string(),
            low_confidence: false,
            fingerprint_data: None,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_site_resolution_by_key_and_id() {
        let store = MemoryEventStore::new();
        let site = store
            .create_site(NewSite {
                name: "Shop".to_string(),
                domain: "shop.example".to_string(),
                api_key: Some("key-1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(store.resolve_site("key-1").await.unwrap().unwrap().id, site.id);
        assert_eq!(
            store.resolve_site(&site.id.to_string()).await.unwrap().unwrap().api_key,
            "key-1"
        );
        assert!(store.resolve_site("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_respects_window_and_filter() {
        let store = MemoryEventStore::new();
        let now = Utc::now();
        store.insert_event(event("1.1.1.1", Verdict::Fraud, 80, now)).await.unwrap();
        store
            .insert_event(event("1.1.1.1", Verdict::Legitimate, 0, now - Duration::hours(2)))
            .await
            .unwrap();
        store.insert_event(event("2.2.2.2", Verdict::Fraud, 90, now)).await.unwrap();

        let since = now - Duration::hours(1);
        let by_ip = EventFilter::by_ip("1.1.1.1");
        assert_eq!(store.count_events_since(1, &by_ip, since).await.unwrap(), 1);
        assert_eq!(
            store
                .count_events_since(1, &by_ip, now - Duration::days(1))
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store
                .count_events_since(1, &EventFilter::default().fraud_only(), since)
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_upsert_reactivates_block() {
        let store = MemoryEventStore::new();
        let now = Utc::now();
        let request = BlockRequest {
            site_id: 1,
            ip_address: "3.3.3.3".to_string(),
            reason: Some("manual".to_string()),
            auto_blocked: false,
            duration: None,
            now,
        };
        let first = store.upsert_block(request.clone()).await.unwrap();
        assert!(store.unblock(1, "3.3.3.3", now).await.unwrap());
        assert!(!store.unblock(1, "3.3.3.3", now).await.unwrap());
        assert!(store.query_active_block(1, "3.3.3.3", now).await.unwrap().is_none());

        let second = store.upsert_block(request).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.is_active);
        assert!(second.unblocked_at.is_none());
    }
}
