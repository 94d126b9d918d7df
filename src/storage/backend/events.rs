//! Click event operations for SeaOrmStorage
//!
//! 事件只追加不修改；保留期清理按批删除，避免长事务。

use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, ExprTrait, FromQueryResult, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, sea_query::Expr,
};
use tracing::{debug, warn};

use super::converters::{event_to_active_model, model_to_event};
use super::{SeaOrmStorage, retry};
use crate::detection::Verdict;
use crate::errors::{ClickGuardError, Result};
use crate::storage::models::{CandidateRow, ClickEventRecord, EventFilter, EventStats, NewClickEvent};

use migration::entities::click_event;

const DELETE_BATCH_SIZE: u64 = 10_000;
const DELETE_MAX_ITERATIONS: u32 = 1000;

/// 统计窗口聚合结果
#[derive(Debug, FromQueryResult)]
struct StatsRow {
    total_events: i64,
    fraud_events: Option<i64>,
    suspicious_events: Option<i64>,
    low_confidence_events: Option<i64>,
    unique_ips: i64,
    unique_fingerprints: i64,
    score_sum: Option<i64>,
}

#[derive(Debug, FromQueryResult)]
struct CandidateQueryRow {
    ip_address: String,
    fraud_score: i32,
    fraud_reason: String,
    created_at: DateTime<Utc>,
}

fn window_condition(site_id: i64, filter: &EventFilter, since: DateTime<Utc>) -> Condition {
    let mut condition = Condition::all()
        .add(click_event::Column::SiteId.eq(site_id))
        .add(click_event::Column::CreatedAt.gte(since));

    if let Some(ref ip) = filter.ip_address {
        condition = condition.add(click_event::Column::IpAddress.eq(ip.as_str()));
    }
    if let Some(ref fp) = filter.fingerprint_hash {
        condition = condition.add(click_event::Column::FingerprintHash.eq(fp.as_str()));
    }
    if filter.fraud_only {
        condition = condition.add(click_event::Column::Verdict.eq(Verdict::Fraud.as_ref()));
    }
    condition
}

fn verdict_count(verdict: Verdict) -> Expr {
    Expr::case(click_event::Column::Verdict.eq(verdict.as_ref()), 1)
        .finally(0)
        .sum()
}

impl SeaOrmStorage {
    pub(super) async fn insert_click_event(&self, event: NewClickEvent) -> Result<i64> {
        let db = &self.db;
        let active = event_to_active_model(&event);

        let result = retry::with_retry("insert_event", self.retry_config, || async {
            click_event::Entity::insert(active.clone()).exec(db).await
        })
        .await
        .map_err(|e| ClickGuardError::database_operation(format!("写入点击事件失败: {}", e)))?;

        Ok(result.last_insert_id)
    }

    pub(super) async fn count_events(
        &self,
        site_id: i64,
        filter: &EventFilter,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let db = &self.db;
        let condition = window_condition(site_id, filter, since);

        retry::with_retry("count_events", self.retry_config, || async {
            click_event::Entity::find()
                .filter(condition.clone())
                .count(db)
                .await
        })
        .await
        .map_err(|e| ClickGuardError::database_operation(format!("统计点击事件失败: {}", e)))
    }

    pub(super) async fn find_events(
        &self,
        site_id: i64,
        filter: &EventFilter,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClickEventRecord>> {
        let models = click_event::Entity::find()
            .filter(window_condition(site_id, filter, since))
            .order_by_desc(click_event::Column::CreatedAt)
            .order_by_desc(click_event::Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| ClickGuardError::database_operation(format!("查询点击事件失败: {}", e)))?;

        Ok(models.into_iter().map(model_to_event).collect())
    }

    pub(super) async fn find_candidate_rows(
        &self,
        site_id: i64,
        since: DateTime<Utc>,
        score_floor: u8,
    ) -> Result<Vec<CandidateRow>> {
        let rows = click_event::Entity::find()
            .select_only()
            .column(click_event::Column::IpAddress)
            .column(click_event::Column::FraudScore)
            .column(click_event::Column::FraudReason)
            .column(click_event::Column::CreatedAt)
            .filter(click_event::Column::SiteId.eq(site_id))
            .filter(click_event::Column::CreatedAt.gte(since))
            .filter(
                Condition::any()
                    .add(click_event::Column::Verdict.eq(Verdict::Fraud.as_ref()))
                    .add(click_event::Column::FraudScore.gte(score_floor as i32)),
            )
            .order_by_desc(click_event::Column::CreatedAt)
            .into_model::<CandidateQueryRow>()
            .all(&self.db)
            .await
            .map_err(|e| ClickGuardError::database_operation(format!("查询封禁候选失败: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| CandidateRow {
                ip_address: row.ip_address,
                fraud_score: row.fraud_score.clamp(0, 100) as u8,
                fraud_reason: row.fraud_reason,
                created_at: row.created_at,
            })
            .collect())
    }

    /// 删除 cutoff 之前的事件（分批）
    pub(super) async fn delete_old_events(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let db = &self.db;
        let mut total_deleted = 0u64;
        let mut iterations = 0;

        loop {
            if iterations >= DELETE_MAX_ITERATIONS {
                warn!(
                    "Event cleanup reached max iterations {} (deleted {} rows)",
                    DELETE_MAX_ITERATIONS, total_deleted
                );
                break;
            }

            let ids: Vec<i64> = click_event::Entity::find()
                .select_only()
                .column(click_event::Column::Id)
                .filter(click_event::Column::CreatedAt.lt(cutoff))
                .order_by_asc(click_event::Column::Id)
                .limit(DELETE_BATCH_SIZE)
                .into_tuple()
                .all(db)
                .await
                .map_err(|e| ClickGuardError::database_operation(format!("查询过期事件失败: {}", e)))?;

            if ids.is_empty() {
                break;
            }

            let deleted = click_event::Entity::delete_many()
                .filter(click_event::Column::Id.is_in(ids))
                .exec(db)
                .await
                .map_err(|e| ClickGuardError::database_operation(format!("删除过期事件失败: {}", e)))?
                .rows_affected;

            total_deleted += deleted;
            iterations += 1;

            debug!(
                "Event cleanup batch {}: deleted {} rows (total {})",
                iterations, deleted, total_deleted
            );

            if deleted < DELETE_BATCH_SIZE {
                break;
            }

            tokio::time::sleep(StdDuration::from_millis(100)).await;
        }

        Ok(total_deleted)
    }

    pub(super) async fn compute_stats(
        &self,
        site_id: i64,
        since: DateTime<Utc>,
    ) -> Result<EventStats> {
        let row = click_event::Entity::find()
            .select_only()
            .column_as(click_event::Column::Id.count(), "total_events")
            .column_as(verdict_count(Verdict::Fraud), "fraud_events")
            .column_as(verdict_count(Verdict::Suspicious), "suspicious_events")
            .column_as(
                Expr::case(click_event::Column::LowConfidence.eq(true), 1)
                    .finally(0)
                    .sum(),
                "low_confidence_events",
            )
            .column_as(Expr::cust("COUNT(DISTINCT ip_address)"), "unique_ips")
            .column_as(
                Expr::cust("COUNT(DISTINCT fingerprint_hash)"),
                "unique_fingerprints",
            )
            .column_as(click_event::Column::FraudScore.sum(), "score_sum")
            .filter(click_event::Column::SiteId.eq(site_id))
            .filter(click_event::Column::CreatedAt.gte(since))
            .into_model::<StatsRow>()
            .one(&self.db)
            .await
            .map_err(|e| ClickGuardError::database_operation(format!("统计查询失败: {}", e)))?;

        let Some(row) = row else {
            return Ok(EventStats::default());
        };

        let total = Ord::max(row.total_events, 0) as u64;
        let mut stats = EventStats {
            total_events: total,
            fraud_events: Ord::max(row.fraud_events.unwrap_or(0), 0) as u64,
            suspicious_events: Ord::max(row.suspicious_events.unwrap_or(0), 0) as u64,
            low_confidence_events: Ord::max(row.low_confidence_events.unwrap_or(0), 0) as u64,
            unique_ips: Ord::max(row.unique_ips, 0) as u64,
            unique_fingerprints: Ord::max(row.unique_fingerprints, 0) as u64,
            avg_fraud_score: if total == 0 {
                0.0
            } else {
                row.score_sum.unwrap_or(0) as f64 / total as f64
            },
            fraud_rate: 0.0,
        };
        stats.compute_fraud_rate();
        Ok(stats)
    }
}
