//! Blocked IP operations for SeaOrmStorage

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    sea_query::{Expr, OnConflict},
};
use tracing::info;

use super::converters::model_to_block;
use super::{SeaOrmStorage, retry};
use crate::errors::{ClickGuardError, Result};
use crate::storage::models::{BlockRequest, BlockedIpRecord};

use migration::entities::blocked_ip;

/// 激活且尚未到解封时间
fn in_force_condition(now: DateTime<Utc>) -> Condition {
    Condition::all()
        .add(blocked_ip::Column::IsActive.eq(true))
        .add(
            Condition::any()
                .add(blocked_ip::Column::AutoUnblockAt.is_null())
                .add(blocked_ip::Column::AutoUnblockAt.gt(now)),
        )
}

impl SeaOrmStorage {
    pub(super) async fn find_active_block(
        &self,
        site_id: i64,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockedIpRecord>> {
        let db = &self.db;
        let ip_owned = ip.to_string();

        let model = retry::with_retry(&format!("find_active_block({})", ip), self.retry_config, || async {
            blocked_ip::Entity::find()
                .filter(blocked_ip::Column::SiteId.eq(site_id))
                .filter(blocked_ip::Column::IpAddress.eq(ip_owned.as_str()))
                .filter(in_force_condition(now))
                .one(db)
                .await
        })
        .await
        .map_err(|e| ClickGuardError::database_operation(format!("查询封禁状态失败: {}", e)))?;

        Ok(model.map(model_to_block))
    }

    /// (site_id, ip_address) 冲突时刷新原有记录并重新激活
    pub(super) async fn upsert_block_row(&self, request: BlockRequest) -> Result<BlockedIpRecord> {
        use sea_orm::ActiveValue::*;

        let db = &self.db;
        let active = blocked_ip::ActiveModel {
            id: NotSet,
            site_id: Set(request.site_id),
            ip_address: Set(request.ip_address.clone()),
            reason: Set(request.reason.clone()),
            auto_blocked: Set(request.auto_blocked),
            auto_unblock_at: Set(request.auto_unblock_at()?),
            is_active: Set(true),
            blocked_at: Set(request.now),
            unblocked_at: Set(None),
        };

        retry::with_retry(
            &format!("upsert_block({})", request.ip_address),
            self.retry_config,
            || async {
                blocked_ip::Entity::insert(active.clone())
                    .on_conflict(
                        OnConflict::columns([
                            blocked_ip::Column::SiteId,
                            blocked_ip::Column::IpAddress,
                        ])
                        .update_columns([
                            blocked_ip::Column::Reason,
                            blocked_ip::Column::AutoBlocked,
                            blocked_ip::Column::AutoUnblockAt,
                            blocked_ip::Column::IsActive,
                            blocked_ip::Column::BlockedAt,
                            blocked_ip::Column::UnblockedAt,
                        ])
                        .to_owned(),
                    )
                    .exec_without_returning(db)
                    .await
            },
        )
        .await
        .map_err(|e| {
            ClickGuardError::database_operation(format!(
                "封禁 IP '{}' 失败: {}",
                request.ip_address, e
            ))
        })?;

        let model = blocked_ip::Entity::find()
            .filter(blocked_ip::Column::SiteId.eq(request.site_id))
            .filter(blocked_ip::Column::IpAddress.eq(request.ip_address.as_str()))
            .one(db)
            .await
            .map_err(|e| ClickGuardError::database_operation(format!("读取封禁记录失败: {}", e)))?
            .ok_or_else(|| {
                ClickGuardError::database_operation(format!(
                    "封禁记录写入后不存在: {}",
                    request.ip_address
                ))
            })?;

        Ok(model_to_block(model))
    }

    pub(super) async fn deactivate_block(
        &self,
        site_id: i64,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = blocked_ip::Entity::update_many()
            .col_expr(blocked_ip::Column::IsActive, Expr::value(false))
            .col_expr(blocked_ip::Column::UnblockedAt, Expr::value(now))
            .filter(blocked_ip::Column::SiteId.eq(site_id))
            .filter(blocked_ip::Column::IpAddress.eq(ip))
            .filter(blocked_ip::Column::IsActive.eq(true))
            .exec(&self.db)
            .await
            .map_err(|e| ClickGuardError::database_operation(format!("解除封禁失败: {}", e)))?;

        Ok(result.rows_affected > 0)
    }

    pub(super) async fn find_blocks(
        &self,
        site_id: i64,
        active_only: bool,
    ) -> Result<Vec<BlockedIpRecord>> {
        let mut query = blocked_ip::Entity::find().filter(blocked_ip::Column::SiteId.eq(site_id));
        if active_only {
            query = query.filter(in_force_condition(Utc::now()));
        }

        let models = query
            .order_by_desc(blocked_ip::Column::BlockedAt)
            .all(&self.db)
            .await
            .map_err(|e| ClickGuardError::database_operation(format!("查询封禁列表失败: {}", e)))?;

        Ok(models.into_iter().map(model_to_block).collect())
    }

    pub(super) async fn find_exportable_ips(
        &self,
        site_id: i64,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        blocked_ip::Entity::find()
            .select_only()
            .column(blocked_ip::Column::IpAddress)
            .filter(blocked_ip::Column::SiteId.eq(site_id))
            .filter(in_force_condition(now))
            .order_by_desc(blocked_ip::Column::BlockedAt)
            .limit(limit as u64)
            .into_tuple::<String>()
            .all(&self.db)
            .await
            .map_err(|e| ClickGuardError::database_operation(format!("导出封禁 IP 失败: {}", e)))
    }

    pub(super) async fn expire_blocks(
        &self,
        site_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut update = blocked_ip::Entity::update_many()
            .col_expr(blocked_ip::Column::IsActive, Expr::value(false))
            .col_expr(blocked_ip::Column::UnblockedAt, Expr::value(now))
            .filter(blocked_ip::Column::IsActive.eq(true))
            .filter(blocked_ip::Column::AutoUnblockAt.is_not_null())
            .filter(blocked_ip::Column::AutoUnblockAt.lte(now));
        if let Some(site_id) = site_id {
            update = update.filter(blocked_ip::Column::SiteId.eq(site_id));
        }

        let expired = update
            .exec(&self.db)
            .await
            .map_err(|e| ClickGuardError::database_operation(format!("过期封禁清理失败: {}", e)))?
            .rows_affected;

        if expired > 0 {
            info!("Expired {} blocks", expired);
        }
        Ok(expired)
    }
}
