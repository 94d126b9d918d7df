//! Tracked site entity
//!
//! 每个站点持有一个 API key，tracker 通过它上报事件。阈值列为空时使用全局配置。

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sites")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub domain: String,
    #[sea_orm(unique)]
    pub api_key: String,
    pub is_active: bool,
    /// Per-site override for the hourly click threshold
    pub max_clicks_per_hour: Option<i64>,
    /// Per-site override for the minimum time on page (seconds)
    pub min_time_on_site: Option<f64>,
    /// Per-site override for the fraud score threshold
    pub fraud_score_threshold: Option<i32>,
    /// Per-site override for auto-blocking
    pub auto_block_enabled: Option<bool>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
