//! Blocked IP entity
//!
//! (site_id, ip_address) 唯一；解除封禁只做软删除（is_active = false）。

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "blocked_ips")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub site_id: i64,
    pub ip_address: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub reason: Option<String>,
    pub auto_blocked: bool,
    /// NULL means the block never expires on its own
    pub auto_unblock_at: Option<DateTimeUtc>,
    pub is_active: bool,
    pub blocked_at: DateTimeUtc,
    pub unblocked_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
