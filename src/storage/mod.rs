//! 事件与封禁存储
//!
//! `EventStore` 是评分引擎、自动封禁和接入流程使用的唯一存储接口。
//! 生产环境使用 SeaORM 后端（SQLite / MySQL / PostgreSQL），测试和基准使用内存实现。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;

pub mod backend;
pub mod memory;
pub mod models;

pub use backend::SeaOrmStorage;
pub use memory::MemoryEventStore;
pub use models::{
    BlockRequest, BlockedIpRecord, CandidateRow, ClickEventRecord, EventFilter, EventStats,
    NewClickEvent, NewSite, SiteRecord, UtmParams,
};

#[async_trait]
pub trait EventStore: Send + Sync {
    fn backend_name(&self) -> &str;

    /// 按 API key 或数字 id 查找站点（包含停用站点）
    async fn resolve_site(&self, key: &str) -> Result<Option<SiteRecord>>;

    async fn list_sites(&self) -> Result<Vec<SiteRecord>>;

    async fn create_site(&self, site: NewSite) -> Result<SiteRecord>;

    /// 返回新事件 id
    async fn insert_event(&self, event: NewClickEvent) -> Result<i64>;

    async fn count_events_since(
        &self,
        site_id: i64,
        filter: &EventFilter,
        since: DateTime<Utc>,
    ) -> Result<u64>;

    /// 按时间倒序返回
    async fn query_events_since(
        &self,
        site_id: i64,
        filter: &EventFilter,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClickEventRecord>>;

    /// 窗口内 verdict = fraud 或 score >= score_floor 的事件
    async fn block_candidate_rows(
        &self,
        site_id: i64,
        since: DateTime<Utc>,
        score_floor: u8,
    ) -> Result<Vec<CandidateRow>>;

    /// 激活且未过期的封禁
    async fn query_active_block(
        &self,
        site_id: i64,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockedIpRecord>>;

    /// 以 (site_id, ip_address) 为键插入或刷新封禁，刷新时重新激活
    async fn upsert_block(&self, request: BlockRequest) -> Result<BlockedIpRecord>;

    /// 软删除；没有激活的封禁时返回 false
    async fn unblock(&self, site_id: i64, ip: &str, now: DateTime<Utc>) -> Result<bool>;

    /// 按封禁时间倒序
    async fn list_blocks(&self, site_id: i64, active_only: bool) -> Result<Vec<BlockedIpRecord>>;

    /// 生效中的封禁 IP，最近封禁的在前
    async fn export_active_ips(
        &self,
        site_id: i64,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>>;

    /// 将 auto_unblock_at <= now 的激活封禁置为失效；site_id 为空时处理所有站点
    async fn expire_stale_blocks(&self, site_id: Option<i64>, now: DateTime<Utc>) -> Result<u64>;

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn event_stats(&self, site_id: i64, since: DateTime<Utc>) -> Result<EventStats>;

    /// 健康检查
    async fn ping(&self) -> Result<()>;
}

pub struct StorageFactory;

impl StorageFactory {
    pub async fn create() -> Result<Arc<SeaOrmStorage>> {
        let config = crate::config::get_config();
        let database_url = &config.database.database_url;

        // 从 URL 自动推断数据库类型
        let backend_type = backend::infer_backend_from_url(database_url)?;

        let storage = SeaOrmStorage::new(database_url, &backend_type).await?;
        Ok(Arc::new(storage))
    }
}

/// 生成站点 API key
pub fn generate_api_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
