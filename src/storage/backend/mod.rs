//! SeaORM storage backend
//!
//! Supports SQLite, MySQL/MariaDB and PostgreSQL. Every query goes through
//! `retry::with_retry` so transient lock/connection errors are retried.

mod blocks;
mod connection;
mod converters;
mod events;
pub mod retry;
mod sites;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use sea_orm::DatabaseConnection;
use tracing::info;

use crate::errors::{ClickGuardError, Result};
use crate::storage::EventStore;
use crate::storage::models::{
    BlockRequest, BlockedIpRecord, CandidateRow, ClickEventRecord, EventFilter, EventStats,
    NewClickEvent, NewSite, SiteRecord,
};

pub use connection::{connect_generic, connect_sqlite, run_migrations};
pub use converters::{event_to_active_model, model_to_block, model_to_event, model_to_site};

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite:")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(ClickGuardError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// SeaORM-based storage backend
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
    backend_name: String,
    /// 站点解析缓存（TTL 60 秒），key 为 API key 或 id 字符串
    site_cache: Cache<String, SiteRecord>,
    retry_config: retry::RetryConfig,
}

impl SeaOrmStorage {
    pub async fn new(database_url: &str, backend_name: &str) -> Result<Self> {
        if database_url.is_empty() {
            return Err(ClickGuardError::database_config("database_url 未设置"));
        }

        let config = crate::config::get_config();
        let retry_config = retry::RetryConfig {
            max_retries: config.database.retry_count,
            base_delay_ms: config.database.retry_base_delay_ms,
            max_delay_ms: config.database.retry_max_delay_ms,
        };

        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            connect_generic(database_url, backend_name, config.database.pool_size).await?
        };

        let storage = SeaOrmStorage {
            db,
            backend_name: backend_name.to_string(),
            site_cache: Cache::builder()
                .time_to_live(Duration::from_secs(60))
                .max_capacity(1000)
                .build(),
            retry_config,
        };

        run_migrations(&storage.db).await?;

        info!(
            "{} storage initialized",
            storage.backend_name.to_uppercase()
        );
        Ok(storage)
    }

    /// 获取数据库连接
    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// 站点变更后清空解析缓存
    pub fn invalidate_site_cache(&self) {
        self.site_cache.invalidate_all();
    }
}

#[async_trait]
impl EventStore for SeaOrmStorage {
    fn backend_name(&self) -> &str {
        &self.backend_name
    }

    async fn resolve_site(&self, key: &str) -> Result<Option<SiteRecord>> {
        if let Some(site) = self.site_cache.get(key) {
            return Ok(Some(site));
        }
        let site = self.find_site(key).await?;
        if let Some(ref site) = site {
            self.site_cache.insert(key.to_string(), site.clone());
        }
        Ok(site)
    }

    async fn list_sites(&self) -> Result<Vec<SiteRecord>> {
        self.load_sites().await
    }

    async fn create_site(&self, site: NewSite) -> Result<SiteRecord> {
        let created = self.insert_site(site).await?;
        self.invalidate_site_cache();
        Ok(created)
    }

    async fn insert_event(&self, event: NewClickEvent) -> Result<i64> {
        self.insert_click_event(event).await
    }

    async fn count_events_since(
        &self,
        site_id: i64,
        filter: &EventFilter,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        self.count_events(site_id, filter, since).await
    }

    async fn query_events_since(
        &self,
        site_id: i64,
        filter: &EventFilter,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClickEventRecord>> {
        self.find_events(site_id, filter, since).await
    }

    async fn block_candidate_rows(
        &self,
        site_id: i64,
        since: DateTime<Utc>,
        score_floor: u8,
    ) -> Result<Vec<CandidateRow>> {
        self.find_candidate_rows(site_id, since, score_floor).await
    }

    async fn query_active_block(
        &self,
        site_id: i64,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockedIpRecord>> {
        self.find_active_block(site_id, ip, now).await
    }

    async fn upsert_block(&self, request: BlockRequest) -> Result<BlockedIpRecord> {
        self.upsert_block_row(request).await
    }

    async fn unblock(&self, site_id: i64, ip: &str, now: DateTime<Utc>) -> Result<bool> {
        self.deactivate_block(site_id, ip, now).await
    }

    async fn list_blocks(&self, site_id: i64, active_only: bool) -> Result<Vec<BlockedIpRecord>> {
        self.find_blocks(site_id, active_only).await
    }

    async fn export_active_ips(
        &self,
        site_id: i64,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        self.find_exportable_ips(site_id, limit, now).await
    }

    async fn expire_stale_blocks(&self, site_id: Option<i64>, now: DateTime<Utc>) -> Result<u64> {
        self.expire_blocks(site_id, now).await
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.delete_old_events(cutoff).await
    }

    async fn event_stats(&self, site_id: i64, since: DateTime<Utc>) -> Result<EventStats> {
        self.compute_stats(site_id, since).await
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await?;
        Ok(())
    }
}
