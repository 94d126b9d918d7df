//! Site operations for SeaOrmStorage

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::info;

use super::converters::model_to_site;
use super::{SeaOrmStorage, retry};
use crate::errors::{ClickGuardError, Result};
use crate::storage::generate_api_key;
use crate::storage::models::{NewSite, SiteRecord};

use migration::entities::site;

impl SeaOrmStorage {
    /// API key 优先；key 是整数时再按 id 查找
    pub(super) async fn find_site(&self, key: &str) -> Result<Option<SiteRecord>> {
        let db = &self.db;
        let key_owned = key.to_string();

        let by_key = retry::with_retry(&format!("find_site({})", key), self.retry_config, || async {
            site::Entity::find()
                .filter(site::Column::ApiKey.eq(key_owned.as_str()))
                .one(db)
                .await
        })
        .await
        .map_err(|e| ClickGuardError::database_operation(format!("查询站点失败: {}", e)))?;

        if let Some(model) = by_key {
            return Ok(Some(model_to_site(model)));
        }

        let Ok(id) = key.parse::<i64>() else {
            return Ok(None);
        };

        let by_id = retry::with_retry(&format!("find_site_by_id({})", id), self.retry_config, || async {
            site::Entity::find_by_id(id).one(db).await
        })
        .await
        .map_err(|e| ClickGuardError::database_operation(format!("查询站点失败: {}", e)))?;

        Ok(by_id.map(model_to_site))
    }

    pub(super) async fn load_sites(&self) -> Result<Vec<SiteRecord>> {
        let models = site::Entity::find()
            .order_by_asc(site::Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| ClickGuardError::database_operation(format!("加载站点列表失败: {}", e)))?;

        Ok(models.into_iter().map(model_to_site).collect())
    }

    pub(super) async fn insert_site(&self, new_site: NewSite) -> Result<SiteRecord> {
        use sea_orm::ActiveValue::*;

        if new_site.name.trim().is_empty() || new_site.domain.trim().is_empty() {
            return Err(ClickGuardError::validation("站点名称和域名不能为空"));
        }

        let api_key = new_site
            .api_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(generate_api_key);

        let active = site::ActiveModel {
            id: NotSet,
            name: Set(new_site.name.trim().to_string()),
            domain: Set(new_site.domain.trim().to_string()),
            api_key: Set(api_key),
            is_active: Set(true),
            max_clicks_per_hour: Set(new_site.overrides.max_clicks_per_hour),
            min_time_on_site: Set(new_site.overrides.min_time_on_site),
            fraud_score_threshold: Set(new_site.overrides.fraud_score_threshold),
            auto_block_enabled: Set(new_site.overrides.auto_block_enabled),
            created_at: Set(Utc::now()),
        };

        let model = active
            .insert(&self.db)
            .await
            .map_err(|e| ClickGuardError::database_operation(format!("创建站点失败: {}", e)))?;

        info!("Site created: {} ({}) id={}", model.name, model.domain, model.id);
        Ok(model_to_site(model))
    }
}
