use std::sync::Arc;

use actix_web::{HttpResponse, Responder, web};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error_response;
use crate::blocking::AutoBlockEngine;
use crate::storage::{EventStats, EventStore};

pub const DEFAULT_PERIOD_HOURS: u32 = 24;
pub const MAX_PERIOD_HOURS: u32 = 720;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// 小时数，1-720
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub site_id: i64,
    pub period_hours: u32,
    pub stats: EventStats,
}

/// 解析统计窗口，非法值回退到默认值，越界值截断
pub fn parse_period(raw: Option<&str>) -> u32 {
    raw.and_then(|p| p.trim().parse::<i64>().ok())
        .map(|h| h.clamp(1, MAX_PERIOD_HOURS as i64) as u32)
        .unwrap_or(DEFAULT_PERIOD_HOURS)
}

pub struct StatsService;

impl StatsService {
    pub async fn fraud_stats(
        path: web::Path<String>,
        query: web::Query<StatsQuery>,
        engine: web::Data<Arc<AutoBlockEngine>>,
        store: web::Data<Arc<dyn EventStore>>,
    ) -> impl Responder {
        let site = match engine.require_site(&path.into_inner()).await {
            Ok(site) => site,
            Err(e) => return error_response(&e),
        };
        let period_hours = parse_period(query.period.as_deref());
        let since = Utc::now() - Duration::hours(period_hours as i64);

        match store.event_stats(site.id, since).await {
            Ok(stats) => HttpResponse::Ok().json(StatsResponse {
                site_id: site.id,
                period_hours,
                stats,
            }),
            Err(e) => error_response(&e),
        }
    }
}

pub fn stats_routes() -> actix_web::Scope {
    web::scope("/stats").route("/{site_id}", web::get().to(StatsService::fraud_stats))
}
