//! 封禁管理接口

use std::str::FromStr;
use std::sync::Arc;

use actix_web::{HttpResponse, Responder, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::{ErrorBody, error_response};
use crate::blocking::{AutoBlockEngine, ExportFormat, render_csv};
use crate::config::AD_NETWORK_EXPORT_CAP;
use crate::storage::BlockedIpRecord;

/// 广告平台排除列表的上限

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub active: Option<String>,
}

/// 时长：数字或数字字符串（小时）
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationHours {
    Number(u32),
    Text(String),
}

impl DurationHours {
    fn hours(&self) -> Option<u32> {
        match self {
            DurationHours::Number(h) => Some(*h),
            DurationHours::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBody {
    pub ip: Option<String>,
    pub reason: Option<String>,
    pub auto_duration: Option<DurationHours>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BlockedList {
    pub blocked: Vec<BlockedIpRecord>,
}

#[derive(Debug, Serialize)]
pub struct BlockedEntry {
    pub blocked: BlockedIpRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub ips: Vec<String>,
    pub count: usize,
    pub max_yandex: u32,
    pub format: &'static str,
}

pub struct BlockedService;

impl BlockedService {
    pub async fn list(
        path: web::Path<String>,
        query: web::Query<ListQuery>,
        engine: web::Data<Arc<AutoBlockEngine>>,
    ) -> impl Responder {
        let site = match engine.require_site(&path.into_inner()).await {
            Ok(site) => site,
            Err(e) => return error_response(&e),
        };
        let active_only = query.active.as_deref().is_none_or(|v| v != "false");

        match engine.list(site.id, active_only).await {
            Ok(blocked) => HttpResponse::Ok().json(BlockedList { blocked }),
            Err(e) => error_response(&e),
        }
    }

    pub async fn block(
        path: web::Path<String>,
        body: web::Json<BlockBody>,
        engine: web::Data<Arc<AutoBlockEngine>>,
    ) -> impl Responder {
        let body = body.into_inner();
        let Some(ip) = body.ip.filter(|ip| !ip.trim().is_empty()) else {
            return HttpResponse::BadRequest().json(ErrorBody::new("IP address is required"));
        };
        let site = match engine.require_site(&path.into_inner()).await {
            Ok(site) => site,
            Err(e) => return error_response(&e),
        };
        let hours = body.auto_duration.as_ref().and_then(DurationHours::hours);

        match engine
            .block_manual(site.id, &ip, body.reason, hours, Utc::now())
            .await
        {
            Ok(blocked) => HttpResponse::Created().json(BlockedEntry { blocked }),
            Err(e) => error_response(&e),
        }
    }

    pub async fn unblock(
        path: web::Path<(String, String)>,
        engine: web::Data<Arc<AutoBlockEngine>>,
    ) -> impl Responder {
        let (site_key, ip) = path.into_inner();
        let site = match engine.require_site(&site_key).await {
            Ok(site) => site,
            Err(e) => return error_response(&e),
        };

        match engine.unblock(site.id, &ip, Utc::now()).await {
            Ok(true) => HttpResponse::Ok().json(serde_json::json!({
                "message": "IP unblocked successfully",
                "ip": ip,
            })),
            Ok(false) => HttpResponse::NotFound().json(ErrorBody::new("Blocked IP not found")),
            Err(e) => error_response(&e),
        }
    }

    pub async fn export(
        path: web::Path<String>,
        query: web::Query<ExportQuery>,
        engine: web::Data<Arc<AutoBlockEngine>>,
    ) -> impl Responder {
        let format = match query.format.as_deref() {
            None => ExportFormat::default(),
            Some(raw) => match ExportFormat::from_str(raw) {
                Ok(f) => f,
                Err(_) => {
                    return HttpResponse::BadRequest()
                        .json(ErrorBody::new(format!("Unsupported export format: {}", raw)));
                }
            },
        };
        let site = match engine.require_site(&path.into_inner()).await {
            Ok(site) => site,
            Err(e) => return error_response(&e),
        };
        let ips = match engine.export_ips(site.id, Utc::now()).await {
            Ok(ips) => ips,
            Err(e) => return error_response(&e),
        };

        match format {
            ExportFormat::Json => HttpResponse::Ok().json(ExportResponse {
                count: ips.len(),
                ips,
                max_yandex: AD_NETWORK_EXPORT_CAP,
                format: "yandex_direct",
            }),
            ExportFormat::Csv => match render_csv(&ips) {
                Ok(body) => HttpResponse::Ok()
                    .content_type("text/csv; charset=utf-8")
                    .append_header((
                        "Content-Disposition",
                        format!("attachment; filename=\"blocked-ips-{}.csv\"", site.id),
                    ))
                    .body(body),
                Err(e) => error_response(&e),
            },
        }
    }

    /// 手动触发一次自动封禁（同步执行并返回结果）
    pub async fn run_auto_block(
        path: web::Path<String>,
        engine: web::Data<Arc<AutoBlockEngine>>,
    ) -> impl Responder {
        let site = match engine.require_site(&path.into_inner()).await {
            Ok(site) => site,
            Err(e) => return error_response(&e),
        };

        match engine.run_for_site(&site, Utc::now()).await {
            Ok(report) => HttpResponse::Ok().json(report),
            Err(e) => error_response(&e),
        }
    }
}

pub fn blocked_routes() -> actix_web::Scope {
    web::scope("/blocked")
        .route("/{site_id}", web::get().to(BlockedService::list))
        .route("/{site_id}", web::post().to(BlockedService::block))
        .route("/{site_id}/export", web::get().to(BlockedService::export))
        .route(
            "/{site_id}/auto-block",
            web::post().to(BlockedService::run_auto_block),
        )
        .route("/{site_id}/{ip}", web::delete().to(BlockedService::unblock))
}
