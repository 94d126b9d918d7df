use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, trace};

use crate::blocking::{AutoBlockQueue, QueueStats};
use crate::ingestion::IngestionPipeline;
use crate::storage::EventStore;

// 应用启动时间
#[derive(Clone, Debug)]
pub struct AppStartTime {
    pub start_datetime: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCheck {
    pub status: &'static str,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime: u64,
    pub uptime_human: String,
    pub storage: StorageCheck,
    pub rules_version: String,
    /// 被封禁 IP 的请求次数（进程内计数）
    pub blocked_attempts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_block_queue: Option<QueueStats>,
    pub response_time_ms: u64,
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    match (days, hours, minutes) {
        (0, 0, 0) => format!("{}s", seconds),
        (0, 0, m) => format!("{}m", m),
        (0, h, m) => format!("{}h{}m", h, m),
        (d, h, _) => format!("{}d{}h", d, h),
    }
}

pub struct HealthService;

impl HealthService {
    pub async fn health_check(
        store: web::Data<Arc<dyn EventStore>>,
        pipeline: web::Data<Arc<IngestionPipeline>>,
        queue: Option<web::Data<Arc<AutoBlockQueue>>>,
        app_start_time: web::Data<AppStartTime>,
    ) -> impl Responder {
        let start_time = Instant::now();
        trace!("Received health check request");

        let backend = store.backend_name().to_string();
        let storage = match tokio::time::timeout(Duration::from_secs(5), store.ping()).await {
            Ok(Ok(())) => StorageCheck {
                status: "healthy",
                backend,
                error: None,
            },
            Ok(Err(e)) => {
                error!("Storage health check failed: {}", e);
                StorageCheck {
                    status: "unhealthy",
                    backend,
                    error: Some(format!("database error: {}", e)),
                }
            }
            Err(_) => {
                error!("Storage health check timeout");
                StorageCheck {
                    status: "unhealthy",
                    backend,
                    error: Some("timeout".to_string()),
                }
            }
        };

        let now = Utc::now();
        let uptime = (now - app_start_time.start_datetime).num_seconds().max(0) as u64;
        let is_healthy = storage.status == "healthy";

        let body = HealthResponse {
            status: storage.status,
            timestamp: now.to_rfc3339(),
            uptime,
            uptime_human: format_uptime(uptime),
            storage,
            rules_version: pipeline.rules_version(),
            blocked_attempts: pipeline.blocked_attempts(),
            auto_block_queue: queue.map(|q| q.stats()),
            response_time_ms: start_time.elapsed().as_millis() as u64,
        };

        let status = if is_healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        HttpResponse::build(status).json(body)
    }

    pub async fn liveness_check() -> impl Responder {
        HttpResponse::NoContent().finish()
    }
}

pub fn health_routes() -> actix_web::Scope {
    web::scope("/health")
        .route("", web::get().to(HealthService::health_check))
        .route("", web::head().to(HealthService::health_check))
        .route("/live", web::get().to(HealthService::liveness_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m");
        assert_eq!(format_uptime(3 * 3600 + 60 * 5), "3h5m");
        assert_eq!(format_uptime(2 * 86_400 + 3600), "2d1h");
    }
}
