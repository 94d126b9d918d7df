use std::sync::Arc;

use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::api::{ErrorBody, error_response};
use crate::config::get_config;
use crate::ingestion::{IngestionPipeline, TrackRequest};
use crate::utils::ip::extract_client_ip;

/// 返回给被追踪客户端的结果，只暴露三态
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    pub success: bool,
    pub fraud_score: u8,
    pub status: &'static str,
}

pub struct TrackService;

impl TrackService {
    pub async fn handle(
        req: HttpRequest,
        body: web::Bytes,
        pipeline: web::Data<Arc<IngestionPipeline>>,
    ) -> impl Responder {
        let request: TrackRequest = match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                debug!("Invalid track payload: {}", e);
                return HttpResponse::BadRequest().json(ErrorBody::new("Invalid JSON payload"));
            }
        };

        let config = get_config();
        let ip = extract_client_ip(&req, &config.api.trusted_proxies)
            .unwrap_or_else(|| "unknown".to_string());
        let header_ua = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok());

        match pipeline.ingest(request, &ip, header_ua, Utc::now()).await {
            Ok(outcome) => HttpResponse::Ok().json(TrackResponse {
                success: outcome.accepted,
                fraud_score: outcome.fraud_score,
                status: outcome.verdict.client_status(),
            }),
            Err(e) => error_response(&e),
        }
    }
}

pub fn track_routes() -> actix_web::Scope {
    web::scope("/track").route("", web::post().to(TrackService::handle))
}
