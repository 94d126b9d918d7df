//! HTTP 接口
//!
//! - `POST /api/track`：tracker 上报
//! - `/api/blocked/{site}`：封禁列表、手动封禁/解封、导出、手动触发自动封禁
//! - `GET /api/stats/{site}`：欺诈统计
//! - `/health`：健康检查

pub mod services;

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::errors::ClickGuardError;

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

pub fn status_for(err: &ClickGuardError) -> StatusCode {
    match err {
        ClickGuardError::Validation(_) => StatusCode::BAD_REQUEST,
        ClickGuardError::SiteNotFound(_) => StatusCode::NOT_FOUND,
        ClickGuardError::Blocked(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 将领域错误映射为 HTTP 响应；服务端错误只返回通用信息
pub fn error_response(err: &ClickGuardError) -> HttpResponse {
    let status = status_for(err);
    let body = match err {
        ClickGuardError::Validation(msg) => ErrorBody::new(msg.clone()),
        ClickGuardError::SiteNotFound(_) => ErrorBody::new("Site not found"),
        ClickGuardError::Blocked(_) => ErrorBody::new("Access denied"),
        other => {
            error!("Request failed: {}", other.format_simple());
            ErrorBody::new("Internal server error")
        }
    };
    HttpResponse::build(status).json(body)
}
