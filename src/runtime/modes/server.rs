//! Server mode
//!
//! This module contains the HTTP server startup logic.
//! It wires the scoring services into actix-web and serves `/api` and `/health`.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{
    App, HttpServer,
    middleware::{Compress, DefaultHeaders},
    web,
};
use anyhow::Result;
use tracing::warn;

use crate::api::services::{AppStartTime, api_routes, health_routes};
use crate::runtime::lifetime;

/// Validate CORS configuration at startup (runs once)
fn validate_cors_config(allowed_origins: &[String]) {
    if allowed_origins.is_empty() {
        warn!(
            "CORS allowed_origins is empty. \
            Trackers embedded on other domains will be rejected by browsers. \
            Set api.cors_allowed_origins explicitly or use '[\"*\"]' for any origin."
        );
    }
}

/// Build CORS middleware from configuration
///
/// tracker 跨域上报，管理接口同源访问
fn build_cors_middleware(allowed_origins: &[String]) -> Cors {
    if allowed_origins.is_empty() {
        return Cors::default();
    }

    let mut cors = Cors::default();
    if allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_any_origin();
    } else {
        for origin in allowed_origins {
            cors = cors.allowed_origin(origin);
        }
    }

    cors.allowed_methods(vec!["GET", "POST", "DELETE"])
        .allowed_header(actix_web::http::header::CONTENT_TYPE)
        .max_age(3600)
}

/// Run the HTTP server
///
/// This function:
/// 1. Records startup time
/// 2. Prepares storage and scoring services, starts background tasks
/// 3. Configures and starts the HTTP server
/// 4. Listens for graceful shutdown signals
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server() -> Result<()> {
    let app_start_time = AppStartTime {
        start_datetime: chrono::Utc::now(),
    };

    let startup = lifetime::startup::prepare_server_startup()
        .await
        .map_err(|e| {
            tracing::error!("Server startup failed: {}", e);
            e
        })?;

    let services = startup.services;
    let store = Arc::clone(&services.store);
    let engine = Arc::clone(&services.engine);
    let pipeline = Arc::clone(&services.pipeline);
    let queue = Arc::clone(&services.queue);
    let queue_for_shutdown = Arc::clone(&services.queue);

    let config = crate::config::get_config();
    let cpu_count = config.server.cpu_count.clamp(1, 32);
    warn!("Using {} CPU cores for the server", cpu_count);

    let allowed_origins = config.api.cors_allowed_origins.clone();
    validate_cors_config(&allowed_origins);

    if config.api.trusted_proxies.is_empty() {
        warn!(
            "Client IP: auto-detect mode enabled. \
             Connections from private IPs will use X-Forwarded-For. \
             To disable, configure api.trusted_proxies explicitly."
        );
    } else {
        warn!(
            "Client IP: explicit trusted proxies configured: {:?}",
            config.api.trusted_proxies
        );
    }

    let server = HttpServer::new(move || {
        let cors = build_cors_middleware(&allowed_origins);

        App::new()
            .wrap(cors)
            .wrap(Compress::default())
            .app_data(web::Data::new(Arc::clone(&store)))
            .app_data(web::Data::new(Arc::clone(&engine)))
            .app_data(web::Data::new(Arc::clone(&pipeline)))
            .app_data(web::Data::new(Arc::clone(&queue)))
            .app_data(web::Data::new(app_start_time.clone()))
            .app_data(web::PayloadConfig::new(256 * 1024))
            .wrap(
                DefaultHeaders::new()
                    .add(("Cache-Control", "no-cache, no-store, must-revalidate")),
            )
            .service(api_routes())
            .service(health_routes())
    })
    .keep_alive(std::time::Duration::from_secs(30))
    .client_request_timeout(std::time::Duration::from_millis(5000))
    .client_disconnect_timeout(std::time::Duration::from_millis(1000))
    .workers(cpu_count);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    warn!("Starting server at http://{}", bind_address);
    let server = server.bind(bind_address)?.run();

    tokio::select! {
        res = server => {
            res?;
        }
        _ = lifetime::shutdown::listen_for_shutdown(queue_for_shutdown) => {
            warn!("Graceful shutdown: all tasks completed");
        }
    }

    Ok(())
}
