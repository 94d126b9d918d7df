//! HTTP API tests
//!
//! Drives the actix routes against the in-memory store with the full
//! service graph (engine, queue, pipeline) assembled by `AppServices`.

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use clickguard::api::services::{AppStartTime, api_routes, health_routes};
use clickguard::config::StaticConfig;
use clickguard::runtime::lifetime::AppServices;
use clickguard::storage::{BlockRequest, EventStore, MemoryEventStore, NewSite};

const PEER: &str = "203.0.113.7:40000";

async fn services() -> AppServices {
    let store: Arc<dyn EventStore> = Arc::new(MemoryEventStore::new());
    store
        .create_site(NewSite {
            name: "Shop".to_string(),
            domain: "shop.example".to_string(),
            api_key: Some("shop-key".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    AppServices::build(store, &StaticConfig::default())
}

macro_rules! test_app {
    ($services:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($services.store.clone()))
                .app_data(web::Data::new($services.engine.clone()))
                .app_data(web::Data::new($services.pipeline.clone()))
                .app_data(web::Data::new($services.queue.clone()))
                .app_data(web::Data::new(AppStartTime {
                    start_datetime: Utc::now(),
                }))
                .service(api_routes())
                .service(health_routes()),
        )
        .await
    };
}

fn track_body() -> Value {
    json!({
        "siteId": "shop-key",
        "fingerprintHash": "fp-abc",
        "fingerprint": {
            "userAgent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36",
            "webgl": "ANGLE (Intel UHD Graphics 630)",
            "plugins": "PDF Viewer",
            "timezone": "Europe/Berlin",
            "language": "de-DE",
            "screenWidth": 1920,
            "screenHeight": 1080,
            "hardwareConcurrency": 8,
            "touchSupport": false,
            "webdriver": false
        },
        "behavior": {
            "mouseMovements": 40,
            "clicks": 2,
            "keyPresses": 0,
            "scrolls": 5,
            "timeOnPage": 12.0,
            "timeToFirstInteraction": 1.5,
            "scrollDepth": 40
        },
        "url": "https://shop.example/",
        "utm": {"utm_source": "yandex", "yclid": "991"}
    })
}

#[actix_rt::test]
async fn test_track_accepts_clean_click() {
    let services = services().await;
    let app = test_app!(services);

    let req = test::TestRequest::post()
        .uri("/api/track")
        .peer_addr(PEER.parse().unwrap())
        .set_json(track_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["fraudScore"], 0);
    assert_eq!(body["status"], "ok");
}

#[actix_rt::test]
async fn test_track_rejects_invalid_json() {
    let services = services().await;
    let app = test_app!(services);

    let req = test::TestRequest::post()
        .uri("/api/track")
        .peer_addr(PEER.parse().unwrap())
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_track_requires_fingerprint_hash() {
    let services = services().await;
    let app = test_app!(services);

    let req = test::TestRequest::post()
        .uri("/api/track")
        .peer_addr(PEER.parse().unwrap())
        .set_json(json!({"siteId": "shop-key"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_track_unknown_site_is_not_found() {
    let services = services().await;
    let app = test_app!(services);

    let mut body = track_body();
    body["siteId"] = json!("nope");
    let req = test::TestRequest::post()
        .uri("/api/track")
        .peer_addr(PEER.parse().unwrap())
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_track_blocked_ip_is_forbidden() {
    let services = services().await;
    let site = services.store.resolve_site("shop-key").await.unwrap().unwrap();
    services
        .store
        .upsert_block(BlockRequest {
            site_id: site.id,
            ip_address: "203.0.113.7".to_string(),
            reason: Some("test".to_string()),
            auto_blocked: false,
            duration: Some(Duration::hours(1)),
            now: Utc::now(),
        })
        .await
        .unwrap();
    let app = test_app!(services);

    let req = test::TestRequest::post()
        .uri("/api/track")
        .peer_addr(PEER.parse().unwrap())
        .set_json(track_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Access denied");
}

#[actix_rt::test]
async fn test_manual_block_list_export_and_unblock() {
    let services = services().await;
    let app = test_app!(services);

    let req = test::TestRequest::post()
        .uri("/api/blocked/shop-key")
        .set_json(json!({"ip": "198.51.100.4", "reason": "chargeback", "autoDuration": "24"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["blocked"]["ipAddress"], "198.51.100.4");
    assert_eq!(body["blocked"]["autoBlocked"], false);
    assert!(body["blocked"]["autoUnblockAt"].is_string());

    let req = test::TestRequest::get()
        .uri("/api/blocked/shop-key")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["blocked"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::get()
        .uri("/api/blocked/shop-key/export")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["ips"], json!(["198.51.100.4"]));
    assert_eq!(body["count"], 1);
    assert_eq!(body["maxYandex"], 25);
    assert_eq!(body["format"], "yandex_direct");

    let req = test::TestRequest::get()
        .uri("/api/blocked/shop-key/export?format=csv")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let csv = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&csv).contains("198.51.100.4"));

    let req = test::TestRequest::delete()
        .uri("/api/blocked/shop-key/198.51.100.4")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::delete()
        .uri("/api/blocked/shop-key/198.51.100.4")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_manual_block_rejects_out_of_range_duration() {
    let services = services().await;
    let app = test_app!(services);

    let req = test::TestRequest::post()
        .uri("/api/blocked/shop-key")
        .set_json(json!({"ip": "1.2.3.4", "autoDuration": 4294967295u64}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "autoDuration out of range");

    // 服务仍可用，且没有写入封禁
    let req = test::TestRequest::get()
        .uri("/api/blocked/shop-key?active=false")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["blocked"].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn test_manual_block_requires_ip() {
    let services = services().await;
    let app = test_app!(services);

    let req = test::TestRequest::post()
        .uri("/api/blocked/shop-key")
        .set_json(json!({"reason": "no ip"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_export_rejects_unknown_format() {
    let services = services().await;
    let app = test_app!(services);

    let req = test::TestRequest::get()
        .uri("/api/blocked/shop-key/export?format=xml")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_stats_reports_window() {
    let services = services().await;
    let app = test_app!(services);

    let req = test::TestRequest::post()
        .uri("/api/track")
        .peer_addr(PEER.parse().unwrap())
        .set_json(track_body())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/stats/shop-key?period=48")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["periodHours"], 48);
    assert_eq!(body["stats"]["totalEvents"], 1);
    assert_eq!(body["stats"]["fraudRate"], 0.0);

    let req = test::TestRequest::get().uri("/api/stats/nope").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_health_reports_storage_and_rules() {
    let services = services().await;
    let app = test_app!(services);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["backend"], "memory");
    assert_eq!(
        body["rulesVersion"],
        "behavior-v1+fingerprint-v1+history-v1"
    );

    let req = test::TestRequest::get().uri("/health/live").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}
