//! Storage failure tests
//!
//! Degraded history lookups, failed event writes and transient auto-block
//! failures, using a store that fails selected operations on demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration as StdDuration;

use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use clickguard::api::services::api_routes;
use clickguard::blocking::{AutoBlockEngine, AutoBlockQueue, AutoBlockTrigger, QueueRetryPolicy};
use clickguard::config::AutoBlockConfig;
use clickguard::detection::{
    FraudScorer, FraudThresholds, HistoricalSignalProvider, ScoringInput, Verdict,
};
use clickguard::errors::{ClickGuardError, Result};
use clickguard::ingestion::{IngestionPipeline, SlidingWindowCounter, TrackRequest};
use clickguard::storage::{
    BlockRequest, BlockedIpRecord, CandidateRow, ClickEventRecord, EventFilter, EventStats,
    EventStore, MemoryEventStore, NewClickEvent, NewSite, SiteRecord,
};

/// 内存存储外包一层，按开关让指定操作失败
#[derive(Default)]
struct FlakyStore {
    inner: MemoryEventStore,
    fail_counts: AtomicBool,
    fail_inserts: AtomicBool,
    /// 之后多少次候选查询失败
    candidate_failures: AtomicU32,
    candidate_calls: AtomicU32,
}

fn backend_down(op: &str) -> ClickGuardError {
    ClickGuardError::database_operation(format!("{}: connection reset", op))
}

#[async_trait]
impl EventStore for FlakyStore {
    fn backend_name(&self) -> &str {
        "flaky"
    }

    async fn resolve_site(&self, key: &str) -> Result<Option<SiteRecord>> {
        self.inner.resolve_site(key).await
    }

    async fn list_sites(&self) -> Result<Vec<SiteRecord>> {
        self.inner.list_sites().await
    }

    async fn create_site(&self, site: NewSite) -> Result<SiteRecord> {
        self.inner.create_site(site).await
    }

    async fn insert_event(&self, event: NewClickEvent) -> Result<i64> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(backend_down("insert_event"));
        }
        self.inner.insert_event(event).await
    }

    async fn count_events_since(
        &self,
        site_id: i64,
        filter: &EventFilter,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(backend_down("count_events"));
        }
        self.inner.count_events_since(site_id, filter, since).await
    }

    async fn query_events_since(
        &self,
        site_id: i64,
        filter: &EventFilter,
        since: DateTime<Utc>,
    ) -> Result<Vec<ClickEventRecord>> {
        self.inner.query_events_since(site_id, filter, since).await
    }

    async fn block_candidate_rows(
        &self,
        site_id: i64,
        since: DateTime<Utc>,
        score_floor: u8,
    ) -> Result<Vec<CandidateRow>> {
        self.candidate_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.candidate_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.candidate_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(backend_down("block_candidate_rows"));
        }
        self.inner
            .block_candidate_rows(site_id, since, score_floor)
            .await
    }

    async fn query_active_block(
        &self,
        site_id: i64,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockedIpRecord>> {
        self.inner.query_active_block(site_id, ip, now).await
    }

    async fn upsert_block(&self, request: BlockRequest) -> Result<BlockedIpRecord> {
        self.inner.upsert_block(request).await
    }

    async fn unblock(&self, site_id: i64, ip: &str, now: DateTime<Utc>) -> Result<bool> {
        self.inner.unblock(site_id, ip, now).await
    }

    async fn list_blocks(&self, site_id: i64, active_only: bool) -> Result<Vec<BlockedIpRecord>> {
        self.inner.list_blocks(site_id, active_only).await
    }

    async fn export_active_ips(
        &self,
        site_id: i64,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        self.inner.export_active_ips(site_id, limit, now).await
    }

    async fn expire_stale_blocks(&self, site_id: Option<i64>, now: DateTime<Utc>) -> Result<u64> {
        self.inner.expire_stale_blocks(site_id, now).await
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.inner.delete_events_before(cutoff).await
    }

    async fn event_stats(&self, site_id: i64, since: DateTime<Utc>) -> Result<EventStats> {
        self.inner.event_stats(site_id, since).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

struct NoopTrigger;

impl AutoBlockTrigger for NoopTrigger {
    fn trigger(&self, _site_id: i64) {}
}

async fn flaky_store() -> (Arc<FlakyStore>, SiteRecord) {
    let store = Arc::new(FlakyStore::default());
    let site = store
        .create_site(NewSite {
            name: "Shop".to_string(),
            domain: "shop.example".to_string(),
            api_key: Some("shop-key".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    (store, site)
}

fn pipeline(store: Arc<FlakyStore>) -> IngestionPipeline {
    IngestionPipeline::new(
        store,
        Arc::new(SlidingWindowCounter::default()),
        Arc::new(NoopTrigger),
        FraudThresholds::default(),
        3,
    )
}

/// 带指纹、不带行为数据的上报
fn request_without_behavior() -> Value {
    json!({
        "siteId": "shop-key",
        "fingerprintHash": "fp-degraded",
        "fingerprint": {
            "userAgent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36",
            "webgl": "ANGLE (Intel UHD Graphics 630)",
            "plugins": "PDF Viewer",
            "webdriver": false
        }
    })
}

async fn total_events(store: &FlakyStore, site_id: i64) -> u64 {
    store
        .inner
        .count_events_since(site_id, &EventFilter::default(), Utc::now() - Duration::days(1))
        .await
        .unwrap()
}

// =============================================================================
// 历史信号降级
// =============================================================================

#[tokio::test]
async fn test_failed_history_counts_score_as_zero() {
    let (store, site) = flaky_store().await;
    store.fail_counts.store(true, Ordering::SeqCst);

    let provider = HistoricalSignalProvider::new(store.clone());
    let signals = provider
        .collect(site.id, "203.0.113.7", "fp-degraded", Utc::now())
        .await;
    assert_eq!(signals.degraded_lookups, 2);
    assert_eq!(signals.fingerprint_reuse, 0);
    assert_eq!(signals.prior_fraud_count, 0);
    assert!(!signals.has_active_block);

    let input = ScoringInput {
        fingerprint: None,
        behavior: None,
        click_count: 1,
    };
    let assessment =
        FraudScorer::default().score(&input, &signals, &FraudThresholds::default());
    assert_eq!(assessment.score, 0);
    assert_eq!(assessment.verdict, Verdict::Legitimate);
    assert!(assessment.low_confidence);
}

#[tokio::test]
async fn test_ingest_completes_when_history_is_unavailable() {
    let (store, site) = flaky_store().await;
    store.fail_counts.store(true, Ordering::SeqCst);
    let pipeline = pipeline(store.clone());

    let request: TrackRequest = serde_json::from_value(request_without_behavior()).unwrap();
    let outcome = pipeline
        .ingest(request, "203.0.113.7", None, Utc::now())
        .await
        .unwrap();

    assert!(outcome.accepted);
    assert_eq!(outcome.verdict, Verdict::Legitimate);
    // 行为数据缺失 + 历史查询降级
    assert!(outcome.low_confidence);
    assert_eq!(total_events(&store, site.id).await, 1);
}

// =============================================================================
// 写入失败
// =============================================================================

#[tokio::test]
async fn test_failed_insert_propagates_without_partial_write() {
    let (store, site) = flaky_store().await;
    store.fail_inserts.store(true, Ordering::SeqCst);
    let pipeline = pipeline(store.clone());

    let request: TrackRequest = serde_json::from_value(request_without_behavior()).unwrap();
    let err = pipeline
        .ingest(request, "203.0.113.7", None, Utc::now())
        .await
        .unwrap_err();

    assert!(matches!(err, ClickGuardError::DatabaseOperation(_)));
    assert_eq!(total_events(&store, site.id).await, 0);
}

#[actix_rt::test]
async fn test_track_returns_server_error_when_insert_fails() {
    let (store, site) = flaky_store().await;
    store.fail_inserts.store(true, Ordering::SeqCst);
    let pipeline = Arc::new(pipeline(store.clone()));

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(pipeline))
            .service(api_routes()),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/track")
        .peer_addr("203.0.113.7:40000".parse().unwrap())
        .set_json(request_without_behavior())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // 不泄露后端错误细节
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Internal server error");
    assert_eq!(total_events(&store, site.id).await, 0);
}

// =============================================================================
// 自动封禁任务重试
// =============================================================================

async fn seed_fraud(store: &FlakyStore, site_id: i64, ip: &str, now: DateTime<Utc>) {
    for i in 0..3 {
        store
            .insert_event(NewClickEvent {
                site_id,
                ip_address: ip.to_string(),
                fingerprint_hash: format!("fp-{}", i),
                user_agent: None,
                url: None,
                referrer: None,
                behavior: Default::default(),
                utm: Default::default(),
                fraud_score: 90,
                verdict: Verdict::Fraud,
                fraud_reason: "WebDriver detected".to_string(),
                low_confidence: false,
                fingerprint_data: None,
                created_at: now - Duration::minutes(10 - i),
            })
            .await
            .unwrap();
    }
}

fn fast_retries(max_attempts: u32) -> QueueRetryPolicy {
    QueueRetryPolicy {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

async fn wait_for_idle(queue: &AutoBlockQueue) {
    for _ in 0..200 {
        if queue.pending_jobs() == 0 {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_queue_retries_transient_failure() {
    let (store, site) = flaky_store().await;
    let now = Utc::now();
    seed_fraud(&store, site.id, "198.51.100.23", now).await;
    store.candidate_failures.store(2, Ordering::SeqCst);

    let engine = Arc::new(AutoBlockEngine::new(
        store.clone(),
        AutoBlockConfig::default(),
        FraudThresholds::default(),
    ));
    let (queue, _handle) = AutoBlockQueue::start(engine, 8, fast_retries(3));

    queue.trigger(site.id);
    wait_for_idle(&queue).await;

    let stats = queue.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(store.candidate_calls.load(Ordering::SeqCst), 3);
    assert!(
        store
            .query_active_block(site.id, "198.51.100.23", Utc::now())
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_queue_gives_up_after_max_attempts() {
    let (store, site) = flaky_store().await;
    seed_fraud(&store, site.id, "198.51.100.23", Utc::now()).await;
    store.candidate_failures.store(10, Ordering::SeqCst);

    let engine = Arc::new(AutoBlockEngine::new(
        store.clone(),
        AutoBlockConfig::default(),
        FraudThresholds::default(),
    ));
    let (queue, _handle) = AutoBlockQueue::start(engine, 8, fast_retries(2));

    queue.trigger(site.id);
    wait_for_idle(&queue).await;

    let stats = queue.stats();
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(store.candidate_calls.load(Ordering::SeqCst), 2);
    assert!(store.list_blocks(site.id, false).await.unwrap().is_empty());
}
