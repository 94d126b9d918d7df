//! Auto-block lifecycle tests
//!
//! Candidate selection, idempotent blocking, expiry and manual blocks,
//! run against the in-memory store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use clickguard::blocking::{
    AutoBlockEngine, FraudScheduler, MANUAL_BLOCK_REASON, MAX_MANUAL_BLOCK_HOURS,
};
use clickguard::config::{AutoBlockConfig, SchedulerConfig};
use clickguard::detection::{BehaviorMetrics, FraudThresholds, SiteOverrides, Verdict};
use clickguard::errors::ClickGuardError;
use clickguard::ingestion::SlidingWindowCounter;
use clickguard::storage::{
    EventStore, MemoryEventStore, NewClickEvent, NewSite, SiteRecord, UtmParams,
};

struct Fixture {
    store: Arc<MemoryEventStore>,
    engine: AutoBlockEngine,
    site: SiteRecord,
}

async fn fixture_with(overrides: SiteOverrides) -> Fixture {
    let store = Arc::new(MemoryEventStore::new());
    let site = store
        .create_site(NewSite {
            name: "Shop".to_string(),
            domain: "shop.example".to_string(),
            api_key: Some("shop-key".to_string()),
            overrides,
        })
        .await
        .unwrap();
    let engine = AutoBlockEngine::new(
        store.clone(),
        AutoBlockConfig::default(),
        FraudThresholds::default(),
    );
    Fixture {
        store,
        engine,
        site,
    }
}

async fn fixture() -> Fixture {
    fixture_with(SiteOverrides::default()).await
}

fn event(
    site_id: i64,
    ip: &str,
    verdict: Verdict,
    score: u8,
    reason: &str,
    at: DateTime<Utc>,
) -> NewClickEvent {
    NewClickEvent {
        site_id,
        ip_address: ip.to_string(),
        fingerprint_hash: format!("fp-{}", ip),
        user_agent: None,
        url: None,
        referrer: None,
        behavior: BehaviorMetrics::default(),
        utm: UtmParams::default(),
        fraud_score: score,
        verdict,
        fraud_reason: reason.to_string(),
        low_confidence: false,
        fingerprint_data: None,
        created_at: at,
    }
}

async fn seed_fraud(f: &Fixture, ip: &str, count: i64, now: DateTime<Utc>) {
    for i in 0..count {
        f.store
            .insert_event(event(
                f.site.id,
                ip,
                Verdict::Fraud,
                85,
                &format!("Headless browser detected #{}", i),
                now - Duration::minutes(count - i),
            ))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_three_fraud_events_create_one_week_block() {
    let f = fixture().await;
    let now = Utc::now();
    seed_fraud(&f, "203.0.113.7", 3, now).await;

    let report = f.engine.run_for_site(&f.site, now).await.unwrap();
    assert_eq!(report.analyzed, 1);
    assert_eq!(report.blocked, 1);

    let block = f
        .store
        .query_active_block(f.site.id, "203.0.113.7", now)
        .await
        .unwrap()
        .expect("block should be active");
    assert!(block.auto_blocked);
    assert_eq!(block.auto_unblock_at, Some(now + Duration::days(7)));
    // 最近一次事件的原因
    assert_eq!(block.reason.as_deref(), Some("Headless browser detected #2"));
}

#[tokio::test]
async fn test_repeated_trigger_is_a_noop() {
    let f = fixture().await;
    let now = Utc::now();
    seed_fraud(&f, "203.0.113.7", 3, now).await;

    f.engine.run_for_site(&f.site, now).await.unwrap();
    let first = f.store.list_blocks(f.site.id, false).await.unwrap();

    f.store
        .insert_event(event(
            f.site.id,
            "203.0.113.7",
            Verdict::Fraud,
            90,
            "again",
            now,
        ))
        .await
        .unwrap();
    let later = now + Duration::minutes(5);
    let report = f.engine.run_for_site(&f.site, later).await.unwrap();

    assert_eq!(report.blocked, 0);
    assert_eq!(report.already_blocked, 1);
    let blocks = f.store.list_blocks(f.site.id, false).await.unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks, first);
}

#[tokio::test]
async fn test_two_events_or_old_events_do_not_block() {
    let f = fixture().await;
    let now = Utc::now();
    seed_fraud(&f, "198.51.100.1", 2, now).await;
    for hours in [25, 26, 30] {
        f.store
            .insert_event(event(
                f.site.id,
                "198.51.100.2",
                Verdict::Fraud,
                95,
                "old",
                now - Duration::hours(hours),
            ))
            .await
            .unwrap();
    }

    let report = f.engine.run_for_site(&f.site, now).await.unwrap();
    assert_eq!(report.analyzed, 0);
    assert!(f.store.list_blocks(f.site.id, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_high_score_suspicious_events_count_as_candidates() {
    let f = fixture().await;
    let now = Utc::now();
    for score in [60, 65, 69] {
        f.store
            .insert_event(event(
                f.site.id,
                "192.0.2.50",
                Verdict::Suspicious,
                score,
                "Too many clicks",
                now - Duration::minutes(10),
            ))
            .await
            .unwrap();
    }
    // 分数低于 60 的可疑事件不计入
    f.store
        .insert_event(event(
            f.site.id,
            "192.0.2.51",
            Verdict::Suspicious,
            59,
            "x",
            now,
        ))
        .await
        .unwrap();

    let candidates = f.engine.find_candidates(f.site.id, now).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].ip_address, "192.0.2.50");
    assert_eq!(candidates[0].fraud_count, 3);
}

#[tokio::test]
async fn test_disabled_site_writes_nothing() {
    let f = fixture_with(SiteOverrides {
        auto_block_enabled: Some(false),
        ..Default::default()
    })
    .await;
    let now = Utc::now();
    seed_fraud(&f, "203.0.113.9", 5, now).await;

    let report = f.engine.run_for_site(&f.site, now).await.unwrap();
    assert_eq!(report, Default::default());
    assert!(f.store.list_blocks(f.site.id, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expiry_sweep_deactivates_past_blocks() {
    let f = fixture().await;
    let blocked_at = Utc::now() - Duration::days(8);
    seed_fraud(&f, "203.0.113.7", 3, blocked_at).await;
    f.engine.run_for_site(&f.site, blocked_at).await.unwrap();

    let now = Utc::now();
    let rows = f.store.list_blocks(f.site.id, false).await.unwrap();
    assert!(rows[0].is_active, "row stays active until the sweep runs");
    assert!(
        f.store
            .query_active_block(f.site.id, "203.0.113.7", now)
            .await
            .unwrap()
            .is_none()
    );

    let expired = f.engine.sweep_expired(now).await.unwrap();
    assert_eq!(expired, 1);
    let rows = f.store.list_blocks(f.site.id, false).await.unwrap();
    assert!(!rows[0].is_active);
    assert_eq!(rows[0].unblocked_at, Some(now));

    assert_eq!(f.engine.sweep_expired(now).await.unwrap(), 0);
}

#[tokio::test]
async fn test_permanent_manual_block_survives_sweep() {
    let f = fixture().await;
    let now = Utc::now();

    let block = f
        .engine
        .block_manual(f.site.id, "198.51.100.20", None, None, now)
        .await
        .unwrap();
    assert!(!block.auto_blocked);
    assert_eq!(block.auto_unblock_at, None);
    assert_eq!(block.reason.as_deref(), Some(MANUAL_BLOCK_REASON));

    let later = now + Duration::days(365);
    assert_eq!(f.engine.sweep_expired(later).await.unwrap(), 0);
    assert!(
        f.store
            .query_active_block(f.site.id, "198.51.100.20", later)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_timed_manual_block_expires() {
    let f = fixture().await;
    let now = Utc::now();
    f.engine
        .block_manual(
            f.site.id,
            "198.51.100.21",
            Some("chargeback".to_string()),
            Some(2),
            now,
        )
        .await
        .unwrap();

    assert_eq!(
        f.engine.sweep_expired(now + Duration::hours(1)).await.unwrap(),
        0
    );
    assert_eq!(
        f.engine.sweep_expired(now + Duration::hours(2)).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_manual_block_requires_ip() {
    let f = fixture().await;
    let err = f
        .engine
        .block_manual(f.site.id, "  ", None, None, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, ClickGuardError::Validation(_)));
}

#[tokio::test]
async fn test_manual_block_duration_out_of_range() {
    let f = fixture().await;
    let now = Utc::now();

    for hours in [MAX_MANUAL_BLOCK_HOURS + 1, u32::MAX] {
        let err = f
            .engine
            .block_manual(f.site.id, "192.0.2.9", None, Some(hours), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ClickGuardError::Validation(_)));
    }
    assert!(f.engine.list(f.site.id, false).await.unwrap().is_empty());

    let longest = f
        .engine
        .block_manual(f.site.id, "192.0.2.9", None, Some(MAX_MANUAL_BLOCK_HOURS), now)
        .await
        .unwrap();
    assert_eq!(
        longest.auto_unblock_at,
        Some(now + Duration::hours(MAX_MANUAL_BLOCK_HOURS as i64))
    );
}

#[tokio::test]
async fn test_unblock_then_reblock_reuses_row() {
    let f = fixture().await;
    let now = Utc::now();
    let first = f
        .engine
        .block_manual(f.site.id, "192.0.2.9", None, None, now)
        .await
        .unwrap();

    assert!(f.engine.unblock(f.site.id, "192.0.2.9", now).await.unwrap());
    assert!(!f.engine.unblock(f.site.id, "192.0.2.9", now).await.unwrap());
    assert!(f.engine.list(f.site.id, true).await.unwrap().is_empty());

    let second = f
        .engine
        .block_manual(f.site.id, "192.0.2.9", None, Some(24), now)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert!(second.is_active);
    assert_eq!(f.engine.list(f.site.id, false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_export_lists_active_ips_newest_first() {
    let f = fixture().await;
    let now = Utc::now();
    for (i, ip) in ["10.0.0.1", "10.0.0.2", "10.0.0.3"].iter().enumerate() {
        f.engine
            .block_manual(f.site.id, ip, None, None, now + Duration::seconds(i as i64))
            .await
            .unwrap();
    }
    f.engine
        .unblock(f.site.id, "10.0.0.2", now + Duration::seconds(10))
        .await
        .unwrap();

    let ips = f
        .engine
        .export_ips(f.site.id, now + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(ips, vec!["10.0.0.3", "10.0.0.1"]);
}

#[tokio::test]
async fn test_export_never_exceeds_ad_network_cap() {
    let f = fixture().await;
    let engine = AutoBlockEngine::new(
        f.store.clone(),
        AutoBlockConfig {
            export_limit: 40,
            ..AutoBlockConfig::default()
        },
        FraudThresholds::default(),
    );
    let now = Utc::now();
    for i in 0..30 {
        engine
            .block_manual(
                f.site.id,
                &format!("10.0.1.{}", i),
                None,
                None,
                now + Duration::seconds(i),
            )
            .await
            .unwrap();
    }

    let ips = engine
        .export_ips(f.site.id, now + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(ips.len(), 25);
    assert_eq!(ips[0], "10.0.1.29");
}

#[tokio::test]
async fn test_require_site_rejects_inactive_sites() {
    let f = fixture().await;
    assert_eq!(f.engine.require_site("shop-key").await.unwrap().id, f.site.id);

    f.store.deactivate_site(f.site.id);
    let err = f.engine.require_site("shop-key").await.unwrap_err();
    assert!(matches!(err, ClickGuardError::SiteNotFound(_)));
}

#[tokio::test]
async fn test_scheduler_sweeps_every_site_and_cleans_old_events() {
    let f = fixture().await;
    let store: Arc<dyn EventStore> = f.store.clone();
    let other = store
        .create_site(NewSite {
            name: "Blog".to_string(),
            domain: "blog.example".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let now = Utc::now();
    seed_fraud(&f, "203.0.113.7", 3, now).await;
    for i in 0..3 {
        store
            .insert_event(event(
                other.id,
                "203.0.113.8",
                Verdict::Fraud,
                80,
                "x",
                now - Duration::minutes(i),
            ))
            .await
            .unwrap();
    }
    store
        .insert_event(event(
            f.site.id,
            "192.0.2.1",
            Verdict::Legitimate,
            0,
            "No anomalies detected",
            now - Duration::days(45),
        ))
        .await
        .unwrap();

    let engine = Arc::new(AutoBlockEngine::new(
        Arc::clone(&store),
        AutoBlockConfig::default(),
        FraudThresholds::default(),
    ));
    let scheduler = FraudScheduler::new(
        Arc::clone(&store),
        engine,
        Arc::new(SlidingWindowCounter::default()),
        SchedulerConfig::default(),
    );

    let sweep = scheduler.run_auto_block(now).await.unwrap();
    assert_eq!(sweep.sites, 2);
    assert_eq!(sweep.blocked, 2);
    assert_eq!(sweep.failed_sites, 0);

    let cleanup = scheduler.run_cleanup(now).await.unwrap();
    assert_eq!(cleanup.events_deleted, 1);
    assert_eq!(f.store.event_count(), 6);
}
