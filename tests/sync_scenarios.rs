//! End-to-end sync runs against the scripted vendor API and the in-memory store
use std::sync::Arc;
use std::time::Duration;

use competitor_sync_lib::application::retrieval_engine::RetrievalConfig;
use competitor_sync_lib::application::sync_service::{SyncRequest, SyncService, SyncSettings};
use competitor_sync_lib::domain::catalog::CaptureDate;
use competitor_sync_lib::domain::credential::VendorCredential;
use competitor_sync_lib::domain::errors::SyncError;
use competitor_sync_lib::domain::repositories::CatalogRepository;
use competitor_sync_lib::infrastructure::in_memory_repository::InMemoryCatalogRepository;
use competitor_sync_lib::test_utils::{ScriptedTransport, part_number};

fn day(day: u32) -> CaptureDate {
    CaptureDate { year: 2024, month: 5, day }
}

fn settings(clients: &[&str]) -> SyncSettings {
    SyncSettings {
        credentials: clients.iter().map(|c| VendorCredential::new(*c, "secret")).collect(),
        ..SyncSettings::default()
    }
}

fn service(
    transport: &Arc<ScriptedTransport>,
    repo: &Arc<InMemoryCatalogRepository>,
    settings: SyncSettings,
    date: CaptureDate,
) -> SyncService {
    SyncService::new(transport.clone(), repo.clone(), settings).with_capture_date(date)
}

#[tokio::test(start_paused = true)]
async fn quota_split_follows_floating_surplus() {
    let transport = Arc::new(ScriptedTransport::with_catalog(4_000));
    // One request goes to the probe, the rest is what the probe reports back
    transport.set_quota("small", 21);
    transport.set_quota("large", 61);
    let repo = Arc::new(InMemoryCatalogRepository::default());

    let report = service(&transport, &repo, settings(&["large", "small"]), day(1))
        .run(SyncRequest::default())
        .await
        .unwrap();

    assert_eq!(report.total, 4_000);
    assert_eq!(report.inserted, 4_000);

    let page_offsets = |client: &str| -> Vec<u64> {
        let mut offsets: Vec<u64> = transport
            .calls_for_client(client)
            .into_iter()
            .filter(|c| c.limit > 1)
            .map(|c| c.offset)
            .collect();
        offsets.sort_unstable();
        offsets
    };
    assert_eq!(page_offsets("small"), (0..1_000).step_by(50).collect::<Vec<_>>());
    assert_eq!(page_offsets("large"), (1_000..4_000).step_by(50).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn insufficient_quota_aborts_before_fetching() {
    let transport = Arc::new(ScriptedTransport::with_catalog(1_000));
    transport.set_quota("a", 3);
    let repo = Arc::new(InMemoryCatalogRepository::default());

    let err = service(&transport, &repo, settings(&["a"]), day(1))
        .run(SyncRequest::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InsufficientQuota { .. }));
    assert!(transport.requested_offsets().is_empty());
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_credential_is_dropped_and_others_cover_the_range() {
    let transport = Arc::new(ScriptedTransport::with_catalog(500));
    transport.reject_client("revoked");
    let repo = Arc::new(InMemoryCatalogRepository::default());

    let report = service(&transport, &repo, settings(&["revoked", "good"]), day(1))
        .run(SyncRequest::default())
        .await
        .unwrap();

    assert_eq!(report.active_credentials, 1);
    assert_eq!(report.inserted, 500);
    assert!(transport.calls_for_client("revoked").is_empty());
}

#[tokio::test(start_paused = true)]
async fn bursts_are_separated_by_the_reset_window() {
    let transport = Arc::new(ScriptedTransport::with_catalog(150));
    let repo = Arc::new(InMemoryCatalogRepository::default());
    let mut settings = settings(&["a"]);
    settings.retrieval = RetrievalConfig {
        burst_limit: 2,
        ..RetrievalConfig::default()
    };

    let report = service(&transport, &repo, settings, day(1))
        .run(SyncRequest::default())
        .await
        .unwrap();
    assert_eq!(report.records_retrieved, 150);

    let mut pages: Vec<_> = transport
        .calls_for_client("a")
        .into_iter()
        .filter(|c| c.limit > 1)
        .collect();
    pages.sort_by_key(|c| c.offset);
    assert_eq!(pages.len(), 3);
    assert!(pages[2].at.duration_since(pages[0].at) >= Duration::from_secs(16));
}

#[tokio::test(start_paused = true)]
async fn in_flight_requests_never_exceed_the_limit() {
    let transport = Arc::new(
        ScriptedTransport::with_catalog(2_000).with_latency(Duration::from_millis(200)),
    );
    let repo = Arc::new(InMemoryCatalogRepository::default());
    let mut settings = settings(&["a", "b"]);
    settings.max_in_flight = 3;

    let report = service(&transport, &repo, settings, day(1))
        .run(SyncRequest::default())
        .await
        .unwrap();

    assert_eq!(report.inserted, 2_000);
    assert!(transport.max_in_flight() <= 3, "saw {}", transport.max_in_flight());
    assert!(transport.max_in_flight() >= 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_remediated_without_duplicates() {
    let transport = Arc::new(ScriptedTransport::with_catalog(150));
    transport.fail_offset(50, 1);
    let repo = Arc::new(InMemoryCatalogRepository::default());

    let report = service(&transport, &repo, settings(&["a"]), day(1))
        .run(SyncRequest::default())
        .await
        .unwrap();

    assert_eq!(report.remediated_pages, 1);
    assert!(report.abandoned_offsets.is_empty());
    assert_eq!(report.records_retrieved, 150);
    assert_eq!(report.inserted, 150);
    assert_eq!(transport.requests_for(50), 2);
}

#[tokio::test(start_paused = true)]
async fn persistent_failures_within_budget_are_abandoned() {
    let transport = Arc::new(ScriptedTransport::with_catalog(500));
    transport.fail_offset_always(100);
    transport.fail_offset_always(300);
    let repo = Arc::new(InMemoryCatalogRepository::default());

    let report = service(&transport, &repo, settings(&["a"]), day(1))
        .run(SyncRequest::default())
        .await
        .unwrap();

    assert_eq!(report.abandoned_offsets, vec![100, 300]);
    assert_eq!(report.inserted, 400);
    assert!(repo.find_record(&part_number(100)).await.unwrap().is_none());
    assert!(repo.find_record(&part_number(150)).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn exhausted_remediation_aborts_with_no_writes() {
    let transport = Arc::new(ScriptedTransport::with_catalog(500));
    for offset in [0, 100, 200, 300, 400] {
        transport.fail_offset_always(offset);
    }
    let repo = Arc::new(InMemoryCatalogRepository::default());

    let err = service(&transport, &repo, settings(&["a"]), day(1))
        .run(SyncRequest::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::RemediationExhausted { .. }));
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn start_offset_and_total_bound_the_run() {
    let transport = Arc::new(ScriptedTransport::with_catalog(1_000));
    let repo = Arc::new(InMemoryCatalogRepository::default());

    let report = service(&transport, &repo, settings(&["a"]), day(1))
        .run(SyncRequest {
            start_offset: Some(500),
            total: Some(800),
        })
        .await
        .unwrap();

    assert_eq!(report.inserted, 300);
    assert!(repo.find_record(&part_number(499)).await.unwrap().is_none());
    assert!(repo.find_record(&part_number(500)).await.unwrap().is_some());
    assert!(repo.find_record(&part_number(799)).await.unwrap().is_some());
    assert!(repo.find_record(&part_number(800)).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn histories_only_grow_across_days() {
    let transport = Arc::new(ScriptedTransport::with_catalog(100));
    let repo = Arc::new(InMemoryCatalogRepository::default());
    let pn = part_number(42);

    // Day 1: first sight
    let first = service(&transport, &repo, settings(&["a"]), day(1))
        .run(SyncRequest::default())
        .await
        .unwrap();
    assert_eq!(first.inserted, 100);

    // Day 2: same market, nothing to write
    let second = service(&transport, &repo, settings(&["a"]), day(2))
        .run(SyncRequest::default())
        .await
        .unwrap();
    assert_eq!((second.inserted, second.updated, second.unchanged), (0, 0, 100));

    // Day 3: price moves, stock does not
    transport.set_market(0.2, 1_000);
    let third = service(&transport, &repo, settings(&["a"]), day(3))
        .run(SyncRequest::default())
        .await
        .unwrap();
    assert_eq!(third.updated, 100);
    let record = repo.find_record(&pn).await.unwrap().unwrap();
    assert_eq!(record.pricing.len(), 2);
    assert_eq!(record.inventory.len(), 1);
    assert_eq!(record.pricing[1].captured_on, day(3));

    // Day 4: price returns to a known value, stock moves
    transport.set_market(0.1, 500);
    service(&transport, &repo, settings(&["a"]), day(4))
        .run(SyncRequest::default())
        .await
        .unwrap();
    let later = repo.find_record(&pn).await.unwrap().unwrap();
    assert_eq!(later.pricing, record.pricing);
    assert_eq!(later.inventory.len(), 2);
    assert_eq!(later.inventory[0], record.inventory[0]);
    assert_eq!(later.inventory[1].payload.cut_tape, 500);
}
