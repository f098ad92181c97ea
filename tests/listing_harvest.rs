//! Listing and detail harvests against a mock source.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use scorecard::models::{EntityKey, EntityMap, EntityRecord, FailedTarget, FailureReason};
use scorecard::pipeline::output::{FAILURES_FILE, load_entities};
use scorecard::pipeline::{ListingOptions, run_details, run_listing};
use scorecard::services::ProgressReporter;
use scorecard::storage::CheckpointStatus;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ids(entities: &EntityMap) -> Vec<String> {
    entities
        .iter()
        .filter_map(|(_, record)| record.id.clone())
        .collect()
}

#[tokio::test]
async fn harvests_until_terminal_page() {
    let server = MockServer::start().await;
    mount_standard_listing(&server).await;
    let tmp = TempDir::new().unwrap();
    let ctx = context(config(&server, tmp.path()));

    let outcome = run_listing(&ctx, ListingOptions::default()).await.unwrap();

    assert_eq!(ids(&outcome.entities), ["1", "2", "3", "4", "5", "6", "7"]);
    assert!(outcome.report.failures.is_empty());
    assert!(!outcome.report.cancelled);
    assert_eq!(load_entities(&ctx.storage).await.unwrap(), outcome.entities);
    // clean run: checkpoint archived
    assert_eq!(ctx.checkpoint("listing").status().await, CheckpointStatus::Missing);
}

#[tokio::test]
async fn no_cursor_past_the_terminal_page() {
    let server = MockServer::start().await;
    mount_page(&server, 0, listing_page([1], None)).await;
    mount_page(&server, 20, listing_page([2], None)).await;
    mount_page(&server, 40, listing_page([3], Some(false))).await;
    // would be harvested if the pager ignored the terminal flag
    mount_page(&server, 60, listing_page([4], None)).await;
    mount_page(&server, 80, listing_page([5], None)).await;
    mount_empty_listing(&server).await;

    let tmp = TempDir::new().unwrap();
    let mut config = config(&server, tmp.path());
    config.listing.batch_size = 1;
    let ctx = context(config);

    let outcome = run_listing(&ctx, ListingOptions::default()).await.unwrap();

    assert_eq!(ids(&outcome.entities), ["1", "2", "3"]);
    assert_eq!(listing_cursors(&server).await, [0, 20, 40]);
}

#[tokio::test]
async fn rate_limited_page_yields_same_entities() {
    let plain = MockServer::start().await;
    mount_standard_listing(&plain).await;
    let plain_dir = TempDir::new().unwrap();
    let expected = run_listing(&context(config(&plain, plain_dir.path())), ListingOptions::default())
        .await
        .unwrap();

    let limited = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("before", "20"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(3)
        .with_priority(1)
        .mount(&limited)
        .await;
    mount_standard_listing(&limited).await;
    let limited_dir = TempDir::new().unwrap();
    let outcome = run_listing(
        &context(config(&limited, limited_dir.path())),
        ListingOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.entities, expected.entities);
    assert!(outcome.report.failures.is_empty());
    let attempts = listing_cursors(&limited)
        .await
        .into_iter()
        .filter(|cursor| *cursor == 20)
        .count();
    assert_eq!(attempts, 4);
}

#[tokio::test]
async fn unauthorized_page_is_reported_and_checkpoint_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("before", "20"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_standard_listing(&server).await;
    let tmp = TempDir::new().unwrap();
    let ctx = context(config(&server, tmp.path()));

    let outcome = run_listing(&ctx, ListingOptions::default()).await.unwrap();

    assert_eq!(ids(&outcome.entities), ["1", "2", "5", "6", "7"]);
    assert_eq!(
        outcome.report.failures,
        [FailedTarget::new("cursor:20", FailureReason::Unauthorized)]
    );
    // never retried
    assert_eq!(
        listing_cursors(&server).await.iter().filter(|c| **c == 20).count(),
        1
    );

    let failures: BTreeMap<String, Vec<FailedTarget>> =
        ctx.storage.read_json(FAILURES_FILE).await.unwrap().unwrap();
    assert_eq!(failures["listing"], outcome.report.failures);

    match ctx.checkpoint("listing").status().await {
        CheckpointStatus::Present { cursor, failed, .. } => {
            assert_eq!(cursor, Some(20));
            assert_eq!(failed, 1);
        }
        other => panic!("expected a kept checkpoint, got {other:?}"),
    }
}

#[tokio::test]
async fn resumed_run_matches_single_pass() {
    let single = MockServer::start().await;
    mount_standard_listing(&single).await;
    let single_dir = TempDir::new().unwrap();
    let expected = run_listing(&context(config(&single, single_dir.path())), ListingOptions::default())
        .await
        .unwrap();

    let server = MockServer::start().await;
    mount_standard_listing(&server).await;
    let tmp = TempDir::new().unwrap();

    // Stop after the first batch.
    let first = context(config(&server, tmp.path()));
    let cancel = first.cancel.clone();
    let stop: Arc<dyn ProgressReporter> = Arc::new(move |_done: usize, _total: usize| cancel.cancel());
    let first = first.with_progress(stop);
    let partial = run_listing(&first, ListingOptions::default()).await.unwrap();
    assert!(partial.report.cancelled);
    assert_eq!(ids(&partial.entities), ["1", "2", "3", "4"]);
    match first.checkpoint("listing").status().await {
        CheckpointStatus::Present { cursor, completed, .. } => {
            assert_eq!(cursor, Some(40));
            assert_eq!(completed, 4);
        }
        other => panic!("expected a checkpoint, got {other:?}"),
    }

    let second = context(config(&server, tmp.path()));
    let resumed = run_listing(&second, ListingOptions::default()).await.unwrap();

    assert!(resumed.report.resumed);
    assert_eq!(resumed.entities, expected.entities);
    let mut cursors = listing_cursors(&server).await;
    cursors.sort_unstable();
    assert_eq!(cursors, [0, 20, 40, 60]);
}

#[tokio::test]
async fn guard_refuses_sharp_drop_unless_forced() {
    let big = MockServer::start().await;
    mount_page(&big, 0, listing_page(1..=12, Some(false))).await;
    mount_empty_listing(&big).await;
    let tmp = TempDir::new().unwrap();
    run_listing(&context(config(&big, tmp.path())), ListingOptions::default())
        .await
        .unwrap();

    let small = MockServer::start().await;
    mount_page(&small, 0, listing_page(1..=3, Some(false))).await;
    mount_empty_listing(&small).await;
    let ctx = context(config(&small, tmp.path()));
    assert!(run_listing(&ctx, ListingOptions::default()).await.is_err());
    assert_eq!(load_entities(&ctx.storage).await.unwrap().len(), 12);

    run_listing(&ctx, ListingOptions { force: true }).await.unwrap();
    assert_eq!(load_entities(&ctx.storage).await.unwrap().len(), 3);
}

#[tokio::test]
async fn details_fill_passes_and_age() {
    let server = MockServer::start().await;
    let pass_page = |levels: &[u8]| {
        let items: Vec<_> = levels
            .iter()
            .map(|level| json!({"boostInfo": {"level": level}}))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({"feedItems": items}))
    };
    Mock::given(method("GET"))
        .and(path("/passes/1"))
        .and(query_param("before", "0"))
        .respond_with(pass_page(&[7, 5, 3]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/passes/1"))
        .and(query_param("before", "20"))
        .respond_with(pass_page(&[4, 2]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/teams/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "team": {"additionalInfo": {"details": ["Height: 6'0\"", "DOB: 1990-06-15"]}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/passes/2"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/teams/2"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let ctx = context(config(&server, tmp.path()));
    let mut entities = EntityMap::new();
    entities.merge(EntityRecord::new(Some("1".into()), "One", 10));
    entities.merge(EntityRecord::new(Some("2".into()), "Two", 20));
    entities.merge(EntityRecord::new(None, "Nameless", 30));

    let report = run_details(&ctx, &mut entities).await.unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(
        report.failures,
        [FailedTarget::new("id:2", FailureReason::Unauthorized)]
    );

    let one = entities.get(&EntityKey::Id("1".into())).unwrap();
    assert_eq!(one.attributes["age"], json!(33));
    assert_eq!(
        one.attributes["pass_distribution"],
        json!({"3": 1, "4": 1, "5": 1, "6": 0, "7": 1})
    );
    assert!(entities.get(&EntityKey::Id("2".into())).unwrap().attributes.is_empty());

    // the scan stopped at the floor level
    let pass_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/passes/1")
        .count();
    assert_eq!(pass_requests, 2);

    let written = load_entities(&ctx.storage).await.unwrap();
    assert_eq!(written, entities);
    assert!(matches!(
        ctx.checkpoint("details").status().await,
        CheckpointStatus::Present { completed: 1, failed: 1, .. }
    ));
}

#[tokio::test]
async fn empty_pages_with_more_stop_at_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [], "hasMore": true})))
        .mount(&server)
        .await;
    let tmp = TempDir::new().unwrap();
    let ctx = context(config(&server, tmp.path()));

    let outcome = run_listing(&ctx, ListingOptions::default()).await.unwrap();

    assert!(outcome.entities.is_empty());
    assert!(outcome.report.failures.is_empty());
    assert!(!outcome.report.cancelled);
    assert_eq!(outcome.report.total, 11);
    let mut cursors = listing_cursors(&server).await;
    cursors.sort_unstable();
    assert_eq!(cursors, (0..=200).step_by(20).collect::<Vec<u64>>());
}

fn nameless_page(name: &str, value: i64, has_more: bool) -> serde_json::Value {
    json!({"items": [{"entity": {"name": name}, "value": value}], "hasMore": has_more})
}

#[tokio::test]
async fn name_collision_keeps_the_earlier_page() {
    let server = MockServer::start().await;
    // the earlier page answers last
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("before", "0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(nameless_page("Sam", 10, true))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    mount_page(&server, 20, nameless_page("Sam", 20, false)).await;
    mount_empty_listing(&server).await;
    let tmp = TempDir::new().unwrap();
    let ctx = context(config(&server, tmp.path()));

    let outcome = run_listing(&ctx, ListingOptions::default()).await.unwrap();

    let sam = outcome.entities.get(&EntityKey::Name("Sam".into())).unwrap();
    assert_eq!(sam.value, 10);
    assert_eq!(outcome.entities.collisions.len(), 1);
    assert_eq!(outcome.entities.collisions[0].rejected.value, 20);
}

async fn mount_colliding_listing(server: &MockServer) {
    mount_page(server, 0, nameless_page("Sam", 10, true)).await;
    mount_page(server, 20, nameless_page("Sam", 20, true)).await;
    mount_page(server, 40, listing_page([5], None)).await;
    mount_page(server, 60, listing_page([6], Some(false))).await;
    mount_empty_listing(server).await;
}

#[tokio::test]
async fn collisions_survive_a_resume() {
    let single = MockServer::start().await;
    mount_colliding_listing(&single).await;
    let single_dir = TempDir::new().unwrap();
    let expected = run_listing(&context(config(&single, single_dir.path())), ListingOptions::default())
        .await
        .unwrap();
    assert_eq!(expected.entities.collisions.len(), 1);

    let server = MockServer::start().await;
    mount_colliding_listing(&server).await;
    let tmp = TempDir::new().unwrap();
    let first = context(config(&server, tmp.path()));
    let cancel = first.cancel.clone();
    let stop: Arc<dyn ProgressReporter> = Arc::new(move |_done: usize, _total: usize| cancel.cancel());
    let partial = run_listing(&first.with_progress(stop), ListingOptions::default())
        .await
        .unwrap();
    assert!(partial.report.cancelled);
    assert_eq!(partial.entities.collisions.len(), 1);

    let resumed = run_listing(&context(config(&server, tmp.path())), ListingOptions::default())
        .await
        .unwrap();

    assert!(resumed.report.resumed);
    assert_eq!(resumed.entities, expected.entities);
}
