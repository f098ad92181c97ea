//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;

use chrono::NaiveDate;
use scorecard::models::Config;
use scorecard::pipeline::HarvestContext;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Fast, quiet config pointed at `server`, storing under `dir`.
pub fn config(server: &MockServer, dir: &Path) -> Config {
    let base = server.uri();
    let mut config = Config::default();
    config.source.listing_url = format!("{base}/list?before={{cursor}}");
    config.source.pass_url = format!("{base}/passes/{{id}}?before={{cursor}}");
    config.source.profile_url = format!("{base}/teams/{{id}}");
    config.source.listing_ceiling = 200;
    config.source.pass_ceiling = 100;
    config.listing.batch_size = 2;
    config.listing.batch_delay_ms = 0;
    config.details.batch_size = 2;
    config.details.batch_delay_ms = 0;
    config.events.batch_size = 2;
    config.events.batch_delay_ms = 0;
    config.retry.backoff_base_ms = 10;
    config.retry.transient_delay_ms = 5;
    config.checkpoint.dir = dir.to_path_buf();
    config.checkpoint.interval = 1;
    config.logging.show_progress = false;
    config
}

pub fn context(config: Config) -> HarvestContext {
    HarvestContext::new(config, CancellationToken::new())
        .unwrap()
        .with_today(today())
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
}

/// Listing page with entities `ids`, named `E<id>` and valued `id * 10`.
pub fn listing_page(ids: impl IntoIterator<Item = u64>, has_more: Option<bool>) -> Value {
    let items: Vec<Value> = ids
        .into_iter()
        .map(|id| json!({"entity": {"id": id, "name": format!("E{id}")}, "value": id * 10}))
        .collect();
    match has_more {
        Some(has_more) => json!({"items": items, "hasMore": has_more}),
        None => json!({"items": items}),
    }
}

/// Serve `body` for `GET /list?before=<cursor>`.
pub async fn mount_page(server: &MockServer, cursor: u64, body: Value) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("before", cursor.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Any listing cursor without its own mock is an empty page.
pub async fn mount_empty_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .with_priority(10)
        .mount(server)
        .await;
}

/// Four data pages at cursors 0..=60; the last one says there is no more.
pub async fn mount_standard_listing(server: &MockServer) {
    mount_page(server, 0, listing_page([1, 2], None)).await;
    mount_page(server, 20, listing_page([3, 4], None)).await;
    mount_page(server, 40, listing_page([5, 6], None)).await;
    mount_page(server, 60, listing_page([7], Some(false))).await;
    mount_empty_listing(server).await;
}

/// `before` cursor of a listing request.
pub fn cursor_of(request: &Request) -> Option<u64> {
    request
        .url
        .query_pairs()
        .find(|(name, _)| name == "before")
        .and_then(|(_, value)| value.parse().ok())
}

/// Cursors requested from `/list`, in arrival order.
pub async fn listing_cursors(server: &MockServer) -> Vec<u64> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == "/list")
        .filter_map(cursor_of)
        .collect()
}
