//! Release freshness checks against a mocked forge

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use instance_monitor::actors::release_monitor::ReleaseMonitor;
use instance_monitor::actors::ticker::TickHandler;
use instance_monitor::config::ResolvedForgeConfig;
use instance_monitor::error::ForgeError;
use instance_monitor::fleet::{FleetView, StaticRegistry};
use instance_monitor::monitors::release::{ForgeClient, ReleaseFreshnessChecker};
use instance_monitor::{AlertSource, CheckStatus, ServiceInfo, StaleReason};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

const DAY_MS: i64 = 86_400_000;
/// 2024-02-01T00:00:00Z
const NOW_MS: i64 = 1_706_745_600_000;

fn services() -> HashMap<String, ServiceInfo> {
    HashMap::from([
        (
            "orders".to_string(),
            ServiceInfo {
                name: "orders".to_string(),
                forge_project_id: Some(42),
                remind_tag_min_diff_ms: Some(7 * DAY_MS),
                ..Default::default()
            },
        ),
        (
            "untracked".to_string(),
            ServiceInfo {
                name: "untracked".to_string(),
                ..Default::default()
            },
        ),
    ])
}

fn checker(server: &MockServer) -> ReleaseFreshnessChecker {
    let fleet = Arc::new(FleetView::new(
        Arc::new(StaticRegistry::default()),
        services(),
        Duration::from_secs(60),
    ));
    let forge = ForgeClient::new(
        reqwest::Client::new(),
        &ResolvedForgeConfig {
            url_prefix: server.uri(),
            token: "secret".to_string(),
        },
    );
    ReleaseFreshnessChecker::new(forge, fleet)
}

async fn mount_jobs(server: &MockServer, jobs: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/jobs"))
        .and(header("PRIVATE-TOKEN", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jobs))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_old_tag_is_reported_stale() {
    let server = MockServer::start().await;
    mount_jobs(
        &server,
        json!([
            {"id": 2, "tag": false, "started_at": "2024-01-30T00:00:00Z"},
            {"id": 1, "tag": true, "started_at": "2024-01-01T00:00:00Z"}
        ]),
    )
    .await;

    let event = checker(&server)
        .try_check_at("orders", NOW_MS)
        .await
        .unwrap()
        .expect("stale release must alert");

    assert_eq!(event.source, AlertSource::Release);
    assert_eq!(event.instance_id, None);
    assert_eq!(event.result.status, CheckStatus::StaleRelease);
    assert_eq!(event.result.observed, (31 * DAY_MS) as f64);
    assert_eq!(event.result.stale_reason, Some(StaleReason::TagTooOld));
}

#[tokio::test]
async fn test_empty_job_list_always_alerts() {
    let server = MockServer::start().await;
    mount_jobs(&server, json!([])).await;

    let event = checker(&server)
        .try_check_at("orders", NOW_MS)
        .await
        .unwrap()
        .expect("missing tag build must alert");

    assert_eq!(event.result.observed, (14 * DAY_MS) as f64);
    assert_eq!(event.result.threshold, Some((7 * DAY_MS) as f64));
    assert_eq!(event.result.stale_reason, Some(StaleReason::NoTagFound));
}

#[tokio::test]
async fn test_recent_tag_is_fine() {
    let server = MockServer::start().await;
    mount_jobs(
        &server,
        json!([{"tag": true, "started_at": "2024-01-30T12:00:00Z"}]),
    )
    .await;

    assert_eq!(
        checker(&server).try_check_at("orders", NOW_MS).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_forge_error_is_non_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let checker = checker(&server);
    assert_matches!(
        checker.try_check_at("orders", NOW_MS).await,
        Err(ForgeError::Status(502))
    );
    assert_eq!(checker.check("orders").await, None);
}

#[tokio::test]
async fn test_services_without_project_are_skipped() {
    let server = MockServer::start().await;
    let checker = checker(&server);

    assert_eq!(checker.checked_services(), vec!["orders".to_string()]);
    assert_eq!(checker.try_check_at("untracked", NOW_MS).await.unwrap(), None);
    assert_matches!(
        checker.try_check_at("unknown", NOW_MS).await,
        Err(ForgeError::UnknownService(_))
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_release_tick_dispatches_and_counts_failures() {
    let server = MockServer::start().await;
    mount_jobs(&server, json!([])).await;

    let h = harness(
        Arc::new(MutableRegistry::default()),
        Default::default(),
        services(),
        Arc::new(ScriptedSource::default()),
    );
    let monitor = ReleaseMonitor::new(
        checker(&server),
        h.ctx.dispatcher.clone(),
        h.counters.clone(),
    );

    let report = monitor.run_tick(NOW_MS).await;
    assert_eq!(report.checked, 1);
    assert_eq!(report.alerts_dispatched, 1);

    let report = monitor.run_tick(NOW_MS + 60_000).await;
    assert_eq!(report.alerts_suppressed, 1);

    h.ctx.dispatcher.flush().await;
    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].content.contains("Release tag is stale - orders"));
    assert!(messages[0].content.contains("no tag build found"));

    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let report = monitor.run_tick(NOW_MS + 120_000).await;
    assert_eq!(report.failed, 1);
    assert_eq!(h.counters.snapshot().forge_errors, 1);
}
