//! HTTP test runs against a mock OSRM server
//!
//! The worker pool uses blocking clients, so each run is moved onto a
//! blocking thread while the mock server keeps serving on the runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use butterfly_probe::{
    Action, Coordinate, LocationPair, ProbeStatus, RunConfig, TestReport, TransportTarget,
    WorkItem,
};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, action: Action, report: bool) -> RunConfig {
    let mut config = RunConfig::new(
        action,
        TransportTarget::Http {
            host: server.uri(),
        },
    );
    config.report = report;
    config.workers = 3;
    config
}

fn route_items(count: usize) -> Vec<WorkItem> {
    (0..count)
        .map(|i| {
            let offset = i as f64 * 0.001;
            WorkItem::Route(LocationPair::new(
                Coordinate::new(4.35 + offset, 50.85),
                Coordinate::new(4.40, 50.90 + offset),
            ))
        })
        .collect()
}

async fn run(config: RunConfig, items: Vec<WorkItem>) -> (TestReport, Vec<ProbeStatus>) {
    tokio::task::spawn_blocking(move || {
        config.validate().unwrap();
        let backend = butterfly_probe::Backend::resolve(&config).unwrap();
        let mut statuses = Vec::new();
        let report =
            butterfly_probe::run_test(&config, &backend, items, |probe| statuses.push(probe.status))
                .unwrap();
        (report, statuses)
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_route_report_averages_distances() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/route/v1/driving/[-0-9.]+,[-0-9.]+;[-0-9.]+,[-0-9.]+$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"code":"Ok","routes":[{"distance":1500.0,"duration":120.0}],"waypoints":[]}"#,
        ))
        .expect(10)
        .mount(&mock_server)
        .await;

    let (report, statuses) = run(config(&mock_server, Action::Route, true), route_items(10)).await;

    assert_eq!(report.requests, 10);
    assert_eq!(statuses.len(), 10);
    assert!(statuses.iter().all(|s| *s == ProbeStatus::Ok));

    let summary = report.distances.expect("expected a distance summary");
    assert_eq!(summary.count, 10);
    assert_eq!(summary.mean, 1500.0);
    assert_eq!(summary.stddev, 0.0);
    assert_eq!(report.latency.count(), 10);
    assert_eq!(report.latency.failed(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_responses_without_routes_are_counted_as_unroutable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/route/v1/driving/"))
        .respond_with(ResponseTemplate::new(400).set_body_string(
            r#"{"code":"NoRoute","message":"Impossible route between points"}"#,
        ))
        .mount(&mock_server)
        .await;

    let (report, statuses) = run(config(&mock_server, Action::Route, true), route_items(4)).await;

    assert_eq!(report.requests, 4);
    assert!(statuses.iter().all(|s| *s == ProbeStatus::NoRoute));
    assert_eq!(report.latency.unroutable(), 4);
    assert!(report.distances.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_report_off_skips_parsing() {
    let mock_server = MockServer::start().await;

    // Not JSON: only a parsing run would notice
    Mock::given(method("GET"))
        .and(path_regex(r"^/route/v1/driving/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&mock_server)
        .await;

    let (report, statuses) = run(config(&mock_server, Action::Route, false), route_items(5)).await;

    assert_eq!(report.requests, 5);
    assert!(statuses.iter().all(|s| *s == ProbeStatus::Ok));
    assert!(report.distances.is_none());
    assert_eq!(report.latency.count(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_matrix_report_uses_mean_cell_distance() {
    let mock_server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_clone = Arc::clone(&calls);
    Mock::given(method("GET"))
        .and(path_regex(r"^/sources_to_targets/v1/driving/"))
        .respond_with(move |_: &wiremock::Request| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(200).set_body_string(
                r#"{"sources_to_targets":[
                    [{"distance":0.0},{"distance":300.0}],
                    [{"distance":500.0},{"distance":0.0}]
                ]}"#,
            )
        })
        .mount(&mock_server)
        .await;

    let input = "((4.35, 50.85), (4.4, 50.9))\n";
    let items = butterfly_probe::load_work_items(Action::Matrix, input.as_bytes()).unwrap();

    let (report, _) = run(config(&mock_server, Action::Matrix, true), items.clone()).await;
    assert_eq!(report.requests, 1);
    assert_eq!(report.distances.unwrap().mean, 200.0);

    let mut exclusive = config(&mock_server, Action::Matrix, true);
    exclusive.exclude_diagonal = true;
    let (report, _) = run(exclusive, items).await;
    assert_eq!(report.distances.unwrap().mean, 400.0);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_errors_do_not_abort_the_run() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/route/v1/driving/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&mock_server)
        .await;

    let (report, statuses) = run(config(&mock_server, Action::Route, true), route_items(6)).await;

    assert_eq!(report.requests, 6);
    assert!(statuses.iter().all(|s| *s == ProbeStatus::Failed));
    assert_eq!(report.latency.failed(), 6);
    assert!(report.distances.is_none());
}
