//! End-to-end tests: scheduler, collectors, discovery and the HTTP server
//! against an in-process mock of the Azure DevOps API.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;

use azdo_client::ApiClient;
use azdo_client::models::Project;
use azdo_exporter::{
    CollectorKind, Discovery, Exporter, ExporterConfig, HttpServer, Registry, ResourceSnapshot,
    ResourceSource, Scheduler, Settings, SharedRegistry,
};

const PR_INFO: &str = "azure_devops_pullrequest_info";

#[derive(Default)]
struct Mock {
    /// Projects whose pull request listing fails.
    failing: Mutex<HashSet<String>>,
    delay_ms: AtomicU64,
    /// Delay of the project listing, in milliseconds.
    projects_delay_ms: AtomicU64,
    pools_fail: AtomicBool,
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn pull_request(id: u64, repository: &str) -> serde_json::Value {
    json!({
        "pullRequestId": id,
        "title": format!("Change {id}"),
        "status": "active",
        "isDraft": false,
        "sourceRefName": "refs/heads/feature",
        "targetRefName": "refs/heads/main",
        "createdBy": { "displayName": "Ann" },
        "creationDate": "2024-03-01T10:00:00Z",
        "repository": { "id": repository, "name": repository },
        "labels": [{ "id": "l1", "name": "review", "active": true }],
        "reviewers": [{ "displayName": "Bo", "vote": 10 }]
    })
}

async fn pull_requests(State(mock): State<Arc<Mock>>, Path(project): Path<String>) -> Response {
    let delay = mock.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if mock.failing.lock().contains(&project) {
        return (StatusCode::NOT_FOUND, "project not found").into_response();
    }

    let value = match project.as_str() {
        "A" => vec![pull_request(1, "ra"), pull_request(2, "ra")],
        "C" => vec![pull_request(7, "rc")],
        _ => Vec::new(),
    };
    axum::Json(json!({ "count": value.len(), "value": value })).into_response()
}

async fn projects(State(mock): State<Arc<Mock>>) -> Response {
    let delay = mock.projects_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    axum::Json(json!({
        "count": 3,
        "value": [
            { "id": "A", "name": "Alpha" },
            { "id": "B", "name": "Beta" },
            { "id": "C", "name": "Archive" }
        ]
    }))
    .into_response()
}

async fn pools(State(mock): State<Arc<Mock>>) -> Response {
    if mock.pools_fail.load(Ordering::SeqCst) {
        return (StatusCode::BAD_REQUEST, "broken").into_response();
    }
    axum::Json(json!({
        "count": 2,
        "value": [
            { "id": 1, "name": "Azure Pipelines", "isHosted": true, "size": 10 },
            { "id": 5, "name": "Linux", "isHosted": false, "size": 3 }
        ]
    }))
    .into_response()
}

async fn mock_server() -> (String, Arc<Mock>) {
    let mock = Arc::new(Mock::default());
    let router = Router::new()
        .route("/_apis/projects", get(projects))
        .route("/_apis/distributedtask/pools", get(pools))
        .route("/:project/_apis/git/pullrequests", get(pull_requests))
        .with_state(Arc::clone(&mock));
    (serve(router).await, mock)
}

fn settings(base: &str, extra: &str) -> Settings {
    let config = ExporterConfig::parse(&format!(
        r#"{{
            azure_devops: {{
                organisation: "contoso",
                url: "{base}",
                access_token: "secret",
                {extra}
            }},
            request: {{ retries: 1, timeout_secs: 5 }},
        }}"#
    ))
    .unwrap();
    config.resolve().unwrap()
}

fn project(id: &str) -> Project {
    Project {
        id: id.to_string(),
        name: id.to_string(),
        ..Default::default()
    }
}

fn scheduler(settings: &Settings, projects: &[&str]) -> (Scheduler, SharedRegistry) {
    let client = Arc::new(ApiClient::new(settings.client.clone()).unwrap());
    let registry = Arc::new(Registry::new());
    let snapshot = ResourceSnapshot::new(projects.iter().map(|p| project(p)).collect(), Vec::new());
    let source = ResourceSource::fixed(snapshot, Vec::new());
    let scheduler = Scheduler::new(settings, client, Arc::clone(&registry), source).unwrap();
    (scheduler, registry)
}

fn pr_ids(registry: &Registry, project: &str) -> Vec<String> {
    let mut ids: Vec<String> = registry
        .series(PR_INFO)
        .into_iter()
        .filter(|(labels, _)| labels.iter().any(|(k, v)| k == "projectID" && v == project))
        .filter_map(|(labels, _)| {
            labels
                .into_iter()
                .find(|(k, _)| k == "pullrequestID")
                .map(|(_, v)| v)
        })
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_failed_resource_keeps_previous_series() {
    let (base, mock) = mock_server().await;
    let settings = settings(&base, "");
    let (scheduler, registry) = scheduler(&settings, &["A", "B", "C"]);
    let collector = scheduler.collector(CollectorKind::PullRequest).unwrap();

    let report = collector.run_cycle().await.unwrap();
    assert_eq!((report.succeeded, report.failed), (3, 0));
    assert_eq!(pr_ids(&registry, "A"), vec!["1", "2"]);
    assert!(pr_ids(&registry, "B").is_empty());
    assert_eq!(pr_ids(&registry, "C"), vec!["7"]);

    let first = registry.collector_stats("pullrequest").unwrap();
    assert_eq!(first.errors_total, 0);
    assert!(first.last_success.is_some());

    mock.failing.lock().insert("C".to_string());
    let report = collector.run_cycle().await.unwrap();
    assert_eq!((report.succeeded, report.failed), (2, 1));

    // C failed: its series survive, the others are replaced.
    assert_eq!(pr_ids(&registry, "A"), vec!["1", "2"]);
    assert_eq!(pr_ids(&registry, "C"), vec!["7"]);

    let second = registry.collector_stats("pullrequest").unwrap();
    assert_eq!(second.cycles, 2);
    assert_eq!(second.errors_total, 1);
    assert_eq!(second.last_failed, 1);
    assert_eq!(second.last_success, first.last_success);
}

#[tokio::test]
async fn test_vanished_resource_drops_its_series() {
    let (base, _mock) = mock_server().await;
    let settings = settings(&base, "");

    let (scheduler, registry) = scheduler(&settings, &["A", "C"]);
    let collector = scheduler.collector(CollectorKind::PullRequest).unwrap();
    collector.run_cycle().await.unwrap();
    assert_eq!(registry.series(PR_INFO).len(), 3);

    // The same registry fed by a collector that no longer sees project C.
    let client = Arc::new(ApiClient::new(settings.client.clone()).unwrap());
    let source = ResourceSource::fixed(ResourceSnapshot::new(vec![project("A")], Vec::new()), Vec::new());
    let scheduler = Scheduler::new(&settings, client, Arc::clone(&registry), source).unwrap();
    let collector = scheduler.collector(CollectorKind::PullRequest).unwrap();
    collector.run_cycle().await.unwrap();

    assert_eq!(pr_ids(&registry, "A"), vec!["1", "2"]);
    assert!(pr_ids(&registry, "C").is_empty());
}

#[tokio::test]
async fn test_repeated_cycles_are_idempotent() {
    let (base, _mock) = mock_server().await;
    let settings = settings(&base, "");
    let (scheduler, registry) = scheduler(&settings, &["A", "B", "C"]);
    let collector = scheduler.collector(CollectorKind::PullRequest).unwrap();

    collector.run_cycle().await.unwrap();
    let first = registry.series(PR_INFO);
    let first_count = registry.series_count();

    collector.run_cycle().await.unwrap();
    assert_eq!(registry.series(PR_INFO), first);
    assert_eq!(registry.series_count(), first_count);
}

#[tokio::test]
async fn test_overrunning_cycle_skips_tick() {
    let (base, mock) = mock_server().await;
    mock.delay_ms.store(300, Ordering::SeqCst);
    let settings = settings(&base, "");
    let (scheduler, registry) = scheduler(&settings, &["A"]);
    let collector = Arc::clone(scheduler.collector(CollectorKind::PullRequest).unwrap());

    let running = {
        let collector = Arc::clone(&collector);
        tokio::spawn(async move { collector.run_cycle().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(collector.run_cycle().await.is_none());
    let report = running.await.unwrap().unwrap();
    assert_eq!(report.succeeded, 1);

    let stats = registry.collector_stats("pullrequest").unwrap();
    assert_eq!(stats.skipped_ticks, 1);
    assert_eq!(stats.cycles, 1);
}

#[tokio::test]
async fn test_render_matches_registry() {
    let (base, _mock) = mock_server().await;
    let settings = settings(&base, "");
    let (scheduler, registry) = scheduler(&settings, &["A", "B", "C"]);
    scheduler
        .collector(CollectorKind::PullRequest)
        .unwrap()
        .run_cycle()
        .await
        .unwrap();

    let body = registry.render();
    assert!(body.contains("# HELP azure_devops_pullrequest_info "));
    assert!(body.contains("# TYPE azure_devops_pullrequest_info gauge"));
    assert!(body.contains(
        r#"azure_devops_pullrequest_label{projectID="A",pullrequestID="1",label="review",active="true"} 1"#
    ));
    assert!(body.contains(r#"voteStatus="approved""#));

    let lines = body
        .lines()
        .filter(|l| l.starts_with("azure_devops_pullrequest_info{"))
        .count();
    assert_eq!(lines, registry.series(PR_INFO).len());

    assert!(body.contains(
        r#"azure_devops_collector_cycles_total{collector="pullrequest"} 1"#
    ));
}

#[tokio::test]
async fn test_discovery_keeps_snapshot_on_failure() {
    let (base, mock) = mock_server().await;
    let settings = settings(
        &base,
        r#"blacklist_projects: ["Archive"], agent_pool_ids: [5],"#,
    );
    let client = Arc::new(ApiClient::new(settings.client.clone()).unwrap());
    let registry = Arc::new(Registry::new());

    let (discovery, rx) = Discovery::new(client, settings.discovery.clone(), Arc::clone(&registry));
    assert!(rx.borrow().projects.is_empty());

    let snapshot = discovery.refresh().await.unwrap();
    let ids: Vec<&str> = snapshot.projects.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B"]);
    assert_eq!(snapshot.agent_pools.len(), 1);
    assert_eq!(snapshot.agent_pools[0].id, 5);
    assert_eq!(rx.borrow().projects.len(), 2);

    mock.pools_fail.store(true, Ordering::SeqCst);
    assert!(discovery.refresh().await.is_err());

    // All-or-nothing: the projects listed before the pool failure are not published.
    assert_eq!(rx.borrow().projects.len(), 2);
    assert!(Arc::ptr_eq(&discovery.current(), &snapshot));

    let stats = registry.discovery_stats();
    assert_eq!(stats.refreshes, 2);
    assert_eq!(stats.errors_total, 1);
    assert_eq!(stats.projects, 2);
}

#[tokio::test]
async fn test_collectors_follow_discovery() {
    let (base, _mock) = mock_server().await;
    let settings = settings(&base, "");
    let client = Arc::new(ApiClient::new(settings.client.clone()).unwrap());
    let registry = Arc::new(Registry::new());

    let (discovery, rx) = Discovery::new(
        Arc::clone(&client),
        settings.discovery.clone(),
        Arc::clone(&registry),
    );
    let source = ResourceSource::new(rx, Vec::new());
    let scheduler = Scheduler::new(&settings, client, Arc::clone(&registry), source).unwrap();
    let collector = scheduler.collector(CollectorKind::PullRequest).unwrap();

    let report = collector.run_cycle().await.unwrap();
    assert_eq!(report.resources, 0);

    discovery.refresh().await.unwrap();
    let report = collector.run_cycle().await.unwrap();
    assert_eq!(report.resources, 3);
    assert_eq!(pr_ids(&registry, "A"), vec!["1", "2"]);
}

#[tokio::test]
async fn test_http_server_serves_and_stops() {
    let (base, _mock) = mock_server().await;
    let settings = settings(&base, "");
    let (scheduler, registry) = scheduler(&settings, &["A"]);
    scheduler
        .collector(CollectorKind::PullRequest)
        .unwrap()
        .run_cycle()
        .await
        .unwrap();

    let addr = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = HttpServer::new(
        Arc::clone(&registry),
        addr,
        "/metrics".to_string(),
        Duration::from_secs(5),
    );
    let task = tokio::spawn(server.run(shutdown_rx));

    let http = reqwest::Client::new();
    let mut body = None;
    for _ in 0..50 {
        match http.get(format!("http://{addr}/metrics")).send().await {
            Ok(response) => {
                assert_eq!(response.status(), reqwest::StatusCode::OK);
                body = Some(response.text().await.unwrap());
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let body = body.expect("server did not start");
    assert!(body.contains(r#"pullrequestID="2""#));

    let health = http
        .get(format!("http://{addr}/healthz"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);
    assert_eq!(health.text().await.unwrap(), "Ok");

    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_health_answers_during_slow_initial_discovery() {
    let (base, mock) = mock_server().await;
    mock.projects_delay_ms.store(3_000, Ordering::SeqCst);

    let mut settings = settings(&base, "");
    settings.server.listen = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let addr = settings.server.listen;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let exporter = Exporter::start(&settings, shutdown_rx).unwrap();

    let http = reqwest::Client::new();
    let mut healthy = false;
    for _ in 0..50 {
        if let Ok(response) = http.get(format!("http://{addr}/healthz")).send().await {
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            assert_eq!(response.text().await.unwrap(), "Ok");
            healthy = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(healthy, "health endpoint did not answer");
    assert!(exporter.registry().discovery_stats().last_success.is_none());

    shutdown_tx.send(true).unwrap();
    exporter.join(Duration::from_secs(5)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scrape_never_mixes_two_cycles() {
    use azdo_exporter::batch::{FamilyDesc, MetricBatch};
    use azdo_exporter::registry::CycleResult;

    const BUILD_STATUS: FamilyDesc = FamilyDesc {
        name: "azure_devops_build_status",
        help: "Azure DevOps build",
        labels: &["buildID"],
    };
    const SERIES: usize = 500;
    const CYCLES: usize = 50;

    fn cycle(n: usize) -> CycleResult {
        let mut batch = MetricBatch::new();
        for id in 0..SERIES {
            batch.add_gauge(&BUILD_STATUS, [("buildID", id.to_string())], n as f64);
        }
        CycleResult {
            batches: vec![("project:p1".into(), batch)],
            ..Default::default()
        }
    }

    let registry: SharedRegistry = Arc::new(Registry::new());
    registry.register("build", &[BUILD_STATUS]).unwrap();
    registry.apply_cycle("build", cycle(0));

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let registry = Arc::clone(&registry);
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            let mut renders = 0usize;
            loop {
                let finished = done.load(Ordering::SeqCst);
                let body = registry.render();
                let values: Vec<&str> = body
                    .lines()
                    .filter(|line| line.starts_with("azure_devops_build_status{"))
                    .filter_map(|line| line.rsplit(' ').next())
                    .collect();
                assert_eq!(values.len(), SERIES);
                assert!(
                    values.iter().all(|v| *v == values[0]),
                    "render mixed cycles"
                );
                renders += 1;
                if finished {
                    break renders;
                }
            }
        })
    };

    for n in 1..=CYCLES {
        registry.apply_cycle("build", cycle(n));
        tokio::task::yield_now().await;
    }
    done.store(true, Ordering::SeqCst);

    let renders = reader.join().unwrap();
    assert!(renders > 0);
    assert_eq!(registry.series("azure_devops_build_status").len(), SERIES);
    assert!(
        registry
            .series("azure_devops_build_status")
            .iter()
            .all(|(_, value)| *value == CYCLES as f64)
    );
}
