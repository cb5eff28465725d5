//! Run control API tests against the in-process router.

mod common;

use axum::http::StatusCode;

use common::{fixtures, TestFixture};

const FILES: i64 = 2 * fixtures::CLASS_RANGES.len() as i64;
const RECORDS: i64 = FILES * fixtures::JOURNAL_RECORDS as i64;

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
}

#[tokio::test]
async fn test_status_when_idle() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/scraper/status").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["state"], "idle");
    assert_eq!(response.body["worker_running"], true);
    assert!(response.body["run_id"].is_null());
    assert!(response.body["last_run"].is_null());
    assert_eq!(response.body["totals"]["publications"], 0);
    assert_eq!(response.body["schedule"]["enabled"], false);
    assert_eq!(
        response.body["schedule"]["description"],
        "Every Monday at 09:00 (UTC+05:30)"
    );
}

#[tokio::test]
async fn test_run_completes() {
    let fixture = TestFixture::new().await;

    let response = fixture.post("/api/v1/scraper/run").await;
    assert_status!(response, StatusCode::ACCEPTED);
    let run_id = response.body["run_id"].as_str().unwrap().to_string();
    assert_eq!(response.body["mode"], "full");

    let status = fixture.wait_for_idle().await;
    assert_eq!(status["last_outcome"], "success");
    assert_eq!(status["totals"]["publications"], 2);
    assert_eq!(status["totals"]["files"], FILES);
    assert_eq!(status["totals"]["records"], RECORDS);
    assert_eq!(status["totals"]["runs"], 1);
    assert_eq!(status["last_run"]["run_id"], run_id.as_str());
    assert_eq!(status["last_run"]["trigger"], "manual");

    let logs = fixture.get("/api/v1/scraper/logs").await;
    assert_status!(logs, StatusCode::OK);
    assert_eq!(logs.body["total"], 1);
    let entry = &logs.body["logs"][0];
    assert_eq!(entry["run_id"], run_id.as_str());
    assert_eq!(entry["outcome"], "success");
    assert_eq!(entry["publications_found"], 2);
    assert_eq!(entry["files_downloaded"], FILES);
    assert_eq!(entry["records_extracted"], RECORDS);
    assert_eq!(entry["details"]["mode"], "full");
}

#[tokio::test]
async fn test_trigger_while_running_conflicts() {
    let fixture = TestFixture::new().await;
    fixture.navigator.set_delay_ms(100).await;

    let first = fixture.post("/api/v1/scraper/run").await;
    assert_status!(first, StatusCode::ACCEPTED);

    for path in [
        "/api/v1/scraper/run",
        "/api/v1/scraper/download",
        "/api/v1/scraper/extract",
    ] {
        let response = fixture.post(path).await;
        assert_status!(response, StatusCode::CONFLICT);
        assert_eq!(response.body["error"], "run in progress");
    }

    let busy = fixture.get("/api/v1/scraper/status").await;
    assert_ne!(busy.body["state"], "idle");
    assert_eq!(busy.body["run_id"], first.body["run_id"]);

    fixture.wait_for_idle().await;
    let logs = fixture.get("/api/v1/scraper/logs").await;
    assert_eq!(logs.body["total"], 1);
}

#[tokio::test]
async fn test_download_then_extract() {
    let fixture = TestFixture::new().await;

    let response = fixture.post("/api/v1/scraper/download").await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["mode"], "download_only");
    let status = fixture.wait_for_idle().await;
    assert_eq!(status["totals"]["files"], FILES);
    assert_eq!(status["totals"]["records"], 0);

    let response = fixture.post("/api/v1/scraper/extract").await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["mode"], "extract_only");
    let status = fixture.wait_for_idle().await;
    assert_eq!(status["totals"]["records"], RECORDS);
    assert_eq!(status["last_run"]["details"]["mode"], "extract_only");
    assert_eq!(status["totals"]["runs"], 2);
}

#[tokio::test]
async fn test_partial_run_reports_error() {
    let fixture = TestFixture::new().await;
    fixture.navigator.fail_target("2236:1-34").await;

    fixture.post("/api/v1/scraper/run").await;
    let status = fixture.wait_for_idle().await;

    assert_eq!(status["last_outcome"], "partial");
    assert!(status["last_error"]
        .as_str()
        .unwrap()
        .contains("1 download(s) failed"));
    assert_eq!(status["last_run"]["details"]["downloads"]["failed"], 1);
}

#[tokio::test]
async fn test_logs_limit() {
    let fixture = TestFixture::new().await;
    for _ in 0..3 {
        let response = fixture.post("/api/v1/scraper/extract").await;
        assert_status!(response, StatusCode::ACCEPTED);
        fixture.wait_for_idle().await;
    }

    let response = fixture.get("/api/v1/scraper/logs?limit=2").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["logs"].as_array().unwrap().len(), 2);
    assert_eq!(response.body["total"], 3);

    let response = fixture.get("/api/v1/scraper/logs?limit=0").await;
    assert_eq!(response.body["logs"].as_array().unwrap().len(), 1);

    let response = fixture.get("/api/v1/scraper/logs?limit=abc").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cleanup() {
    let fixture = TestFixture::new().await;
    fixture.post("/api/v1/scraper/run").await;
    fixture.wait_for_idle().await;

    let response = fixture.delete("/api/v1/scraper/cleanup").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["publications_deleted"], 2);
    assert_eq!(response.body["run_logs_deleted"], 1);
    assert_eq!(response.body["download_dir_removed"], true);
    assert!(!fixture.temp_dir.path().join("downloads").exists());

    let status = fixture.get("/api/v1/scraper/status").await;
    assert_eq!(status.body["totals"]["publications"], 0);
    assert_eq!(status.body["totals"]["files"], 0);
    assert_eq!(status.body["totals"]["records"], 0);
    assert_eq!(status.body["totals"]["runs"], 0);
}

#[tokio::test]
async fn test_cleanup_while_running_conflicts() {
    let fixture = TestFixture::new().await;
    fixture.navigator.set_delay_ms(100).await;

    fixture.post("/api/v1/scraper/run").await;
    let response = fixture.delete("/api/v1/scraper/cleanup").await;
    assert_status!(response, StatusCode::CONFLICT);
    assert_eq!(response.body["error"], "run in progress");

    fixture.wait_for_idle().await;
    let response = fixture.delete("/api/v1/scraper/cleanup").await;
    assert_status!(response, StatusCode::OK);
}

#[tokio::test]
async fn test_worker_stopped_is_unavailable() {
    let fixture = TestFixture::new().await;
    fixture.coordinator.stop().await;

    let response = fixture.post("/api/v1/scraper/run").await;
    assert_status!(response, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.post("/api/v1/scraper/run").await;
    fixture.wait_for_idle().await;

    let (status, body) = fixture.get_text("/api/v1/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("harvester_runs_total"));
    assert!(body.contains("harvester_publications_by_status"));
    assert!(body.contains("harvester_http_requests_total"));
}

#[tokio::test]
async fn test_unknown_route() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/scraper/nope").await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let response = fixture.get("/api/v1/scraper/run").await;
    assert_status!(response, StatusCode::METHOD_NOT_ALLOWED);
}
