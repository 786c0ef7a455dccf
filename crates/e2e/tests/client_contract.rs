use std::time::Duration;

use realm_e2e::domain::{ServerStatus, Tier};
use realm_e2e::poll::{self, PollBudget};
use realm_e2e::probe::{ApiProbe, ProbeMode};
use realm_e2e::{report, ApiClient, E2eConfig, RunFilter, ScenarioContext, TestRunner};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn quick() -> PollBudget {
    PollBudget::new(Duration::from_millis(300), Duration::from_millis(20))
}

fn config_for(api_url: &str) -> E2eConfig {
    let mut config = E2eConfig::default();
    config.functions_url = api_url.to_string();
    config
}

#[tokio::test]
async fn function_key_and_query_reach_the_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/game-servers"))
        .and(query_param("code", "secret-key"))
        .and(query_param("userId", "user-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "servers": [{ "id": "a" }] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server.uri());
    config.functions_key = Some("secret-key".to_string());
    let api = ApiClient::new(&config).unwrap();

    let resp = api.list_servers("user-1").await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.endpoint, "GET /api/game-servers");
    assert!(resp.field(&["data", "servers"]).unwrap().is_array());
}

#[tokio::test]
async fn non_json_bodies_are_kept_raw() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/game-servers/srv-1"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let api = ApiClient::new(&config_for(&server.uri())).unwrap();
    let resp = api.get_server("srv-1").await.unwrap();
    assert!(!resp.is_success());
    assert!(resp.body.is_null());
    assert!(resp.raw.contains("Bad Gateway"));
}

#[tokio::test]
async fn probe_modes_disagree_on_degraded_health() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "status": "degraded" })))
        .mount(&server)
        .await;

    let url = format!("{}/api/health", server.uri());
    let strict = ApiProbe::new(url, Duration::from_secs(2), ProbeMode::Strict).unwrap();
    assert!(!strict.check().await.is_available());
    assert!(strict.with_mode(ProbeMode::Lenient).check().await.is_available());

    let health = strict.health().await.unwrap();
    assert_eq!(health.status, 503);
    assert_eq!(health.field(&["status"]), Some(&json!("degraded")));
}

#[tokio::test]
async fn server_status_poll_returns_the_accepted_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/game-servers/srv-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "status": "Running" } })))
        .mount(&server)
        .await;

    let api = ApiClient::new(&config_for(&server.uri())).unwrap();
    let state = poll::wait_for_server_status(&api, "srv-1", &ServerStatus::PROVISIONED, quick()).await;
    assert_eq!(state, Some(ServerStatus::Running));

    let halted = poll::wait_for_server_status(&api, "srv-1", &ServerStatus::HALTED, quick()).await;
    assert_eq!(halted, None);
}

#[tokio::test]
async fn tier_and_subscription_polls_read_the_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/game-servers/srv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "tier": "medium" } })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/subscriptions/sub-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sub-1",
            "status": "CANCELED"
        })))
        .mount(&server)
        .await;

    let api = ApiClient::new(&config_for(&server.uri())).unwrap();
    assert!(poll::wait_for_tier(&api, "srv-1", Tier::Medium, quick()).await);
    assert!(!poll::wait_for_tier(&api, "srv-1", Tier::Heavy, quick()).await);

    let record = poll::wait_for_subscription(&api, "sub-1", &["canceled", "cancelled"], quick())
        .await
        .unwrap();
    assert_eq!(record["id"], "sub-1");
}

#[tokio::test]
async fn reports_are_written_for_a_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "healthy" })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(&server.uri());
    config.runner.retries = Some(0);
    config.runner.output_dir = dir.path().join("test-results");
    std::fs::create_dir_all(config.runner.output_dir.join("flow-1")).unwrap();
    std::fs::write(config.runner.output_dir.join("flow-1/trace.zip"), b"zip").unwrap();

    let runner = TestRunner::new(config.clone());
    let ctx = ScenarioContext::new(config.clone()).unwrap();
    let filter = RunFilter {
        suite: Some("checkout-api".into()),
        grep: Some(regex::Regex::new("health").unwrap()),
        tag: None,
    };
    let summary = runner.run_with(&ctx, &filter).await.unwrap();
    assert_eq!((summary.total, summary.passed), (1, 1));

    let json_path = report::write_json(&summary, &config.runner.output_dir).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
    assert_eq!(parsed["suites"][0]["tests"][0]["status"], "passed");
    assert_eq!(parsed["workers"], 1);

    let html_path = report::write_html(&summary, &dir.path().join("report"), &config.runner.output_dir).unwrap();
    let html = std::fs::read_to_string(html_path).unwrap();
    assert!(html.contains("checkout-api"));
    assert!(html.contains("trace.zip"));
    assert!(report::format_list(&summary).contains("1 passed, 0 failed, 0 skipped"));
}
