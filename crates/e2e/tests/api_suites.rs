use realm_e2e::scenarios::{checkout_api::CheckoutApi, server_provisioning::ServerProvisioning};
use realm_e2e::scenarios::{auth_contract::AuthContract, server_lifecycle::ServerLifecycle};
use realm_e2e::scenarios::subscription_payment::SubscriptionPayment;
use realm_e2e::{E2eConfig, Outcome, RunFilter, TestRunner};
use regex::Regex;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Closed port; connections are refused immediately
const OFFLINE: &str = "http://127.0.0.1:9";

fn config_for(api_url: &str) -> E2eConfig {
    let mut config = E2eConfig::default();
    config.functions_url = api_url.to_string();
    config.web_url = OFFLINE.to_string();
    config.admin_url = OFFLINE.to_string();
    config.runner.retries = Some(0);
    config.timeouts.probe_ms = 1_000;
    config
}

fn grep(pattern: &str) -> RunFilter {
    RunFilter {
        grep: Some(Regex::new(pattern).unwrap()),
        ..Default::default()
    }
}

fn outcomes(summary: &realm_e2e::RunSummary) -> Vec<(String, &'static str)> {
    summary
        .suites
        .iter()
        .flat_map(|s| s.tests.iter())
        .map(|t| (t.name.clone(), t.outcome.label()))
        .collect()
}

async fn healthy(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "healthy" })))
        .mount(server)
        .await;
}

/// Provision answers 202 and echoes the requested id, or `id_override`
async fn provisioning(server: &MockServer, id_override: Option<&'static str>) {
    Mock::given(method("POST"))
        .and(path("/api/game-servers/provision"))
        .respond_with(move |req: &Request| {
            let body: Value = req.body_json().unwrap_or(Value::Null);
            let requested = body["serverId"].as_str().unwrap_or_default().to_string();
            let server_id = id_override.map(str::to_string).unwrap_or(requested);
            ResponseTemplate::new(202).set_body_json(json!({
                "success": true,
                "data": { "serverId": server_id, "status": "installing" }
            }))
        })
        .mount(server)
        .await;
}

/// Everything the checkout-api suite touches, behaving
async fn commerce_api(server: &MockServer, provision_id: Option<&'static str>) {
    healthy(server).await;
    provisioning(server, provision_id).await;
    Mock::given(method("POST"))
        .and(path("/api/checkout/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "checkoutUrl": "https://www.mollie.com/checkout/test-mode?method=ideal&token=6.abc",
                "paymentId": "tr_test123"
            }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/game-servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/subscriptions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "data": { "id": "sub_test", "status": "pending" }
        })))
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/api/game-servers/[^/]+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn checkout_api_passes_against_a_conforming_api() {
    let server = MockServer::start().await;
    commerce_api(&server, None).await;

    let mut runner = TestRunner::with_config(config_for(&server.uri()));
    runner.register(Box::new(CheckoutApi));
    let summary = runner.run(&RunFilter::default()).await.unwrap();

    assert_eq!(summary.total, 5);
    assert_eq!(summary.passed, 5, "{:?}", summary.failures().collect::<Vec<_>>());
    assert_eq!(summary.exit_code(), 0);

    let deletes = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "DELETE")
        .count();
    assert_eq!(deletes, 1, "teardown deletes the provisioned server once");
}

#[tokio::test]
async fn wrong_server_id_fails_only_the_provision_test() {
    let server = MockServer::start().await;
    commerce_api(&server, Some("someone-elses-server")).await;

    let mut runner = TestRunner::with_config(config_for(&server.uri()));
    runner.register(Box::new(CheckoutApi));
    let summary = runner.run(&RunFilter::default()).await.unwrap();

    assert_eq!((summary.passed, summary.failed), (4, 1));
    let failure = summary.failures().next().unwrap();
    assert_eq!(failure.name, "provision server");
    match &failure.outcome {
        Outcome::Failed { error } => assert!(error.contains("someone-elses-server")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn unhealthy_api_skips_instead_of_failing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut runner = TestRunner::with_config(config_for(&server.uri()));
    runner.register(Box::new(CheckoutApi));
    let summary = runner.run(&RunFilter::default()).await.unwrap();

    assert_eq!(summary.skipped, summary.total);
    assert_eq!(summary.exit_code(), 0);
    // Only the health endpoint was ever called
    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .filter(|r| r.method.as_str() != "DELETE")
        .all(|r| r.url.path() == "/api/health"));
}

#[tokio::test]
async fn missing_payment_key_is_reported_as_misconfiguration() {
    let server = MockServer::start().await;
    healthy(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "subscriptions": [] } })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/checkout/create"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "success": false,
            "message": "Missing authentication: Bearer token required"
        })))
        .mount(&server)
        .await;

    let mut runner = TestRunner::with_config(config_for(&server.uri()));
    runner.register(Box::new(SubscriptionPayment));
    let summary = runner.run(&grep("Mollie|list user subscriptions")).await.unwrap();

    let outcomes: Vec<(&str, &str)> = summary.suites[0]
        .tests
        .iter()
        .map(|t| (t.name.as_str(), t.outcome.label()))
        .collect();
    // Listing needs only the API, so the broken purchase chain leaves it alone
    assert_eq!(
        outcomes,
        [
            ("create checkout session with Mollie", "failed"),
            ("navigate to Mollie checkout page", "skipped"),
            ("complete payment on Mollie", "skipped"),
            ("list user subscriptions", "passed"),
        ]
    );
    match &summary.suites[0].tests[0].outcome {
        Outcome::Failed { error } => assert!(error.contains("MOLLIE_API_KEY"), "{}", error),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn invalid_payloads_must_be_rejected() {
    let server = MockServer::start().await;
    healthy(&server).await;
    for endpoint in ["/api/checkout/create", "/api/game-servers/provision"] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "error": "validation failed"
            })))
            .mount(&server)
            .await;
    }

    let mut runner = TestRunner::with_config(config_for(&server.uri()));
    runner.register(Box::new(SubscriptionPayment));
    runner.register(Box::new(ServerProvisioning));
    let summary = runner.run(&grep("rejects")).await.unwrap();

    assert_eq!(summary.total, 8);
    assert_eq!(summary.passed, 8, "{:?}", summary.failures().collect::<Vec<_>>());
}

#[tokio::test]
async fn accepting_an_invalid_payload_fails() {
    let server = MockServer::start().await;
    healthy(&server).await;
    provisioning(&server, None).await;

    let mut runner = TestRunner::with_config(config_for(&server.uri()));
    runner.register(Box::new(ServerProvisioning));
    let summary = runner.run(&grep("rejects invalid tier")).await.unwrap();

    assert_eq!(summary.failed, 1);
    match &summary.suites[0].tests[0].outcome {
        Outcome::Failed { error } => assert!(error.contains("returned 202"), "{}", error),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn payment_posts_skip_while_health_is_failing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/checkout/create"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut runner = TestRunner::with_config(config_for(&server.uri()));
    runner.register(Box::new(SubscriptionPayment));
    let summary = runner.run(&grep("Mollie|rejects")).await.unwrap();

    assert_eq!(summary.total, 8);
    assert_eq!(summary.skipped, summary.total, "{:?}", outcomes(&summary));
}

#[tokio::test]
async fn degraded_health_still_runs_property_updates_and_deletes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "status": "degraded" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/game-servers/[^/]+/status$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "status": "running" } })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(path_regex(r"^/api/game-servers"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "success": false })))
        .mount(&server)
        .await;

    let mut runner = TestRunner::with_config(config_for(&server.uri()));
    runner.register(Box::new(ServerLifecycle));
    let summary = runner.run(&RunFilter::default()).await.unwrap();

    let expected: Vec<(String, &str)> = [
        ("stop server", "skipped"),
        ("start server", "skipped"),
        ("restart server", "skipped"),
        ("create backup", "skipped"),
        ("update server name", "passed"),
        ("update server config", "passed"),
        ("upgrade tier small to medium", "passed"),
        ("tier change persisted", "passed"),
        ("delete server keeping data", "passed"),
        ("delete server and data", "passed"),
    ]
    .into_iter()
    .map(|(name, label)| (name.to_string(), label))
    .collect();
    assert_eq!(outcomes(&summary), expected);
    // Fixtures are provisioned only behind a healthy API
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/api/game-servers/provision"));
}

/// `/api/auth/me` answers 200 only for `Bearer live-token`
async fn auth_api(server: &MockServer) {
    healthy(server).await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("Authorization", "Bearer live-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "user_id": "u-1",
            "provider_name": "aad",
            "user_claims": [{ "typ": "email", "val": "player@realmgrid.io" }]
        }])))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Unauthorized" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn auth_contract_passes_against_a_conforming_api() {
    let server = MockServer::start().await;
    auth_api(&server).await;

    let mut config = config_for(&server.uri());
    config.auth_token = Some("live-token".to_string());
    let mut runner = TestRunner::with_config(config);
    runner.register(Box::new(AuthContract));
    let summary = runner.run(&RunFilter::default()).await.unwrap();

    assert_eq!(summary.total, 6);
    assert_eq!(summary.passed, 6, "{:?}", outcomes(&summary));

    let bearers: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/api/auth/me")
        .filter_map(|r| {
            r.headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .collect();
    assert!(bearers.contains(&"Bearer invalid.token.here".to_string()));
    // The expired token is a signed three-part JWT
    assert!(bearers
        .iter()
        .any(|b| b != "Bearer invalid.token.here" && b != "Bearer live-token" && b.split('.').count() == 3));
}

#[tokio::test]
async fn accepting_bad_tokens_fails_and_sessionless_checks_skip() {
    let server = MockServer::start().await;
    healthy(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "user_id": "anyone" }])))
        .mount(&server)
        .await;

    let mut runner = TestRunner::with_config(config_for(&server.uri()));
    runner.register(Box::new(AuthContract));
    let summary = runner.run(&RunFilter::default()).await.unwrap();

    let expected: Vec<(String, &str)> = [
        ("rejects unauthenticated requests", "failed"),
        ("rejects an invalid token", "failed"),
        ("rejects an expired token", "failed"),
        ("returns user information for a valid token", "skipped"),
        ("logout", "skipped"),
        ("session is gone after logout", "skipped"),
    ]
    .into_iter()
    .map(|(name, label)| (name.to_string(), label))
    .collect();
    assert_eq!(outcomes(&summary), expected);
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn whole_run_skips_cleanly_without_infrastructure() {
    let runner = TestRunner::new(config_for(OFFLINE));
    let summary = runner.run(&RunFilter::default()).await.unwrap();

    assert!(summary.total > 40, "only {} tests recorded", summary.total);
    assert_eq!(summary.failed, 0, "{:?}", summary.failures().collect::<Vec<_>>());
    assert_eq!(summary.passed, 0);
    assert_eq!(summary.skipped, summary.total);
    assert_eq!(summary.exit_code(), 0);
}
