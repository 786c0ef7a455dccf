//! Built-in suites, one per feature area
//!
//! Each suite gates itself: API scenarios skip when the health probe
//! fails, browser scenarios skip when the front end or Playwright is
//! missing. Test bodies are plain `async fn`s returning [`StepResult`].

use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::ApiResponse;
use crate::domain::{GameType, ProvisionRequest, Tier};
use crate::envelope;
use crate::runner::Suite;
use crate::scenario::{ensure, skip, ScenarioContext, StepResult};
use crate::telemetry::{debug_value, log_step};

pub mod admin_dashboard;
pub mod admin_production;
pub mod auth_contract;
pub mod checkout_api;
pub mod flows;
pub mod server_lifecycle;
pub mod server_provisioning;
pub mod subscription_lifecycle;
pub mod subscription_payment;
pub mod user_journey;
pub mod web_app;

/// Every built-in suite, in run order
pub fn default_suites() -> Vec<Box<dyn Suite>> {
    vec![
        Box::new(checkout_api::CheckoutApi),
        Box::new(auth_contract::AuthContract),
        Box::new(server_provisioning::ServerProvisioning),
        Box::new(server_lifecycle::ServerLifecycle),
        Box::new(subscription_lifecycle::SubscriptionLifecycle),
        Box::new(subscription_payment::SubscriptionPayment),
        Box::new(web_app::WebApp),
        Box::new(user_journey::UserJourney),
        Box::new(admin_dashboard::AdminDashboard),
        Box::new(admin_production::AdminProduction),
    ]
}

/// `GET /api/health` must answer `{status: "healthy"}`
pub(crate) async fn health_check(ctx: &ScenarioContext) -> StepResult<()> {
    log_step("Checking API health");
    let resp = ctx.probe.health().await?;
    if !resp.is_success() {
        return skip(format!("API not available (health returned {})", resp.status));
    }
    let status = resp.field(&["status"]).and_then(|v| v.as_str());
    ensure(
        status == Some("healthy"),
        format!("health status: expected \"healthy\", got {:?}", status),
    )?;
    debug!("Health check passed");
    Ok(())
}

/// Status line at debug level, the way every API step reports
pub(crate) fn log_response(label: &str, resp: &ApiResponse) {
    debug_value(label, Some(&json!({ "status": resp.status })));
}

/// Provision a fixture server for later steps; failures are only logged
pub(crate) async fn provision_fixture(ctx: &ScenarioContext, server_id: &str, user_id: &str, name: &str) {
    if !ctx.probe.check().await.is_available() {
        return;
    }
    let request = ProvisionRequest::new(server_id, user_id, name, GameType::Minecraft, Tier::Small);
    match ctx.api.provision_server(&request).await {
        Ok(resp) => info!("Fixture server {} provision returned {}", server_id, resp.status),
        Err(e) => warn!("Fixture server {} could not be provisioned: {}", server_id, e),
    }
}

/// The app bounced an unauthenticated visitor to a login page
pub(crate) fn redirected_to_login(url: &str) -> bool {
    url.contains("login") || url.contains("auth")
}

/// Titles are checked only once hydration has set one
pub(crate) fn title_ok(title: &str, keywords: &[&str]) -> bool {
    let title = title.to_lowercase();
    title.is_empty() || keywords.iter().any(|k| title.contains(k))
}

/// Number of records in a list response, whatever its envelope
pub(crate) fn list_len(resp: &ApiResponse, paths: &[&str]) -> usize {
    envelope::pick_array(&resp.body, paths).map_or(0, Vec::len)
}
