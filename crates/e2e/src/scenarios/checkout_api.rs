//! Smoke tests for the commerce API surface

use async_trait::async_trait;
use tracing::info;

use super::{health_check, list_len, log_response};
use crate::domain::{CheckoutRequest, CreateSubscriptionRequest, GameType, ProvisionRequest, ServerStatus, Tier};
use crate::envelope;
use crate::ids::timestamp_ms;
use crate::runner::Suite;
use crate::scenario::{ensure, ScenarioContext, StepResult, SuiteRecorder};
use crate::telemetry::log_step;

const API_USER: &str = "e2e-test-user";

pub struct CheckoutApi;

#[async_trait(?Send)]
impl Suite for CheckoutApi {
    fn name(&self) -> &str {
        "checkout-api"
    }

    fn description(&self) -> &str {
        "Health, checkout, provisioning and subscription endpoints"
    }

    fn tags(&self) -> Vec<String> {
        vec!["api".into(), "smoke".into()]
    }

    async fn run(&self, ctx: &ScenarioContext, rec: &mut SuiteRecorder) {
        let server_id = format!("e2e-srv-{}", timestamp_ms());

        rec.case("health check returns healthy", || health_check(ctx)).await;
        rec.case("create checkout session", || create_checkout(ctx)).await;
        rec.case("provision server", || provision(ctx, &server_id)).await;
        rec.case("list user servers", || list_servers(ctx)).await;
        rec.case("create subscription", || create_subscription(ctx)).await;

        rec.teardown("delete provisioned server", ctx.api.cleanup_server(&server_id))
            .await;
    }
}

async fn create_checkout(ctx: &ScenarioContext) -> StepResult<()> {
    ctx.require_api().await?;
    log_step("Creating checkout session");

    let request = CheckoutRequest::new(
        API_USER,
        &ctx.config.test_user.email,
        GameType::Minecraft,
        Tier::Small,
        &format!("E2E-Test-{}", timestamp_ms()),
    );
    let resp = ctx.api.create_checkout(&request).await?;
    log_response("Checkout response", &resp);

    if resp.is_success() {
        let url = resp.require_str(&["data.checkoutUrl", "checkoutUrl"])?;
        info!("Checkout URL: {}", url);
    }
    Ok(())
}

async fn provision(ctx: &ScenarioContext, server_id: &str) -> StepResult<()> {
    ctx.require_api().await?;
    log_step("Provisioning server");

    let request = ProvisionRequest::new(
        server_id,
        API_USER,
        "E2E Test Server",
        GameType::Minecraft,
        Tier::Small,
    )
    .with_minecraft_settings("E2E Test Server");
    let resp = ctx.api.provision_server(&request).await?;
    log_response("Provision response", &resp);

    if matches!(resp.status, 200 | 202) && resp.success_flag() == Some(true) {
        let id = resp.require_str(&["data.serverId"])?;
        ensure(id == server_id, format!("provisioned id {} != {}", id, server_id))?;

        let status = resp.require_str(&["data.status"])?;
        let parsed = ServerStatus::parse(status);
        ensure(
            parsed.map_or(false, |s| ServerStatus::PROVISIONED.contains(&s)),
            format!("provision status '{}' is not a provisioning state", status),
        )?;
    }
    Ok(())
}

async fn list_servers(ctx: &ScenarioContext) -> StepResult<()> {
    ctx.require_api().await?;
    log_step("Listing servers");

    let resp = ctx.api.list_servers(API_USER).await?;
    log_response("List response", &resp);

    if resp.is_success() {
        ensure(
            envelope::pick_array(&resp.body, &["data", "servers"]).is_some(),
            "server list has neither data nor servers array",
        )?;
        info!("Found {} servers", list_len(&resp, &["data", "servers"]));
    }
    Ok(())
}

async fn create_subscription(ctx: &ScenarioContext) -> StepResult<()> {
    ctx.require_api().await?;
    log_step("Creating subscription");

    let request = CreateSubscriptionRequest {
        user_id: API_USER.to_string(),
        email: ctx.config.test_user.email.clone(),
        tier: Tier::Small,
        game_type: GameType::Minecraft,
        server_name: format!("E2E-Sub-{}", timestamp_ms()),
    };
    let resp = ctx.api.create_subscription(&request).await?;
    log_response("Subscription response", &resp);

    if resp.is_success() {
        ensure(!resp.body.is_null(), "subscription response has no body")?;
    }
    Ok(())
}
