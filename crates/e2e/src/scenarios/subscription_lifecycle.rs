//! Server provisioning after subscription, cancellation and the
//! subscription views.
//!
//! This suite gates on the lenient probe: a health endpoint reporting a
//! degraded state still lets it run.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{list_len, log_response, provision_fixture};
use crate::domain::{CancelSubscriptionRequest, GameType, ProvisionRequest, ServerStatus, Tier};
use crate::envelope;
use crate::ids::{timestamp_ms, TestIds};
use crate::poll::{self, PollBudget};
use crate::runner::Suite;
use crate::scenario::{ensure, ensure_eq, ScenarioContext, StepResult, SuiteRecorder};
use crate::status;
use crate::telemetry::log_step;

const AFTER_PROVISION: [ServerStatus; 5] = [
    ServerStatus::Installing,
    ServerStatus::Starting,
    ServerStatus::Running,
    ServerStatus::Pending,
    ServerStatus::Stopped,
];

pub struct SubscriptionLifecycle;

#[async_trait(?Send)]
impl Suite for SubscriptionLifecycle {
    fn name(&self) -> &str {
        "subscription-lifecycle"
    }

    fn description(&self) -> &str {
        "Provisioning after subscription, cancellation and subscription views"
    }

    fn tags(&self) -> Vec<String> {
        vec!["api".into(), "subscriptions".into()]
    }

    async fn run(&self, ctx: &ScenarioContext, rec: &mut SuiteRecorder) {
        // Provisioning after subscription
        let ids = ctx.ids();
        {
            let mut chain = rec.serial();
            let server = chain
                .step("subscription triggers server provisioning", provision_for_subscription(ctx, &ids))
                .await;
            chain
                .then("server is running or installing", server, |server_id| {
                    server_comes_up(ctx, server_id)
                })
                .await;
        }
        rec.teardown("delete subscription server", ctx.api.cleanup_server(&ids.server_id))
            .await;
        rec.teardown(
            "delete subscription",
            ctx.api.cleanup_subscription(&ids.subscription_id),
        )
        .await;

        // Cancellation
        let ids = ctx.ids();
        provision_fixture(ctx, &ids.server_id, &ids.user_id, "Cancel Test Server").await;
        rec.case("cancel subscription immediately", || cancel_immediately(ctx, &ids))
            .await;
        rec.case("server stops after immediate cancel", || server_halts(ctx, &ids))
            .await;
        rec.case("cancel subscription at period end", || cancel_at_period_end(ctx))
            .await;
        rec.teardown("delete cancel server", ctx.api.cleanup_server(&ids.server_id))
            .await;
        rec.teardown(
            "delete cancel subscription",
            ctx.api.cleanup_subscription(&ids.subscription_id),
        )
        .await;

        // Views
        let ids = ctx.ids();
        rec.case("list subscriptions for user", || list_for_user(ctx, &ids)).await;
        rec.case("get subscription details", || subscription_details(ctx, &ids))
            .await;
    }
}

/// Yields the provisioned server id when the API accepted it
async fn provision_for_subscription(ctx: &ScenarioContext, ids: &TestIds) -> StepResult<String> {
    ctx.require_api_reachable().await?;
    log_step("Creating subscription that should provision a server");

    let request = ProvisionRequest::new(
        &ids.server_id,
        &ids.user_id,
        "E2E Subscription Test Server",
        GameType::Minecraft,
        Tier::Small,
    )
    .with_minecraft_settings("E2E Lifecycle Test");
    let resp = ctx.api.provision_server(&request).await?;
    log_response("Provision response", &resp);
    resp.expect_status(&status::provision_async())?;

    ensure_eq(resp.success_flag(), Some(true), "success flag")?;
    let id = resp.require_str(&["data.serverId", "serverId"])?;
    ensure_eq(id, ids.server_id.as_str(), "serverId")?;
    info!("Server {} provisioned", id);
    Ok(id.to_string())
}

async fn server_comes_up(ctx: &ScenarioContext, server_id: String) -> StepResult<()> {
    ctx.require_api_reachable().await?;
    log_step("Checking server status");

    let budget = PollBudget::propagation();
    if let Some(state) = poll::wait_for_server_status(&ctx.api, &server_id, &AFTER_PROVISION, budget).await {
        info!("Server status: {}", state);
        return Ok(());
    }

    let resp = ctx.api.server_status(&server_id).await?;
    log_response("Status response", &resp);
    if resp.is_success() {
        let raw = envelope::pick_str(&resp.body, envelope::SERVER_STATUS).unwrap_or_default();
        return ensure(false, format!("server status '{}' never reached a provisioned state", raw));
    }
    warn!("Status endpoint answered {}; server state not verified", resp.status);
    Ok(())
}

async fn cancel_immediately(ctx: &ScenarioContext, ids: &TestIds) -> StepResult<()> {
    ctx.require_api_reachable().await?;
    log_step("Canceling subscription immediately");

    let request = CancelSubscriptionRequest {
        immediate: true,
        reason: "E2E Test - immediate cancellation".to_string(),
        skip_mollie: Some(true),
        timezone: None,
    };
    let resp = ctx.api.cancel_subscription(&ids.subscription_id, &request).await?;
    log_response("Cancel response", &resp);
    resp.expect_status(&status::found_or_missing())?;

    if resp.status == 404 {
        info!("Subscription not found (expected for an isolated test)");
        return Ok(());
    }
    ensure_eq(resp.success_flag(), Some(true), "success flag")?;
    ensure_eq(
        envelope::pick_str(&resp.body, &["data.status"]),
        Some("canceled"),
        "data.status",
    )?;
    ensure_eq(
        envelope::pick_bool(&resp.body, &["data.immediate"]),
        Some(true),
        "data.immediate",
    )?;
    info!("Subscription canceled immediately");
    Ok(())
}

async fn server_halts(ctx: &ScenarioContext, ids: &TestIds) -> StepResult<()> {
    ctx.require_api_reachable().await?;
    log_step("Verifying server stopped");

    let halted = poll::wait_for_server_status(
        &ctx.api,
        &ids.server_id,
        &ServerStatus::HALTED,
        PollBudget::propagation(),
    )
    .await;
    match halted {
        Some(state) => info!("Server is {} as expected", state),
        None => warn!("Server {} has not reported a halted state (may still be stopping)", ids.server_id),
    }
    Ok(())
}

async fn cancel_at_period_end(ctx: &ScenarioContext) -> StepResult<()> {
    ctx.require_api_reachable().await?;
    log_step("Testing scheduled cancellation");

    let subscription_id = format!("sub-scheduled-{}", timestamp_ms());
    let request = CancelSubscriptionRequest {
        immediate: false,
        reason: "E2E Test - scheduled cancellation".to_string(),
        skip_mollie: Some(true),
        timezone: Some("Europe/Amsterdam".to_string()),
    };
    let resp = ctx.api.cancel_subscription(&subscription_id, &request).await?;
    log_response("Scheduled cancel response", &resp);
    resp.expect_status(&status::found_or_missing())?;

    if resp.status == 404 {
        info!("Subscription not found (expected for an isolated test)");
        return Ok(());
    }
    ensure_eq(resp.success_flag(), Some(true), "success flag")?;
    ensure_eq(
        envelope::pick_str(&resp.body, &["data.status"]),
        Some("canceling"),
        "data.status",
    )?;
    let cancel_at = resp.require_field(&["data.cancelAt"])?;
    info!("Subscription scheduled for cancellation at {}", cancel_at);
    Ok(())
}

async fn list_for_user(ctx: &ScenarioContext, ids: &TestIds) -> StepResult<()> {
    ctx.require_api_reachable().await?;
    log_step("Listing user subscriptions");

    let resp = ctx.api.list_subscriptions(&ids.user_id).await?;
    log_response("List subscriptions response", &resp);
    if resp.is_success() {
        info!(
            "Found {} subscription(s) for user",
            list_len(&resp, envelope::SUBSCRIPTION_LIST)
        );
    }
    Ok(())
}

async fn subscription_details(ctx: &ScenarioContext, ids: &TestIds) -> StepResult<()> {
    ctx.require_api_reachable().await?;
    log_step("Getting subscription details");

    let resp = ctx.api.get_subscription(&ids.subscription_id).await?;
    log_response("Subscription details response", &resp);
    resp.expect_status(&status::found_or_missing())?;
    if resp.is_success() {
        info!("Subscription details retrieved");
    }
    Ok(())
}
