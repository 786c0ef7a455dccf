//! Power actions, property updates and deletion of a provisioned server

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{log_response, provision_fixture};
use crate::api::ServerAction;
use crate::domain::{ServerPatch, ServerStatus, Tier};
use crate::envelope;
use crate::ids::{generate_user_id, timestamp_ms, TestIds};
use crate::poll::{self, PollBudget};
use crate::runner::Suite;
use crate::scenario::{ensure, ensure_eq, ScenarioContext, StepResult, SuiteRecorder};
use crate::status::{self, StatusSet};
use crate::telemetry::log_step;

pub struct ServerLifecycle;

#[async_trait(?Send)]
impl Suite for ServerLifecycle {
    fn name(&self) -> &str {
        "server-lifecycle"
    }

    fn description(&self) -> &str {
        "Start/stop/restart/backup, property updates and deletion"
    }

    fn tags(&self) -> Vec<String> {
        vec!["api".into(), "servers".into()]
    }

    async fn run(&self, ctx: &ScenarioContext, rec: &mut SuiteRecorder) {
        // Power actions
        let server_id = format!("lifecycle-{}", timestamp_ms());
        let user_id = generate_user_id();
        provision_fixture(ctx, &server_id, &user_id, "Lifecycle Test").await;

        for (name, action, accepted) in [
            ("stop server", ServerAction::Stop, status::found_or_missing()),
            ("start server", ServerAction::Start, status::found_or_missing()),
            ("restart server", ServerAction::Restart, status::found_or_missing()),
            ("create backup", ServerAction::Backup, status::backup_accepted()),
        ] {
            rec.case(name, || power_action(ctx, &server_id, action, &accepted))
                .await;
        }
        rec.teardown("delete lifecycle server", ctx.api.cleanup_server(&server_id))
            .await;

        // Property updates and deletion answer even while health reports degraded
        let ids = ctx.ids();
        provision_fixture(ctx, &ids.server_id, &ids.user_id, "Original Server Name").await;

        rec.case("update server name", || update_name(ctx, &ids)).await;
        rec.case("update server config", || update_config(ctx, &ids)).await;
        {
            let mut chain = rec.serial();
            let upgraded = chain
                .step("upgrade tier small to medium", upgrade_tier(ctx, &ids))
                .await;
            chain
                .then("tier change persisted", upgraded, |upgraded| {
                    verify_tier(ctx, &ids, upgraded)
                })
                .await;
        }
        rec.teardown("delete property server", ctx.api.cleanup_server(&ids.server_id))
            .await;

        // Deletion
        let ids = ctx.ids();
        provision_fixture(ctx, &ids.server_id, &ids.user_id, "Delete Test Server").await;
        rec.case("delete server keeping data", || delete_keep_data(ctx, &ids.server_id))
            .await;
        rec.case("delete server and data", || delete_with_data(ctx, &ids.user_id))
            .await;
    }
}

async fn power_action(
    ctx: &ScenarioContext,
    server_id: &str,
    action: ServerAction,
    accepted: &StatusSet,
) -> StepResult<()> {
    ctx.require_api().await?;
    log_step(&format!("Sending {} to {}", action.as_str(), server_id));

    let resp = ctx.api.server_action(server_id, action).await?;
    log_response(&format!("{} response", action.as_str()), &resp);
    resp.expect_status(accepted)?;
    Ok(())
}

fn changes_include(body: &Value, field: &str) -> bool {
    envelope::pick_array(body, &["data.changes", "changes"])
        .map_or(false, |changes| changes.iter().any(|c| c.as_str() == Some(field)))
}

async fn update_name(ctx: &ScenarioContext, ids: &TestIds) -> StepResult<()> {
    ctx.require_api_reachable().await?;
    log_step("Updating server name");

    let new_name = format!("Updated Server Name {}", timestamp_ms());
    let patch = ServerPatch {
        name: Some(new_name.clone()),
        ..Default::default()
    };
    let resp = ctx.api.update_server(&ids.server_id, &patch).await?;
    log_response("Update response", &resp);

    if resp.is_success() {
        ensure_eq(resp.success_flag(), Some(true), "success flag")?;
        ensure(changes_include(&resp.body, "name"), "changes do not list 'name'")?;
        info!("Server name updated to \"{}\"", new_name);
    } else {
        resp.expect_status(&status::found_or_missing())?;
    }
    Ok(())
}

async fn update_config(ctx: &ScenarioContext, ids: &TestIds) -> StepResult<()> {
    ctx.require_api_reachable().await?;
    log_step("Updating server max players");

    let patch = ServerPatch {
        config: Some(json!({ "maxPlayers": 15, "difficulty": "hard" })),
        ..Default::default()
    };
    let resp = ctx.api.update_server(&ids.server_id, &patch).await?;
    log_response("Config update response", &resp);

    if resp.is_success() {
        ensure_eq(resp.success_flag(), Some(true), "success flag")?;
        if envelope::pick_bool(&resp.body, &["data.needsRestart"]) == Some(true) {
            info!("Server requires restart for changes to take effect");
        }
    } else {
        resp.expect_status(&status::found_or_missing())?;
    }
    Ok(())
}

/// Yields whether the API accepted the upgrade
async fn upgrade_tier(ctx: &ScenarioContext, ids: &TestIds) -> StepResult<bool> {
    ctx.require_api_reachable().await?;
    log_step("Upgrading server tier");

    let patch = ServerPatch {
        tier: Some(Tier::Medium),
        ..Default::default()
    };
    let resp = ctx.api.update_server(&ids.server_id, &patch).await?;
    log_response("Tier upgrade response", &resp);

    if resp.is_success() {
        ensure_eq(resp.success_flag(), Some(true), "success flag")?;
        let tier = resp.require_str(&["data.tier", "tier"])?;
        ensure_eq(tier, "medium", "tier")?;
        Ok(true)
    } else {
        resp.expect_status(&status::found_or_missing())?;
        Ok(false)
    }
}

async fn verify_tier(ctx: &ScenarioContext, ids: &TestIds, upgraded: bool) -> StepResult<()> {
    ctx.require_api_reachable().await?;
    log_step("Verifying server changes");

    if upgraded {
        let persisted =
            poll::wait_for_tier(&ctx.api, &ids.server_id, Tier::Medium, PollBudget::propagation()).await;
        ensure(persisted, "tier 'medium' was never reflected on the server record")?;
        info!("Server tier: medium");
        return Ok(());
    }

    let resp = ctx.api.get_server(&ids.server_id).await?;
    if resp.is_success() {
        if let Some(tier) = envelope::pick_str(&resp.body, &["data.tier", "tier"]) {
            ensure(
                tier == "small" || tier == "medium",
                format!("unexpected tier '{}'", tier),
            )?;
        }
    }
    Ok(())
}

async fn delete_keep_data(ctx: &ScenarioContext, server_id: &str) -> StepResult<()> {
    ctx.require_api_reachable().await?;
    log_step("Deleting server but keeping data");

    let resp = ctx.api.delete_server(server_id, true).await?;
    log_response("Delete (keep data) response", &resp);

    if resp.is_success() {
        ensure_eq(resp.success_flag(), Some(true), "success flag")?;
        ensure_eq(
            envelope::pick_bool(&resp.body, &["data.dataKept"]),
            Some(true),
            "data.dataKept",
        )?;
        info!("Server deleted, data kept");
    } else {
        resp.expect_status(&status::found_or_missing())?;
    }
    Ok(())
}

async fn delete_with_data(ctx: &ScenarioContext, user_id: &str) -> StepResult<()> {
    ctx.require_api_reachable().await?;
    log_step("Deleting server and all data");

    let server_id = format!("srv-delete-{}", timestamp_ms());
    provision_fixture(ctx, &server_id, user_id, "Full Delete Test").await;
    let settled = poll::wait_for_server_status(
        &ctx.api,
        &server_id,
        &[
            ServerStatus::Installing,
            ServerStatus::Starting,
            ServerStatus::Running,
            ServerStatus::Pending,
            ServerStatus::Stopped,
        ],
        PollBudget::propagation(),
    )
    .await;
    if settled.is_none() {
        warn!("Server {} never reported a status before delete", server_id);
    }

    let resp = ctx.api.delete_server(&server_id, false).await?;
    log_response("Delete (remove data) response", &resp);

    if resp.is_success() {
        ensure_eq(resp.success_flag(), Some(true), "success flag")?;
        resp.require_field(&["data.deletedResources"])?;
        info!("Server and data deleted");
    } else {
        resp.expect_status(&status::found_or_missing())?;
    }
    Ok(())
}
