//! Server provisioning, game-type matrix and provisioning error handling

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::{health_check, list_len, log_response};
use crate::domain::{GameType, ProvisionRequest, ServerStatus, Tier};
use crate::envelope;
use crate::ids::{generate_server_name, generate_user_id, timestamp_ms};
use crate::runner::Suite;
use crate::scenario::{ensure, ScenarioContext, StepResult, SuiteRecorder};
use crate::status;
use crate::telemetry::log_step;

const GAMES: [GameType; 3] = [GameType::Minecraft, GameType::Valheim, GameType::Palworld];

pub struct ServerProvisioning;

#[async_trait(?Send)]
impl Suite for ServerProvisioning {
    fn name(&self) -> &str {
        "server-provisioning"
    }

    fn description(&self) -> &str {
        "Provisioning, server lookups and provisioning validation"
    }

    fn tags(&self) -> Vec<String> {
        vec!["api".into(), "servers".into()]
    }

    async fn run(&self, ctx: &ScenarioContext, rec: &mut SuiteRecorder) {
        let server_id = format!("srv-{}", timestamp_ms());
        let user_id = generate_user_id();

        rec.case("health check", || health_check(ctx)).await;
        rec.case("provision Minecraft server", || provision_minecraft(ctx, &server_id, &user_id))
            .await;
        rec.case("list user servers", || list_user_servers(ctx, &user_id)).await;
        rec.case("get server details", || server_details(ctx, &server_id)).await;
        rec.case("check server status", || server_status(ctx, &server_id)).await;
        rec.teardown("delete provisioned server", ctx.api.cleanup_server(&server_id))
            .await;

        for game in GAMES {
            let name = format!("provision {} server", game);
            rec.case(&name, || provision_game(ctx, game)).await;
        }

        rec.case("rejects invalid game type", || {
            rejects(ctx, json!({
                "serverId": format!("err-{}", timestamp_ms()),
                "userId": "test",
                "name": "Err",
                "gameType": "invalid",
                "tier": "small",
            }))
        })
        .await;
        rec.case("rejects invalid tier", || {
            rejects(ctx, json!({
                "serverId": format!("err-{}", timestamp_ms()),
                "userId": "test",
                "name": "Err",
                "gameType": "minecraft",
                "tier": "invalid",
            }))
        })
        .await;
        rec.case("rejects missing required fields", || {
            rejects(ctx, json!({ "gameType": "minecraft", "tier": "small" }))
        })
        .await;
        rec.case("unknown server is not found", || unknown_server(ctx)).await;
    }
}

async fn provision_minecraft(ctx: &ScenarioContext, server_id: &str, user_id: &str) -> StepResult<()> {
    ctx.require_api().await?;
    log_step("Provisioning new Minecraft server");

    let request = ProvisionRequest::new(
        server_id,
        user_id,
        &generate_server_name(),
        GameType::Minecraft,
        Tier::Small,
    )
    .with_minecraft_settings("E2E Test");
    let resp = ctx.api.provision_server(&request).await?;
    log_response("Provision response", &resp);
    resp.expect_status(&status::provision_accepted())?;

    if resp.is_success() && resp.success_flag() != Some(false) {
        let id = resp.require_str(&["data.serverId", "serverId"])?;
        ensure(id == server_id, format!("provisioned id {} != {}", id, server_id))?;
        if let Some(state) = resp.field(&["data.status"]).and_then(|v| v.as_str()) {
            ensure(
                ServerStatus::parse(state).map_or(false, |s| ServerStatus::PROVISIONED.contains(&s)),
                format!("provision status '{}' is not a provisioning state", state),
            )?;
        }
        debug!("Server provisioned: {}", server_id);
    }
    Ok(())
}

async fn list_user_servers(ctx: &ScenarioContext, user_id: &str) -> StepResult<()> {
    ctx.require_api().await?;
    log_step("Listing servers");

    let resp = ctx.api.list_servers(user_id).await?;
    log_response("List response", &resp);
    if resp.is_success() {
        debug!("Found {} servers", list_len(&resp, envelope::SERVER_LIST));
    }
    Ok(())
}

async fn server_details(ctx: &ScenarioContext, server_id: &str) -> StepResult<()> {
    ctx.require_api().await?;
    log_step("Getting server details");

    let resp = ctx.api.get_server(server_id).await?;
    log_response("Details response", &resp);
    if resp.is_success() {
        resp.require_field(&["data.serverId", "serverId"])?;
    }
    Ok(())
}

async fn server_status(ctx: &ScenarioContext, server_id: &str) -> StepResult<()> {
    ctx.require_api().await?;
    log_step("Checking server status");

    let resp = ctx.api.server_status(server_id).await?;
    log_response("Status response", &resp);
    if resp.is_success() {
        let raw = envelope::pick_str(&resp.body, envelope::SERVER_STATUS).unwrap_or_default();
        let known = ServerStatus::parse(raw).filter(|s| *s != ServerStatus::Deleted);
        ensure(known.is_some(), format!("unexpected server status '{}'", raw))?;
        info!("Server status: {}", raw);
    }
    Ok(())
}

async fn provision_game(ctx: &ScenarioContext, game: GameType) -> StepResult<()> {
    ctx.require_api().await?;
    let id = format!("{}-{}", game, timestamp_ms());

    let request = ProvisionRequest::new(
        &id,
        &generate_user_id(),
        &format!("{} Test", game),
        game,
        Tier::Small,
    );
    let resp = ctx.api.provision_server(&request).await?;
    log_response(&format!("{} response", game), &resp);

    let accepted = resp.expect_status(&status::game_provision()).map(|r| r.is_success());
    if let Ok(true) = accepted {
        ctx.api.cleanup_server(&id).await;
    }
    accepted?;
    Ok(())
}

async fn rejects(ctx: &ScenarioContext, body: serde_json::Value) -> StepResult<()> {
    ctx.require_api().await?;
    let resp = ctx.api.post_json("/api/game-servers/provision", &body).await?;
    log_response("Invalid provision response", &resp);
    resp.expect_status(&status::invalid_input())?;
    Ok(())
}

async fn unknown_server(ctx: &ScenarioContext) -> StepResult<()> {
    ctx.require_api().await?;
    let resp = ctx.api.get_server("non-existent-id").await?;
    resp.expect_status(&status::missing())?;
    Ok(())
}
