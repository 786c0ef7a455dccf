//! Complete purchase journey: mock sign-in through checkout, then the API
//! calls the storefront would make on the user's behalf.

use async_trait::async_trait;
use tracing::{info, warn};

use super::log_response;
use crate::auth::{MockAuthToken, AUTH_TOKEN_KEY};
use crate::domain::{CheckoutRequest, GameType, ProvisionRequest, ServerStatus, Tier};
use crate::envelope;
use crate::ids::{generate_server_name, timestamp_ms, TestIds};
use crate::playwright::BrowserFlow;
use crate::poll::{self, PollBudget};
use crate::runner::Suite;
use crate::scenario::{ensure, ensure_eq, ScenarioContext, StepResult, SuiteRecorder};
use crate::telemetry::log_step;

const MINECRAFT_LINK: &[&str] = &[
    r#"a[href*="minecraft"]"#,
    r#"button:has-text("Minecraft")"#,
    "text=/minecraft/i",
];
const SMALL_TIER: &[&str] = &[r#"[data-tier="small"]"#, r#"button:has-text("Small")"#, "text=/€9.99/"];
const ADD_TO_CART: &[&str] = &[
    r#"button:has-text("Add to Cart")"#,
    r#"[data-testid="add-to-cart"]"#,
    r#"button:has-text("Order Now")"#,
];
const CART: &[&str] = &[
    r#"[data-testid="cart-button"]"#,
    r#"button:has-text("Cart")"#,
    r#"[aria-label*="cart" i]"#,
];
const CHECKOUT: &[&str] = &[
    r#"button:has-text("Checkout")"#,
    r#"[data-testid="checkout-button"]"#,
    r#"button:has-text("Pay")"#,
];

pub struct UserJourney;

#[async_trait(?Send)]
impl Suite for UserJourney {
    fn name(&self) -> &str {
        "user-journey"
    }

    fn description(&self) -> &str {
        "Sign in, pick a Minecraft tier, check out, provision"
    }

    fn tags(&self) -> Vec<String> {
        vec!["ui".into(), "api".into(), "journey".into()]
    }

    async fn run(&self, ctx: &ScenarioContext, rec: &mut SuiteRecorder) {
        let ids = ctx.ids();
        rec.case("complete purchase journey", || purchase_journey(ctx, &ids))
            .await;
        rec.case("provisioned server reaches a known state", || {
            server_smoke(ctx, &ids)
        })
        .await;
        rec.teardown("delete journey server", ctx.api.cleanup_server(&ids.server_id))
            .await;
    }
}

/// Storefront steps from the home page to the checkout button
pub fn storefront_journey(ctx: &ScenarioContext) -> BrowserFlow {
    let token = MockAuthToken::for_user(&ctx.config.test_user);
    BrowserFlow::new("user-journey", &ctx.config.web_url)
        .setup_mock_auth(&token)
        .goto("/")
        .wait_for_app_load()
        .record_url("homeUrl")
        .record_title("homeTitle")
        .read_local_storage("authToken", AUTH_TOKEN_KEY)
        .screenshot("e2e-00-home")
        .if_visible(
            "minecraftLink",
            MINECRAFT_LINK,
            2_000,
            |f| f.click(MINECRAFT_LINK).wait_for_app_load(),
            |f| f.goto("/minecraft").wait_for_app_load(),
        )
        .screenshot("e2e-01-minecraft-page")
        .if_visible("smallTier", SMALL_TIER, 2_000, |f| f.click(SMALL_TIER), |f| f)
        .if_visible(
            "addToCart",
            ADD_TO_CART,
            2_000,
            |f| f.click(ADD_TO_CART).sleep(500),
            |f| f,
        )
        .screenshot("e2e-02-added-to-cart")
        .if_visible("cartButton", CART, 2_000, |f| f.click(CART).sleep(500), |f| f)
        .if_visible("checkoutButton", CHECKOUT, 2_000, |f| f.click(CHECKOUT), |f| f)
        .screenshot("e2e-03-checkout")
}

async fn purchase_journey(ctx: &ScenarioContext, ids: &TestIds) -> StepResult<()> {
    ctx.require_web().await?;
    log_step("Starting complete user journey");

    let report = ctx.run_flow(storefront_journey(ctx)).await?;
    info!(
        "Home: {} ({})",
        report.value_str("homeUrl").unwrap_or_default(),
        report.value_str("homeTitle").unwrap_or_default()
    );

    let raw = report.value_str("authToken").unwrap_or_default();
    ensure(!raw.is_empty(), "mock session was not stored in localStorage")?;
    let token: MockAuthToken = serde_json::from_str(raw).map_err(crate::error::E2eError::from)?;
    ensure(token.is_authenticated, "stored session is not authenticated")?;
    ensure_eq(
        token.user.email.as_str(),
        ctx.config.test_user.email.as_str(),
        "session email",
    )?;

    for (label, what) in [
        ("minecraftLink", "Minecraft link"),
        ("smallTier", "Small tier"),
        ("addToCart", "Add to cart"),
        ("cartButton", "Cart button"),
        ("checkoutButton", "Checkout button"),
    ] {
        match report.visible(label) {
            Some(true) => info!("{} clicked", what),
            _ => warn!("{} not found", what),
        }
    }

    if !ctx.probe.check().await.is_available() {
        warn!("API not available; skipping provisioning and checkout calls");
        return Ok(());
    }

    log_step("Provisioning server via API");
    let request = ProvisionRequest::new(
        &ids.server_id,
        &ids.user_id,
        &generate_server_name(),
        GameType::Minecraft,
        Tier::Small,
    );
    let resp = ctx.api.provision_server(&request).await?;
    log_response("Provision response", &resp);

    log_step("Creating checkout via API");
    let checkout = CheckoutRequest::new(
        &ids.user_id,
        &ids.email,
        GameType::Minecraft,
        Tier::Small,
        &format!("E2E-Journey-{}", timestamp_ms()),
    );
    let resp = ctx.api.create_checkout(&checkout).await?;
    log_response("Checkout response", &resp);
    if resp.is_success() {
        if let Some(url) = resp.field(&["data.checkoutUrl", "checkoutUrl"]) {
            info!("Checkout URL: {}", url);
        }
    }
    Ok(())
}

async fn server_smoke(ctx: &ScenarioContext, ids: &TestIds) -> StepResult<()> {
    ctx.require_api().await?;
    log_step("Checking journey server");

    let provisioned = poll::wait_for_server_status(
        &ctx.api,
        &ids.server_id,
        &ServerStatus::PROVISIONED,
        PollBudget::propagation(),
    )
    .await;
    match provisioned {
        Some(state) => info!("Server {} is {}", ids.server_id, state),
        None => warn!("Server {} has not reported a provisioning state", ids.server_id),
    }

    let resp = ctx.api.list_servers(&ids.user_id).await?;
    log_response("List response", &resp);
    if resp.is_success() && provisioned.is_some() {
        let listed = envelope::pick_array(&resp.body, envelope::SERVER_LIST)
            .map_or(false, |servers| {
                servers.iter().any(|s| {
                    envelope::pick_str(s, &["serverId", "id"]) == Some(ids.server_id.as_str())
                })
            });
        ensure(listed, format!("server {} missing from the user's list", ids.server_id))?;
    }
    Ok(())
}
