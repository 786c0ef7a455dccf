//! Admin portal pages render, or send the visitor to sign in

use async_trait::async_trait;
use tracing::info;

use super::{redirected_to_login, title_ok};
use crate::auth::MockAuthToken;
use crate::playwright::BrowserFlow;
use crate::runner::Suite;
use crate::scenario::{ensure, ScenarioContext, StepResult, SuiteRecorder};
use crate::telemetry::log_step;

const NAVIGATION: &[&str] = &["nav", r#"[role="navigation"]"#, "aside"];
const MAIN: &[&str] = &["main", r#"[role="main"]"#, ".dashboard"];

/// Admin page, path and the selectors that show its content
struct AdminPage {
    name: &'static str,
    path: &'static str,
    content: &'static [&'static str],
}

const PAGES: [AdminPage; 3] = [
    AdminPage {
        name: "servers",
        path: "/servers",
        content: &[
            r#"[data-testid="servers-list"]"#,
            "table",
            ".server-list",
            "text=/servers|Server/i",
        ],
    },
    AdminPage {
        name: "VMs",
        path: "/vms",
        content: &[r#"[data-testid="vms-list"]"#, "table", "text=/vm|virtual/i"],
    },
    AdminPage {
        name: "CRM",
        path: "/crm",
        content: &[r#"[data-testid="crm"]"#, "text=/crm|customer|company|contact/i"],
    },
];

pub struct AdminDashboard;

#[async_trait(?Send)]
impl Suite for AdminDashboard {
    fn name(&self) -> &str {
        "admin-dashboard"
    }

    fn description(&self) -> &str {
        "Admin portal dashboard and management pages"
    }

    fn tags(&self) -> Vec<String> {
        vec!["ui".into(), "admin".into()]
    }

    async fn run(&self, ctx: &ScenarioContext, rec: &mut SuiteRecorder) {
        rec.case("access admin dashboard", || dashboard(ctx)).await;
        for page in &PAGES {
            let name = format!("view {} page", page.name);
            rec.case(&name, || admin_page(ctx, page)).await;
        }
    }
}

fn signed_in(ctx: &ScenarioContext, name: &str) -> BrowserFlow {
    BrowserFlow::new(name, &ctx.config.admin_url)
        .setup_mock_auth(&MockAuthToken::for_user(&ctx.config.test_user))
}

async fn dashboard(ctx: &ScenarioContext) -> StepResult<()> {
    ctx.require_admin().await?;
    log_step("Opening admin dashboard");

    let flow = signed_in(ctx, "admin-dashboard")
        .goto("/")
        .wait_for_app_load()
        .sleep(2_000)
        .record_title("title")
        .soft_visible("navigation", NAVIGATION, 5_000)
        .soft_visible("main", MAIN, 5_000)
        .full_page_screenshot("admin-dashboard");
    let report = ctx.run_flow(flow).await?;

    let title = report.value_str("title").unwrap_or_default();
    let navigation = report.visible("navigation").unwrap_or(false);
    let main = report.visible("main").unwrap_or(false);
    info!("Admin title: {}, navigation: {}, main: {}", title, navigation, main);

    ensure(title_ok(title, &["realm", "admin", "grid"]), format!("unexpected admin title '{}'", title))?;
    ensure(navigation || main, "neither navigation nor main content is visible")
}

async fn admin_page(ctx: &ScenarioContext, page: &AdminPage) -> StepResult<()> {
    ctx.require_admin().await?;
    log_step(&format!("Opening admin {} page", page.name));

    let flow = signed_in(ctx, &format!("admin-{}", page.path.trim_start_matches('/')))
        .goto(page.path)
        .wait_for_app_load()
        .record_url("url")
        .soft_visible("content", page.content, 10_000);
    let report = ctx.run_flow(flow).await?;

    let url = report.value_str("url").unwrap_or_default();
    if redirected_to_login(url) {
        info!("Redirected to login, auth required for {}", page.path);
        return Ok(());
    }
    ensure(
        report.visible("content") == Some(true),
        format!("{} page shows no content at {}", page.name, url),
    )
}
