//! Admin portal against a data-bearing environment, signed in through the
//! development login.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::envelope;
use crate::playwright::{BrowserFlow, FlowReport};
use crate::runner::Suite;
use crate::scenario::{ensure, ScenarioContext, StepResult, SuiteRecorder};
use crate::telemetry::log_step;

const MICROSOFT_LOGIN: &[&str] = &[r#"button:has-text("Login with Microsoft")"#];
const DEV_LOGIN: &[&str] = &[r#"button:has-text("Development Login")"#];
const DASHBOARD: &[&str] = &["text=Dashboard", "text=Total Servers"];
const API_NEEDLES: &[&str] = &["azurewebsites.net", "/api/"];

pub struct AdminProduction;

#[async_trait(?Send)]
impl Suite for AdminProduction {
    fn name(&self) -> &str {
        "admin-production"
    }

    fn description(&self) -> &str {
        "Admin portal with dev login and live data"
    }

    fn tags(&self) -> Vec<String> {
        vec!["ui".into(), "admin".into(), "production".into()]
    }

    async fn run(&self, ctx: &ScenarioContext, rec: &mut SuiteRecorder) {
        rec.case("loads and logs in with dev credentials", || dev_login(ctx))
            .await;
        rec.case("displays production data", || production_data(ctx)).await;
        rec.case("fetches servers", || {
            captured_list(ctx, "servers", "/global-admin/servers", 2)
        })
        .await;
        rec.case("fetches subscriptions", || {
            captured_list(ctx, "subscriptions", "/global-admin/subscriptions", 1)
        })
        .await;
    }
}

/// Open the portal and use the development login when a login page shows.
/// The flow skips when only the Microsoft login is offered.
pub fn with_dev_login(flow: BrowserFlow) -> BrowserFlow {
    flow.goto("/").wait_for_app_load().if_visible(
        "loginPage",
        MICROSOFT_LOGIN,
        2_000,
        |f| {
            f.if_visible(
                "devLogin",
                DEV_LOGIN,
                2_000,
                |f| f.log("Clicking dev login button").click(DEV_LOGIN).wait_for_app_load(),
                |f| f.skip("Dev login not available"),
            )
        },
        |f| f,
    )
}

fn portal(ctx: &ScenarioContext, name: &str) -> BrowserFlow {
    BrowserFlow::new(name, &ctx.config.admin_url)
}

fn log_browser_errors(report: &FlowReport) {
    for line in report.errors() {
        warn!("[{}] {}", line.kind, line.text);
    }
}

async fn dev_login(ctx: &ScenarioContext) -> StepResult<()> {
    ctx.require_admin().await?;
    log_step("Admin portal load and dev auth");

    let flow = with_dev_login(portal(ctx, "admin-login"))
        .sleep(2_000)
        .soft_visible("dashboard", DASHBOARD, 5_000)
        .full_page_screenshot("admin-login");
    let report = ctx.run_flow(flow).await?;
    log_browser_errors(&report);

    let dashboard = report.visible("dashboard").unwrap_or(false);
    info!("Dashboard loaded: {}", dashboard);
    ensure(dashboard, "dashboard did not render after login")
}

fn endpoint_path(url: &str) -> String {
    reqwest::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

async fn production_data(ctx: &ScenarioContext) -> StepResult<()> {
    ctx.require_admin().await?;
    log_step("Production data display");

    let flow = with_dev_login(portal(ctx, "admin-production-data").watch_api_calls("api", API_NEEDLES))
        .sleep(5_000)
        .text_content("body", &["body"])
        .full_page_screenshot("admin-production-data");
    let report = ctx.run_flow(flow).await?;
    log_browser_errors(&report);

    let body = report.value_str("body").unwrap_or_default().to_lowercase();
    let has_servers = body.contains("server");
    let has_subscriptions = body.contains("subscription");
    info!(
        "Data found: servers {}, subscriptions {}, minecraft {}",
        has_servers,
        has_subscriptions,
        body.contains("minecraft")
    );

    let calls = report.api_calls("api");
    let successful = calls.iter().filter(|c| (200..300).contains(&c.status)).count();
    let errors = calls.iter().filter(|c| c.status >= 400).count();
    info!("API calls: {} total, {} successful, {} errors", calls.len(), successful, errors);
    let endpoints: BTreeSet<String> = calls.iter().map(|c| endpoint_path(&c.url)).collect();
    for endpoint in &endpoints {
        info!("   • {}", endpoint);
    }

    ensure(!calls.is_empty(), "the dashboard made no API calls")?;
    ensure(
        has_servers || has_subscriptions,
        "page mentions neither servers nor subscriptions",
    )
}

fn describe(record: &Value, fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| {
            let value = record.get(*f).map_or_else(|| "N/A".to_string(), |v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            format!("{}={}", f, value)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn captured_list(ctx: &ScenarioContext, what: &str, needle: &str, minimum: usize) -> StepResult<()> {
    ctx.require_admin().await?;
    log_step(&format!("{} endpoint verification", what));

    let flow = with_dev_login(portal(ctx, &format!("admin-{}", what)).capture_responses(what, needle))
        .sleep(5_000);
    let report = ctx.run_flow(flow).await?;

    let Some(captured) = report.responses(what).into_iter().last() else {
        warn!("No {} response captured", what);
        return Ok(());
    };
    info!("{} API called: {}", what, captured.status);

    let records = envelope::pick_array(&captured.body, &["data", ""])
        .cloned()
        .unwrap_or_default();
    info!("Found {} {} in response", records.len(), what);
    for (i, record) in records.iter().enumerate() {
        info!(
            "   {}. {}",
            i + 1,
            describe(record, &["id", "serverName", "gameType", "planType", "amount", "status", "userId"])
        );
    }
    ensure(
        records.len() >= minimum,
        format!("expected at least {} {}, found {}", minimum, what, records.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playwright::BrowserStep;

    #[test]
    fn dev_login_skips_when_only_microsoft_login_is_offered() {
        let flow = with_dev_login(BrowserFlow::new("admin", "http://localhost:4321"));
        let Some(BrowserStep::IfVisible { then, otherwise, .. }) = flow.steps().last() else {
            panic!("login branch missing");
        };
        assert!(otherwise.is_empty());
        let Some(BrowserStep::IfVisible { otherwise: no_dev, .. }) = then.first() else {
            panic!("dev login branch missing");
        };
        assert_eq!(
            no_dev,
            &vec![BrowserStep::Skip {
                reason: "Dev login not available".into()
            }]
        );
    }

    #[test]
    fn endpoints_are_reduced_to_paths() {
        assert_eq!(
            endpoint_path("https://realm-dev-api-fa.azurewebsites.net/api/global-admin/servers?code=x"),
            "/api/global-admin/servers"
        );
        assert_eq!(endpoint_path("not a url"), "not a url");
    }

    #[test]
    fn records_are_described_field_by_field() {
        let record = serde_json::json!({ "id": "srv-1", "status": "running", "amount": 14.99 });
        assert_eq!(
            describe(&record, &["id", "amount", "userId"]),
            "id=srv-1 amount=14.99 userId=N/A"
        );
    }
}
