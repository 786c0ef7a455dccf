//! Bounded polling
//!
//! Stands in for fixed sleeps while waiting on asynchronous server-side
//! effects (provisioning, webhooks, property propagation). Every wait has a
//! ceiling; running out of budget yields `None`, and the caller decides
//! whether that is a failure.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::api::ApiClient;
use crate::config::E2eConfig;
use crate::domain::{ServerStatus, Tier};
use crate::envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub max_wait: Duration,
    pub interval: Duration,
}

impl PollBudget {
    pub fn new(max_wait: Duration, interval: Duration) -> Self {
        Self { max_wait, interval }
    }

    /// Server provisioning: up to the configured provision timeout
    pub fn provisioning(config: &E2eConfig) -> Self {
        Self::new(config.timeouts.server_provision(), Duration::from_secs(2))
    }

    /// Property changes and webhook side effects
    pub fn propagation() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_millis(500))
    }
}

/// Call `attempt` until it yields a value or the budget runs out.
///
/// The first attempt always happens, even with a zero budget.
pub async fn poll_until<T, F, Fut>(budget: PollBudget, mut attempt: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + budget.max_wait;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if let Some(value) = attempt().await {
            return Some(value);
        }
        let now = Instant::now();
        if now >= deadline {
            debug!("Poll gave up after {} attempts", attempts);
            return None;
        }
        tokio::time::sleep(budget.interval.min(deadline - now)).await;
    }
}

/// Wait until the server reports one of `accepted`
pub async fn wait_for_server_status(
    api: &ApiClient,
    server_id: &str,
    accepted: &[ServerStatus],
    budget: PollBudget,
) -> Option<ServerStatus> {
    poll_until(budget, || async move {
        let resp = api.server_status(server_id).await.ok()?;
        if !resp.is_success() {
            return None;
        }
        let status = envelope::pick_str(&resp.body, envelope::SERVER_STATUS)
            .and_then(ServerStatus::parse)?;
        accepted.contains(&status).then_some(status)
    })
    .await
}

/// Wait until the server record shows `tier`
pub async fn wait_for_tier(api: &ApiClient, server_id: &str, tier: Tier, budget: PollBudget) -> bool {
    poll_until(budget, || async move {
        let resp = api.get_server(server_id).await.ok()?;
        let record = envelope::pick(&resp.body, envelope::SERVER_RECORD)?;
        (record.get("tier").and_then(Value::as_str) == Some(tier.as_str())).then_some(())
    })
    .await
    .is_some()
}

/// Wait until the subscription shows up with one of `accepted` statuses,
/// returning its record
pub async fn wait_for_subscription(
    api: &ApiClient,
    subscription_id: &str,
    accepted: &[&str],
    budget: PollBudget,
) -> Option<Value> {
    poll_until(budget, || async move {
        let resp = api.get_subscription(subscription_id).await.ok()?;
        if !resp.is_success() {
            return None;
        }
        let record = envelope::pick(&resp.body, &["data", ""])?;
        let status = record.get("status").and_then(Value::as_str)?;
        accepted
            .iter()
            .any(|s| s.eq_ignore_ascii_case(status))
            .then(|| record.clone())
    })
    .await
}
