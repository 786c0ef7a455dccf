//! Availability gates for the API and the front ends
//!
//! A probe never errors. Whatever goes wrong on the wire becomes
//! [`Availability::Unavailable`], which scenarios turn into a skip.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::api::ApiResponse;
use crate::error::E2eResult;
use crate::scenario::{StepResult, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Only a 2xx answer counts
    Strict,
    /// Any HTTP answer counts, so a health endpoint reporting a degraded
    /// state still lets the suite run
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable { reason: String },
}

impl Availability {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Availability::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }

    /// Gate a scenario step on this result
    pub fn require(self) -> StepResult<()> {
        match self {
            Availability::Available => Ok(()),
            Availability::Unavailable { reason } => Err(Verdict::Skip(reason)),
        }
    }
}

/// Decide availability from the outcome of one request
pub fn classify(mode: ProbeMode, target: &str, status: Result<u16, String>) -> Availability {
    match (mode, status) {
        (_, Err(e)) => Availability::unavailable(format!("{} unreachable: {}", target, e)),
        (ProbeMode::Lenient, Ok(_)) => Availability::Available,
        (ProbeMode::Strict, Ok(code)) if (200..300).contains(&code) => Availability::Available,
        (ProbeMode::Strict, Ok(code)) => {
            Availability::unavailable(format!("{} health check returned {}", target, code))
        }
    }
}

/// Health gate for the provisioning API
#[derive(Debug, Clone)]
pub struct ApiProbe {
    client: Client,
    url: String,
    mode: ProbeMode,
}

impl ApiProbe {
    /// `url` is the full health endpoint, function key included
    pub fn new(url: String, timeout: Duration, mode: ProbeMode) -> E2eResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url, mode })
    }

    pub fn mode(&self) -> ProbeMode {
        self.mode
    }

    pub fn with_mode(&self, mode: ProbeMode) -> Self {
        Self {
            client: self.client.clone(),
            url: self.url.clone(),
            mode,
        }
    }

    /// One bounded request; never cached, never an error
    pub async fn check(&self) -> Availability {
        let status = self
            .client
            .get(&self.url)
            .send()
            .await
            .map(|resp| resp.status().as_u16())
            .map_err(|e| e.to_string());
        let availability = classify(self.mode, "API", status);
        debug!("API probe ({:?}): {:?}", self.mode, availability);
        availability
    }

    /// The health response itself, for tests that assert on its body
    pub async fn health(&self) -> E2eResult<ApiResponse> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status().as_u16();
        let raw = response.text().await?;
        Ok(ApiResponse {
            endpoint: "GET /api/health".to_string(),
            status,
            body: serde_json::from_str(&raw).unwrap_or(Value::Null),
            raw,
        })
    }
}

/// Reachability gate for the web app or admin portal.
///
/// Dev servers answer 404 on some roots while still serving the app, so
/// any response counts.
#[derive(Debug, Clone)]
pub struct WebProbe {
    client: Client,
    url: String,
}

impl WebProbe {
    pub fn new(url: &str, timeout: Duration) -> E2eResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn check(&self) -> Availability {
        let status = self
            .client
            .get(&self.url)
            .send()
            .await
            .map(|resp| resp.status().as_u16())
            .map_err(|e| e.to_string());
        classify(ProbeMode::Lenient, &self.url, status)
    }
}
