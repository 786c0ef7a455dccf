//! Error types for E2E testing

use thiserror::Error;

use crate::status::StatusSet;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Flow spec parse error: {0}")]
    SpecParse(String),

    #[error("Browser flow '{flow}' failed: {reason}")]
    FlowFailed { flow: String, reason: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("{endpoint} returned {actual}, expected one of {expected}")]
    UnexpectedStatus {
        endpoint: String,
        expected: StatusSet,
        actual: u16,
    },

    #[error("{endpoint}: response has no field matching any of [{paths}]")]
    MissingField { endpoint: String, paths: String },

    #[error("Misconfigured environment: {0}")]
    Misconfigured(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether the error means the target was unreachable rather than wrong.
    ///
    /// Connection refused, DNS failures and request timeouts all land here.
    /// Request-builder errors such as a malformed URL do not.
    /// A missing Playwright install counts too: the browser is infrastructure.
    pub fn is_transport(&self) -> bool {
        match self {
            E2eError::Http(e) => e.is_connect() || e.is_timeout(),
            E2eError::PlaywrightNotFound => true,
            _ => false,
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_status_names_the_accepted_set() {
        let err = E2eError::UnexpectedStatus {
            endpoint: "POST /api/game-servers/provision".to_string(),
            expected: StatusSet::of(&[400, 422]),
            actual: 200,
        };
        assert_eq!(
            err.to_string(),
            "POST /api/game-servers/provision returned 200, expected one of {400, 422}"
        );
    }

    #[test]
    fn assertion_failures_are_not_transport_errors() {
        assert!(!E2eError::AssertionFailed("count".into()).is_transport());
        assert!(!E2eError::Misconfigured("key".into()).is_transport());
        assert!(E2eError::PlaywrightNotFound.is_transport());
    }

    #[tokio::test]
    async fn malformed_urls_fail_instead_of_skipping() {
        let err = reqwest::Client::new().get("not a url").send().await.unwrap_err();
        assert!(!E2eError::Http(err).is_transport());
    }

    #[tokio::test]
    async fn refused_connections_are_transport_errors() {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/api/health")
            .send()
            .await
            .unwrap_err();
        assert!(E2eError::Http(err).is_transport());
    }
}
