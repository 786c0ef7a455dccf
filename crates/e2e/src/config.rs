//! Suite configuration
//!
//! Resolved once at start-up: defaults, then an optional TOML file, then the
//! environment (`WEB_URL`, `ADMIN_URL`, `FUNCTIONS_URL`, `FUNCTION_APP_URL`,
//! `FUNCTIONS_KEY`, `JWT_SECRET`, `E2E_AUTH_TOKEN`, `CI`). URLs are taken as given; a malformed one shows up
//! later as a navigation or request failure.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::E2eResult;

pub const DEFAULT_WEB_URL: &str = "http://localhost:5173";
pub const DEFAULT_ADMIN_URL: &str = "http://localhost:5173";
pub const DEFAULT_FUNCTIONS_URL: &str = "http://localhost:7071";
pub const DEFAULT_JWT_SECRET: &str = "realm-grid-dev-secret-change-in-production";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// Customer-facing web app
    pub web_url: String,

    /// Admin portal
    pub admin_url: String,

    /// Provisioning/commerce API (Azure Functions)
    pub functions_url: String,

    /// Function key appended as `code=` to API calls
    pub functions_key: Option<String>,

    /// HS256 secret the API signs session tokens with
    pub jwt_secret: String,

    /// A live session token for `/api/auth/me`; auth checks that need one skip without it
    pub auth_token: Option<String>,

    /// Running under CI
    pub ci: bool,

    /// Fallback identity for flows that don't generate their own
    pub test_user: TestUser,

    pub timeouts: Timeouts,

    pub runner: RunnerSettings,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            web_url: DEFAULT_WEB_URL.to_string(),
            admin_url: DEFAULT_ADMIN_URL.to_string(),
            functions_url: DEFAULT_FUNCTIONS_URL.to_string(),
            functions_key: None,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            auth_token: None,
            ci: false,
            test_user: TestUser::default(),
            timeouts: Timeouts::default(),
            runner: RunnerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestUser {
    pub email: String,
    pub name: String,
    pub id: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            email: "e2e-test@realmgrid.io".to_string(),
            name: "E2E Test User".to_string(),
            id: "e2e-test-user-id".to_string(),
        }
    }
}

/// Timeouts in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub navigation_ms: u64,
    pub action_ms: u64,
    pub server_provision_ms: u64,
    pub probe_ms: u64,
    /// Bounded wait for visibility checks
    pub expect_ms: u64,
    /// Global budget for one test, retries excluded
    pub test_ms: u64,
    /// Extra settle time after network idle
    pub app_settle_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            action_ms: 10_000,
            server_provision_ms: 60_000,
            probe_ms: 5_000,
            expect_ms: 10_000,
            test_ms: 120_000,
            app_settle_ms: 1_000,
        }
    }
}

impl Timeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn server_provision(&self) -> Duration {
        Duration::from_millis(self.server_provision_ms)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    pub fn test(&self) -> Duration {
        Duration::from_millis(self.test_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "firefox" => BrowserKind::Firefox,
            "webkit" => BrowserKind::Webkit,
            _ => BrowserKind::Chromium,
        }
    }
}

/// Which artifacts every browser flow leaves behind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPolicy {
    pub trace: bool,
    pub screenshot: bool,
    pub video: bool,
}

impl Default for ArtifactPolicy {
    fn default() -> Self {
        Self {
            trace: true,
            screenshot: true,
            video: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Retries per failed test; `None` means 2 under CI, 1 otherwise
    pub retries: Option<u32>,
    pub browser: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub ignore_https_errors: bool,
    pub output_dir: PathBuf,
    pub report_dir: PathBuf,
    pub artifacts: ArtifactPolicy,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            retries: None,
            browser: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            ignore_https_errors: true,
            output_dir: PathBuf::from("test-results"),
            report_dir: PathBuf::from("playwright-report"),
            artifacts: ArtifactPolicy::default(),
        }
    }
}

impl RunnerSettings {
    /// Tests run one at a time; flows share browser storage and API state.
    pub const WORKERS: usize = 1;

    pub fn retries(&self, ci: bool) -> u32 {
        self.retries.unwrap_or(if ci { 2 } else { 1 })
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.output_dir.join("screenshots")
    }
}

impl E2eConfig {
    /// Defaults overridden by the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load configuration from file, then apply the environment
    pub fn load(path: &Path) -> E2eResult<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any variable source; split out for tests.
    pub fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("WEB_URL") {
            self.web_url = url;
        }
        if let Some(url) = var("ADMIN_URL") {
            self.admin_url = url;
        }
        if let Some(url) = var("FUNCTIONS_URL") {
            self.functions_url = url;
        }
        // The deployed function app wins over a local functions host.
        if let Some(url) = var("FUNCTION_APP_URL") {
            self.functions_url = url;
        }
        if let Some(key) = var("FUNCTIONS_KEY").filter(|k| !k.is_empty()) {
            self.functions_key = Some(key);
        }
        if let Some(secret) = var("JWT_SECRET").filter(|s| !s.is_empty()) {
            self.jwt_secret = secret;
        }
        if let Some(token) = var("E2E_AUTH_TOKEN").filter(|t| !t.is_empty()) {
            self.auth_token = Some(token);
        }
        if let Some(ci) = var("CI") {
            self.ci = !ci.is_empty() && ci != "0" && !ci.eq_ignore_ascii_case("false");
        }
    }

    /// Full API URL for `path`, with the function key when configured
    pub fn api_url(&self, path: &str) -> String {
        let base = self.functions_url.trim_end_matches('/');
        let url = format!("{}{}", base, path);
        match &self.functions_key {
            Some(key) => {
                let separator = if path.contains('?') { '&' } else { '?' };
                format!("{}{}code={}", url, separator, key)
            }
            None => url,
        }
    }

    pub fn retries(&self) -> u32 {
        self.runner.retries(self.ci)
    }
}
