//! Declarative YAML browser flows
//!
//! Quick UI checks that need no API setup can be written as YAML instead of
//! a suite. Each file holds one flow; the runner executes a directory of them
//! as the `flows` suite.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auth::MockAuthToken;
use crate::config::E2eConfig;
use crate::error::{E2eError, E2eResult};
use crate::playwright::BrowserFlow;

/// A complete flow parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSpec {
    /// Unique name for this flow
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Which front end the relative URLs resolve against
    #[serde(default)]
    pub target: FlowTarget,

    /// Inject the mock session before the first navigation
    #[serde(default)]
    pub mock_auth: bool,

    /// Steps to execute in order
    pub steps: Vec<FlowStep>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowTarget {
    #[default]
    Web,
    Admin,
}

/// A single step in a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FlowStep {
    /// Navigate to a URL (relative to the target)
    Navigate { url: String },

    /// Network idle plus the settle delay
    WaitForAppLoad,

    /// Click the first match of any selector
    Click {
        #[serde(deserialize_with = "one_or_many")]
        selector: Vec<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    Fill {
        #[serde(deserialize_with = "one_or_many")]
        selector: Vec<String>,
        value: String,
    },

    /// Visibility check that records a boolean instead of failing
    SoftVisible {
        label: String,
        #[serde(deserialize_with = "one_or_many")]
        selector: Vec<String>,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Fail unless the element becomes visible
    Assert {
        #[serde(deserialize_with = "one_or_many")]
        selector: Vec<String>,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Fail unless the current URL matches a regex
    AssertUrl { pattern: String },

    Screenshot {
        name: String,
        #[serde(default)]
        full_page: bool,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep { ms: u64 },

    /// Evaluate JavaScript and record the value
    Evaluate { label: String, script: String },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_wait_timeout() -> u64 {
    5000
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

impl FlowSpec {
    /// Parse a flow from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a flow from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all flows from a directory, sorted by name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            specs.push(Self::from_file(entry.path())?);
        }

        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }

    /// Filter flows by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("flow has no name".to_string()));
        }
        for step in &self.steps {
            let empty = match step {
                FlowStep::Click { selector, .. }
                | FlowStep::Fill { selector, .. }
                | FlowStep::SoftVisible { selector, .. }
                | FlowStep::Assert { selector, .. } => selector.is_empty(),
                _ => false,
            };
            if empty {
                return Err(E2eError::SpecParse(format!(
                    "flow '{}' has a step with no selector",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Compile into a browser flow against the configured front end
    pub fn to_flow(&self, config: &E2eConfig) -> BrowserFlow {
        let base_url = match self.target {
            FlowTarget::Web => &config.web_url,
            FlowTarget::Admin => &config.admin_url,
        };
        let mut flow = BrowserFlow::new(&self.name, base_url);
        if self.mock_auth {
            flow = flow.setup_mock_auth(&MockAuthToken::for_user(&config.test_user));
        }

        for step in &self.steps {
            flow = match step {
                FlowStep::Navigate { url } => flow.goto(url),
                FlowStep::WaitForAppLoad => flow.wait_for_app_load(),
                FlowStep::Click { selector, timeout_ms } => {
                    let sels = refs(selector);
                    match timeout_ms {
                        Some(t) => flow.click_within(&sels, *t),
                        None => flow.click(&sels),
                    }
                }
                FlowStep::Fill { selector, value } => flow.fill(&refs(selector), value),
                FlowStep::SoftVisible {
                    label,
                    selector,
                    timeout_ms,
                } => flow.soft_visible(label, &refs(selector), *timeout_ms),
                FlowStep::Assert { selector, timeout_ms } => flow.expect_visible(&refs(selector), *timeout_ms),
                FlowStep::AssertUrl { pattern } => flow.expect_url(pattern),
                FlowStep::Screenshot { name, full_page: true } => flow.full_page_screenshot(name),
                FlowStep::Screenshot { name, .. } => flow.screenshot(name),
                FlowStep::Sleep { ms } => flow.sleep(*ms),
                FlowStep::Evaluate { label, script } => flow.evaluate(label, script),
                FlowStep::Log { message } => flow.log(message),
            };
        }
        flow
    }
}

fn refs(selectors: &[String]) -> Vec<&str> {
    selectors.iter().map(String::as_str).collect()
}
