//! Playwright browser automation
//!
//! A [`BrowserFlow`] is a list of steps compiled into one Node script that
//! drives a single browser context, so storage written by one step (the
//! mock session, a cart) is visible to the next. The script reports back
//! through marker-prefixed JSON lines on stdout, which [`FlowReport`]
//! folds into soft-check results, recorded values, captured responses and
//! the console/network transcript.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::auth::{clear_auth_script, MockAuthToken};
use crate::config::{ArtifactPolicy, BrowserKind, E2eConfig, Timeouts};
use crate::error::{E2eError, E2eResult};
use crate::probe::Availability;
use crate::scenario::{StepResult, Verdict};

/// Prefix of every event line the generated script prints
pub const EVENT_MARKER: &str = "@@realm-e2e@@";

/// A single step of a browser flow
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserStep {
    /// Register an init script; affects navigations made after it
    InitScript(String),
    Goto { url: String },
    /// Network idle, then the configured settle delay
    WaitForAppLoad,
    Click { selectors: Vec<String>, timeout_ms: Option<u64> },
    Fill { selectors: Vec<String>, value: String },
    SelectIndex { selectors: Vec<String>, index: usize },
    Screenshot { name: String, full_page: bool },
    /// Bounded visibility wait recorded as a boolean
    SoftVisible { label: String, selectors: Vec<String>, timeout_ms: u64 },
    IfVisible {
        label: String,
        selectors: Vec<String>,
        timeout_ms: u64,
        then: Vec<BrowserStep>,
        otherwise: Vec<BrowserStep>,
    },
    ExpectVisible { selectors: Vec<String>, timeout_ms: u64 },
    ExpectUrl { pattern: String },
    WaitForUrl { label: String, pattern: String, timeout_ms: u64, soft: bool },
    RecordTitle { label: String },
    RecordUrl { label: String },
    ReadLocalStorage { label: String, key: String },
    TextContent { label: String, selectors: Vec<String> },
    Evaluate { label: String, script: String },
    CaptureResponses { label: String, url_contains: String },
    WatchApiCalls { label: String, url_contains: Vec<String> },
    Sleep { ms: u64 },
    Skip { reason: String },
    Log { message: String },
}

fn owned(selectors: &[&str]) -> Vec<String> {
    selectors.iter().map(|s| s.to_string()).collect()
}

/// Builder for a browser flow
#[derive(Debug, Clone)]
pub struct BrowserFlow {
    name: String,
    base_url: String,
    steps: Vec<BrowserStep>,
}

impl BrowserFlow {
    pub fn new(name: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn steps(&self) -> &[BrowserStep] {
        &self.steps
    }

    pub fn push(mut self, step: BrowserStep) -> Self {
        self.steps.push(step);
        self
    }

    fn branch(&self) -> Self {
        Self::new(&self.name, &self.base_url)
    }

    /// Inject the mock session. Must come before the navigation that needs it.
    pub fn setup_mock_auth(self, token: &MockAuthToken) -> Self {
        let script = token.init_script();
        self.push(BrowserStep::InitScript(script))
    }

    pub fn clear_auth(self) -> Self {
        self.evaluate("clearAuth", &clear_auth_script())
    }

    /// Absolute URL, or a path joined onto the flow's base URL
    pub fn goto(self, url: &str) -> Self {
        self.push(BrowserStep::Goto { url: url.to_string() })
    }

    pub fn wait_for_app_load(self) -> Self {
        self.push(BrowserStep::WaitForAppLoad)
    }

    /// Click the first visible match of any selector
    pub fn click(self, selectors: &[&str]) -> Self {
        self.push(BrowserStep::Click {
            selectors: owned(selectors),
            timeout_ms: None,
        })
    }

    pub fn click_within(self, selectors: &[&str], timeout_ms: u64) -> Self {
        self.push(BrowserStep::Click {
            selectors: owned(selectors),
            timeout_ms: Some(timeout_ms),
        })
    }

    pub fn fill(self, selectors: &[&str], value: &str) -> Self {
        self.push(BrowserStep::Fill {
            selectors: owned(selectors),
            value: value.to_string(),
        })
    }

    pub fn select_index(self, selectors: &[&str], index: usize) -> Self {
        self.push(BrowserStep::SelectIndex {
            selectors: owned(selectors),
            index,
        })
    }

    pub fn screenshot(self, name: &str) -> Self {
        self.push(BrowserStep::Screenshot {
            name: name.to_string(),
            full_page: false,
        })
    }

    pub fn full_page_screenshot(self, name: &str) -> Self {
        self.push(BrowserStep::Screenshot {
            name: name.to_string(),
            full_page: true,
        })
    }

    /// Full-page screenshot with a timestamped name
    pub fn debug_screenshot(self, name: &str) -> Self {
        let name = format!("debug-{}-{}", name, crate::ids::timestamp_ms());
        self.push(BrowserStep::Screenshot { name, full_page: true })
    }

    pub fn soft_visible(self, label: &str, selectors: &[&str], timeout_ms: u64) -> Self {
        self.push(BrowserStep::SoftVisible {
            label: label.to_string(),
            selectors: owned(selectors),
            timeout_ms,
        })
    }

    /// Branch on a soft visibility check; the result is recorded under `label`
    pub fn if_visible<T, O>(
        self,
        label: &str,
        selectors: &[&str],
        timeout_ms: u64,
        then: T,
        otherwise: O,
    ) -> Self
    where
        T: FnOnce(BrowserFlow) -> BrowserFlow,
        O: FnOnce(BrowserFlow) -> BrowserFlow,
    {
        let then = then(self.branch()).steps;
        let otherwise = otherwise(self.branch()).steps;
        self.push(BrowserStep::IfVisible {
            label: label.to_string(),
            selectors: owned(selectors),
            timeout_ms,
            then,
            otherwise,
        })
    }

    pub fn expect_visible(self, selectors: &[&str], timeout_ms: u64) -> Self {
        self.push(BrowserStep::ExpectVisible {
            selectors: owned(selectors),
            timeout_ms,
        })
    }

    /// Fail unless the current URL matches the JS regex `pattern`
    pub fn expect_url(self, pattern: &str) -> Self {
        self.push(BrowserStep::ExpectUrl {
            pattern: pattern.to_string(),
        })
    }

    pub fn wait_for_url(self, label: &str, pattern: &str, timeout_ms: u64, soft: bool) -> Self {
        self.push(BrowserStep::WaitForUrl {
            label: label.to_string(),
            pattern: pattern.to_string(),
            timeout_ms,
            soft,
        })
    }

    pub fn record_title(self, label: &str) -> Self {
        self.push(BrowserStep::RecordTitle { label: label.to_string() })
    }

    pub fn record_url(self, label: &str) -> Self {
        self.push(BrowserStep::RecordUrl { label: label.to_string() })
    }

    pub fn read_local_storage(self, label: &str, key: &str) -> Self {
        self.push(BrowserStep::ReadLocalStorage {
            label: label.to_string(),
            key: key.to_string(),
        })
    }

    /// Record the text of the first match, `null` when absent
    pub fn text_content(self, label: &str, selectors: &[&str]) -> Self {
        self.push(BrowserStep::TextContent {
            label: label.to_string(),
            selectors: owned(selectors),
        })
    }

    /// Evaluate a JS expression in the page and record its value
    pub fn evaluate(self, label: &str, script: &str) -> Self {
        self.push(BrowserStep::Evaluate {
            label: label.to_string(),
            script: script.to_string(),
        })
    }

    /// Record JSON bodies of responses whose URL contains `url_contains`
    pub fn capture_responses(self, label: &str, url_contains: &str) -> Self {
        self.push(BrowserStep::CaptureResponses {
            label: label.to_string(),
            url_contains: url_contains.to_string(),
        })
    }

    /// Record method/status/URL of responses whose URL contains any needle
    pub fn watch_api_calls(self, label: &str, url_contains: &[&str]) -> Self {
        self.push(BrowserStep::WatchApiCalls {
            label: label.to_string(),
            url_contains: owned(url_contains),
        })
    }

    pub fn sleep(self, ms: u64) -> Self {
        self.push(BrowserStep::Sleep { ms })
    }

    /// End the flow as skipped
    pub fn skip(self, reason: &str) -> Self {
        self.push(BrowserStep::Skip {
            reason: reason.to_string(),
        })
    }

    pub fn log(self, message: &str) -> Self {
        self.push(BrowserStep::Log {
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftCheck {
    pub label: String,
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub label: String,
    pub url: String,
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCall {
    pub label: String,
    pub method: String,
    pub url: String,
    pub status: u16,
}

/// Console output, page errors and failed requests, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum FlowEvent {
    Soft {
        label: String,
        visible: bool,
    },
    Value {
        label: String,
        #[serde(default)]
        value: Value,
    },
    Response {
        label: String,
        url: String,
        status: u16,
        #[serde(default)]
        body: Value,
    },
    ApiCall {
        label: String,
        method: String,
        url: String,
        status: u16,
    },
    Console {
        kind: String,
        text: String,
    },
    PageError {
        text: String,
    },
    RequestFailed {
        url: String,
        error: String,
    },
    Screenshot {
        path: PathBuf,
    },
    Log {
        message: String,
    },
    Skip {
        reason: String,
    },
    Failure {
        message: String,
    },
    Done,
}

/// Everything one flow run reported
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowReport {
    pub flow: String,
    pub artifact_dir: PathBuf,
    pub soft_checks: Vec<SoftCheck>,
    pub values: BTreeMap<String, Value>,
    pub responses: Vec<CapturedResponse>,
    pub api_calls: Vec<ApiCall>,
    pub transcript: Vec<TranscriptLine>,
    pub screenshots: Vec<PathBuf>,
    pub skipped: Option<String>,
    pub failure: Option<String>,
    pub completed: bool,
}

const BROWSER_MISSING: &[&str] = &["Executable doesn't exist", "npx playwright install"];

impl FlowReport {
    /// Fold the script's stdout into a report; non-event lines are ignored
    pub fn from_output(flow: &str, artifact_dir: &Path, stdout: &str) -> Self {
        let mut report = FlowReport {
            flow: flow.to_string(),
            artifact_dir: artifact_dir.to_path_buf(),
            ..Default::default()
        };

        for line in stdout.lines() {
            let Some(json) = line.strip_prefix(EVENT_MARKER) else {
                continue;
            };
            match serde_json::from_str::<FlowEvent>(json) {
                Ok(event) => report.apply(event),
                Err(e) => warn!("Unreadable flow event ({}): {}", e, json),
            }
        }
        report
    }

    fn apply(&mut self, event: FlowEvent) {
        match event {
            FlowEvent::Soft { label, visible } => self.soft_checks.push(SoftCheck { label, visible }),
            FlowEvent::Value { label, value } => {
                self.values.insert(label, value);
            }
            FlowEvent::Response { label, url, status, body } => {
                self.responses.push(CapturedResponse { label, url, status, body })
            }
            FlowEvent::ApiCall { label, method, url, status } => {
                self.api_calls.push(ApiCall { label, method, url, status })
            }
            FlowEvent::Console { kind, text } => self.transcript.push(TranscriptLine {
                kind: format!("console:{}", kind),
                text,
            }),
            FlowEvent::PageError { text } => self.transcript.push(TranscriptLine {
                kind: "pageerror".to_string(),
                text,
            }),
            FlowEvent::RequestFailed { url, error } => self.transcript.push(TranscriptLine {
                kind: "requestfailed".to_string(),
                text: format!("{} {}", url, error),
            }),
            FlowEvent::Screenshot { path } => self.screenshots.push(path),
            FlowEvent::Log { message } => info!("[{}] {}", self.flow, message),
            FlowEvent::Skip { reason } => self.skipped = Some(reason),
            FlowEvent::Failure { message } => self.failure = Some(message),
            FlowEvent::Done => self.completed = true,
        }
    }

    /// Latest soft check recorded under `label`
    pub fn visible(&self, label: &str) -> Option<bool> {
        self.soft_checks
            .iter()
            .rev()
            .find(|c| c.label == label)
            .map(|c| c.visible)
    }

    pub fn value(&self, label: &str) -> Option<&Value> {
        self.values.get(label).filter(|v| !v.is_null())
    }

    pub fn value_str(&self, label: &str) -> Option<&str> {
        self.value(label).and_then(Value::as_str)
    }

    pub fn responses(&self, label: &str) -> Vec<&CapturedResponse> {
        self.responses.iter().filter(|r| r.label == label).collect()
    }

    pub fn api_calls(&self, label: &str) -> Vec<&ApiCall> {
        self.api_calls.iter().filter(|c| c.label == label).collect()
    }

    /// `METHOD status url` per watched call, in order
    pub fn api_call_summary(&self) -> Vec<String> {
        self.api_calls
            .iter()
            .map(|c| format!("{} {} {}", c.method, c.status, c.url))
            .collect()
    }

    pub fn errors(&self) -> impl Iterator<Item = &TranscriptLine> {
        self.transcript
            .iter()
            .filter(|l| l.kind == "pageerror" || l.kind == "requestfailed" || l.kind == "console:error")
    }

    /// Convert into a step outcome: skipped flows skip, failed flows fail
    pub fn into_step(self) -> StepResult<Self> {
        if let Some(reason) = &self.skipped {
            return Err(Verdict::Skip(reason.clone()));
        }
        if let Some(message) = &self.failure {
            if BROWSER_MISSING.iter().any(|m| message.contains(m)) {
                return Err(Verdict::Skip(format!(
                    "Playwright browsers are not installed: {}",
                    message.lines().next().unwrap_or_default()
                )));
            }
            return Err(Verdict::Fail(E2eError::FlowFailed {
                flow: self.flow.clone(),
                reason: message.clone(),
            }));
        }
        if !self.completed {
            return Err(Verdict::Fail(E2eError::FlowFailed {
                flow: self.flow.clone(),
                reason: "script ended without reporting completion".to_string(),
            }));
        }
        Ok(self)
    }
}

/// File-system friendly form of a flow name
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn js<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn js_path(path: &Path) -> String {
    js(&path.to_string_lossy())
}

/// Playwright browser handle
pub struct PlaywrightHandle {
    browser: BrowserKind,
    headless: bool,
    viewport_width: u32,
    viewport_height: u32,
    ignore_https_errors: bool,
    artifacts: ArtifactPolicy,
    output_dir: PathBuf,
    screenshot_dir: PathBuf,
    timeouts: Timeouts,
    available: OnceCell<Availability>,
}

impl PlaywrightHandle {
    pub fn new(config: &E2eConfig) -> Self {
        let runner = &config.runner;
        Self {
            browser: runner.browser,
            headless: runner.headless,
            viewport_width: runner.viewport_width,
            viewport_height: runner.viewport_height,
            ignore_https_errors: runner.ignore_https_errors,
            artifacts: runner.artifacts.clone(),
            output_dir: runner.output_dir.clone(),
            screenshot_dir: runner.screenshot_dir(),
            timeouts: config.timeouts.clone(),
            available: OnceCell::new(),
        }
    }

    /// Whether `npx playwright --version` works; checked once per handle
    pub async fn availability(&self) -> Availability {
        self.available
            .get_or_init(|| async {
                let status = Command::new("npx")
                    .args(["--no-install", "playwright", "--version"])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .status()
                    .await;
                match status {
                    Ok(s) if s.success() => Availability::Available,
                    _ => Availability::unavailable(E2eError::PlaywrightNotFound.to_string()),
                }
            })
            .await
            .clone()
    }

    /// Run a flow to completion and collect its report
    pub async fn run(&self, flow: &BrowserFlow) -> E2eResult<FlowReport> {
        if !self.availability().await.is_available() {
            return Err(E2eError::PlaywrightNotFound);
        }

        let artifact_dir = self
            .output_dir
            .join(format!("{}-{}", slug(flow.name()), crate::ids::timestamp_ms()));
        std::fs::create_dir_all(&artifact_dir)?;
        std::fs::create_dir_all(&self.screenshot_dir)?;

        let script = self.build_script(flow, &artifact_dir);
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("flow.js");
        std::fs::write(&script_path, &script)?;

        info!("Running browser flow '{}'", flow.name());
        debug!("Playwright script: {}", script_path.display());

        let child = Command::new("node")
            .arg(&script_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeouts.test(), child.wait_with_output())
            .await
            .map_err(|_| E2eError::Timeout(format!("browser flow '{}'", flow.name())))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if stderr.contains("Cannot find module") && stderr.contains("playwright") {
            return Err(E2eError::PlaywrightNotFound);
        }

        let mut report = FlowReport::from_output(flow.name(), &artifact_dir, &stdout);
        for line in &report.transcript {
            if line.kind == "console:error" || line.kind == "pageerror" {
                warn!("[{}] {}: {}", flow.name(), line.kind, line.text);
            } else {
                debug!("[{}] {}: {}", flow.name(), line.kind, line.text);
            }
        }

        if !output.status.success() && report.failure.is_none() && report.skipped.is_none() {
            report.failure = Some(format!("node exited with {}: {}", output.status, stderr.trim()));
        }
        Ok(report)
    }

    /// Build the Node script for a flow
    pub fn build_script(&self, flow: &BrowserFlow, artifact_dir: &Path) -> String {
        let mut script = String::new();

        let context_video = if self.artifacts.video {
            format!(",\n    recordVideo: {{ dir: {} }}", js_path(&artifact_dir.join("video")))
        } else {
            String::new()
        };

        script.push_str(&format!(
            r#"const pw = require(require.resolve('playwright', {{ paths: [process.cwd(), __dirname] }}));
const MARK = {marker};
const emit = (event, data) => process.stdout.write(MARK + JSON.stringify({{ event, ...(data || {{}}) }}) + '\n');
class FlowSkip extends Error {{}}
const loc = (page, sels) => sels.slice(1).reduce((acc, s) => acc.or(page.locator(s)), page.locator(sels[0])).filter({{ visible: true }}).first();
const soft = async (locator, timeout) => {{
  try {{ await locator.waitFor({{ state: 'visible', timeout }}); return true; }} catch (e) {{ return false; }}
}};

(async () => {{
  const browser = await pw.{browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }},
    ignoreHTTPSErrors: {ignore_https}{video}
  }});
"#,
            marker = js(EVENT_MARKER),
            browser = self.browser.as_str(),
            headless = self.headless,
            width = self.viewport_width,
            height = self.viewport_height,
            ignore_https = self.ignore_https_errors,
            video = context_video,
        ));

        if self.artifacts.trace {
            script.push_str("  await context.tracing.start({ screenshots: true, snapshots: true });\n");
        }

        script.push_str(&format!(
            r#"  const page = await context.newPage();
  page.setDefaultTimeout({action});
  page.setDefaultNavigationTimeout({navigation});
  page.on('console', m => emit('console', {{ kind: m.type(), text: m.text() }}));
  page.on('pageerror', e => emit('page_error', {{ text: e.message }}));
  page.on('requestfailed', r => emit('request_failed', {{ url: r.url(), error: (r.failure() || {{}}).errorText || '' }}));
  const baseUrl = {base_url};
  const resolve = u => /^https?:/.test(u) ? u : baseUrl.replace(/\/$/, '') + u;
  let exitCode = 0;

  try {{
"#,
            action = self.timeouts.action_ms,
            navigation = self.timeouts.navigation_ms,
            base_url = js(flow.base_url()),
        ));

        for (i, step) in flow.steps().iter().enumerate() {
            script.push_str(&format!("\n    // Step {}\n", i + 1));
            script.push_str(&self.step_to_js(flow, step, 4));
            script.push('\n');
        }

        script.push_str(
            r#"
    emit('done');
  } catch (error) {
    if (error instanceof FlowSkip) {
      emit('skip', { reason: error.message });
    } else {
      emit('failure', { message: error.message });
      exitCode = 1;
    }
  } finally {
"#,
        );

        if self.artifacts.screenshot {
            let final_shot = artifact_dir.join("final.png");
            script.push_str(&format!(
                "    await page.screenshot({{ path: {path}, fullPage: true }}).then(() => emit('screenshot', {{ path: {path} }}), () => {{}});\n",
                path = js_path(&final_shot)
            ));
        }
        if self.artifacts.trace {
            script.push_str(&format!(
                "    await context.tracing.stop({{ path: {} }}).catch(() => {{}});\n",
                js_path(&artifact_dir.join("trace.zip"))
            ));
        }

        script.push_str(
            r#"    await context.close().catch(() => {});
    await browser.close().catch(() => {});
  }
  process.exit(exitCode);
})().catch(error => {
  emit('failure', { message: error.message });
  process.exit(1);
});
"#,
        );

        script
    }

    /// Convert a step to JavaScript code
    fn step_to_js(&self, flow: &BrowserFlow, step: &BrowserStep, indent: usize) -> String {
        let pad = " ".repeat(indent);
        match step {
            BrowserStep::InitScript(content) => {
                format!("{}await context.addInitScript({});", pad, js(content))
            }
            BrowserStep::Goto { url } => format!("{}await page.goto(resolve({}));", pad, js(url)),
            BrowserStep::WaitForAppLoad => format!(
                "{pad}await page.waitForLoadState('networkidle');\n{pad}await page.waitForTimeout({});",
                self.timeouts.app_settle_ms,
                pad = pad
            ),
            BrowserStep::Click { selectors, timeout_ms } => match timeout_ms {
                Some(t) => format!("{}await loc(page, {}).click({{ timeout: {} }});", pad, js(selectors), t),
                None => format!("{}await loc(page, {}).click();", pad, js(selectors)),
            },
            BrowserStep::Fill { selectors, value } => {
                format!("{}await loc(page, {}).fill({});", pad, js(selectors), js(value))
            }
            BrowserStep::SelectIndex { selectors, index } => format!(
                "{}await loc(page, {}).selectOption({{ index: {} }});",
                pad,
                js(selectors),
                index
            ),
            BrowserStep::Screenshot { name, full_page } => {
                let path = self
                    .screenshot_dir
                    .join(format!("{}-{}.png", slug(flow.name()), slug(name)));
                format!(
                    "{pad}await page.screenshot({{ path: {path}, fullPage: {full} }});\n{pad}emit('screenshot', {{ path: {path} }});",
                    pad = pad,
                    path = js_path(&path),
                    full = full_page
                )
            }
            BrowserStep::SoftVisible { label, selectors, timeout_ms } => format!(
                "{}emit('soft', {{ label: {}, visible: await soft(loc(page, {}), {}) }});",
                pad,
                js(label),
                js(selectors),
                timeout_ms
            ),
            BrowserStep::IfVisible {
                label,
                selectors,
                timeout_ms,
                then,
                otherwise,
            } => {
                let inner = indent + 2;
                let then_js: Vec<String> = then.iter().map(|s| self.step_to_js(flow, s, inner)).collect();
                let else_js: Vec<String> = otherwise.iter().map(|s| self.step_to_js(flow, s, inner)).collect();
                format!(
                    "{pad}{{\n{pad}  const visible = await soft(loc(page, {sels}), {t});\n{pad}  emit('soft', {{ label: {label}, visible }});\n{pad}  if (visible) {{\n{then}\n{pad}  }} else {{\n{otherwise}\n{pad}  }}\n{pad}}}",
                    pad = pad,
                    sels = js(selectors),
                    t = timeout_ms,
                    label = js(label),
                    then = then_js.join("\n"),
                    otherwise = else_js.join("\n"),
                )
            }
            BrowserStep::ExpectVisible { selectors, timeout_ms } => format!(
                "{pad}if (!(await soft(loc(page, {sels}), {t}))) throw new Error('Expected visible: ' + {sels}.join(' | '));",
                pad = pad,
                sels = js(selectors),
                t = timeout_ms
            ),
            BrowserStep::ExpectUrl { pattern } => format!(
                "{pad}if (!new RegExp({p}).test(page.url())) throw new Error('URL ' + page.url() + ' does not match ' + {p});",
                pad = pad,
                p = js(pattern)
            ),
            BrowserStep::WaitForUrl {
                label,
                pattern,
                timeout_ms,
                soft,
            } => format!(
                "{pad}{{\n{pad}  const reached = await page.waitForURL(new RegExp({p}), {{ timeout: {t} }}).then(() => true, () => false);\n{pad}  emit('soft', {{ label: {label}, visible: reached }});\n{pad}  if (!reached && {hard}) throw new Error('URL never matched ' + {p} + ', last ' + page.url());\n{pad}}}",
                pad = pad,
                p = js(pattern),
                t = timeout_ms,
                label = js(label),
                hard = !soft
            ),
            BrowserStep::RecordTitle { label } => format!(
                "{}emit('value', {{ label: {}, value: await page.title() }});",
                pad,
                js(label)
            ),
            BrowserStep::RecordUrl { label } => {
                format!("{}emit('value', {{ label: {}, value: page.url() }});", pad, js(label))
            }
            BrowserStep::ReadLocalStorage { label, key } => format!(
                "{}emit('value', {{ label: {}, value: await page.evaluate(k => localStorage.getItem(k), {}) }});",
                pad,
                js(label),
                js(key)
            ),
            BrowserStep::TextContent { label, selectors } => format!(
                "{}emit('value', {{ label: {}, value: await loc(page, {}).textContent({{ timeout: {} }}).catch(() => null) }});",
                pad,
                js(label),
                js(selectors),
                self.timeouts.expect_ms
            ),
            BrowserStep::Evaluate { label, script } => format!(
                "{}emit('value', {{ label: {}, value: (await page.evaluate({})) ?? null }});",
                pad,
                js(label),
                js(script)
            ),
            BrowserStep::CaptureResponses { label, url_contains } => format!(
                "{pad}page.on('response', async r => {{\n{pad}  if (!r.url().includes({needle})) return;\n{pad}  const body = await r.json().catch(() => null);\n{pad}  emit('response', {{ label: {label}, url: r.url(), status: r.status(), body }});\n{pad}}});",
                pad = pad,
                needle = js(url_contains),
                label = js(label)
            ),
            BrowserStep::WatchApiCalls { label, url_contains } => format!(
                "{pad}page.on('response', r => {{\n{pad}  if ({needle}.some(n => r.url().includes(n))) emit('api_call', {{ label: {label}, method: r.request().method(), url: r.url(), status: r.status() }});\n{pad}}});",
                pad = pad,
                needle = js(url_contains),
                label = js(label)
            ),
            BrowserStep::Sleep { ms } => format!("{}await page.waitForTimeout({});", pad, ms),
            BrowserStep::Skip { reason } => format!("{}throw new FlowSkip({});", pad, js(reason)),
            BrowserStep::Log { message } => {
                format!("{}emit('log', {{ message: {} }});", pad, js(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestUser;

    fn handle() -> PlaywrightHandle {
        PlaywrightHandle::new(&E2eConfig::default())
    }

    #[test]
    fn mock_auth_is_registered_before_navigation() {
        let token = MockAuthToken::for_user(&TestUser::default());
        let flow = BrowserFlow::new("auth", "http://localhost:5173")
            .setup_mock_auth(&token)
            .goto("/")
            .read_local_storage("token", "realm_auth_token");

        let script = handle().build_script(&flow, Path::new("/tmp/auth"));
        let init = script.find("context.addInitScript(").unwrap();
        let goto = script.find("page.goto(resolve(\"/\"))").unwrap();
        assert!(init < goto);
        assert!(script.contains("localStorage.getItem(k), \"realm_auth_token\""));
    }

    #[test]
    fn selectors_are_json_encoded_and_or_ed() {
        let flow = BrowserFlow::new("cart", "http://localhost:5173")
            .click(&["button:has-text(\"Add to cart\")", "[data-testid='add-to-cart']"]);
        let script = handle().build_script(&flow, Path::new("/tmp/cart"));
        assert!(script.contains(
            r#"await loc(page, ["button:has-text(\"Add to cart\")","[data-testid='add-to-cart']"]).click();"#
        ));
    }

    #[test]
    fn or_ed_selectors_resolve_to_a_visible_match() {
        let flow = BrowserFlow::new("nav", "http://localhost:5173").soft_visible(
            "nav",
            &["nav.mobile", "nav.desktop"],
            2_000,
        );
        let script = handle().build_script(&flow, Path::new("/tmp/nav"));
        assert!(script.contains(".filter({ visible: true }).first();"));
        assert!(!script.contains("page.locator(sels[0])).first()"));
        assert!(script.contains(
            r#"emit('soft', { label: "nav", visible: await soft(loc(page, ["nav.mobile","nav.desktop"]), 2000) });"#
        ));
    }

    #[test]
    fn artifacts_follow_the_policy() {
        let flow = BrowserFlow::new("Home Page", "http://localhost:5173").goto("/");
        let script = handle().build_script(&flow, Path::new("/tmp/home"));
        assert!(script.contains("recordVideo: { dir: \"/tmp/home/video\" }"));
        assert!(script.contains("context.tracing.start"));
        assert!(script.contains("\"/tmp/home/trace.zip\""));
        assert!(script.contains("\"/tmp/home/final.png\""));

        let mut config = E2eConfig::default();
        config.runner.artifacts = ArtifactPolicy {
            trace: false,
            screenshot: false,
            video: false,
        };
        let script = PlaywrightHandle::new(&config).build_script(&flow, Path::new("/tmp/home"));
        assert!(!script.contains("recordVideo"));
        assert!(!script.contains("tracing"));
        assert!(!script.contains("final.png"));
    }

    #[test]
    fn if_visible_nests_both_branches() {
        let flow = BrowserFlow::new("admin", "http://localhost:5173").if_visible(
            "devLogin",
            &["button:has-text(\"Dev Login\")"],
            5_000,
            |f| f.click(&["button:has-text(\"Dev Login\")"]),
            |f| f.skip("Dev login not available"),
        );
        match &flow.steps()[0] {
            BrowserStep::IfVisible { then, otherwise, .. } => {
                assert_eq!(then.len(), 1);
                assert_eq!(otherwise[0], BrowserStep::Skip { reason: "Dev login not available".into() });
            }
            other => panic!("unexpected step {:?}", other),
        }
        let script = handle().build_script(&flow, Path::new("/tmp/admin"));
        assert!(script.contains("throw new FlowSkip(\"Dev login not available\");"));
        assert!(script.contains("emit('soft', { label: \"devLogin\", visible });"));
    }

    #[test]
    fn report_folds_events_and_ignores_noise() {
        let stdout = format!(
            "{m}{{\"event\":\"soft\",\"label\":\"nav\",\"visible\":false}}\n\
             some stray log line\n\
             {m}{{\"event\":\"soft\",\"label\":\"nav\",\"visible\":true}}\n\
             {m}{{\"event\":\"value\",\"label\":\"title\",\"value\":\"RealmGrid Admin\"}}\n\
             {m}{{\"event\":\"response\",\"label\":\"servers\",\"url\":\"http://x/global-admin/servers\",\"status\":200,\"body\":{{\"servers\":[1,2]}}}}\n\
             {m}{{\"event\":\"api_call\",\"label\":\"api\",\"method\":\"GET\",\"url\":\"http://x/api/health\",\"status\":200}}\n\
             {m}{{\"event\":\"console\",\"kind\":\"error\",\"text\":\"boom\"}}\n\
             {m}{{\"event\":\"done\"}}\n",
            m = EVENT_MARKER
        );
        let report = FlowReport::from_output("admin", Path::new("/tmp/a"), &stdout);
        assert_eq!(report.visible("nav"), Some(true));
        assert_eq!(report.value_str("title"), Some("RealmGrid Admin"));
        assert_eq!(report.responses("servers")[0].body["servers"].as_array().unwrap().len(), 2);
        assert_eq!(report.api_call_summary(), vec!["GET 200 http://x/api/health".to_string()]);
        assert_eq!(report.errors().count(), 1);
        assert!(report.into_step().is_ok());
    }

    #[test]
    fn skipped_and_failed_flows_map_to_verdicts() {
        let skip = format!("{}{{\"event\":\"skip\",\"reason\":\"no dev login\"}}", EVENT_MARKER);
        let report = FlowReport::from_output("f", Path::new("/tmp"), &skip);
        assert!(matches!(report.into_step(), Err(Verdict::Skip(r)) if r == "no dev login"));

        let fail = format!("{}{{\"event\":\"failure\",\"message\":\"Timeout 30000ms exceeded\"}}", EVENT_MARKER);
        let report = FlowReport::from_output("f", Path::new("/tmp"), &fail);
        assert!(matches!(report.into_step(), Err(Verdict::Fail(E2eError::FlowFailed { .. }))));

        let missing = format!(
            "{}{{\"event\":\"failure\",\"message\":\"browserType.launch: Executable doesn't exist at /ms-playwright\"}}",
            EVENT_MARKER
        );
        let report = FlowReport::from_output("f", Path::new("/tmp"), &missing);
        assert!(matches!(report.into_step(), Err(Verdict::Skip(_))));

        let silent = FlowReport::from_output("f", Path::new("/tmp"), "");
        assert!(matches!(silent.into_step(), Err(Verdict::Fail(_))));
    }

    #[test]
    fn slugs_are_path_safe() {
        assert_eq!(slug("Admin Dashboard › loads"), "admin-dashboard-loads");
        assert_eq!(slug("--x--"), "x");
    }
}
