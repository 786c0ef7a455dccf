//! Scenario conventions: verdicts, recorded outcomes and serial chains
//!
//! A scenario step returns [`StepResult`]. `Err(Verdict::Skip)` means the
//! step could not meaningfully run (infrastructure down, a prerequisite
//! never produced), `Err(Verdict::Fail)` means a value was captured and was
//! wrong. Transport errors convert to skips through `?`.

use std::fmt::Debug;
use std::future::Future;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::api::ApiClient;
use crate::playwright::{BrowserFlow, FlowReport, PlaywrightHandle};
use crate::config::E2eConfig;
use crate::error::{E2eError, E2eResult};
use crate::ids::TestIds;
use crate::probe::{ApiProbe, ProbeMode, WebProbe};

/// Why a step stopped early
#[derive(Debug)]
pub enum Verdict {
    Skip(String),
    Fail(E2eError),
}

impl From<E2eError> for Verdict {
    fn from(err: E2eError) -> Self {
        if err.is_transport() {
            Verdict::Skip(format!("infrastructure unavailable: {}", err))
        } else {
            Verdict::Fail(err)
        }
    }
}

pub type StepResult<T> = Result<T, Verdict>;

pub fn skip<T>(reason: impl Into<String>) -> StepResult<T> {
    Err(Verdict::Skip(reason.into()))
}

/// Hard assertion on a captured value
pub fn ensure(condition: bool, message: impl Into<String>) -> StepResult<()> {
    if condition {
        Ok(())
    } else {
        Err(Verdict::Fail(E2eError::AssertionFailed(message.into())))
    }
}

pub fn ensure_eq<T: PartialEq + Debug>(actual: T, expected: T, what: &str) -> StepResult<()> {
    ensure(
        actual == expected,
        format!("{}: expected {:?}, got {:?}", what, expected, actual),
    )
}

/// Final state of one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Skipped { reason: String },
    Failed { error: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Skipped { .. } => "skipped",
            Outcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    pub suite: String,
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub duration_ms: u64,
    /// Attempts made, retries included
    pub attempts: u32,
}

impl TestRecord {
    pub fn title(&self) -> String {
        format!("{} › {}", self.suite, self.name)
    }
}

/// Everything a suite needs to talk to the system under test
pub struct ScenarioContext {
    pub config: E2eConfig,
    pub api: ApiClient,
    /// 2xx-only health gate
    pub probe: ApiProbe,
    pub web_probe: WebProbe,
    pub admin_probe: WebProbe,
    pub browser: PlaywrightHandle,
}

impl ScenarioContext {
    pub fn new(config: E2eConfig) -> E2eResult<Self> {
        let timeout = config.timeouts.probe();
        Ok(Self {
            api: ApiClient::new(&config)?,
            probe: ApiProbe::new(config.api_url("/api/health"), timeout, ProbeMode::Strict)?,
            web_probe: WebProbe::new(&config.web_url, timeout)?,
            admin_probe: WebProbe::new(&config.admin_url, timeout)?,
            browser: PlaywrightHandle::new(&config),
            config,
        })
    }

    /// Fresh identifiers for one scenario
    pub fn ids(&self) -> TestIds {
        TestIds::generate()
    }

    /// Skip unless the API health check answers 2xx
    pub async fn require_api(&self) -> StepResult<()> {
        self.probe.check().await.require()
    }

    /// Skip unless the API answers at all, degraded health included
    pub async fn require_api_reachable(&self) -> StepResult<()> {
        self.probe.with_mode(ProbeMode::Lenient).check().await.require()
    }

    /// Skip unless the web app and a Playwright install are both present
    pub async fn require_web(&self) -> StepResult<()> {
        self.web_probe.check().await.require()?;
        self.browser.availability().await.require()
    }

    pub async fn require_admin(&self) -> StepResult<()> {
        self.admin_probe.check().await.require()?;
        self.browser.availability().await.require()
    }

    /// Run a browser flow, turning its skip or failure into a verdict
    pub async fn run_flow(&self, flow: BrowserFlow) -> StepResult<FlowReport> {
        self.browser.run(&flow).await?.into_step()
    }
}

/// Collects test outcomes for one suite
pub struct SuiteRecorder {
    suite: String,
    retries: u32,
    test_timeout: Duration,
    grep: Option<Regex>,
    records: Vec<TestRecord>,
}

impl SuiteRecorder {
    pub fn new(suite: &str, retries: u32, test_timeout: Duration) -> Self {
        Self {
            suite: suite.to_string(),
            retries,
            test_timeout,
            grep: None,
            records: Vec::new(),
        }
    }

    /// Only run tests whose `suite › name` title matches
    pub fn with_grep(mut self, grep: Option<Regex>) -> Self {
        self.grep = grep;
        self
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TestRecord> {
        self.records
    }

    fn selected(&self, name: &str) -> bool {
        match &self.grep {
            Some(re) => re.is_match(&format!("{} › {}", self.suite, name)),
            None => true,
        }
    }

    /// Run an independent test. Failures are retried; skips are not.
    pub async fn case<F, Fut>(&mut self, name: &str, mut test: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StepResult<()>>,
    {
        if !self.selected(name) {
            return;
        }

        let start = Instant::now();
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            let outcome = self.attempt(name, test()).await;
            match &outcome {
                Outcome::Failed { error } if attempts <= self.retries => {
                    warn!("{} › {} failed (attempt {}), retrying: {}", self.suite, name, attempts, error);
                }
                _ => break outcome,
            }
        };

        self.record(name, outcome, start, attempts);
    }

    async fn attempt<T, Fut>(&self, name: &str, fut: Fut) -> Outcome
    where
        Fut: Future<Output = StepResult<T>>,
    {
        match tokio::time::timeout(self.test_timeout, fut).await {
            Ok(Ok(_)) => Outcome::Passed,
            Ok(Err(Verdict::Skip(reason))) => Outcome::Skipped { reason },
            Ok(Err(Verdict::Fail(e))) => Outcome::Failed { error: e.to_string() },
            Err(_) => Outcome::Failed {
                error: E2eError::Timeout(format!(
                    "test '{}' exceeded {} ms",
                    name,
                    self.test_timeout.as_millis()
                ))
                .to_string(),
            },
        }
    }

    fn record(&mut self, name: &str, outcome: Outcome, start: Instant, attempts: u32) {
        match &outcome {
            Outcome::Passed => info!("✓ {} › {}", self.suite, name),
            Outcome::Skipped { reason } => info!("- {} › {} (skipped: {})", self.suite, name, reason),
            Outcome::Failed { error } => error!("✗ {} › {} - {}", self.suite, name, error),
        }
        self.records.push(TestRecord {
            suite: self.suite.clone(),
            name: name.to_string(),
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
            attempts,
        });
    }

    fn record_skip(&mut self, name: &str, reason: String) {
        self.record(name, Outcome::Skipped { reason }, Instant::now(), 0);
    }

    /// Start an ordered sequence whose steps depend on each other
    pub fn serial(&mut self) -> SerialChain<'_> {
        SerialChain {
            recorder: self,
            broken: None,
        }
    }

    /// Best-effort cleanup: runs, logs, never recorded
    pub async fn teardown<Fut>(&mut self, name: &str, cleanup: Fut)
    where
        Fut: Future<Output = ()>,
    {
        if tokio::time::timeout(self.test_timeout, cleanup).await.is_err() {
            warn!("{} teardown '{}' timed out", self.suite, name);
        }
    }
}

/// Ordered steps sharing carry-state.
///
/// Once a step fails or skips, every later step is recorded as skipped
/// without running. A step whose input was never produced skips too.
/// Steps run once: retrying one link of a chain would replay side effects
/// the next link already depends on.
pub struct SerialChain<'r> {
    recorder: &'r mut SuiteRecorder,
    broken: Option<String>,
}

impl SerialChain<'_> {
    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    /// Run a step with no input from earlier steps
    pub async fn step<T, Fut>(&mut self, name: &str, fut: Fut) -> Option<T>
    where
        Fut: Future<Output = StepResult<T>>,
    {
        if !self.recorder.selected(name) {
            return None;
        }
        if let Some(prev) = &self.broken {
            let reason = format!("previous step '{}' did not pass", prev);
            self.recorder.record_skip(name, reason);
            return None;
        }

        let start = Instant::now();
        let (outcome, value) = match tokio::time::timeout(self.recorder.test_timeout, fut).await {
            Ok(Ok(value)) => (Outcome::Passed, Some(value)),
            Ok(Err(Verdict::Skip(reason))) => (Outcome::Skipped { reason }, None),
            Ok(Err(Verdict::Fail(e))) => (Outcome::Failed { error: e.to_string() }, None),
            Err(_) => (
                Outcome::Failed {
                    error: E2eError::Timeout(format!("step '{}'", name)).to_string(),
                },
                None,
            ),
        };

        if outcome != Outcome::Passed {
            self.broken = Some(name.to_string());
        }
        self.recorder.record(name, outcome, start, 1);
        value
    }

    /// Run a step that consumes an earlier step's output
    pub async fn then<D, T, F, Fut>(&mut self, name: &str, input: Option<D>, f: F) -> Option<T>
    where
        F: FnOnce(D) -> Fut,
        Fut: Future<Output = StepResult<T>>,
    {
        match input {
            Some(input) if self.broken.is_none() => self.step(name, f(input)).await,
            Some(_) => self.step(name, async { skip::<T>("blocked") }).await,
            None => {
                if self.recorder.selected(name) {
                    let reason = match &self.broken {
                        Some(prev) => format!("previous step '{}' did not pass", prev),
                        None => "required input from an earlier step was not produced".to_string(),
                    };
                    self.broken.get_or_insert_with(|| name.to_string());
                    self.recorder.record_skip(name, reason);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder() -> SuiteRecorder {
        SuiteRecorder::new("unit", 1, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn failures_are_retried_and_skips_are_not() {
        let mut rec = recorder();
        let calls = Cell::new(0);

        rec.case("flaky", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { ensure(n > 1, "first attempt fails") }
        })
        .await;
        assert_eq!(rec.records()[0].outcome, Outcome::Passed);
        assert_eq!(rec.records()[0].attempts, 2);

        let skips = Cell::new(0);
        rec.case("gated", || {
            skips.set(skips.get() + 1);
            async { skip("api down") }
        })
        .await;
        assert_eq!(skips.get(), 1);
        assert_eq!(rec.records()[1].outcome.label(), "skipped");
    }

    #[test]
    fn transport_errors_become_skips() {
        let verdict: Verdict = E2eError::PlaywrightNotFound.into();
        assert!(matches!(verdict, Verdict::Skip(_)));

        let verdict: Verdict = E2eError::AssertionFailed("count".into()).into();
        assert!(matches!(verdict, Verdict::Fail(_)));
    }

    #[tokio::test]
    async fn per_test_timeout_fails_the_test() {
        let mut rec = SuiteRecorder::new("unit", 0, Duration::from_millis(20));
        rec.case("slow", || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        })
        .await;
        match &rec.records()[0].outcome {
            Outcome::Failed { error } => assert!(error.contains("exceeded 20 ms")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn chain_skips_dependents_of_a_failed_step() {
        let mut rec = recorder();
        let mut chain = rec.serial();

        let url: Option<String> = chain
            .step("create checkout", async { ensure(false, "no checkoutUrl").map(|_| String::new()) })
            .await;
        assert!(url.is_none());

        let ran = Cell::new(false);
        let paid = chain
            .then("open checkout", url.as_ref(), |_| {
                ran.set(true);
                async { Ok(()) }
            })
            .await;
        assert!(paid.is_none());
        assert!(!ran.get());

        chain.step("list", async { Ok(()) }).await;

        let outcomes: Vec<&str> = rec.records().iter().map(|r| r.outcome.label()).collect();
        assert_eq!(outcomes, ["failed", "skipped", "skipped"]);
    }

    #[tokio::test]
    async fn chain_threads_values_between_steps() {
        let mut rec = recorder();
        let mut chain = rec.serial();

        let id = chain.step("create", async { Ok("sub-1".to_string()) }).await;
        let status = chain
            .then("verify", id.as_deref(), |id| async move { Ok(format!("{}:active", id)) })
            .await;
        assert_eq!(status.as_deref(), Some("sub-1:active"));
        assert!(rec.records().iter().all(|r| r.outcome == Outcome::Passed));
    }

    #[tokio::test]
    async fn grep_filters_cases_by_title() {
        let mut rec = recorder().with_grep(Some(Regex::new("health").unwrap()));
        rec.case("health check", || async { Ok(()) }).await;
        rec.case("provision", || async { Ok(()) }).await;
        assert_eq!(rec.records().len(), 1);
        assert_eq!(rec.records()[0].title(), "unit › health check");
    }

    #[tokio::test]
    async fn teardown_is_never_recorded() {
        let mut rec = recorder();
        rec.teardown("delete server", async {}).await;
        assert!(rec.records().is_empty());
    }
}
