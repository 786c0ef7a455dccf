//! Main test runner: executes suites one at a time and aggregates outcomes

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::{E2eConfig, RunnerSettings};
use crate::error::E2eResult;
use crate::scenario::{Outcome, ScenarioContext, SuiteRecorder, TestRecord};
use crate::scenarios;
use crate::spec::FlowSpec;

/// One feature area's tests
#[async_trait(?Send)]
pub trait Suite {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run every test, recording outcomes. Never panics on a failed test.
    async fn run(&self, ctx: &ScenarioContext, rec: &mut SuiteRecorder);
}

/// Which suites and tests to run
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    /// Suite name, matched as a substring
    pub suite: Option<String>,
    /// Regex over `suite › test` titles
    pub grep: Option<Regex>,
    pub tag: Option<String>,
}

impl RunFilter {
    pub fn matches(&self, suite: &dyn Suite) -> bool {
        let by_name = self
            .suite
            .as_deref()
            .map_or(true, |s| suite.name().contains(s));
        let by_tag = self
            .tag
            .as_deref()
            .map_or(true, |t| suite.tags().iter().any(|tag| tag == t));
        by_name && by_tag
    }
}

/// Result of one suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub duration_ms: u64,
    pub tests: Vec<TestRecord>,
}

impl SuiteResult {
    fn count(&self, label: &str) -> usize {
        self.tests.iter().filter(|t| t.outcome.label() == label).count()
    }

    pub fn passed(&self) -> usize {
        self.count("passed")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: String,
    pub web_url: String,
    pub admin_url: String,
    pub functions_url: String,
    pub workers: usize,
    pub retries: u32,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub suites: Vec<SuiteResult>,
}

impl RunSummary {
    /// 0 unless some test failed; skips never fail a run
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestRecord> {
        self.suites
            .iter()
            .flat_map(|s| s.tests.iter())
            .filter(|t| matches!(t.outcome, Outcome::Failed { .. }))
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: E2eConfig,
    suites: Vec<Box<dyn Suite>>,
    flows_dir: Option<PathBuf>,
}

impl TestRunner {
    /// Runner with no suites registered
    pub fn with_config(config: E2eConfig) -> Self {
        Self {
            config,
            suites: Vec::new(),
            flows_dir: None,
        }
    }

    /// Runner with every built-in suite registered
    pub fn new(config: E2eConfig) -> Self {
        let mut runner = Self::with_config(config);
        for suite in scenarios::default_suites() {
            runner.register(suite);
        }
        runner
    }

    pub fn register(&mut self, suite: Box<dyn Suite>) {
        self.suites.push(suite);
    }

    /// Also run the YAML flows found under `dir`
    pub fn with_flows(mut self, dir: PathBuf) -> Self {
        self.flows_dir = Some(dir);
        self
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    fn load_flow_suite(&self) -> E2eResult<Option<Box<dyn Suite>>> {
        match &self.flows_dir {
            Some(dir) if dir.exists() => {
                let specs = FlowSpec::load_all(dir)?;
                info!("Loaded {} YAML flow(s) from {}", specs.len(), dir.display());
                Ok(Some(Box::new(scenarios::flows::FlowSuite::new(specs))))
            }
            _ => Ok(None),
        }
    }

    /// `(name, description, tags)` of every suite the filter selects
    pub fn list(&self, filter: &RunFilter) -> E2eResult<Vec<(String, String, Vec<String>)>> {
        let flows = self.load_flow_suite()?;
        Ok(self
            .suites
            .iter()
            .chain(flows.iter())
            .map(|s| &**s)
            .filter(|s| filter.matches(*s))
            .map(|s| (s.name().to_string(), s.description().to_string(), s.tags()))
            .collect())
    }

    /// Run the selected suites strictly one after another
    pub async fn run(&self, filter: &RunFilter) -> E2eResult<RunSummary> {
        let ctx = ScenarioContext::new(self.config.clone())?;
        self.run_with(&ctx, filter).await
    }

    pub async fn run_with(&self, ctx: &ScenarioContext, filter: &RunFilter) -> E2eResult<RunSummary> {
        let start = Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();
        let flows = self.load_flow_suite()?;
        let retries = self.config.retries();

        let selected: Vec<&dyn Suite> = self
            .suites
            .iter()
            .chain(flows.iter())
            .map(|s| &**s)
            .filter(|s| filter.matches(*s))
            .collect();

        info!(
            "Running {} suite(s) with {} worker, {} retr{}",
            selected.len(),
            RunnerSettings::WORKERS,
            retries,
            if retries == 1 { "y" } else { "ies" }
        );

        let mut suites = Vec::new();
        for suite in selected {
            let suite_start = Instant::now();
            info!("▶ {}: {}", suite.name(), suite.description());

            let mut rec = SuiteRecorder::new(suite.name(), retries, self.config.timeouts.test())
                .with_grep(filter.grep.clone());
            suite.run(ctx, &mut rec).await;

            suites.push(SuiteResult {
                name: suite.name().to_string(),
                description: suite.description().to_string(),
                tags: suite.tags(),
                duration_ms: suite_start.elapsed().as_millis() as u64,
                tests: rec.into_records(),
            });
        }

        let passed: usize = suites.iter().map(SuiteResult::passed).sum();
        let failed: usize = suites.iter().map(SuiteResult::failed).sum();
        let skipped: usize = suites.iter().map(SuiteResult::skipped).sum();
        let total: usize = suites.iter().map(|s| s.tests.len()).sum();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );
        if failed > 0 {
            error!("{} test(s) failed", failed);
        }

        Ok(RunSummary {
            started_at,
            web_url: self.config.web_url.clone(),
            admin_url: self.config.admin_url.clone(),
            functions_url: self.config.functions_url.clone(),
            workers: RunnerSettings::WORKERS,
            retries,
            total,
            passed,
            failed,
            skipped,
            duration_ms,
            suites,
        })
    }
}
