//! RealmGrid E2E Test Framework
//!
//! Black-box checks of a deployed RealmGrid stack: the customer web app,
//! the admin portal and the provisioning/commerce API. This crate:
//! - Probes each target first, so a missing environment skips instead of failing
//! - Talks to the API over HTTP with tolerant status and envelope checks
//! - Drives Playwright through generated Node scripts for browser flows
//! - Runs suites serially and writes JSON, HTML and list reports
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── ScenarioContext { config, api, probes, browser }     │
//! │    ├── Suite::run(ctx, SuiteRecorder)                       │
//! │    │     ├── case(name, || async { .. })   retried          │
//! │    │     ├── serial().step / .then         carry-state      │
//! │    │     └── teardown(name, cleanup)       best effort      │
//! │    └── RunSummary -> results.json, index.html, list         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserFlow -> Node + Playwright -> FlowReport             │
//! │  FlowSpec (YAML) -> BrowserFlow                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod playwright;
pub mod poll;
pub mod probe;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod scenarios;
pub mod spec;
pub mod status;
pub mod telemetry;

pub use api::{ApiClient, ApiResponse};
pub use config::E2eConfig;
pub use error::{E2eError, E2eResult};
pub use runner::{RunFilter, RunSummary, Suite, TestRunner};
pub use scenario::{Outcome, ScenarioContext, StepResult, SuiteRecorder, Verdict};
pub use spec::{FlowSpec, FlowStep};
