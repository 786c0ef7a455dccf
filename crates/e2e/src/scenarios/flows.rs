//! YAML flows run as one suite

use async_trait::async_trait;
use tracing::info;

use crate::runner::Suite;
use crate::scenario::{ScenarioContext, StepResult, SuiteRecorder};
use crate::spec::{FlowSpec, FlowTarget};

pub struct FlowSuite {
    specs: Vec<FlowSpec>,
}

impl FlowSuite {
    pub fn new(specs: Vec<FlowSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[FlowSpec] {
        &self.specs
    }
}

#[async_trait(?Send)]
impl Suite for FlowSuite {
    fn name(&self) -> &str {
        "flows"
    }

    fn description(&self) -> &str {
        "Declarative YAML browser flows"
    }

    /// `flows` plus every tag any flow carries, so `--tag` reaches them
    fn tags(&self) -> Vec<String> {
        let mut tags = vec!["flows".to_string()];
        for tag in self.specs.iter().flat_map(|s| s.tags.iter()) {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags
    }

    async fn run(&self, ctx: &ScenarioContext, rec: &mut SuiteRecorder) {
        for spec in &self.specs {
            rec.case(&spec.name, || run_spec(ctx, spec)).await;
        }
    }
}

async fn run_spec(ctx: &ScenarioContext, spec: &FlowSpec) -> StepResult<()> {
    match spec.target {
        FlowTarget::Web => ctx.require_web().await?,
        FlowTarget::Admin => ctx.require_admin().await?,
    }
    if !spec.description.is_empty() {
        info!("{}: {}", spec.name, spec.description);
    }
    let report = ctx.run_flow(spec.to_flow(&ctx.config)).await?;
    for check in &report.soft_checks {
        info!("  {} visible: {}", check.label, check.visible);
    }
    Ok(())
}
