use std::path::PathBuf;

use realm_e2e::playwright::BrowserStep;
use realm_e2e::spec::{FlowSpec, FlowTarget};
use realm_e2e::{E2eConfig, RunFilter, TestRunner};

fn flows_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/flows")
}

#[test]
fn bundled_flows_parse() {
    let specs = FlowSpec::load_all(&flows_dir()).unwrap();
    let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["admin-login", "storefront-home"]);

    let admin = &specs[0];
    assert_eq!(admin.target, FlowTarget::Admin);
    let flow = admin.to_flow(&E2eConfig::default());
    assert!(matches!(
        flow.steps().last(),
        Some(BrowserStep::Screenshot { full_page: true, .. })
    ));

    let storefront = &specs[1];
    assert!(storefront.mock_auth);
    assert!(matches!(
        storefront.to_flow(&E2eConfig::default()).steps()[0],
        BrowserStep::InitScript(_)
    ));
}

#[test]
fn flows_are_listed_as_their_own_suite() {
    let runner = TestRunner::with_config(E2eConfig::default()).with_flows(flows_dir());
    let by_tag = RunFilter {
        tag: Some("smoke".into()),
        ..Default::default()
    };
    let listed = runner.list(&by_tag).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].0, "flows");
    assert!(listed[0].2.iter().any(|t| t == "admin"));
}
