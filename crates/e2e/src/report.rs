//! Run reports: JSON, HTML and a list on stdout

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::E2eResult;
use crate::runner::RunSummary;
use crate::scenario::Outcome;

const ARTIFACT_EXTENSIONS: &[&str] = &["zip", "webm", "png"];

/// Write `results.json` under `dir`
pub fn write_json(summary: &RunSummary, dir: &Path) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("results.json");
    std::fs::write(&path, serde_json::to_string_pretty(summary)?)?;
    info!("Results written to: {}", path.display());
    Ok(path)
}

/// Write `index.html` under `dir`, linking artifacts found in `artifacts_dir`
pub fn write_html(summary: &RunSummary, dir: &Path, artifacts_dir: &Path) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("index.html");
    std::fs::write(&path, render_html(summary, &collect_artifacts(artifacts_dir)))?;
    info!("HTML report written to: {}", path.display());
    Ok(path)
}

/// Traces, videos and screenshots under `dir`, sorted
pub fn collect_artifacts(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ARTIFACT_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render_html(summary: &RunSummary, artifacts: &[PathBuf]) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>RealmGrid E2E report</title>\n\
         <style>body{{font-family:sans-serif}}td{{padding:2px 8px}}.passed{{color:#1a7f37}}.failed{{color:#cf222e}}.skipped{{color:#9a6700}}</style>\n\
         </head><body>\n<h1>RealmGrid E2E report</h1>\n\
         <p>{} · {} passed · {} failed · {} skipped · {} ms</p>\n\
         <p>Web {} · Admin {} · API {}</p>\n",
        escape(&summary.started_at),
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.duration_ms,
        escape(&summary.web_url),
        escape(&summary.admin_url),
        escape(&summary.functions_url),
    );

    for suite in &summary.suites {
        let _ = write!(
            html,
            "<h2>{}</h2>\n<p>{}</p>\n<table>\n",
            escape(&suite.name),
            escape(&suite.description)
        );
        for test in &suite.tests {
            let detail = match &test.outcome {
                Outcome::Passed => String::new(),
                Outcome::Skipped { reason } => escape(reason),
                Outcome::Failed { error } => escape(error),
            };
            let _ = writeln!(
                html,
                "<tr class=\"{cls}\"><td>{cls}</td><td>{}</td><td>{} ms</td><td>{}</td></tr>",
                escape(&test.name),
                test.duration_ms,
                detail,
                cls = test.outcome.label(),
            );
        }
        html.push_str("</table>\n");
    }

    if !artifacts.is_empty() {
        html.push_str("<h2>Artifacts</h2>\n<ul>\n");
        for artifact in artifacts {
            let shown = artifact.to_string_lossy();
            let _ = writeln!(html, "<li><a href=\"{0}\">{0}</a></li>", escape(&shown));
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</body></html>\n");
    html
}

/// One line per test, then the totals
pub fn format_list(summary: &RunSummary) -> String {
    let mut out = String::new();
    for suite in &summary.suites {
        for test in &suite.tests {
            let mark = match test.outcome {
                Outcome::Passed => "✓",
                Outcome::Skipped { .. } => "-",
                Outcome::Failed { .. } => "✘",
            };
            let retry = if test.attempts > 1 {
                format!(" (attempt {})", test.attempts)
            } else {
                String::new()
            };
            let _ = writeln!(out, "  {} {} ({} ms){}", mark, test.title(), test.duration_ms, retry);
        }
    }

    let failures: Vec<_> = summary.failures().collect();
    if !failures.is_empty() {
        let _ = writeln!(out);
        for (i, test) in failures.iter().enumerate() {
            if let Outcome::Failed { error } = &test.outcome {
                let _ = writeln!(out, "  {}) {}\n     {}", i + 1, test.title(), error);
            }
        }
    }

    let _ = writeln!(
        out,
        "\n  {} passed, {} failed, {} skipped ({} ms)",
        summary.passed, summary.failed, summary.skipped, summary.duration_ms
    );
    out
}

pub fn print_list(summary: &RunSummary) {
    print!("{}", format_list(summary));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::SuiteResult;
    use crate::scenario::TestRecord;

    fn summary() -> RunSummary {
        let record = |name: &str, outcome: Outcome, attempts: u32| TestRecord {
            suite: "checkout-api".to_string(),
            name: name.to_string(),
            outcome,
            duration_ms: 12,
            attempts,
        };
        RunSummary {
            started_at: "2026-10-19T10:00:00Z".to_string(),
            web_url: "http://localhost:5173".to_string(),
            admin_url: "http://localhost:5173".to_string(),
            functions_url: "http://localhost:7071".to_string(),
            workers: 1,
            retries: 1,
            total: 3,
            passed: 1,
            failed: 1,
            skipped: 1,
            duration_ms: 40,
            suites: vec![SuiteResult {
                name: "checkout-api".to_string(),
                description: "Checkout <API>".to_string(),
                tags: vec!["api".to_string()],
                duration_ms: 40,
                tests: vec![
                    record("health", Outcome::Passed, 1),
                    record("create", Outcome::Failed { error: "no checkoutUrl".into() }, 2),
                    record("list", Outcome::Skipped { reason: "API down".into() }, 1),
                ],
            }],
        }
    }

    #[test]
    fn list_shows_each_test_and_failures() {
        let list = format_list(&summary());
        assert!(list.contains("✓ checkout-api › health (12 ms)"));
        assert!(list.contains("✘ checkout-api › create (12 ms) (attempt 2)"));
        assert!(list.contains("1) checkout-api › create\n     no checkoutUrl"));
        assert!(list.contains("1 passed, 1 failed, 1 skipped"));
    }

    #[test]
    fn html_escapes_and_links_artifacts() {
        let html = render_html(&summary(), &[PathBuf::from("test-results/flow-1/trace.zip")]);
        assert!(html.contains("Checkout &lt;API&gt;"));
        assert!(html.contains("<tr class=\"failed\"><td>failed</td><td>create</td>"));
        assert!(html.contains("href=\"test-results/flow-1/trace.zip\""));
    }

    #[test]
    fn reports_land_in_their_directories() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = dir.path().join("test-results");
        std::fs::create_dir_all(artifacts.join("home-1")).unwrap();
        std::fs::write(artifacts.join("home-1/final.png"), b"png").unwrap();
        std::fs::write(artifacts.join("home-1/flow.log"), b"log").unwrap();

        let json = write_json(&summary(), &artifacts).unwrap();
        let parsed: RunSummary = serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(parsed.suites[0].tests[1].attempts, 2);

        let html = write_html(&summary(), &dir.path().join("playwright-report"), &artifacts).unwrap();
        let content = std::fs::read_to_string(html).unwrap();
        assert!(content.contains("final.png"));
        assert!(!content.contains("flow.log"));
    }
}
