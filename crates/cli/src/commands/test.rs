use std::path::Path;

use anyhow::{Context, bail};
use armor_waf::{Rules, SuiteReport, TestStatus, TestSuite};
use serde::Serialize;

use crate::OutputFormat;

#[derive(Serialize)]
struct SuiteOutput<'a> {
    suite: &'a str,
    report: SuiteReport,
    results: &'a [TestStatus],
}

pub fn run(
    rules: &Rules,
    path: &Path,
    workers: usize,
    format: Option<OutputFormat>,
) -> anyhow::Result<()> {
    let suite = TestSuite::from_file(path).context("failed to load test suite")?;
    let checked = super::compile(rules, &suite.expr)?;
    let program = rules.program(&checked);

    let statuses = if workers > 1 {
        rules.run_test_suite_concurrent(&program, &suite.tests, workers)
    } else {
        rules.run_test_suite(&program, &suite.tests)
    };
    let report = SuiteReport::from_statuses(&statuses);

    match format {
        Some(OutputFormat::Json) => {
            let output = SuiteOutput {
                suite: &suite.name,
                report,
                results: &statuses,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Some(OutputFormat::Text) | None => {
            for status in &statuses {
                if status.passed() {
                    println!("PASS {}/{}", suite.name, status.name);
                } else {
                    println!("FAIL {}/{}: {}", suite.name, status.name, status.failure());
                }
            }
            println!("{}: {report}", suite.name);
        }
    }

    if !report.all_passed() {
        bail!("{} of {} test cases failed", report.failed, report.total());
    }
    Ok(())
}
