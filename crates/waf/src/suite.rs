//! Test suites: a rule expression with named cases and their expected
//! outcomes, and the verdicts produced by running them.

use std::fmt;
use std::path::Path;

use armor_rules::RuleError;
use serde::{Deserialize, Serialize};

use crate::attributes::AttributeSet;

/// A rule expression and the cases it is checked against.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSuite {
    pub name: String,
    pub expr: String,
    pub tests: Vec<TestCase>,
}

/// One input and the outcome the rule should produce for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub when: AttributeSet,
    pub expectation: Expectation,
}

/// What a case expects from evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Evaluation succeeds with this boolean.
    Output(bool),
    /// Evaluation fails with an error whose message contains this text.
    Error(String),
}

impl Default for Expectation {
    fn default() -> Self {
        Self::Output(false)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSuite {
    #[serde(default)]
    name: String,
    #[serde(default)]
    expr: String,
    #[serde(default)]
    tests: Vec<RawTestCase>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTestCase {
    #[serde(default)]
    name: String,
    #[serde(default)]
    when: Option<AttributeSet>,
    #[serde(default)]
    expect: bool,
    #[serde(default)]
    error: String,
}

impl TryFrom<RawTestCase> for TestCase {
    type Error = RuleError;

    fn try_from(raw: RawTestCase) -> Result<Self, Self::Error> {
        let expectation = match (raw.expect, raw.error.is_empty()) {
            (true, false) => {
                return Err(RuleError::Configuration(format!(
                    "test case \"{}\" has both expect and error",
                    raw.name
                )));
            }
            (_, false) => Expectation::Error(raw.error),
            (expect, true) => Expectation::Output(expect),
        };
        Ok(Self {
            name: raw.name,
            when: raw.when.unwrap_or_default().normalized(),
            expectation,
        })
    }
}

impl TestSuite {
    /// Parse a YAML suite, validating every case before anything runs.
    pub fn from_yaml(yaml: &str) -> Result<Self, RuleError> {
        let raw: RawSuite = serde_yaml_ng::from_str(yaml)
            .map_err(|e| RuleError::Parse(format!("invalid test suite: {e}")))?;
        let tests = raw
            .tests
            .into_iter()
            .map(TestCase::try_from)
            .collect::<Result<_, _>>()?;
        Ok(Self {
            name: raw.name,
            expr: raw.expr,
            tests,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            RuleError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&yaml)
    }
}

/// The outcome of one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail(String),
}

/// A case name and its verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestStatus {
    pub name: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl TestStatus {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verdict: Verdict::Pass,
        }
    }

    pub fn fail(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verdict: Verdict::Fail(reason.into()),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// The failure description; empty for passing cases.
    pub fn failure(&self) -> &str {
        match &self.verdict {
            Verdict::Pass => "",
            Verdict::Fail(reason) => reason,
        }
    }
}

/// Counts over a suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SuiteReport {
    pub passed: usize,
    pub failed: usize,
}

impl SuiteReport {
    pub fn from_statuses(statuses: &[TestStatus]) -> Self {
        let passed = statuses.iter().filter(|s| s.passed()).count();
        Self {
            passed,
            failed: statuses.len() - passed,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} passed, {} failed", self.passed, self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_suite() {
        let yaml = r"
name: methods
expr: request.method == 'GET'
tests:
  - name: get
    when:
      request:
        method: GET
        headers:
          X-Forwarded-For: 1.2.3.4
    expect: true
  - name: post
    when:
      request:
        method: POST
  - name: empty
  - name: failing
    error: no such key
";
        let suite = TestSuite::from_yaml(yaml).unwrap();
        assert_eq!(suite.name, "methods");
        assert_eq!(suite.expr, "request.method == 'GET'");
        assert_eq!(suite.tests.len(), 4);
        assert_eq!(suite.tests[0].expectation, Expectation::Output(true));
        assert_eq!(suite.tests[0].when.request.headers["x-forwarded-for"], "1.2.3.4");
        assert_eq!(suite.tests[1].expectation, Expectation::Output(false));
        assert_eq!(suite.tests[2].when, AttributeSet::default());
        assert_eq!(suite.tests[3].expectation, Expectation::Error("no such key".into()));
    }

    #[test]
    fn expect_and_error_conflict() {
        let yaml = r"
name: bad
expr: 'true'
tests:
  - name: both
    expect: true
    error: boom
";
        let err = TestSuite::from_yaml(yaml).unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: test case \"both\" has both expect and error"
        );
    }

    #[test]
    fn expect_false_with_error_expects_the_error() {
        let yaml = "name: s\nexpr: 'true'\ntests:\n  - name: c\n    expect: false\n    error: boom\n";
        let suite = TestSuite::from_yaml(yaml).unwrap();
        assert_eq!(suite.tests[0].expectation, Expectation::Error("boom".into()));
    }

    #[test]
    fn malformed_suite() {
        assert!(matches!(
            TestSuite::from_yaml("tests: 3"),
            Err(RuleError::Parse(_))
        ));
    }

    #[test]
    fn statuses_and_report() {
        let statuses = vec![
            TestStatus::pass("a"),
            TestStatus::fail("b", "expected result true, got false"),
        ];
        assert!(statuses[0].passed());
        assert_eq!(statuses[0].failure(), "");
        assert_eq!(statuses[1].failure(), "expected result true, got false");

        let report = SuiteReport::from_statuses(&statuses);
        assert_eq!(report.total(), 2);
        assert!(!report.all_passed());
        assert_eq!(report.to_string(), "1 passed, 1 failed");
    }

    #[test]
    fn status_serializes_flat() {
        let json = serde_json::to_value(TestStatus::fail("b", "boom")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "b", "verdict": "fail", "reason": "boom"})
        );
    }
}
