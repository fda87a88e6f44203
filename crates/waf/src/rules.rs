use std::thread;

use armor_rules::{CheckedExpr, Env, Program, RuleError, Type, Value};
use tracing::{debug, info, instrument};

use crate::config::RulesConfig;
use crate::suite::{Expectation, SuiteReport, TestCase, TestStatus};
use crate::surface::CapabilitySurface;
use crate::version::SchemaVersion;

/// A rule compilation environment for one schema version.
///
/// Compile a rule once, turn it into a [`Program`], then evaluate the
/// program against any number of attribute sets. Programs are immutable and
/// may be evaluated from several threads at once.
#[derive(Debug)]
pub struct Rules {
    config: RulesConfig,
    env: Env,
}

impl Rules {
    pub fn new(config: &RulesConfig) -> Result<Self, RuleError> {
        let env = CapabilitySurface::for_version(config.version).env()?;
        Ok(Self {
            config: *config,
            env,
        })
    }

    /// An environment for `version` with default settings.
    pub fn for_version(version: SchemaVersion) -> Result<Self, RuleError> {
        Self::new(&RulesConfig::new(version))
    }

    pub fn version(&self) -> SchemaVersion {
        self.config.version
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Parse and check rule text. The rule must evaluate to a boolean.
    #[instrument(level = "debug", skip_all, fields(version = %self.config.version))]
    pub fn compile(&self, source: &str) -> Result<CheckedExpr, RuleError> {
        let expr = armor_rules_cel::parse(source, self.env.macros())?;
        let checked = self.env.check(expr)?;
        if checked.output_type != Type::Bool {
            return Err(RuleError::Check(vec![
                "expression must evaluate to a boolean value".to_owned(),
            ]));
        }
        debug!(source, "rule compiled");
        Ok(checked)
    }

    pub fn program(&self, checked: &CheckedExpr) -> Program {
        self.env.program(checked, self.config.optimize)
    }

    /// Evaluate every case in order and return one status per case.
    #[instrument(level = "debug", skip_all, fields(cases = cases.len()))]
    pub fn run_test_suite(&self, program: &Program, cases: &[TestCase]) -> Vec<TestStatus> {
        let statuses: Vec<_> = cases.iter().map(|case| run_case(program, case)).collect();
        info!(report = %SuiteReport::from_statuses(&statuses), "test suite finished");
        statuses
    }

    /// Like [`Rules::run_test_suite`], spreading cases over `workers`
    /// threads. Statuses keep the declaration order of `cases`.
    #[instrument(level = "debug", skip_all, fields(cases = cases.len(), workers = workers))]
    pub fn run_test_suite_concurrent(
        &self,
        program: &Program,
        cases: &[TestCase],
        workers: usize,
    ) -> Vec<TestStatus> {
        let chunk = cases.len().div_ceil(workers.max(1)).max(1);
        let statuses: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = cases
                .chunks(chunk)
                .map(|batch| {
                    scope.spawn(move || {
                        batch.iter().map(|case| run_case(program, case)).collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .zip(cases.chunks(chunk))
                .flat_map(|(handle, batch)| {
                    handle.join().unwrap_or_else(|_| {
                        batch
                            .iter()
                            .map(|case| TestStatus::fail(&case.name, "evaluation panicked"))
                            .collect()
                    })
                })
                .collect()
        });
        info!(report = %SuiteReport::from_statuses(&statuses), "test suite finished");
        statuses
    }
}

fn run_case(program: &Program, case: &TestCase) -> TestStatus {
    let status = verdict(&case.name, &case.expectation, program.eval(&case.when));
    debug!(case = %case.name, passed = status.passed(), "test case evaluated");
    status
}

/// Compare an evaluation outcome against a case's expectation.
pub fn verdict(
    name: &str,
    expectation: &Expectation,
    outcome: Result<Value, RuleError>,
) -> TestStatus {
    match (outcome, expectation) {
        (Err(err), Expectation::Error(wanted)) => {
            let message = err.to_string();
            if message.contains(wanted.as_str()) {
                TestStatus::pass(name)
            } else {
                TestStatus::fail(
                    name,
                    format!("got error {message:?}, wanted error containing {wanted:?}"),
                )
            }
        }
        (Err(err), Expectation::Output(_)) => TestStatus::fail(name, err.to_string()),
        (Ok(actual), expectation) => {
            // A case that only names an error still expects `false` on success.
            let expected = match expectation {
                Expectation::Output(expected) => *expected,
                Expectation::Error(_) => false,
            };
            if actual == Value::Bool(expected) {
                TestStatus::pass(name)
            } else {
                TestStatus::fail(
                    name,
                    format!("expected result {expected}, got {}", display_value(&actual)),
                )
            }
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s:?}"),
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.type_name().to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeSet;

    fn rules() -> Rules {
        Rules::new(&RulesConfig::default()).unwrap()
    }

    fn case(name: &str, when: AttributeSet, expectation: Expectation) -> TestCase {
        TestCase {
            name: name.into(),
            when,
            expectation,
        }
    }

    fn get_request() -> AttributeSet {
        let mut attrs = AttributeSet::default();
        attrs.request.method = "GET".into();
        attrs
    }

    #[test]
    fn compile_rejects_non_boolean_rules() {
        let err = rules().compile("request.method").unwrap_err();
        assert_eq!(err.to_string(), "expression must evaluate to a boolean value");
    }

    #[test]
    fn compile_reports_undeclared_references() {
        let err = rules().compile("request.port == 80").unwrap_err();
        assert!(err.to_string().contains("undeclared reference to 'request'"));
        let err = rules().compile("1 / 2 == 0").unwrap_err();
        assert!(err.to_string().contains("undeclared reference to '_/_'"));
    }

    #[test]
    fn verdicts() {
        let pass = verdict("a", &Expectation::Output(true), Ok(Value::Bool(true)));
        assert!(pass.passed());

        let fail = verdict("b", &Expectation::Output(true), Ok(Value::Bool(false)));
        assert_eq!(fail.failure(), "expected result true, got false");

        let expected_err = Expectation::Error("no such key".into());
        let ok = verdict("c", &expected_err, Err(RuleError::NoSuchKey("x".into())));
        assert!(ok.passed());

        let wrong = verdict("d", &expected_err, Err(RuleError::Function("invalid IP address: x".into())));
        assert_eq!(
            wrong.failure(),
            r#"got error "invalid IP address: x", wanted error containing "no such key""#
        );

        let surprise = verdict("e", &Expectation::Output(false), Err(RuleError::NoSuchKey("k".into())));
        assert_eq!(surprise.failure(), "no such key: k");

        let quiet = verdict("f", &expected_err, Ok(Value::Bool(false)));
        assert!(quiet.passed());

        let missing = verdict("g", &expected_err, Ok(Value::Bool(true)));
        assert_eq!(missing.failure(), "expected result false, got true");

        let untyped = verdict("h", &Expectation::Output(true), Ok(Value::from("yes")));
        assert_eq!(untyped.failure(), r#"expected result true, got "yes""#);
    }

    #[test]
    fn suite_runs_in_order_and_is_repeatable() {
        let rules = rules();
        let checked = rules.compile("request.method == 'GET'").unwrap();
        let program = rules.program(&checked);
        let cases = vec![
            case("get", get_request(), Expectation::Output(true)),
            case("empty", AttributeSet::default(), Expectation::Output(false)),
            case("wrong", AttributeSet::default(), Expectation::Output(true)),
        ];
        let first = rules.run_test_suite(&program, &cases);
        let names: Vec<_> = first.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["get", "empty", "wrong"]);
        assert!(first[0].passed() && first[1].passed());
        assert_eq!(first[2].failure(), "expected result true, got false");
        assert_eq!(rules.run_test_suite(&program, &cases), first);
    }

    #[test]
    fn concurrent_matches_sequential() {
        let rules = rules();
        let checked = rules
            .compile("inIpRange(origin.ip, '10.0.0.0/8') && request.method == 'GET'")
            .unwrap();
        let program = rules.program(&checked);
        let cases: Vec<_> = (0..25)
            .map(|i| {
                let mut when = get_request();
                when.origin.ip = if i % 3 == 0 { format!("10.0.0.{i}") } else { "bad".into() };
                let expectation = if i % 3 == 0 {
                    Expectation::Output(true)
                } else {
                    Expectation::Error("invalid IP address".into())
                };
                case(&format!("case-{i}"), when, expectation)
            })
            .collect();
        let sequential = rules.run_test_suite(&program, &cases);
        for workers in [0, 1, 4, 64] {
            assert_eq!(rules.run_test_suite_concurrent(&program, &cases, workers), sequential);
        }
        assert!(sequential.iter().all(TestStatus::passed));
    }

    #[test]
    fn optimize_setting_is_honored() {
        let config = RulesConfig {
            optimize: false,
            ..RulesConfig::default()
        };
        let rules = Rules::new(&config).unwrap();
        let checked = rules.compile("1 + 1 == 2").unwrap();
        assert_eq!(rules.program(&checked).expr(), &checked.expr);
        let optimized = Rules::new(&RulesConfig::default()).unwrap();
        assert_eq!(optimized.program(&checked).expr(), &armor_rules::Expr::Bool(true));
    }
}
