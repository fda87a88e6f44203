//! Local compilation, evaluation, and testing of Cloud Armor rule
//! expressions.
//!
//! A [`Rules`] environment exposes the attribute namespace and functions of
//! one [`SchemaVersion`]. Rules are compiled once, turned into programs, and
//! evaluated against [`AttributeSet`]s, either one at a time or as a
//! [`TestSuite`] whose cases declare the expected outcome.
//!
//! ```
//! use armor_waf::{AttributeSet, Rules, RulesConfig};
//!
//! let rules = Rules::new(&RulesConfig::default()).unwrap();
//! let checked = rules.compile("request.method == 'GET'").unwrap();
//! let program = rules.program(&checked);
//!
//! let when = AttributeSet::from_yaml("request: {method: GET}").unwrap();
//! assert_eq!(program.eval(&when).unwrap().as_bool(), Some(true));
//! ```

pub mod attributes;
pub mod config;
pub mod functions;
pub mod rules;
pub mod suite;
pub mod surface;
pub mod version;

pub use attributes::{
    AttributeSet, OriginAttributes, RecaptchaAction, RecaptchaExemption, RecaptchaSession,
    RequestAttributes, TokenAttributes,
};
pub use config::RulesConfig;
pub use functions::FunctionError;
pub use rules::{verdict, Rules};
pub use suite::{Expectation, SuiteReport, TestCase, TestStatus, TestSuite, Verdict};
pub use surface::{CapabilitySurface, PresenceMacro};
pub use version::SchemaVersion;
