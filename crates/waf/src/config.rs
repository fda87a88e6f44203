use std::path::Path;

use armor_rules::RuleError;
use serde::{Deserialize, Serialize};

use crate::version::SchemaVersion;

/// Settings for a [`Rules`](crate::Rules) environment.
///
/// # Example
///
/// ```toml
/// version = "VCurrent"
/// optimize = false
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    /// Schema version rules are compiled against. Defaults to the latest.
    #[serde(default)]
    pub version: SchemaVersion,
    /// Whether programs are optimized before evaluation.
    #[serde(default = "default_optimize")]
    pub optimize: bool,
}

fn default_optimize() -> bool {
    true
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            version: SchemaVersion::default(),
            optimize: default_optimize(),
        }
    }
}

impl RulesConfig {
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, RuleError> {
        toml::from_str(source).map_err(|e| RuleError::Configuration(e.message().to_owned()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            RuleError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }
}
