use std::fmt;
use std::str::FromStr;

use armor_rules::RuleError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A generation of the attribute and function surface.
///
/// Versions are ordered and strictly additive: everything legal under
/// `Current` is legal under `Next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SchemaVersion {
    /// The surface the production service accepts today.
    Current,
    /// `Current` plus request body and request parameters.
    #[default]
    Next,
}

impl SchemaVersion {
    /// The latest version.
    pub const LATEST: Self = Self::Next;

    /// Every version, oldest first.
    pub const ALL: [Self; 2] = [Self::Current, Self::Next];

    /// The numeric ordinal of this version.
    pub fn ordinal(self) -> u32 {
        match self {
            Self::Current => 1,
            Self::Next => 2,
        }
    }

    /// Look a version up by ordinal.
    pub fn from_ordinal(ordinal: u32) -> Result<Self, RuleError> {
        match ordinal {
            1 => Ok(Self::Current),
            2 => Ok(Self::Next),
            other => Err(RuleError::Configuration(format!(
                "unsupported schema version: {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "VCurrent",
            Self::Next => "VNext",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVersion {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VCurrent" | "current" | "1" => Ok(Self::Current),
            "VNext" | "next" | "2" => Ok(Self::Next),
            other => Err(RuleError::Configuration(format!(
                "unsupported schema version: {other}"
            ))),
        }
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Ordinal(u32),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Ordinal(n) => Self::from_ordinal(n),
            Repr::Name(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}
