//! The request, origin, and token attributes a rule is evaluated against.
//!
//! Rules see these as a flat namespace of dotted names (`request.method`,
//! `token.recaptcha_action.score`). [`AttributeSet`] resolves each name by
//! exact match; there is no fallback from a child name to its parent record.

use std::collections::HashMap;

use armor_rules::{Activation, RuleError, Value};
use serde::{Deserialize, Deserializer, Serialize};

/// Every attribute set holds these records; after deserialization none of
/// them is ever absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeSet {
    #[serde(default, deserialize_with = "null_as_default")]
    pub request: RequestAttributes,
    #[serde(default, deserialize_with = "null_as_default")]
    pub origin: OriginAttributes,
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: TokenAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestAttributes {
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    #[serde(default, deserialize_with = "header_map")]
    pub headers: HashMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub query: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub scheme: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    /// Untyped request parameters. Keys are case-sensitive and values may
    /// nest arbitrarily.
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl RequestAttributes {
    /// Replace the headers, folding every name to lowercase.
    #[must_use]
    pub fn with_headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OriginAttributes {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub region_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub asn: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tls_ja3_fingerprint: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tls_ja4_fingerprint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenAttributes {
    #[serde(default, deserialize_with = "null_as_default")]
    pub recaptcha_exemption: RecaptchaExemption,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recaptcha_action: RecaptchaAction,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recaptcha_session: RecaptchaSession,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecaptchaExemption {
    #[serde(default)]
    pub valid: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecaptchaAction {
    #[serde(default)]
    pub score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub captcha_status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: String,
    #[serde(default)]
    pub valid: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecaptchaSession {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub valid: bool,
}

impl AttributeSet {
    /// Parse a YAML attribute document and normalize it.
    ///
    /// An empty document yields the zero-valued set.
    pub fn from_yaml(yaml: &str) -> Result<Self, RuleError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let attrs: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| RuleError::Parse(format!("invalid attributes: {e}")))?;
        Ok(attrs.normalized())
    }

    /// Fold header names to lowercase.
    ///
    /// Names that differ only in case collapse into one entry; which of the
    /// original values survives is unspecified.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self
            .request
            .headers
            .keys()
            .any(|k| k.bytes().any(|b| b.is_ascii_uppercase()))
        {
            self.request.headers = std::mem::take(&mut self.request.headers)
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect();
        }
        self
    }
}

impl Activation for AttributeSet {
    fn resolve(&self, name: &str) -> Option<Value> {
        let request = &self.request;
        let origin = &self.origin;
        let token = &self.token;
        let value = match name {
            "request.method" => Value::from(request.method.as_str()),
            "request.headers" => Value::Map(
                request
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect(),
            ),
            "request.path" => Value::from(request.path.as_str()),
            "request.query" => Value::from(request.query.as_str()),
            "request.scheme" => Value::from(request.scheme.as_str()),
            "request.body" => Value::from(request.body.as_str()),
            "request.params" => {
                Value::from_json(serde_json::Value::Object(request.params.clone()))
            }
            "origin.ip" => Value::from(origin.ip.as_str()),
            "origin.region_code" => Value::from(origin.region_code.as_str()),
            "origin.asn" => Value::Int(origin.asn),
            "origin.user_ip" => Value::from(origin.user_ip.as_str()),
            "origin.tls_ja3_fingerprint" => Value::from(origin.tls_ja3_fingerprint.as_str()),
            "origin.tls_ja4_fingerprint" => Value::from(origin.tls_ja4_fingerprint.as_str()),
            "token.recaptcha_exemption.valid" => Value::Bool(token.recaptcha_exemption.valid),
            "token.recaptcha_action.score" => Value::Float(token.recaptcha_action.score),
            "token.recaptcha_action.captcha_status" => {
                Value::from(token.recaptcha_action.captcha_status.as_str())
            }
            "token.recaptcha_action.action" => Value::from(token.recaptcha_action.action.as_str()),
            "token.recaptcha_action.valid" => Value::Bool(token.recaptcha_action.valid),
            "token.recaptcha_session.score" => Value::Float(token.recaptcha_session.score),
            "token.recaptcha_session.valid" => Value::Bool(token.recaptcha_session.valid),
            _ => return None,
        };
        Some(value)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Header values written as YAML scalars other than strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum HeaderValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<HeaderValue> for String {
    fn from(value: HeaderValue) -> Self {
        match value {
            HeaderValue::String(s) => s,
            HeaderValue::Int(n) => n.to_string(),
            HeaderValue::Float(f) => f.to_string(),
            HeaderValue::Bool(b) => b.to_string(),
        }
    }
}

fn header_map<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, Option<HeaderValue>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.map(String::from).unwrap_or_default()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTRIBUTE_NAMES: [&str; 20] = [
        "request.method",
        "request.headers",
        "request.path",
        "request.query",
        "request.scheme",
        "request.body",
        "request.params",
        "origin.ip",
        "origin.region_code",
        "origin.asn",
        "origin.user_ip",
        "origin.tls_ja3_fingerprint",
        "origin.tls_ja4_fingerprint",
        "token.recaptcha_exemption.valid",
        "token.recaptcha_action.score",
        "token.recaptcha_action.captcha_status",
        "token.recaptcha_action.action",
        "token.recaptcha_action.valid",
        "token.recaptcha_session.score",
        "token.recaptcha_session.valid",
    ];

    #[test]
    fn empty_set_resolves_zero_values() {
        let attrs = AttributeSet::default();
        for name in ATTRIBUTE_NAMES {
            assert!(attrs.resolve(name).is_some(), "{name}");
        }
        assert_eq!(attrs.resolve("request.method"), Some(Value::from("")));
        assert_eq!(attrs.resolve("origin.asn"), Some(Value::Int(0)));
        assert_eq!(attrs.resolve("token.recaptcha_session.score"), Some(Value::Float(0.0)));
        assert_eq!(attrs.resolve("token.recaptcha_action.valid"), Some(Value::Bool(false)));
        assert_eq!(attrs.resolve("request.headers"), Some(Value::Map(HashMap::new())));
    }

    #[test]
    fn resolution_is_flat() {
        let attrs = AttributeSet::default();
        assert_eq!(attrs.resolve("request"), None);
        assert_eq!(attrs.resolve("token.recaptcha_action"), None);
        assert_eq!(attrs.resolve("request.method.length"), None);
        assert_eq!(attrs.resolve("origin.port"), None);
    }

    #[test]
    fn normalization_folds_header_names() {
        let mut attrs = AttributeSet::default();
        attrs.request.headers.insert("User-Agent".into(), "Mozilla/5.0".into());
        attrs.request.headers.insert("HOST".into(), "example.com".into());
        let attrs = attrs.normalized();
        assert!(attrs.request.headers.keys().all(|k| k == &k.to_ascii_lowercase()));
        assert_eq!(attrs.request.headers["user-agent"], "Mozilla/5.0");
        assert_eq!(attrs.request.headers["host"], "example.com");
    }

    #[test]
    fn case_variants_collapse() {
        let mut attrs = AttributeSet::default();
        attrs.request.headers.insert("X-Id".into(), "a".into());
        attrs.request.headers.insert("x-id".into(), "b".into());
        let attrs = attrs.normalized();
        assert_eq!(attrs.request.headers.len(), 1);
        assert!(attrs.request.headers.contains_key("x-id"));
    }

    #[test]
    fn with_headers_folds_names() {
        let request = RequestAttributes::default().with_headers([("Content-Type", "text/html")]);
        assert_eq!(request.headers["content-type"], "text/html");
    }

    #[test]
    fn yaml_with_null_records_and_scalar_headers() {
        let yaml = r"
request:
  method: POST
  headers:
    Content-Length: 42
    DNT: true
    X-Empty:
origin:
token:
  recaptcha_action:
    score: 0.9
";
        let attrs = AttributeSet::from_yaml(yaml).unwrap();
        assert_eq!(attrs.request.method, "POST");
        assert_eq!(attrs.request.headers["content-length"], "42");
        assert_eq!(attrs.request.headers["dnt"], "true");
        assert_eq!(attrs.request.headers["x-empty"], "");
        assert_eq!(attrs.origin, OriginAttributes::default());
        assert_eq!(attrs.resolve("token.recaptcha_action.score"), Some(Value::Float(0.9)));
    }

    #[test]
    fn yaml_params_keep_case_and_nesting() {
        let yaml = r"
request:
  params:
    Key: value
    nested:
      count: 3
";
        let attrs = AttributeSet::from_yaml(yaml).unwrap();
        let Some(Value::Map(params)) = attrs.resolve("request.params") else {
            panic!("params should resolve to a map");
        };
        assert_eq!(params["Key"], Value::from("value"));
        assert!(!params.contains_key("key"));
        let Value::Map(nested) = &params["nested"] else {
            panic!("nested should be a map");
        };
        assert_eq!(nested["count"], Value::Int(3));
    }

    #[test]
    fn empty_and_invalid_yaml() {
        assert_eq!(AttributeSet::from_yaml("  \n").unwrap(), AttributeSet::default());
        let err = AttributeSet::from_yaml("request: [1, 2]").unwrap_err();
        assert!(matches!(err, RuleError::Parse(_)));
        let err = AttributeSet::from_yaml("requests: {}").unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }
}
