//! The variables, functions, and macros a rule may use, per schema version.
//!
//! The surface is assembled from three tables: attribute declarations, an
//! allow-list over the standard library, and the custom functions. Each
//! entry names the version that introduced it, so a new version only adds
//! rows.

use std::sync::Arc;

use armor_rules::engine::stdlib::{standard_functions, values_equal};
use armor_rules::ir::operators;
use armor_rules::{
    Env, Expr, FunctionDecl, Macro, OverloadDecl, RuleError, Type, Value, VariableDecl,
};
use tracing::debug;

use crate::functions;
use crate::version::SchemaVersion;

#[derive(Debug, Clone, Copy)]
enum AttributeKind {
    String,
    Int,
    Double,
    Bool,
    Map,
}

impl AttributeKind {
    fn to_type(self) -> Type {
        match self {
            Self::String => Type::String,
            Self::Int => Type::Int,
            Self::Double => Type::Double,
            Self::Bool => Type::Bool,
            Self::Map => Type::map(Type::String, Type::Dyn),
        }
    }
}

struct Attribute {
    name: &'static str,
    kind: AttributeKind,
    since: SchemaVersion,
}

const fn attr(name: &'static str, kind: AttributeKind, since: SchemaVersion) -> Attribute {
    Attribute { name, kind, since }
}

const ATTRIBUTES: [Attribute; 20] = {
    use AttributeKind::{Bool, Double, Int, Map, String};
    use SchemaVersion::{Current, Next};
    [
        attr("request.method", String, Current),
        attr("request.headers", Map, Current),
        attr("request.path", String, Current),
        attr("request.query", String, Current),
        attr("request.scheme", String, Current),
        attr("origin.ip", String, Current),
        attr("origin.region_code", String, Current),
        attr("origin.asn", Int, Current),
        attr("origin.user_ip", String, Current),
        attr("origin.tls_ja3_fingerprint", String, Current),
        attr("origin.tls_ja4_fingerprint", String, Current),
        attr("token.recaptcha_exemption.valid", Bool, Current),
        attr("token.recaptcha_action.score", Double, Current),
        attr("token.recaptcha_action.captcha_status", String, Current),
        attr("token.recaptcha_action.action", String, Current),
        attr("token.recaptcha_action.valid", Bool, Current),
        attr("token.recaptcha_session.score", Double, Current),
        attr("token.recaptcha_session.valid", Bool, Current),
        attr("request.body", String, Next),
        attr("request.params", Map, Next),
    ]
};

/// Standard-library functions rules may call, with the overload ids kept
/// for each. An empty list keeps every overload.
const PERMITTED_STDLIB: &[(&str, &[&str])] = &[
    (operators::LOGICAL_AND, &[]),
    (operators::LOGICAL_OR, &[]),
    (operators::LOGICAL_NOT, &[]),
    (operators::LESS, &["less_int64", "less_double"]),
    (operators::LESS_EQUALS, &["less_equals_int64", "less_equals_double"]),
    (operators::GREATER, &["greater_int64", "greater_double"]),
    (operators::GREATER_EQUALS, &["greater_equals_int64", "greater_equals_double"]),
    (operators::IN, &["in_map"]),
    (operators::INDEX, &[]),
    (operators::ADD, &["add_int64", "add_double", "add_string"]),
    (operators::SUBTRACT, &["subtract_double", "subtract_int64"]),
    (operators::MULTIPLY, &["multiply_double", "multiply_int64"]),
    ("size", &["size_string"]),
    ("int", &["string_to_int", "int_to_int"]),
    ("matches", &[]),
    ("contains", &[]),
    ("endsWith", &[]),
    ("startsWith", &[]),
    (operators::NOT_STRICTLY_FALSE, &[]),
];

/// Custom functions and the version each first appeared in.
const CUSTOM_FUNCTIONS: &[(SchemaVersion, fn() -> FunctionDecl)] = &[
    (SchemaVersion::Current, || equality_decl(operators::EQUALS, "equals", equals)),
    (SchemaVersion::Current, || {
        equality_decl(operators::NOT_EQUALS, "not_equals", not_equals)
    }),
    (SchemaVersion::Current, || {
        FunctionDecl::new("inIpRange").overload(
            OverloadDecl::global("inIpRange_string", vec![Type::String, Type::String], Type::Bool)
                .with_impl(functions::in_ip_range_binding),
        )
    }),
    (SchemaVersion::Current, || {
        string_transform("lower", "string_lower", functions::lower_binding)
    }),
    (SchemaVersion::Current, || {
        string_transform("upper", "string_upper", functions::upper_binding)
    }),
    (SchemaVersion::Current, || {
        string_transform("base64Decode", "base64Decode_string", functions::base64_decode_binding)
    }),
    (SchemaVersion::Current, || {
        string_transform("urlDecode", "urlDecode_string", functions::url_decode_binding)
    }),
    (SchemaVersion::Current, || {
        string_transform("urlDecodeUni", "urlDecodeUni_string", functions::url_decode_uni_binding)
    }),
    (SchemaVersion::Current, || {
        string_transform("utf8ToUnicode", "utf8ToUnicode_string", functions::utf8_to_unicode_binding)
    }),
];

/// Equality restricted to four same-type pairings. The runtime binding
/// compares values, so a `dyn` operand of another kind is simply unequal.
fn equality_decl(
    name: &str,
    prefix: &str,
    implementation: armor_rules::Implementation,
) -> FunctionDecl {
    [
        ("bool", Type::Bool),
        ("double", Type::Double),
        ("int64", Type::Int),
        ("string", Type::String),
    ]
    .into_iter()
    .fold(FunctionDecl::new(name), |decl, (suffix, ty)| {
        decl.overload(OverloadDecl::global(
            &format!("{prefix}_{suffix}"),
            vec![ty.clone(), ty],
            Type::Bool,
        ))
    })
    .with_singleton(implementation)
}

fn string_transform(
    name: &str,
    id: &str,
    implementation: armor_rules::Implementation,
) -> FunctionDecl {
    FunctionDecl::new(name).overload(
        OverloadDecl::member(id, vec![Type::String], Type::String).with_impl(implementation),
    )
}

fn operands<'a>(name: &str, args: &'a [Value]) -> Result<(&'a Value, &'a Value), RuleError> {
    match args {
        [lhs, rhs] => Ok((lhs, rhs)),
        _ => Err(RuleError::NoSuchOverload {
            function: name.to_owned(),
            args: args.iter().map(Value::type_name).collect::<Vec<_>>().join(", "),
        }),
    }
}

fn equals(args: &[Value]) -> Result<Value, RuleError> {
    let (lhs, rhs) = operands(operators::EQUALS, args)?;
    Ok(Value::Bool(values_equal(lhs, rhs)))
}

fn not_equals(args: &[Value]) -> Result<Value, RuleError> {
    let (lhs, rhs) = operands(operators::NOT_EQUALS, args)?;
    Ok(Value::Bool(!values_equal(lhs, rhs)))
}

/// `has(x.f)` and `has(x['f'])` become presence tests of `f` on `x`.
///
/// Any other argument shape is left alone, which leaves an undeclared `has`
/// call for the checker to reject.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceMacro;

impl Macro for PresenceMacro {
    fn name(&self) -> &str {
        "has"
    }

    fn arg_count(&self) -> usize {
        1
    }

    fn expand(&self, target: Option<&Expr>, args: &[Expr]) -> Option<Expr> {
        if target.is_some() {
            return None;
        }
        match args.first()? {
            Expr::Field(operand, field) => Some(Expr::Presence(operand.clone(), field.clone())),
            Expr::Index(operand, key) => match key.as_ref() {
                Expr::String(field) => Some(Expr::Presence(operand.clone(), field.clone())),
                _ => None,
            },
            _ => None,
        }
    }
}

/// The declarations exposed to rules under one schema version.
#[derive(Debug, Clone)]
pub struct CapabilitySurface {
    version: SchemaVersion,
    variables: Vec<VariableDecl>,
    functions: Vec<FunctionDecl>,
}

impl CapabilitySurface {
    pub fn for_version(version: SchemaVersion) -> Self {
        let variables = ATTRIBUTES
            .iter()
            .filter(|a| a.since <= version)
            .map(|a| VariableDecl::new(a.name, a.kind.to_type()))
            .collect();

        let mut functions: Vec<FunctionDecl> = standard_functions()
            .into_iter()
            .filter_map(|decl| {
                let (_, ids) = PERMITTED_STDLIB.iter().find(|(name, _)| *name == decl.name)?;
                if ids.is_empty() {
                    Some(decl)
                } else {
                    decl.subset(ids)
                }
            })
            .collect();
        functions.extend(
            CUSTOM_FUNCTIONS
                .iter()
                .filter(|(since, _)| *since <= version)
                .map(|(_, decl)| decl()),
        );

        Self {
            version,
            variables,
            functions,
        }
    }

    /// Look a surface up by version ordinal.
    pub fn for_ordinal(ordinal: u32) -> Result<Self, RuleError> {
        SchemaVersion::from_ordinal(ordinal).map(Self::for_version)
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn variables(&self) -> &[VariableDecl] {
        &self.variables
    }

    pub fn functions(&self) -> &[FunctionDecl] {
        &self.functions
    }

    /// Build an expression environment exposing exactly this surface.
    pub fn env(&self) -> Result<Env, RuleError> {
        let builder = self
            .variables
            .iter()
            .cloned()
            .fold(Env::builder(), armor_rules::EnvBuilder::variable);
        let env = self
            .functions
            .iter()
            .cloned()
            .fold(builder, armor_rules::EnvBuilder::function)
            .with_macro(Arc::new(PresenceMacro))
            .build()?;
        debug!(version = %self.version, "capability surface built");
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(surface: &CapabilitySurface) -> Vec<&str> {
        surface.variables().iter().map(|v| v.name.as_str()).collect()
    }

    fn function<'a>(surface: &'a CapabilitySurface, name: &str) -> Option<&'a FunctionDecl> {
        surface.functions().iter().find(|f| f.name == name)
    }

    #[test]
    fn current_surface_attributes() {
        let surface = CapabilitySurface::for_version(SchemaVersion::Current);
        assert_eq!(surface.variables().len(), 18);
        assert!(!names(&surface).contains(&"request.body"));
        assert!(!names(&surface).contains(&"request.params"));
        let headers = surface
            .variables()
            .iter()
            .find(|v| v.name == "request.headers")
            .unwrap();
        assert_eq!(headers.ty, Type::map(Type::String, Type::Dyn));
    }

    #[test]
    fn versions_nest() {
        let current = CapabilitySurface::for_version(SchemaVersion::Current);
        let next = CapabilitySurface::for_version(SchemaVersion::Next);
        for decl in current.variables() {
            assert!(next.variables().contains(decl), "{}", decl.name);
        }
        for decl in current.functions() {
            let later = function(&next, &decl.name).unwrap();
            let ids: Vec<_> = later.overloads.iter().map(|o| o.id.as_str()).collect();
            assert!(decl.overloads.iter().all(|o| ids.contains(&o.id.as_str())));
        }
        assert_eq!(next.variables().len(), 20);
    }

    #[test]
    fn equality_has_four_pairings() {
        let surface = CapabilitySurface::for_version(SchemaVersion::Next);
        for (name, prefix) in [(operators::EQUALS, "equals"), (operators::NOT_EQUALS, "not_equals")] {
            let decl = function(&surface, name).unwrap();
            let ids: Vec<_> = decl.overloads.iter().map(|o| o.id.clone()).collect();
            assert_eq!(
                ids,
                ["bool", "double", "int64", "string"].map(|t| format!("{prefix}_{t}"))
            );
            assert!(decl.singleton.is_some());
        }
    }

    #[test]
    fn stdlib_is_restricted() {
        let surface = CapabilitySurface::for_version(SchemaVersion::Next);
        for absent in [
            operators::DIVIDE,
            operators::MODULO,
            operators::NEGATE,
            operators::CONDITIONAL,
            "double",
            "string",
        ] {
            assert!(function(&surface, absent).is_none(), "{absent}");
        }
        let size = function(&surface, "size").unwrap();
        assert_eq!(size.overloads.len(), 1);
        assert_eq!(size.overloads[0].id, "size_string");
        let less = function(&surface, operators::LESS).unwrap();
        assert!(less.find_overload("less_string").is_none());
        assert!(function(&surface, operators::IN).unwrap().find_overload("in_list").is_none());
        assert_eq!(function(&surface, "matches").unwrap().overloads.len(), 2);
    }

    #[test]
    fn custom_functions_are_declared() {
        let surface = CapabilitySurface::for_version(SchemaVersion::Current);
        let in_ip_range = function(&surface, "inIpRange").unwrap();
        assert!(!in_ip_range.overloads[0].member);
        for name in ["lower", "upper", "base64Decode", "urlDecode", "urlDecodeUni", "utf8ToUnicode"] {
            let decl = function(&surface, name).unwrap();
            assert!(decl.overloads[0].member, "{name}");
            assert_eq!(decl.overloads[0].params, vec![Type::String]);
        }
    }

    #[test]
    fn unknown_ordinal_is_rejected() {
        assert!(matches!(
            CapabilitySurface::for_ordinal(7),
            Err(RuleError::Configuration(_))
        ));
        assert_eq!(
            CapabilitySurface::for_ordinal(1).unwrap().version(),
            SchemaVersion::Current
        );
    }

    #[test]
    fn presence_macro_shapes() {
        let headers = Expr::Field(Box::new(Expr::Ident("request".into())), "headers".into());
        let mac = PresenceMacro;

        let select = Expr::Field(Box::new(headers.clone()), "user_agent".into());
        assert_eq!(
            mac.expand(None, &[select]),
            Some(Expr::Presence(Box::new(headers.clone()), "user_agent".into()))
        );

        let index = Expr::Index(Box::new(headers.clone()), Box::new(Expr::String("user-agent".into())));
        assert_eq!(
            mac.expand(None, &[index]),
            Some(Expr::Presence(Box::new(headers.clone()), "user-agent".into()))
        );

        let dynamic_key = Expr::Index(Box::new(headers.clone()), Box::new(Expr::Ident("k".into())));
        assert_eq!(mac.expand(None, &[dynamic_key]), None);
        let call = Expr::member_call(headers.clone(), "get", vec![Expr::String("k".into())]);
        assert_eq!(mac.expand(None, &[call]), None);
        assert_eq!(mac.expand(Some(&headers), &[Expr::Int(1)]), None);
    }

    #[test]
    fn env_exposes_presence_macro_only() {
        let env = CapabilitySurface::for_version(SchemaVersion::Current).env().unwrap();
        assert_eq!(env.macros().names(), vec!["has"]);
    }

    #[test]
    fn equality_bindings_compare_values() {
        assert_eq!(equals(&[Value::from("1"), Value::Int(1)]), Ok(Value::Bool(false)));
        assert_eq!(not_equals(&[Value::from("1"), Value::Int(1)]), Ok(Value::Bool(true)));
        assert_eq!(equals(&[Value::Bool(true), Value::Bool(true)]), Ok(Value::Bool(true)));
        assert!(equals(&[Value::Int(1)]).is_err());
    }
}
