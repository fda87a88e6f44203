//! The standard function library: operators, conversions, and string
//! helpers, each declared with stable overload ids so an environment can
//! expose any subset of them.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

use regex::Regex;

use crate::check::decls::{FunctionDecl, OverloadDecl};
use crate::check::types::Type;
use crate::engine::dispatch::Implementation;
use crate::engine::value::Value;
use crate::error::RuleError;
use crate::ir::operators;

/// Every function in the standard library.
///
/// Ternaries, division, modulo, negation and list membership have no
/// declarations here; expressions using them fail to check.
pub fn standard_functions() -> Vec<FunctionDecl> {
    let a = || Type::param("A");
    let map_kv = || Type::map(Type::param("K"), Type::param("V"));

    vec![
        FunctionDecl::new(operators::LOGICAL_NOT).overload(
            OverloadDecl::global("logical_not", vec![Type::Bool], Type::Bool).with_impl(logical_not),
        ),
        FunctionDecl::new(operators::LOGICAL_AND).overload(
            OverloadDecl::global("logical_and", vec![Type::Bool, Type::Bool], Type::Bool)
                .with_impl(logical_and),
        ),
        FunctionDecl::new(operators::LOGICAL_OR).overload(
            OverloadDecl::global("logical_or", vec![Type::Bool, Type::Bool], Type::Bool)
                .with_impl(logical_or),
        ),
        FunctionDecl::new(operators::EQUALS).overload(
            OverloadDecl::global("equals", vec![a(), a()], Type::Bool).with_impl(equals),
        ),
        FunctionDecl::new(operators::NOT_EQUALS).overload(
            OverloadDecl::global("not_equals", vec![a(), a()], Type::Bool).with_impl(not_equals),
        ),
        ordering_decl(operators::LESS, "less", less),
        ordering_decl(operators::LESS_EQUALS, "less_equals", less_equals),
        ordering_decl(operators::GREATER, "greater", greater),
        ordering_decl(operators::GREATER_EQUALS, "greater_equals", greater_equals),
        arithmetic_decl(operators::ADD, "add", add).overload(
            OverloadDecl::global("add_string", vec![Type::String, Type::String], Type::String)
                .with_impl(add),
        ),
        arithmetic_decl(operators::SUBTRACT, "subtract", subtract),
        arithmetic_decl(operators::MULTIPLY, "multiply", multiply),
        FunctionDecl::new(operators::IN).overload(
            OverloadDecl::global("in_map", vec![a(), Type::map(a(), Type::param("B"))], Type::Bool)
                .with_impl(in_map),
        ),
        FunctionDecl::new(operators::INDEX)
            .overload(
                OverloadDecl::global("index_list", vec![Type::list(a()), Type::Int], a())
                    .with_impl(index),
            )
            .overload(
                OverloadDecl::global("index_map", vec![map_kv(), Type::param("K")], Type::param("V"))
                    .with_impl(index),
            ),
        FunctionDecl::new("size").overload(
            OverloadDecl::global("size_string", vec![Type::String], Type::Int).with_impl(size),
        ),
        FunctionDecl::new("int")
            .overload(OverloadDecl::global("int_to_int", vec![Type::Int], Type::Int).with_impl(to_int))
            .overload(OverloadDecl::global("string_to_int", vec![Type::String], Type::Int).with_impl(to_int)),
        FunctionDecl::new("matches")
            .overload(
                OverloadDecl::global("matches", vec![Type::String, Type::String], Type::Bool).with_impl(matches),
            )
            .overload(
                OverloadDecl::member("matches_string", vec![Type::String, Type::String], Type::Bool)
                    .with_impl(matches),
            ),
        string_predicate_decl("contains", "contains_string", contains),
        string_predicate_decl("startsWith", "starts_with_string", starts_with),
        string_predicate_decl("endsWith", "ends_with_string", ends_with),
        FunctionDecl::new(operators::NOT_STRICTLY_FALSE).overload(
            OverloadDecl::global("not_strictly_false", vec![Type::Bool], Type::Bool)
                .with_impl(not_strictly_false),
        ),
    ]
}

fn ordering_decl(name: &str, prefix: &str, implementation: Implementation) -> FunctionDecl {
    [("int64", Type::Int), ("double", Type::Double)]
        .into_iter()
        .fold(FunctionDecl::new(name), |decl, (suffix, ty)| {
            decl.overload(
                OverloadDecl::global(&format!("{prefix}_{suffix}"), vec![ty.clone(), ty], Type::Bool)
                    .with_impl(implementation),
            )
        })
}

fn arithmetic_decl(name: &str, prefix: &str, implementation: Implementation) -> FunctionDecl {
    FunctionDecl::new(name)
        .overload(
            OverloadDecl::global(&format!("{prefix}_int64"), vec![Type::Int, Type::Int], Type::Int)
                .with_impl(implementation),
        )
        .overload(
            OverloadDecl::global(
                &format!("{prefix}_double"),
                vec![Type::Double, Type::Double],
                Type::Double,
            )
            .with_impl(implementation),
        )
}

fn string_predicate_decl(
    name: &str,
    id: &str,
    implementation: Implementation,
) -> FunctionDecl {
    FunctionDecl::new(name).overload(
        OverloadDecl::member(id, vec![Type::String, Type::String], Type::Bool).with_impl(implementation),
    )
}

fn no_overload(name: &str, args: &[Value]) -> RuleError {
    RuleError::NoSuchOverload {
        function: name.to_owned(),
        args: args
            .iter()
            .map(Value::type_name)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn overflow() -> RuleError {
    RuleError::Evaluation("integer overflow".into())
}

fn len_to_int(len: usize) -> Value {
    Value::Int(i64::try_from(len).unwrap_or(i64::MAX))
}

/// Value equality across kinds: numbers compare numerically, containers
/// compare element-wise, and values of unrelated kinds are never equal.
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        (a, b) => a == b,
    }
}

/// Orders two values; `None` when either side is NaN.
#[allow(clippy::cast_precision_loss)]
fn compare(name: &str, args: &[Value]) -> Result<Option<Ordering>, RuleError> {
    match args {
        [Value::Int(a), Value::Int(b)] => Ok(Some(a.cmp(b))),
        [Value::Float(a), Value::Float(b)] => Ok(a.partial_cmp(b)),
        [Value::Int(a), Value::Float(b)] => Ok((*a as f64).partial_cmp(b)),
        [Value::Float(a), Value::Int(b)] => Ok(a.partial_cmp(&(*b as f64))),
        _ => Err(no_overload(name, args)),
    }
}

fn compare_with(
    name: &str,
    args: &[Value],
    test: fn(Ordering) -> bool,
) -> Result<Value, RuleError> {
    compare(name, args).map(|ordering| Value::Bool(ordering.is_some_and(test)))
}

fn less(args: &[Value]) -> Result<Value, RuleError> {
    compare_with(operators::LESS, args, Ordering::is_lt)
}

fn less_equals(args: &[Value]) -> Result<Value, RuleError> {
    compare_with(operators::LESS_EQUALS, args, Ordering::is_le)
}

fn greater(args: &[Value]) -> Result<Value, RuleError> {
    compare_with(operators::GREATER, args, Ordering::is_gt)
}

fn greater_equals(args: &[Value]) -> Result<Value, RuleError> {
    compare_with(operators::GREATER_EQUALS, args, Ordering::is_ge)
}

fn equals(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [a, b] => Ok(Value::Bool(values_equal(a, b))),
        _ => Err(no_overload(operators::EQUALS, args)),
    }
}

fn not_equals(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [a, b] => Ok(Value::Bool(!values_equal(a, b))),
        _ => Err(no_overload(operators::NOT_EQUALS, args)),
    }
}

fn logical_not(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::Bool(b)] => Ok(Value::Bool(!b)),
        _ => Err(no_overload(operators::LOGICAL_NOT, args)),
    }
}

fn logical_and(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::Bool(a), Value::Bool(b)] => Ok(Value::Bool(*a && *b)),
        _ => Err(no_overload(operators::LOGICAL_AND, args)),
    }
}

fn logical_or(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::Bool(a), Value::Bool(b)] => Ok(Value::Bool(*a || *b)),
        _ => Err(no_overload(operators::LOGICAL_OR, args)),
    }
}

fn not_strictly_false(args: &[Value]) -> Result<Value, RuleError> {
    Ok(Value::Bool(!matches!(args, [Value::Bool(false)])))
}

fn add(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::Int(a), Value::Int(b)] => a.checked_add(*b).map(Value::Int).ok_or_else(overflow),
        [Value::Float(a), Value::Float(b)] => Ok(Value::Float(a + b)),
        [Value::String(a), Value::String(b)] => Ok(Value::String(format!("{a}{b}"))),
        _ => Err(no_overload(operators::ADD, args)),
    }
}

fn subtract(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::Int(a), Value::Int(b)] => a.checked_sub(*b).map(Value::Int).ok_or_else(overflow),
        [Value::Float(a), Value::Float(b)] => Ok(Value::Float(a - b)),
        _ => Err(no_overload(operators::SUBTRACT, args)),
    }
}

fn multiply(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::Int(a), Value::Int(b)] => a.checked_mul(*b).map(Value::Int).ok_or_else(overflow),
        [Value::Float(a), Value::Float(b)] => Ok(Value::Float(a * b)),
        _ => Err(no_overload(operators::MULTIPLY, args)),
    }
}

fn in_map(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::String(key), Value::Map(map)] => Ok(Value::Bool(map.contains_key(key))),
        [_, Value::Map(_)] => Ok(Value::Bool(false)),
        _ => Err(no_overload(operators::IN, args)),
    }
}

fn index(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::List(list), Value::Int(i)] => usize::try_from(*i)
            .ok()
            .and_then(|i| list.get(i))
            .cloned()
            .ok_or_else(|| RuleError::Evaluation(format!("index out of range: {i}"))),
        [Value::Map(map), Value::String(key)] => map_lookup(map, key),
        _ => Err(no_overload(operators::INDEX, args)),
    }
}

fn map_lookup(map: &HashMap<String, Value>, key: &str) -> Result<Value, RuleError> {
    map.get(key)
        .cloned()
        .ok_or_else(|| RuleError::NoSuchKey(key.to_owned()))
}

fn size(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::String(s)] => Ok(len_to_int(s.chars().count())),
        _ => Err(no_overload("size", args)),
    }
}

fn to_int(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::Int(n)] => Ok(Value::Int(*n)),
        [Value::String(s)] => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| RuleError::Evaluation(format!("cannot convert '{s}' to int: {e}"))),
        _ => Err(no_overload("int", args)),
    }
}

/// Compiled `matches` patterns shared by every program. Rule patterns are
/// almost always literals, so a suite compiles each one once.
static PATTERNS: LazyLock<Mutex<HashMap<String, Regex>>> = LazyLock::new(Mutex::default);

const PATTERN_CACHE_LIMIT: usize = 256;

fn compiled_pattern(pattern: &str) -> Result<Regex, RuleError> {
    let mut cache = PATTERNS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern).map_err(|e| RuleError::InvalidRegex(e.to_string()))?;
    if cache.len() >= PATTERN_CACHE_LIMIT {
        cache.clear();
    }
    cache.insert(pattern.to_owned(), re.clone());
    Ok(re)
}

fn matches(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::String(s), Value::String(pattern)] => {
            Ok(Value::Bool(compiled_pattern(pattern)?.is_match(s)))
        }
        _ => Err(no_overload("matches", args)),
    }
}

fn contains(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::String(s), Value::String(needle)] => Ok(Value::Bool(s.contains(needle.as_str()))),
        _ => Err(no_overload("contains", args)),
    }
}

fn starts_with(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::String(s), Value::String(prefix)] => Ok(Value::Bool(s.starts_with(prefix.as_str()))),
        _ => Err(no_overload("startsWith", args)),
    }
}

fn ends_with(args: &[Value]) -> Result<Value, RuleError> {
    match args {
        [Value::String(s), Value::String(suffix)] => Ok(Value::Bool(s.ends_with(suffix.as_str()))),
        _ => Err(no_overload("endsWith", args)),
    }
}
