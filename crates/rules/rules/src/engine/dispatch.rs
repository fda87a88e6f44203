//! Runtime dispatch of function and operator calls.

use std::collections::HashMap;

use super::value::Value;
use crate::check::decls::FunctionDecl;
use crate::check::types::Type;
use crate::error::RuleError;

/// A native function implementation. Receiver-style calls receive the
/// receiver as the first argument.
pub type Implementation = fn(&[Value]) -> Result<Value, RuleError>;

#[derive(Debug, Clone)]
struct RuntimeOverload {
    params: Vec<Type>,
    implementation: Implementation,
}

#[derive(Debug, Clone, Default)]
struct RuntimeFunction {
    singleton: Option<Implementation>,
    overloads: Vec<RuntimeOverload>,
}

/// Maps function names to the implementations an environment declared.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    functions: HashMap<String, RuntimeFunction>,
}

impl Dispatcher {
    /// Build a dispatcher from function declarations. Overloads without an
    /// implementation are skipped; the function's singleton covers them.
    pub fn from_decls<'a>(decls: impl IntoIterator<Item = &'a FunctionDecl>) -> Self {
        let functions = decls
            .into_iter()
            .map(|decl| {
                let overloads = decl
                    .overloads
                    .iter()
                    .filter_map(|o| {
                        o.implementation.map(|implementation| RuntimeOverload {
                            params: o.params.clone(),
                            implementation,
                        })
                    })
                    .collect();
                (
                    decl.name.clone(),
                    RuntimeFunction {
                        singleton: decl.singleton,
                        overloads,
                    },
                )
            })
            .collect();
        Self { functions }
    }

    /// Invoke `name` with already evaluated arguments.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, RuleError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| RuleError::Evaluation(format!("unknown function: {name}")))?;
        if let Some(singleton) = function.singleton {
            return singleton(args);
        }
        function
            .overloads
            .iter()
            .find(|o| {
                o.params.len() == args.len()
                    && o.params.iter().zip(args).all(|(p, a)| accepts(p, a))
            })
            .map_or_else(
                || {
                    Err(RuleError::NoSuchOverload {
                        function: name.to_owned(),
                        args: args
                            .iter()
                            .map(Value::type_name)
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
                },
                |o| (o.implementation)(args),
            )
    }

    /// Returns `true` if `name` has a runtime binding.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

/// Whether a runtime value fits a declared parameter type by kind.
fn accepts(param: &Type, value: &Value) -> bool {
    match (param, value) {
        (Type::Dyn | Type::Param(_), _)
        | (Type::Bool, Value::Bool(_))
        | (Type::Int, Value::Int(_))
        | (Type::Double, Value::Float(_))
        | (Type::String, Value::String(_))
        | (Type::Null, Value::Null)
        | (Type::List(_), Value::List(_))
        | (Type::Map(..), Value::Map(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::decls::OverloadDecl;

    fn first(args: &[Value]) -> Result<Value, RuleError> {
        Ok(args[0].clone())
    }

    fn always_true(_: &[Value]) -> Result<Value, RuleError> {
        Ok(Value::Bool(true))
    }

    #[test]
    fn dispatches_on_runtime_kinds() {
        let decl = FunctionDecl::new("pick")
            .overload(OverloadDecl::global("pick_int", vec![Type::Int], Type::Int).with_impl(first));
        let dispatcher = Dispatcher::from_decls([&decl]);
        assert_eq!(dispatcher.call("pick", &[Value::Int(4)]), Ok(Value::Int(4)));

        let err = dispatcher.call("pick", &[Value::from("x")]).unwrap_err();
        assert_eq!(err.to_string(), "no such overload: pick(string)");
    }

    #[test]
    fn singleton_takes_precedence() {
        let decl = FunctionDecl::new("eq")
            .overload(OverloadDecl::global("eq_int", vec![Type::Int, Type::Int], Type::Bool))
            .with_singleton(always_true);
        let dispatcher = Dispatcher::from_decls([&decl]);
        let result = dispatcher.call("eq", &[Value::from("a"), Value::Int(1)]);
        assert_eq!(result, Ok(Value::Bool(true)));
    }

    #[test]
    fn unknown_function() {
        let dispatcher = Dispatcher::default();
        assert!(!dispatcher.contains("nope"));
        assert!(matches!(
            dispatcher.call("nope", &[]),
            Err(RuleError::Evaluation(_))
        ));
    }
}
