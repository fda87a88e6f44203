use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::check::decls::{FunctionDecl, VariableDecl};
use crate::check::types::Type;
use crate::check::{CheckedExpr, Checker};
use crate::engine::dispatch::Dispatcher;
use crate::engine::program::Program;
use crate::error::RuleError;
use crate::ir::expr::Expr;
use crate::ir::macros::{Macro, MacroRegistry};
use crate::ir::optimize::optimize;

/// A compilation environment: the variables, functions, and macros an
/// expression may use.
///
/// Environments are immutable once built and cheap to share behind an `Arc`.
pub struct Env {
    variables: HashMap<String, Type>,
    functions: HashMap<String, FunctionDecl>,
    macros: MacroRegistry,
    dispatcher: Arc<Dispatcher>,
}

impl Env {
    pub fn builder() -> EnvBuilder {
        EnvBuilder::default()
    }

    /// Type-check a parsed (and macro-expanded) expression.
    #[instrument(level = "debug", skip_all)]
    pub fn check(&self, expr: Expr) -> Result<CheckedExpr, RuleError> {
        Checker::new(&self.variables, &self.functions).check(expr)
    }

    /// Bind a checked expression to this environment's functions.
    pub fn program(&self, checked: &CheckedExpr, optimized: bool) -> Program {
        let expr = if optimized {
            optimize(checked.expr.clone())
        } else {
            checked.expr.clone()
        };
        Program::new(expr, Arc::clone(&self.dispatcher))
    }

    /// The macros parsers should apply before checking.
    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    /// The declared type of a variable.
    pub fn variable(&self, name: &str) -> Option<&Type> {
        self.variables.get(name)
    }

    /// All declared variables, sorted by name.
    pub fn variables(&self) -> Vec<VariableDecl> {
        let mut vars: Vec<_> = self
            .variables
            .iter()
            .map(|(name, ty)| VariableDecl::new(name.clone(), ty.clone()))
            .collect();
        vars.sort_by(|a, b| a.name.cmp(&b.name));
        vars
    }

    /// A declared function.
    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.get(name)
    }

    /// All declared functions, sorted by name.
    pub fn functions(&self) -> Vec<&FunctionDecl> {
        let mut funcs: Vec<_> = self.functions.values().collect();
        funcs.sort_by(|a, b| a.name.cmp(&b.name));
        funcs
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("variables", &self.variables.len())
            .field("functions", &self.functions.len())
            .field("macros", &self.macros)
            .finish_non_exhaustive()
    }
}

/// Accumulates declarations for an [`Env`].
#[derive(Default)]
pub struct EnvBuilder {
    variables: Vec<VariableDecl>,
    functions: Vec<FunctionDecl>,
    macros: MacroRegistry,
}

impl EnvBuilder {
    #[must_use]
    pub fn variable(mut self, decl: VariableDecl) -> Self {
        self.variables.push(decl);
        self
    }

    #[must_use]
    pub fn function(mut self, decl: FunctionDecl) -> Self {
        self.functions.push(decl);
        self
    }

    #[must_use]
    pub fn with_macro(mut self, mac: Arc<dyn Macro>) -> Self {
        self.macros = self.macros.with(mac);
        self
    }

    /// Validate the declarations and build the environment.
    ///
    /// Declaring the same variable twice or the same overload id twice is a
    /// configuration error. Declarations of the same function name merge.
    pub fn build(self) -> Result<Env, RuleError> {
        let mut variables = HashMap::with_capacity(self.variables.len());
        for decl in self.variables {
            if variables.insert(decl.name.clone(), decl.ty).is_some() {
                return Err(RuleError::Configuration(format!(
                    "variable '{}' declared more than once",
                    decl.name
                )));
            }
        }

        let mut functions: HashMap<String, FunctionDecl> = HashMap::new();
        for decl in self.functions {
            match functions.get_mut(&decl.name) {
                Some(existing) => {
                    for overload in decl.overloads {
                        if existing.find_overload(&overload.id).is_some() {
                            return Err(RuleError::Configuration(format!(
                                "overload '{}' of '{}' declared more than once",
                                overload.id, decl.name
                            )));
                        }
                        existing.overloads.push(overload);
                    }
                    if decl.singleton.is_some() {
                        existing.singleton = decl.singleton;
                    }
                }
                None => {
                    functions.insert(decl.name.clone(), decl);
                }
            }
        }

        let dispatcher = Arc::new(Dispatcher::from_decls(functions.values()));
        debug!(
            variables = variables.len(),
            functions = functions.len(),
            "environment built"
        );
        Ok(Env {
            variables,
            functions,
            macros: self.macros,
            dispatcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::decls::OverloadDecl;
    use crate::engine::activation::MapActivation;
    use crate::engine::stdlib::standard_functions;
    use crate::engine::value::Value;
    use crate::ir::expr::BinaryOp;

    fn env() -> Env {
        standard_functions()
            .into_iter()
            .fold(Env::builder(), EnvBuilder::function)
            .variable(VariableDecl::new("origin.asn", Type::Int))
            .build()
            .unwrap()
    }

    #[test]
    fn check_then_run() {
        let env = env();
        let expr = Expr::Binary(
            BinaryOp::Eq,
            Box::new(Expr::Field(Box::new(Expr::Ident("origin".into())), "asn".into())),
            Box::new(Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Int(15000)),
                Box::new(Expr::Int(169)),
            )),
        );
        let checked = env.check(expr).unwrap();
        assert_eq!(checked.output_type, Type::Bool);

        let activation = MapActivation::new().with("origin.asn", 15169_i64);
        for optimized in [false, true] {
            let program = env.program(&checked, optimized);
            assert_eq!(program.eval(&activation), Ok(Value::Bool(true)));
        }
        assert!(matches!(
            env.program(&checked, true).expr(),
            Expr::Binary(BinaryOp::Eq, _, rhs) if **rhs == Expr::Int(15169)
        ));
    }

    #[test]
    fn duplicate_variable_is_rejected() {
        let err = Env::builder()
            .variable(VariableDecl::new("a", Type::Int))
            .variable(VariableDecl::new("a", Type::String))
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: variable 'a' declared more than once"
        );
    }

    #[test]
    fn function_declarations_merge() {
        let env = Env::builder()
            .function(FunctionDecl::new("f").overload(OverloadDecl::global(
                "f_int",
                vec![Type::Int],
                Type::Int,
            )))
            .function(FunctionDecl::new("f").overload(OverloadDecl::global(
                "f_string",
                vec![Type::String],
                Type::String,
            )))
            .build()
            .unwrap();
        assert_eq!(env.function("f").unwrap().overloads.len(), 2);

        let err = Env::builder()
            .function(FunctionDecl::new("f").overload(OverloadDecl::global("f_int", vec![], Type::Int)))
            .function(FunctionDecl::new("f").overload(OverloadDecl::global("f_int", vec![], Type::Int)))
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleError::Configuration(_)));
    }

    #[test]
    fn introspection_is_sorted() {
        let env = env();
        assert_eq!(env.variables()[0].name, "origin.asn");
        assert_eq!(env.variable("origin.asn"), Some(&Type::Int));
        let names: Vec<_> = env.functions().iter().map(|f| f.name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(env.macros().is_empty());
    }
}
