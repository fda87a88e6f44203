//! Static checking of parsed expressions against an environment.
//!
//! The checker resolves dotted attribute names, verifies that every
//! operator and function application matches a declared overload, and
//! infers the output type. All errors are collected rather than stopping
//! at the first one.

pub mod decls;
pub mod types;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RuleError;
use crate::ir::expr::Expr;
use crate::ir::operators;

use self::decls::FunctionDecl;
use self::types::{Bindings, Type};

/// An expression that passed checking, with its inferred output type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckedExpr {
    pub expr: Expr,
    pub output_type: Type,
}

/// Walks an expression tree, rewriting qualified names and typing each node.
pub struct Checker<'a> {
    variables: &'a HashMap<String, Type>,
    functions: &'a HashMap<String, FunctionDecl>,
    errors: Vec<String>,
}

impl<'a> Checker<'a> {
    pub fn new(
        variables: &'a HashMap<String, Type>,
        functions: &'a HashMap<String, FunctionDecl>,
    ) -> Self {
        Self {
            variables,
            functions,
            errors: Vec::new(),
        }
    }

    /// Check `expr`, returning the rewritten tree and its type or every
    /// error found.
    pub fn check(mut self, expr: Expr) -> Result<CheckedExpr, RuleError> {
        let (expr, output_type) = self.visit(expr);
        if self.errors.is_empty() {
            debug!(output_type = %output_type, "expression checked");
            Ok(CheckedExpr { expr, output_type })
        } else {
            Err(RuleError::Check(self.errors))
        }
    }

    fn error(&mut self, message: String) -> Type {
        self.errors.push(message);
        Type::Error
    }

    fn visit(&mut self, expr: Expr) -> (Expr, Type) {
        match expr {
            Expr::Null => (Expr::Null, Type::Null),
            Expr::Bool(b) => (Expr::Bool(b), Type::Bool),
            Expr::Int(n) => (Expr::Int(n), Type::Int),
            Expr::Float(f) => (Expr::Float(f), Type::Double),
            Expr::String(s) => (Expr::String(s), Type::String),

            Expr::List(items) => {
                let mut elem: Option<Type> = None;
                let mut checked = Vec::with_capacity(items.len());
                for item in items {
                    let (item, ty) = self.visit(item);
                    elem = Some(elem.map_or(ty.clone(), |e| e.join(&ty)));
                    checked.push(item);
                }
                (Expr::List(checked), Type::list(elem.unwrap_or(Type::Dyn)))
            }

            Expr::Map(entries) => {
                let mut value_type: Option<Type> = None;
                let mut checked = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let (value, ty) = self.visit(value);
                    value_type = Some(value_type.map_or(ty.clone(), |v| v.join(&ty)));
                    checked.push((key, value));
                }
                let ty = Type::map(Type::String, value_type.unwrap_or(Type::Dyn));
                (Expr::Map(checked), ty)
            }

            Expr::Ident(name) => match self.variables.get(&name) {
                Some(ty) => {
                    let ty = ty.clone();
                    (Expr::Ident(name), ty)
                }
                None => {
                    let ty = self.error(format!("undeclared reference to '{name}'"));
                    (Expr::Ident(name), ty)
                }
            },

            Expr::Field(base, field) => {
                if let Some(mut segments) = path_segments(&base) {
                    segments.push(&field);
                    if let Some(resolved) = self.resolve_qualified(&segments) {
                        return resolved;
                    }
                }
                let (base, base_type) = self.visit(*base);
                let ty = self.select_type(&base_type, &field);
                (Expr::Field(Box::new(base), field), ty)
            }

            Expr::Presence(base, field) => {
                let (base, base_type) = self.visit(*base);
                let ty = if base_type.supports_fields() {
                    Type::Bool
                } else {
                    self.error(format!(
                        "type '{base_type}' does not support presence tests"
                    ))
                };
                (Expr::Presence(Box::new(base), field), ty)
            }

            Expr::Index(base, index) => {
                let (base, base_type) = self.visit(*base);
                let (index, index_type) = self.visit(*index);
                let ty = self.resolve_overload(operators::INDEX, false, &[base_type, index_type]);
                (Expr::Index(Box::new(base), Box::new(index)), ty)
            }

            Expr::Unary(op, inner) => {
                let (inner, inner_type) = self.visit(*inner);
                let ty = self.resolve_overload(op.function_name(), false, &[inner_type]);
                (Expr::Unary(op, Box::new(inner)), ty)
            }

            Expr::Binary(op, lhs, rhs) => {
                let (lhs, lhs_type) = self.visit(*lhs);
                let (rhs, rhs_type) = self.visit(*rhs);
                let ty = self.resolve_overload(op.function_name(), false, &[lhs_type, rhs_type]);
                (Expr::Binary(op, Box::new(lhs), Box::new(rhs)), ty)
            }

            Expr::Ternary(cond, then_branch, else_branch) => {
                let (cond, cond_type) = self.visit(*cond);
                let (then_branch, then_type) = self.visit(*then_branch);
                let (else_branch, else_type) = self.visit(*else_branch);
                let ty = self.resolve_overload(
                    operators::CONDITIONAL,
                    false,
                    &[cond_type, then_type, else_type],
                );
                (
                    Expr::Ternary(Box::new(cond), Box::new(then_branch), Box::new(else_branch)),
                    ty,
                )
            }

            Expr::Call {
                function,
                target,
                args,
            } => {
                let mut arg_types = Vec::with_capacity(args.len() + 1);
                let target = target.map(|t| {
                    let (t, ty) = self.visit(*t);
                    arg_types.push(ty);
                    Box::new(t)
                });
                let args: Vec<Expr> = args
                    .into_iter()
                    .map(|a| {
                        let (a, ty) = self.visit(a);
                        arg_types.push(ty);
                        a
                    })
                    .collect();
                let ty = self.resolve_overload(&function, target.is_some(), &arg_types);
                (
                    Expr::Call {
                        function,
                        target,
                        args,
                    },
                    ty,
                )
            }
        }
    }

    /// Resolve a chain of field selections rooted at an identifier to the
    /// longest declared variable name, e.g. `request.params.key` becomes a
    /// selection of `key` on the variable `request.params`.
    fn resolve_qualified(&mut self, segments: &[&str]) -> Option<(Expr, Type)> {
        for len in (1..=segments.len()).rev() {
            let candidate = segments[..len].join(".");
            let Some(var_type) = self.variables.get(&candidate) else {
                continue;
            };
            let mut resolved = Expr::Ident(candidate);
            let mut ty = var_type.clone();
            for field in &segments[len..] {
                ty = self.select_type(&ty, field);
                resolved = Expr::Field(Box::new(resolved), (*field).to_owned());
            }
            return Some((resolved, ty));
        }
        None
    }

    fn select_type(&mut self, base_type: &Type, field: &str) -> Type {
        match base_type {
            Type::Map(key, value) => {
                if matches!(key.as_ref(), Type::String | Type::Dyn) {
                    value.as_ref().clone()
                } else {
                    self.error(format!("type '{base_type}' does not support field selection"))
                }
            }
            Type::Dyn => Type::Dyn,
            Type::Error => Type::Error,
            other => self.error(format!(
                "type '{other}' does not support field selection of '{field}'"
            )),
        }
    }

    fn resolve_overload(&mut self, function: &str, member: bool, arg_types: &[Type]) -> Type {
        if arg_types.contains(&Type::Error) {
            return Type::Error;
        }
        let Some(decl) = self.functions.get(function) else {
            return self.error(format!("undeclared reference to '{function}'"));
        };

        let mut result: Option<Type> = None;
        for overload in decl
            .overloads
            .iter()
            .filter(|o| o.member == member && o.params.len() == arg_types.len())
        {
            let mut bindings = Bindings::new();
            let matched = overload
                .params
                .iter()
                .zip(arg_types)
                .all(|(param, arg)| param.is_assignable_from(arg, &mut bindings));
            if matched {
                let ty = overload.result.substitute(&bindings);
                result = Some(result.map_or(ty.clone(), |r| r.join(&ty)));
            }
        }

        match result {
            Some(ty) => ty,
            None => {
                let rendered = if member {
                    let (receiver, rest) = arg_types.split_first().unwrap_or((&Type::Dyn, &[]));
                    format!("{receiver}.({})", join_types(rest))
                } else {
                    format!("({})", join_types(arg_types))
                };
                self.error(format!(
                    "found no matching overload for '{function}' applied to '{rendered}'"
                ))
            }
        }
    }
}

/// The identifier and field names of a pure selection chain, e.g.
/// `["origin", "ip"]` for `origin.ip`.
fn path_segments(expr: &Expr) -> Option<Vec<&str>> {
    match expr {
        Expr::Ident(name) => Some(vec![name.as_str()]),
        Expr::Field(base, field) => {
            let mut segments = path_segments(base)?;
            segments.push(field);
            Some(segments)
        }
        _ => None,
    }
}

fn join_types(types: &[Type]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
