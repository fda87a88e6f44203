use std::collections::HashMap;

use crate::engine::context::EvalContext;
use crate::engine::value::Value;
use crate::error::RuleError;
use crate::ir::expr::{BinaryOp, Expr};
use crate::ir::operators;

/// Recursively evaluate an expression against the provided context.
pub fn eval(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, RuleError> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Float(f) => Ok(Value::Float(*f)),
        Expr::String(s) => Ok(Value::String(s.clone())),

        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),

        Expr::Map(entries) => {
            let mut result = HashMap::with_capacity(entries.len());
            for (key, value) in entries {
                result.insert(key.clone(), eval(value, ctx)?);
            }
            Ok(Value::Map(result))
        }

        Expr::Ident(name) => ctx
            .activation
            .resolve(name)
            .ok_or_else(|| RuleError::UndefinedVariable(name.clone())),

        Expr::Field(base, field) => eval(base, ctx)?.field(field),

        Expr::Presence(base, field) => eval(base, ctx)?.has_field(field).map(Value::Bool),

        Expr::Index(base, index) => {
            let base_val = eval(base, ctx)?;
            let index_val = eval(index, ctx)?;
            ctx.dispatcher.call(operators::INDEX, &[base_val, index_val])
        }

        Expr::Unary(op, inner) => {
            let val = eval(inner, ctx)?;
            ctx.dispatcher.call(op.function_name(), &[val])
        }

        Expr::Binary(BinaryOp::And, lhs, rhs) => eval_logical(lhs, rhs, false, ctx),
        Expr::Binary(BinaryOp::Or, lhs, rhs) => eval_logical(lhs, rhs, true, ctx),

        Expr::Binary(op, lhs, rhs) => {
            let lhs_val = eval(lhs, ctx)?;
            let rhs_val = eval(rhs, ctx)?;
            ctx.dispatcher.call(op.function_name(), &[lhs_val, rhs_val])
        }

        Expr::Ternary(cond, then_branch, else_branch) => match eval(cond, ctx)? {
            Value::Bool(true) => eval(then_branch, ctx),
            Value::Bool(false) => eval(else_branch, ctx),
            other => Err(RuleError::NoSuchOverload {
                function: operators::CONDITIONAL.to_owned(),
                args: other.type_name().to_owned(),
            }),
        },

        Expr::Call {
            function,
            target,
            args,
        } => {
            let mut evaluated = Vec::with_capacity(args.len() + 1);
            if let Some(target) = target {
                evaluated.push(eval(target, ctx)?);
            }
            for arg in args {
                evaluated.push(eval(arg, ctx)?);
            }
            ctx.dispatcher.call(function, &evaluated)
        }
    }
}

/// Evaluate `&&` (`decisive == false`) or `||` (`decisive == true`).
///
/// Either operand equal to the decisive value settles the result, even when
/// the other operand fails. Otherwise the first error wins.
fn eval_logical(
    lhs: &Expr,
    rhs: &Expr,
    decisive: bool,
    ctx: &EvalContext<'_>,
) -> Result<Value, RuleError> {
    let function = if decisive {
        operators::LOGICAL_OR
    } else {
        operators::LOGICAL_AND
    };
    let lhs_val = eval(lhs, ctx);
    if matches!(lhs_val, Ok(Value::Bool(b)) if b == decisive) {
        return Ok(Value::Bool(decisive));
    }
    let rhs_val = eval(rhs, ctx);
    if matches!(rhs_val, Ok(Value::Bool(b)) if b == decisive) {
        return Ok(Value::Bool(decisive));
    }
    match (lhs_val?, rhs_val?) {
        (Value::Bool(_), Value::Bool(_)) => Ok(Value::Bool(!decisive)),
        (a, b) => Err(RuleError::NoSuchOverload {
            function: function.to_owned(),
            args: format!("{}, {}", a.type_name(), b.type_name()),
        }),
    }
}
