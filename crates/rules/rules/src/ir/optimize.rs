//! Optimizer passes for checked expression IR.
//!
//! Runs after type checking, so every operator application it sees is one
//! the environment accepted. Supported transformations:
//! - Constant folding for arithmetic, comparison, and logic on literals.
//! - Dead branch elimination for conditionals with constant conditions.
//! - Double negation removal (`!!x` -> `x`).
//!
//! Folding never changes an evaluation error into a value: operations that
//! would overflow are left for the evaluator to report.

use super::expr::{BinaryOp, Expr, UnaryOp};

/// Run all optimization passes on an expression tree, returning the optimized form.
pub fn optimize(expr: Expr) -> Expr {
    let expr = fold_constants(expr);
    let expr = eliminate_dead_branches(expr);
    remove_double_negation(expr)
}

/// Rebuild `expr` with `pass` applied to each direct child.
fn map_children(expr: Expr, pass: fn(Expr) -> Expr) -> Expr {
    match expr {
        Expr::List(items) => Expr::List(items.into_iter().map(pass).collect()),
        Expr::Map(entries) => Expr::Map(entries.into_iter().map(|(k, v)| (k, pass(v))).collect()),
        Expr::Field(inner, field) => Expr::Field(Box::new(pass(*inner)), field),
        Expr::Presence(inner, field) => Expr::Presence(Box::new(pass(*inner)), field),
        Expr::Index(base, index) => Expr::Index(Box::new(pass(*base)), Box::new(pass(*index))),
        Expr::Unary(op, inner) => Expr::Unary(op, Box::new(pass(*inner))),
        Expr::Binary(op, lhs, rhs) => Expr::Binary(op, Box::new(pass(*lhs)), Box::new(pass(*rhs))),
        Expr::Ternary(cond, then_branch, else_branch) => Expr::Ternary(
            Box::new(pass(*cond)),
            Box::new(pass(*then_branch)),
            Box::new(pass(*else_branch)),
        ),
        Expr::Call {
            function,
            target,
            args,
        } => Expr::Call {
            function,
            target: target.map(|t| Box::new(pass(*t))),
            args: args.into_iter().map(pass).collect(),
        },
        leaf => leaf,
    }
}

/// Constant folding: evaluate operations on literal values at compile time.
fn fold_constants(expr: Expr) -> Expr {
    match map_children(expr, fold_constants) {
        Expr::Unary(op, inner) => match (op, *inner) {
            (UnaryOp::Not, Expr::Bool(b)) => Expr::Bool(!b),
            (UnaryOp::Neg, Expr::Int(n)) if n != i64::MIN => Expr::Int(-n),
            (UnaryOp::Neg, Expr::Float(f)) => Expr::Float(-f),
            (op, inner) => Expr::Unary(op, Box::new(inner)),
        },
        Expr::Binary(op, lhs, rhs) => fold_binary(op, *lhs, *rhs),
        other => other,
    }
}

/// Attempt to fold a binary operation on constant operands.
#[allow(clippy::float_cmp)]
fn fold_binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let folded = match (op, &lhs, &rhs) {
        // Integer arithmetic
        (BinaryOp::Add, Expr::Int(a), Expr::Int(b)) => a.checked_add(*b).map(Expr::Int),
        (BinaryOp::Sub, Expr::Int(a), Expr::Int(b)) => a.checked_sub(*b).map(Expr::Int),
        (BinaryOp::Mul, Expr::Int(a), Expr::Int(b)) => a.checked_mul(*b).map(Expr::Int),
        (BinaryOp::Div, Expr::Int(a), Expr::Int(b)) => a.checked_div(*b).map(Expr::Int),
        (BinaryOp::Mod, Expr::Int(a), Expr::Int(b)) => a.checked_rem(*b).map(Expr::Int),

        // Float arithmetic
        (BinaryOp::Add, Expr::Float(a), Expr::Float(b)) => Some(Expr::Float(a + b)),
        (BinaryOp::Sub, Expr::Float(a), Expr::Float(b)) => Some(Expr::Float(a - b)),
        (BinaryOp::Mul, Expr::Float(a), Expr::Float(b)) => Some(Expr::Float(a * b)),

        // String concatenation
        (BinaryOp::Add, Expr::String(a), Expr::String(b)) => Some(Expr::String(format!("{a}{b}"))),

        // Integer comparison
        (BinaryOp::Eq, Expr::Int(a), Expr::Int(b)) => Some(Expr::Bool(a == b)),
        (BinaryOp::Ne, Expr::Int(a), Expr::Int(b)) => Some(Expr::Bool(a != b)),
        (BinaryOp::Lt, Expr::Int(a), Expr::Int(b)) => Some(Expr::Bool(a < b)),
        (BinaryOp::Le, Expr::Int(a), Expr::Int(b)) => Some(Expr::Bool(a <= b)),
        (BinaryOp::Gt, Expr::Int(a), Expr::Int(b)) => Some(Expr::Bool(a > b)),
        (BinaryOp::Ge, Expr::Int(a), Expr::Int(b)) => Some(Expr::Bool(a >= b)),

        // Float comparison
        (BinaryOp::Eq, Expr::Float(a), Expr::Float(b)) => Some(Expr::Bool(a == b)),
        (BinaryOp::Ne, Expr::Float(a), Expr::Float(b)) => Some(Expr::Bool(a != b)),
        (BinaryOp::Lt, Expr::Float(a), Expr::Float(b)) => Some(Expr::Bool(a < b)),
        (BinaryOp::Le, Expr::Float(a), Expr::Float(b)) => Some(Expr::Bool(a <= b)),
        (BinaryOp::Gt, Expr::Float(a), Expr::Float(b)) => Some(Expr::Bool(a > b)),
        (BinaryOp::Ge, Expr::Float(a), Expr::Float(b)) => Some(Expr::Bool(a >= b)),

        // String and bool equality
        (BinaryOp::Eq, Expr::String(a), Expr::String(b)) => Some(Expr::Bool(a == b)),
        (BinaryOp::Ne, Expr::String(a), Expr::String(b)) => Some(Expr::Bool(a != b)),
        (BinaryOp::Eq, Expr::Bool(a), Expr::Bool(b)) => Some(Expr::Bool(a == b)),
        (BinaryOp::Ne, Expr::Bool(a), Expr::Bool(b)) => Some(Expr::Bool(a != b)),

        // A constant operand decides the result regardless of errors on the
        // other side: `false && x`, `x && false` -> `false`, and likewise
        // `true` for `||`.
        (BinaryOp::And, Expr::Bool(false), _) | (BinaryOp::And, _, Expr::Bool(false)) => {
            Some(Expr::Bool(false))
        }
        (BinaryOp::Or, Expr::Bool(true), _) | (BinaryOp::Or, _, Expr::Bool(true)) => {
            Some(Expr::Bool(true))
        }
        _ => None,
    };
    if let Some(folded) = folded {
        return folded;
    }

    // Identity: `true && x` -> `x`, `false || x` -> `x`, and mirrored.
    match (op, lhs, rhs) {
        (BinaryOp::And, Expr::Bool(true), other)
        | (BinaryOp::And, other, Expr::Bool(true))
        | (BinaryOp::Or, Expr::Bool(false), other)
        | (BinaryOp::Or, other, Expr::Bool(false)) => other,
        (op, lhs, rhs) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
    }
}

/// Dead branch elimination: replace conditionals whose condition is a known
/// constant with the appropriate branch.
fn eliminate_dead_branches(expr: Expr) -> Expr {
    match map_children(expr, eliminate_dead_branches) {
        Expr::Ternary(cond, then_branch, else_branch) => match *cond {
            Expr::Bool(true) => *then_branch,
            Expr::Bool(false) => *else_branch,
            cond => Expr::Ternary(Box::new(cond), then_branch, else_branch),
        },
        other => other,
    }
}

/// Remove double negations: `!!x` -> `x`.
fn remove_double_negation(expr: Expr) -> Expr {
    match map_children(expr, remove_double_negation) {
        Expr::Unary(UnaryOp::Not, inner) => match *inner {
            Expr::Unary(UnaryOp::Not, double_inner) => *double_inner,
            other => Expr::Unary(UnaryOp::Not, Box::new(other)),
        },
        other => other,
    }
}
