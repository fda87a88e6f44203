//! A small typed expression engine: parse-tree IR, a static checker with
//! overload resolution, and a tree-walking evaluator.
//!
//! Hosts build an [`Env`] from variable and function declarations, check
//! parsed expressions against it, and evaluate the resulting [`Program`]s
//! against an [`Activation`].

pub mod check;
pub mod engine;
pub mod env;
pub mod error;
pub mod ir;

pub use check::decls::{FunctionDecl, OverloadDecl, VariableDecl};
pub use check::types::Type;
pub use check::CheckedExpr;
pub use engine::{Activation, Implementation, MapActivation, Program, Value};
pub use env::{Env, EnvBuilder};
pub use error::RuleError;
pub use ir::expr::Expr;
pub use ir::macros::{Macro, MacroRegistry};
