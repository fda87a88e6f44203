use std::sync::Arc;

use tracing::{instrument, trace};

use super::activation::Activation;
use super::context::EvalContext;
use super::dispatch::Dispatcher;
use super::eval::eval;
use super::value::Value;
use crate::error::RuleError;
use crate::ir::expr::Expr;

/// A checked expression bound to the functions of the environment that
/// produced it. Programs are immutable and may be shared across threads.
#[derive(Debug, Clone)]
pub struct Program {
    expr: Expr,
    dispatcher: Arc<Dispatcher>,
}

impl Program {
    pub(crate) fn new(expr: Expr, dispatcher: Arc<Dispatcher>) -> Self {
        Self { expr, dispatcher }
    }

    /// The expression this program evaluates.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate the program against an activation.
    #[instrument(level = "trace", skip_all)]
    pub fn eval(&self, activation: &dyn Activation) -> Result<Value, RuleError> {
        let ctx = EvalContext::new(activation, &self.dispatcher);
        let result = eval(&self.expr, &ctx);
        trace!(?result, "program evaluated");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::activation::MapActivation;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn program_is_send_and_sync() {
        assert_send_sync::<Program>();
    }

    #[test]
    fn program_evaluates_against_activation() {
        let program = Program::new(Expr::Ident("x".into()), Arc::new(Dispatcher::default()));
        let activation = MapActivation::new().with("x", 5_i64);
        assert_eq!(program.eval(&activation), Ok(Value::Int(5)));
        assert_eq!(program.expr(), &Expr::Ident("x".into()));
    }
}
