use super::activation::Activation;
use super::dispatch::Dispatcher;

/// Everything an evaluation pass needs besides the expression itself.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// Variable bindings for this evaluation.
    pub activation: &'a dyn Activation,
    /// Function implementations declared by the environment.
    pub dispatcher: &'a Dispatcher,
}

impl<'a> EvalContext<'a> {
    pub fn new(activation: &'a dyn Activation, dispatcher: &'a Dispatcher) -> Self {
        Self {
            activation,
            dispatcher,
        }
    }
}
