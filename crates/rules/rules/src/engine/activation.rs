use std::collections::HashMap;

use super::value::Value;

/// Supplies values for the variables referenced by an expression.
pub trait Activation {
    /// Returns the value bound to the fully qualified variable `name`, or
    /// `None` when the variable is not bound.
    fn resolve(&self, name: &str) -> Option<Value>;
}

/// An activation backed by a plain name-to-value map.
#[derive(Debug, Clone, Default)]
pub struct MapActivation {
    values: HashMap<String, Value>,
}

impl MapActivation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl Activation for MapActivation {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

impl Activation for HashMap<String, Value> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}
