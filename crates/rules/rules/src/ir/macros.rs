//! Macro declarations.
//!
//! A macro rewrites a call expression into another expression after parsing.
//! Frontends apply the registered macros; a macro that does not recognise the
//! shape of its arguments returns `None` and the call is left as written.

use std::fmt;
use std::sync::Arc;

use super::expr::Expr;

/// A parse-time rewrite of a call with a fixed name and arity.
pub trait Macro: Send + Sync {
    /// The function name the macro is triggered by.
    fn name(&self) -> &str;

    /// The number of arguments (excluding any receiver) the macro accepts.
    fn arg_count(&self) -> usize;

    /// Whether the macro is triggered by receiver-style calls (`x.m(...)`)
    /// rather than global calls (`m(...)`).
    fn receiver_style(&self) -> bool {
        false
    }

    /// Rewrite the call, or return `None` when the arguments do not have a
    /// shape the macro understands.
    fn expand(&self, target: Option<&Expr>, args: &[Expr]) -> Option<Expr>;
}

/// The set of macros an environment exposes.
#[derive(Clone, Default)]
pub struct MacroRegistry {
    macros: Vec<Arc<dyn Macro>>,
}

impl MacroRegistry {
    /// Create an empty registry (no macros at all).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a macro.
    #[must_use]
    pub fn with(mut self, mac: Arc<dyn Macro>) -> Self {
        self.macros.push(mac);
        self
    }

    /// Look up a macro by call shape.
    pub fn find(&self, name: &str, receiver_style: bool, arg_count: usize) -> Option<&dyn Macro> {
        self.macros
            .iter()
            .find(|m| {
                m.name() == name
                    && m.receiver_style() == receiver_style
                    && m.arg_count() == arg_count
            })
            .map(AsRef::as_ref)
    }

    /// Names of the registered macros.
    pub fn names(&self) -> Vec<&str> {
        self.macros.iter().map(|m| m.name()).collect()
    }

    /// Returns `true` if no macros are registered.
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

impl fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroRegistry")
            .field("macros", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always;

    impl Macro for Always {
        fn name(&self) -> &str {
            "always"
        }

        fn arg_count(&self) -> usize {
            1
        }

        fn expand(&self, _target: Option<&Expr>, _args: &[Expr]) -> Option<Expr> {
            Some(Expr::Bool(true))
        }
    }

    #[test]
    fn find_matches_name_style_and_arity() {
        let registry = MacroRegistry::new().with(Arc::new(Always));
        assert!(registry.find("always", false, 1).is_some());
        assert!(registry.find("always", true, 1).is_none());
        assert!(registry.find("always", false, 2).is_none());
        assert!(registry.find("never", false, 1).is_none());
        assert_eq!(registry.names(), vec!["always"]);
    }

    #[test]
    fn empty_registry() {
        let registry = MacroRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.find("has", false, 1).is_none());
    }
}
