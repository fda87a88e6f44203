use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Static types known to the checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Int,
    Double,
    String,
    /// The type of the `null` literal.
    Null,
    /// A value whose type is only known at runtime.
    Dyn,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    /// A type parameter in an overload signature, bound on first use.
    Param(String),
    /// The type of an expression that failed to check.
    Error,
}

/// Type parameter bindings collected while matching one overload.
pub type Bindings = HashMap<String, Type>;

impl Type {
    pub fn list(elem: Self) -> Self {
        Self::List(Box::new(elem))
    }

    pub fn map(key: Self, value: Self) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    pub fn param(name: &str) -> Self {
        Self::Param(name.to_owned())
    }

    /// Returns `true` if a value of type `arg` may be passed where `self`
    /// is expected, binding type parameters in `bindings` as it goes.
    pub fn is_assignable_from(&self, arg: &Self, bindings: &mut Bindings) -> bool {
        if let Self::Param(name) = self {
            return match bindings.get(name).cloned() {
                Some(bound) => bound.is_assignable_from(arg, bindings),
                None => {
                    bindings.insert(name.clone(), arg.clone());
                    true
                }
            };
        }
        match (self, arg) {
            (Self::Dyn | Self::Error, _) | (_, Self::Dyn | Self::Error) => true,
            (Self::List(p), Self::List(a)) => p.is_assignable_from(a, bindings),
            (Self::Map(pk, pv), Self::Map(ak, av)) => {
                pk.is_assignable_from(ak, bindings) && pv.is_assignable_from(av, bindings)
            }
            (p, a) => p == a,
        }
    }

    /// Replace bound type parameters; unbound parameters become `dyn`.
    #[must_use]
    pub fn substitute(&self, bindings: &Bindings) -> Self {
        match self {
            Self::Param(name) => bindings
                .get(name)
                .map_or(Self::Dyn, |bound| bound.substitute(bindings)),
            Self::List(elem) => Self::list(elem.substitute(bindings)),
            Self::Map(key, value) => Self::map(key.substitute(bindings), value.substitute(bindings)),
            other => other.clone(),
        }
    }

    /// The least specific type covering both `self` and `other`.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        if self == other { self.clone() } else { Self::Dyn }
    }

    /// Returns `true` if field selection is allowed on this type.
    pub fn supports_fields(&self) -> bool {
        matches!(self, Self::Map(..) | Self::Dyn | Self::Error)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Double => f.write_str("double"),
            Self::String => f.write_str("string"),
            Self::Null => f.write_str("null_type"),
            Self::Dyn => f.write_str("dyn"),
            Self::List(elem) => write!(f, "list({elem})"),
            Self::Map(key, value) => write!(f, "map({key}, {value})"),
            Self::Param(name) => f.write_str(name),
            Self::Error => f.write_str("*error*"),
        }
    }
}
