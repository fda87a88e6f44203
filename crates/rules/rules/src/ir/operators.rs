//! Canonical function names for operators.
//!
//! Operators are declared and dispatched like any other function, so the
//! capability surface can allow or withhold each one individually.

pub const LOGICAL_AND: &str = "_&&_";
pub const LOGICAL_OR: &str = "_||_";
pub const LOGICAL_NOT: &str = "!_";
pub const NEGATE: &str = "-_";
pub const CONDITIONAL: &str = "_?_:_";

pub const EQUALS: &str = "_==_";
pub const NOT_EQUALS: &str = "_!=_";
pub const LESS: &str = "_<_";
pub const LESS_EQUALS: &str = "_<=_";
pub const GREATER: &str = "_>_";
pub const GREATER_EQUALS: &str = "_>=_";

pub const ADD: &str = "_+_";
pub const SUBTRACT: &str = "_-_";
pub const MULTIPLY: &str = "_*_";
pub const DIVIDE: &str = "_/_";
pub const MODULO: &str = "_%_";

pub const IN: &str = "@in";
pub const INDEX: &str = "_[_]";
pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";

/// Returns `true` if `name` is one of the operator function names above.
pub fn is_operator(name: &str) -> bool {
    matches!(
        name,
        LOGICAL_AND
            | LOGICAL_OR
            | LOGICAL_NOT
            | NEGATE
            | CONDITIONAL
            | EQUALS
            | NOT_EQUALS
            | LESS
            | LESS_EQUALS
            | GREATER
            | GREATER_EQUALS
            | ADD
            | SUBTRACT
            | MULTIPLY
            | DIVIDE
            | MODULO
            | IN
            | INDEX
            | NOT_STRICTLY_FALSE
    )
}
