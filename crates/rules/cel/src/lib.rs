//! CEL text frontend for armor rules: a parser producing the shared
//! expression IR and the macro expansion pass that runs before checking.

pub mod macros;
pub mod parser;

pub use macros::expand_macros;
pub use parser::parse_cel_expr;

use armor_rules::ir::macros::MacroRegistry;
use armor_rules::{Expr, RuleError};

/// Parse `source` and apply `macros` to the result.
pub fn parse(source: &str, macros: &MacroRegistry) -> Result<Expr, RuleError> {
    parse_cel_expr(source).map(|expr| expand_macros(expr, macros))
}
