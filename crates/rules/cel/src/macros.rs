//! Macro expansion over parsed expressions.
//!
//! Expansion runs bottom-up, so macro arguments are expanded before the
//! macro that receives them. A call that matches a registered macro by
//! name, call style and arity is replaced by the macro's rewrite; when the
//! macro declines, the call is kept as written and is later checked as an
//! ordinary function call.

use armor_rules::ir::expr::Expr;
use armor_rules::ir::macros::MacroRegistry;
use tracing::trace;

/// Apply every registered macro to `expr`.
pub fn expand_macros(expr: Expr, registry: &MacroRegistry) -> Expr {
    if registry.is_empty() {
        return expr;
    }
    expand(expr, registry)
}

fn expand(expr: Expr, registry: &MacroRegistry) -> Expr {
    let recurse = |e: Expr| expand(e, registry);
    match expr {
        Expr::List(items) => Expr::List(items.into_iter().map(recurse).collect()),
        Expr::Map(entries) => Expr::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, expand(v, registry)))
                .collect(),
        ),
        Expr::Field(base, field) => Expr::Field(Box::new(recurse(*base)), field),
        Expr::Presence(base, field) => Expr::Presence(Box::new(recurse(*base)), field),
        Expr::Index(base, index) => {
            Expr::Index(Box::new(recurse(*base)), Box::new(recurse(*index)))
        }
        Expr::Unary(op, inner) => Expr::Unary(op, Box::new(recurse(*inner))),
        Expr::Binary(op, lhs, rhs) => {
            Expr::Binary(op, Box::new(recurse(*lhs)), Box::new(recurse(*rhs)))
        }
        Expr::Ternary(cond, then_branch, else_branch) => Expr::Ternary(
            Box::new(recurse(*cond)),
            Box::new(recurse(*then_branch)),
            Box::new(recurse(*else_branch)),
        ),
        Expr::Call {
            function,
            target,
            args,
        } => {
            let target = target.map(|t| Box::new(expand(*t, registry)));
            let args: Vec<Expr> = args.into_iter().map(|a| expand(a, registry)).collect();
            let expanded = registry
                .find(&function, target.is_some(), args.len())
                .and_then(|mac| mac.expand(target.as_deref(), &args));
            match expanded {
                Some(rewritten) => {
                    trace!(function = %function, "macro expanded");
                    rewritten
                }
                None => Expr::Call {
                    function,
                    target,
                    args,
                },
            }
        }
        leaf => leaf,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use armor_rules::ir::macros::Macro;

    use super::*;
    use crate::parser::parse_cel_expr;

    /// `exists(x.f)` becomes a presence test on `x`.
    struct Exists;

    impl Macro for Exists {
        fn name(&self) -> &str {
            "exists"
        }

        fn arg_count(&self) -> usize {
            1
        }

        fn expand(&self, _target: Option<&Expr>, args: &[Expr]) -> Option<Expr> {
            match &args[0] {
                Expr::Field(base, field) => Some(Expr::Presence(base.clone(), field.clone())),
                _ => None,
            }
        }
    }

    fn registry() -> MacroRegistry {
        MacroRegistry::new().with(Arc::new(Exists))
    }

    #[test]
    fn expands_matching_calls() {
        let expr = parse_cel_expr("exists(a.b) && exists(c.d.e)").unwrap();
        assert_eq!(
            expand_macros(expr, &registry()).to_source(),
            "(has(a.b) && has(c.d.e))"
        );
    }

    #[test]
    fn declined_expansion_keeps_the_call() {
        let expr = parse_cel_expr("exists(a)").unwrap();
        assert_eq!(
            expand_macros(expr.clone(), &registry()),
            Expr::call("exists", vec![Expr::Ident("a".into())])
        );
    }

    #[test]
    fn arity_and_style_must_match() {
        for source in ["exists(a.b, c)", "x.exists(a.b)"] {
            let expr = parse_cel_expr(source).unwrap();
            assert_eq!(expand_macros(expr.clone(), &registry()), expr, "{source}");
        }
    }

    #[test]
    fn expands_inside_arguments() {
        let expr = parse_cel_expr("f(!exists(a.b))").unwrap();
        assert_eq!(expand_macros(expr, &registry()).to_source(), "f(!has(a.b))");
    }

    #[test]
    fn empty_registry_is_identity() {
        let expr = parse_cel_expr("exists(a.b)").unwrap();
        assert_eq!(expand_macros(expr.clone(), &MacroRegistry::new()), expr);
    }
}
