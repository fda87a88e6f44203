pub mod compile;
pub mod file;
pub mod test;

use std::borrow::Cow;

use armor_rules::CheckedExpr;
use armor_waf::Rules;

use crate::OutputFormat;

/// Rewrite `['key']` accessors to `.key` in expressions over request
/// parameters, the form the production service accepts.
pub fn rewrite_params_accessors(expr: &str) -> Cow<'_, str> {
    if expr.contains("request.params") {
        Cow::Owned(expr.replace("['", ".").replace("']", ""))
    } else {
        Cow::Borrowed(expr)
    }
}

/// Compile one expression as the production service would receive it.
pub fn compile(rules: &Rules, expr: &str) -> anyhow::Result<CheckedExpr> {
    let expr = rewrite_params_accessors(expr);
    rules
        .compile(&expr)
        .map_err(|e| anyhow::anyhow!("failed to compile expression: {e}"))
}

pub fn print_checked(checked: &CheckedExpr, format: Option<OutputFormat>) -> anyhow::Result<()> {
    match format {
        Some(OutputFormat::Json) => println!("{}", serde_json::to_string_pretty(checked)?),
        Some(OutputFormat::Text) => {
            println!("{}", checked.expr.to_source());
            println!("  type: {}", checked.output_type);
        }
        None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_brackets_become_selections() {
        assert_eq!(
            rewrite_params_accessors("request.params['key1']['key2'] == 'v'"),
            "request.params.key1.key2 == 'v'"
        );
    }

    #[test]
    fn other_expressions_are_untouched() {
        let expr = "request.headers['user-agent'] == 'x'";
        assert!(matches!(rewrite_params_accessors(expr), Cow::Borrowed(e) if e == expr));
    }
}
