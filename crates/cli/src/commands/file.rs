use std::path::Path;

use anyhow::Context;
use armor_waf::Rules;
use tracing::{debug, info};

use crate::OutputFormat;

/// A `;`-separated expression and the line it starts on.
#[derive(Debug, PartialEq, Eq)]
pub struct Statement<'a> {
    pub line: usize,
    pub expr: &'a str,
}

/// Split a rule file into its non-empty expressions.
pub fn statements(content: &str) -> Vec<Statement<'_>> {
    let mut line = 1;
    let mut out = Vec::new();
    for segment in content.split(';') {
        let trimmed = segment.trim_start();
        let leading = &segment[..segment.len() - trimmed.len()];
        let start = line + leading.matches('\n').count();
        line += segment.matches('\n').count();
        let expr = trimmed.trim_end();
        if !expr.is_empty() {
            out.push(Statement { line: start, expr });
        }
    }
    out
}

pub fn run(rules: &Rules, path: &Path, format: Option<OutputFormat>) -> anyhow::Result<()> {
    info!(path = %path.display(), "reading expression file");
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    for (index, statement) in statements(&content).into_iter().enumerate() {
        debug!(index, line = statement.line, expr = statement.expr, "compiling expression");
        let checked = super::compile(rules, statement.expr)
            .with_context(|| format!("{}:{}", path.display(), statement.line))?;
        super::print_checked(&checked, format)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_report_start_lines() {
        let content = "a == 1;\n\nb == 2 &&\n  c == 3;\n;  \nd\n";
        assert_eq!(
            statements(content),
            vec![
                Statement { line: 1, expr: "a == 1" },
                Statement { line: 3, expr: "b == 2 &&\n  c == 3" },
                Statement { line: 6, expr: "d" },
            ]
        );
    }

    #[test]
    fn empty_file_has_no_statements() {
        assert!(statements(" \n ; \n").is_empty());
    }
}
