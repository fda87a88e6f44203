use armor_waf::Rules;

use crate::OutputFormat;

pub fn run(rules: &Rules, expr: &str, format: Option<OutputFormat>) -> anyhow::Result<()> {
    let checked = super::compile(rules, expr)?;
    super::print_checked(&checked, format)
}
