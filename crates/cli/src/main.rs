//! rulescli
//!
//! Compile Cloud Armor rule expressions and run rule test suites locally.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, bail};
use armor_waf::{Rules, RulesConfig, SchemaVersion};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

/// Compile and test Cloud Armor rule expressions.
#[derive(Parser, Debug)]
#[command(name = "rulescli", version, about)]
struct Cli {
    /// Rule expression to compile.
    #[arg(conflicts_with = "expr_flag")]
    expression: Option<String>,

    /// Rule expression to compile.
    #[arg(long = "expr", value_name = "EXPRESSION")]
    expr_flag: Option<String>,

    /// File of `;`-separated rule expressions to compile.
    #[arg(long)]
    file: Option<PathBuf>,

    /// YAML test suite to run.
    #[arg(long)]
    test: Option<PathBuf>,

    /// Schema version (VCurrent, VNext). Overrides the config file.
    #[arg(long, env = "RULESCLI_SCHEMA_VERSION")]
    schema_version: Option<SchemaVersion>,

    /// TOML file with environment settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Evaluate rules without optimizing them first.
    #[arg(long)]
    no_optimize: bool,

    /// Print checked expressions or suite results in this format.
    #[arg(long)]
    output_format: Option<OutputFormat>,

    /// Worker threads for running test cases.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Log compilation and evaluation steps.
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    fn rules_config(&self) -> anyhow::Result<RulesConfig> {
        let mut config = match &self.config {
            Some(path) => RulesConfig::from_file(path)?,
            None => RulesConfig::new(SchemaVersion::Current),
        };
        if let Some(version) = self.schema_version {
            config.version = version;
        }
        if self.no_optimize {
            config.optimize = false;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let expr = cli.expression.as_deref().or(cli.expr_flag.as_deref());
    if expr.is_none() && cli.file.is_none() && cli.test.is_none() {
        bail!("one of <EXPRESSION>, --expr, --file or --test is required");
    }

    let config = cli.rules_config()?;
    debug!(version = %config.version, optimize = config.optimize, "building environment");
    let rules = Rules::new(&config).context("failed to create rules environment")?;

    if let Some(expr) = expr {
        return commands::compile::run(&rules, expr, cli.output_format);
    }
    if let Some(path) = &cli.file {
        return commands::file::run(&rules, path, cli.output_format);
    }
    if let Some(path) = &cli.test {
        return commands::test::run(&rules, path, cli.workers, cli.output_format);
    }
    Ok(())
}
