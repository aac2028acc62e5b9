//! Validate subcommand
//!
//! Checks one configuration file against the site schema. By default the file
//! is layered over the built-in defaults and its templates are resolved first,
//! the same way a partial site file is used at runtime.

use crate::config::loader::load_file;
use crate::config::template::{RuntimeInfo, TemplateContext, resolve_tree};
use crate::config::{EnvAdapter, Schema, deep_merge, defaults::default_config};
use clap::Args;
use serde_json::Map;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// Arguments for the validate subcommand
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration file (JSON or YAML)
    #[arg(value_name = "FILE")]
    pub path: PathBuf,

    /// Validate the file on its own, without layering it over the defaults
    #[arg(long)]
    pub strict: bool,
}

/// Prints `valid`, or every issue on its own line.
pub async fn run(args: &ValidateArgs, env: &EnvAdapter, out: &mut dyn Write) -> anyhow::Result<bool> {
    let document = match load_file(&args.path).await {
        Ok(document) => document,
        Err(e) => {
            writeln!(out, "error: {}", e)?;
            return Ok(false);
        }
    };

    let candidate = if args.strict {
        document
    } else {
        deep_merge(default_config(), document)
    };

    let runtime = RuntimeInfo::new(env!("CARGO_PKG_VERSION"), env.environment());
    let ctx = TemplateContext::for_config(&candidate, env, &runtime, &Map::new());
    let (resolved, report) = resolve_tree(&candidate, &ctx);
    for warning in &report.warnings {
        warn!("{}", warning);
    }

    let outcome = Schema::site().validate(&resolved);
    if outcome.success {
        writeln!(out, "valid")?;
        return Ok(true);
    }

    for issue in &outcome.errors {
        writeln!(out, "{}", issue)?;
    }
    Ok(false)
}
