//! Export subcommand
//!
//! Resolves the tier preset and prints the sanitised configuration together
//! with its load metadata as JSON.

use crate::config::{ConfigManager, EnvAdapter, Environment, ManagerOptions};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;

/// Arguments for the export subcommand
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Deployment tier (default: PORTFOLIO_ENV)
    #[arg(short, long, value_name = "TIER")]
    pub env: Option<Environment>,

    /// Directory holding site files (default: PORTFOLIO_CONFIG_DIR or ./config)
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

/// Succeeds when the exported configuration is valid.
pub async fn run(args: &ExportArgs, env: &EnvAdapter, out: &mut dyn Write) -> anyhow::Result<bool> {
    let mut options = ManagerOptions::default().with_env(env.clone());
    if let Some(environment) = args.env {
        options = options.with_environment(environment);
    }
    if let Some(dir) = &args.dir {
        options = options.with_base_dir(dir);
    }

    let manager = ConfigManager::new(options);
    let loaded = manager.initialize().await?;
    let exported = manager.export();
    writeln!(out, "{}", serde_json::to_string_pretty(&exported)?)?;
    Ok(loaded.is_valid)
}
