//! Portfolio site configuration CLI
//!
//! Validates, generates, previews, compares and exports site configuration.

use anyhow::Result;
use clap::Parser;
use portfolio_config::cli::{self, Cli};
use portfolio_config::config::EnvAdapter;
use portfolio_config::logging::init_logging;
use std::process::ExitCode;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log, cli.verbose)?;
    debug!(log = %cli.log, "Logging initialized");

    let env = EnvAdapter::process();
    let mut stdout = std::io::stdout().lock();
    let ok = cli::run(&cli.command, &env, &mut stdout).await?;

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
