//! CLI command definitions for portfolio-config
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.
//! Each subcommand module also carries its runner, which writes its report to
//! the given output so it can be driven from tests.

pub mod diff;
pub mod export;
pub mod generate;
pub mod preview;
pub mod validate;

use crate::config::EnvAdapter;
use crate::logging::LogTarget;
use clap::{Parser, Subcommand};
use diff::DiffArgs;
use export::ExportArgs;
use generate::GenerateArgs;
use preview::PreviewArgs;
use std::io::Write;
use validate::ValidateArgs;

/// Portfolio site configuration tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: LogTarget,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check a configuration file against the site schema
    Validate(ValidateArgs),

    /// Write a starter configuration file
    Generate(GenerateArgs),

    /// Show template variables and the fully resolved configuration
    Preview(PreviewArgs),

    /// Compare two configuration files
    Diff(DiffArgs),

    /// Print the resolved configuration with sensitive fields removed
    Export(ExportArgs),
}

/// Run `command`, writing its report to `out`. Returns whether it succeeded.
pub async fn run(command: &Command, env: &EnvAdapter, out: &mut dyn Write) -> anyhow::Result<bool> {
    match command {
        Command::Validate(args) => validate::run(args, env, out).await,
        Command::Generate(args) => generate::run(args, out),
        Command::Preview(args) => preview::run(args, env, out).await,
        Command::Diff(args) => diff::run(args, out).await,
        Command::Export(args) => export::run(args, env, out).await,
    }
}
