//! Diff subcommand
//!
//! Compares two configuration files path by path.

use crate::config::ConfigDiff;
use crate::config::loader::load_file;
use anyhow::Context;
use clap::Args;
use std::io::Write;
use std::path::PathBuf;

/// Arguments for the diff subcommand
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Baseline configuration file
    #[arg(value_name = "OLD")]
    pub old: PathBuf,

    /// Configuration file to compare against the baseline
    #[arg(value_name = "NEW")]
    pub new: PathBuf,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    pub format: DiffFormat,
}

/// Output format for diff results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiffFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for DiffFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(DiffFormat::Text),
            "json" => Ok(DiffFormat::Json),
            _ => Err(format!("Invalid format '{}'. Valid options: text, json", s)),
        }
    }
}

impl std::fmt::Display for DiffFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffFormat::Text => write!(f, "text"),
            DiffFormat::Json => write!(f, "json"),
        }
    }
}

pub async fn run(args: &DiffArgs, out: &mut dyn Write) -> anyhow::Result<bool> {
    let old = load_file(&args.old)
        .await
        .with_context(|| format!("Failed to load {}", args.old.display()))?;
    let new = load_file(&args.new)
        .await
        .with_context(|| format!("Failed to load {}", args.new.display()))?;

    let report = ConfigDiff::new(
        args.old.display().to_string(),
        args.new.display().to_string(),
        &old,
        &new,
    );

    match args.format {
        DiffFormat::Text => write!(out, "{}", report)?,
        DiffFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?,
    }
    Ok(true)
}
