//! Generate subcommand
//!
//! Writes the starter site document. The format follows the file extension.

use crate::config::FileFormat;
use crate::config::defaults::starter_document;
use anyhow::{Context, bail};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;

/// Arguments for the generate subcommand
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Output file (.json, .yaml or .yml)
    #[arg(value_name = "FILE")]
    pub path: PathBuf,

    /// Overwrite the file if it already exists
    #[arg(short, long)]
    pub force: bool,
}

pub fn run(args: &GenerateArgs, out: &mut dyn Write) -> anyhow::Result<bool> {
    if args.path.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        );
    }

    let format = FileFormat::from_path(&args.path)?;
    let content = format.render(&starter_document())?;

    if let Some(parent) = args.path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(&args.path, content)
        .with_context(|| format!("Failed to write {}", args.path.display()))?;

    writeln!(out, "Wrote starter configuration to {}", args.path.display())?;
    Ok(true)
}
