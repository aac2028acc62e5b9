//! Preview subcommand
//!
//! Merges the given sources over the built-in defaults, lists the template
//! variables referenced by the merged tree, and prints the resolved result.

use crate::config::template::{RuntimeInfo, TemplateContext, collect_variables, resolve_tree};
use crate::config::{
    ConfigManager, ConfigSource, EnvAdapter, Environment, ManagerOptions, presets,
};
use clap::Args;
use std::io::Write;

/// Arguments for the preview subcommand
#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Files or http(s) URLs, lowest priority first (default: the tier preset)
    #[arg(value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Deployment tier (default: PORTFOLIO_ENV)
    #[arg(short, long, value_name = "TIER")]
    pub env: Option<Environment>,
}

impl PreviewArgs {
    /// Sources in priority order, above the built-in defaults.
    pub fn to_sources(&self) -> Option<Vec<ConfigSource>> {
        if self.sources.is_empty() {
            return None;
        }
        let mut sources = vec![ConfigSource::builtin(0)];
        for (index, locator) in self.sources.iter().enumerate() {
            let priority = (index as i32 + 1) * 10;
            let source = if locator.starts_with("http://") || locator.starts_with("https://") {
                ConfigSource::url(locator.clone(), priority)
            } else {
                ConfigSource::file(locator, priority)
            };
            sources.push(source);
        }
        Some(sources)
    }
}

/// Fails only when none of the requested sources could be read.
pub async fn run(args: &PreviewArgs, env: &EnvAdapter, out: &mut dyn Write) -> anyhow::Result<bool> {
    let environment = args.env.unwrap_or_else(|| env.environment());
    let requested = args.to_sources();

    let mut options = ManagerOptions::default()
        .with_env(env.clone())
        .with_environment(environment)
        .with_templates(false)
        .with_validation(false);
    if let Some(sources) = requested.clone() {
        options = options.with_sources(sources);
    }

    let manager = ConfigManager::new(options);
    let loaded = manager.initialize().await?;

    if requested.is_some() && !loaded.sources.iter().any(|s| s.priority > 0) {
        writeln!(out, "error: none of the sources could be read")?;
        for warning in &loaded.warnings {
            writeln!(out, "  {}", warning)?;
        }
        return Ok(false);
    }

    let raw = &loaded.config;
    let variables = collect_variables(raw);
    writeln!(out, "Template variables ({}):", variables.len())?;
    for name in &variables {
        writeln!(out, "  {}", name)?;
    }

    let runtime = RuntimeInfo::new(env!("CARGO_PKG_VERSION"), environment);
    let ctx = TemplateContext::for_config(raw, env, &runtime, &presets::custom_vars(environment));
    let (resolved, report) = resolve_tree(raw, &ctx);

    if !report.unresolved.is_empty() {
        writeln!(out, "Unresolved expressions ({}):", report.unresolved.len())?;
        for expr in &report.unresolved {
            writeln!(out, "  {}", expr)?;
        }
    }

    writeln!(out, "Resolved configuration:")?;
    writeln!(out, "{}", serde_json::to_string_pretty(&resolved)?)?;
    Ok(true)
}
