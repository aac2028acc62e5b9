//! Per-environment source lists.
//!
//! | Tier        | Sources (ascending priority)                                              |
//! |-------------|---------------------------------------------------------------------------|
//! | development | builtin, `site.json`?, `site.development.json`?, `site.local.json`?, env  |
//! | staging     | builtin, `site.json` (cached), `site.staging.json`?, remote URL, env      |
//! | production  | builtin, `site.json` (cached), `site.production.json`?, remote URL, env   |
//! | test        | builtin, `site.test.json`?                                                |
//!
//! `?` marks optional files. The remote URL comes from `PORTFOLIO_CONFIG_URL`
//! and is only added when set.

use super::env::EnvAdapter;
use super::types::{ConfigSource, Environment};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Directory holding site files when `PORTFOLIO_CONFIG_DIR` is unset.
pub const DEFAULT_CONFIG_DIR: &str = "config";
pub const CONFIG_DIR_VAR: &str = "PORTFOLIO_CONFIG_DIR";
pub const CONFIG_URL_VAR: &str = "PORTFOLIO_CONFIG_URL";

/// Base file name shared by every tier.
pub const BASE_FILE: &str = "site.json";

const FILE_TTL_MILLIS: u64 = 5 * 60 * 1000;
const REMOTE_TTL_MILLIS: u64 = 60 * 1000;

/// Resolve the configuration directory from the environment.
pub fn config_dir(env: &EnvAdapter) -> PathBuf {
    env.read(CONFIG_DIR_VAR, Some(DEFAULT_CONFIG_DIR), false)
        .ok()
        .flatten()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR))
}

/// Source list for `environment`, rooted at `dir`.
pub fn sources_for(environment: Environment, dir: &Path, env: &EnvAdapter) -> Vec<ConfigSource> {
    let tier_file = |tier: &str| dir.join(format!("site.{}.json", tier));
    let remote = env
        .read(CONFIG_URL_VAR, None, false)
        .ok()
        .flatten()
        .filter(|url| !url.trim().is_empty());

    match environment {
        Environment::Development => vec![
            ConfigSource::builtin(0),
            ConfigSource::file(dir.join(BASE_FILE), 10).optional(),
            ConfigSource::file(tier_file("development"), 20).optional(),
            ConfigSource::file(tier_file("local"), 30).optional(),
            ConfigSource::environment(40),
        ],
        Environment::Staging | Environment::Production => {
            let mut sources = vec![
                ConfigSource::builtin(0),
                ConfigSource::file(dir.join(BASE_FILE), 10).cached(FILE_TTL_MILLIS),
                ConfigSource::file(tier_file(environment.as_str()), 20).optional(),
            ];
            if let Some(url) = remote {
                sources.push(ConfigSource::url(url, 25).cached(REMOTE_TTL_MILLIS));
            }
            sources.push(ConfigSource::environment(40));
            sources
        }
        Environment::Test => vec![
            ConfigSource::builtin(0),
            ConfigSource::file(tier_file("test"), 10).optional(),
        ],
    }
}

/// Extra `custom.*` template variables contributed by the tier.
pub fn custom_vars(environment: Environment) -> Map<String, Value> {
    let mut vars = Map::new();
    if environment == Environment::Test {
        vars.insert("environment".to_string(), Value::from("test"));
    }
    vars
}
