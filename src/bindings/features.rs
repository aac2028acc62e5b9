//! Feature flags under `features.*`.

use crate::config::{ConfigManager, ConfigPath, LoadedConfig, SetOptions};
use crate::error::ConfigResult;
use serde_json::Value;

/// Whether `name` is enabled. Missing or non-boolean flags read as `false`.
pub fn is_enabled(manager: &ConfigManager, name: &str) -> bool {
    let path = ConfigPath::from_segments(["features", name]);
    manager
        .get_at(&path)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Names of enabled flags, sorted.
pub fn enabled_features(manager: &ConfigManager) -> Vec<String> {
    let mut names: Vec<String> = match manager.get("features") {
        Some(Value::Object(flags)) => flags
            .into_iter()
            .filter(|(_, v)| v.as_bool() == Some(true))
            .map(|(name, _)| name)
            .collect(),
        _ => Vec::new(),
    };
    names.sort();
    names
}

pub async fn set_feature(
    manager: &ConfigManager,
    name: &str,
    enabled: bool,
) -> ConfigResult<LoadedConfig> {
    let path = ConfigPath::from_segments(["features", name]);
    manager
        .set_at(&path, Value::Bool(enabled), SetOptions::default())
        .await
}
