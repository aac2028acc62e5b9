//! Read-only derived views over the live configuration, plus list mutation helpers.
//!
//! Every helper takes the [`ConfigManager`] explicitly. Mutations rewrite a
//! list through [`ConfigManager::update_at`], so the read and the write happen
//! under the same write gate and pass through validation like any other write.

pub mod features;
pub mod portfolio;
pub mod skills;
pub mod timeline;

use crate::config::{ConfigManager, LoadedConfig, SetOptions, merge_into};
use crate::error::{ConfigError, ConfigIssue, ConfigResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// Typed entries of the list at `path`. Malformed entries are skipped.
pub(crate) fn read_list<T: DeserializeOwned>(manager: &ConfigManager, path: &str) -> Vec<T> {
    raw_list(manager, path)
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(path = %path, index, "Skipping malformed entry: {}", e);
                None
            }
        })
        .collect()
}

fn raw_list(manager: &ConfigManager, path: &str) -> Vec<Value> {
    list_items(manager.get(path).as_ref())
}

fn list_items(current: Option<&Value>) -> Vec<Value> {
    match current {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn key_of<'a>(entry: &'a Value, key_field: &str) -> Option<&'a str> {
    entry.get(key_field).and_then(Value::as_str)
}

/// Rewrite the list at `path` under the manager's write gate.
async fn edit_list<F>(manager: &ConfigManager, path: &str, edit: F) -> ConfigResult<LoadedConfig>
where
    F: FnOnce(&mut Vec<Value>) -> ConfigResult<()>,
{
    let path = manager.path(path)?;
    manager
        .update_at(
            &path,
            |current| {
                let mut items = list_items(current);
                edit(&mut items)?;
                Ok(Value::Array(items))
            },
            SetOptions::default(),
        )
        .await
}

/// Append `entry`, rejecting a duplicate `key_field` value.
pub(crate) async fn insert_entry<T: Serialize>(
    manager: &ConfigManager,
    path: &str,
    key_field: &str,
    entry: &T,
) -> ConfigResult<LoadedConfig> {
    let entry = serde_json::to_value(entry).map_err(|e| ConfigError::parse(path, e))?;
    let Some(key) = key_of(&entry, key_field).map(str::to_string) else {
        return Err(ConfigError::Validation(vec![ConfigIssue::new(
            path,
            format!("entry has no '{}'", key_field),
        )]));
    };

    edit_list(manager, path, |items| {
        if items.iter().any(|item| key_of(item, key_field) == Some(key.as_str())) {
            return Err(ConfigError::Validation(vec![ConfigIssue::new(
                path,
                format!("an entry with {} '{}' already exists", key_field, key),
            )]));
        }
        items.push(entry);
        Ok(())
    })
    .await
}

/// Deep-merge `patch` into the entry whose `key_field` equals `key`.
pub(crate) async fn update_entry(
    manager: &ConfigManager,
    path: &str,
    key_field: &str,
    kind: &'static str,
    key: &str,
    patch: Value,
) -> ConfigResult<LoadedConfig> {
    edit_list(manager, path, |items| {
        let entry = items
            .iter_mut()
            .find(|item| key_of(item, key_field) == Some(key))
            .ok_or_else(|| ConfigError::not_found(kind, key))?;
        merge_into(entry, patch);
        Ok(())
    })
    .await
}

/// Remove the entry whose `key_field` equals `key`.
pub(crate) async fn remove_entry(
    manager: &ConfigManager,
    path: &str,
    key_field: &str,
    kind: &'static str,
    key: &str,
) -> ConfigResult<LoadedConfig> {
    edit_list(manager, path, |items| {
        let before = items.len();
        items.retain(|item| key_of(item, key_field) != Some(key));
        if items.len() == before {
            return Err(ConfigError::not_found(kind, key));
        }
        Ok(())
    })
    .await
}
