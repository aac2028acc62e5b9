//! Core data types shared across the resolution pipeline.

use crate::error::ConfigIssue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Kind of configuration origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Structured file on disk (JSON or YAML)
    File,
    /// Remote document fetched over HTTP
    Url,
    /// Assembled from environment variables
    Environment,
    /// Built-in baseline tree
    Default,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::File => write!(f, "file"),
            SourceKind::Url => write!(f, "url"),
            SourceKind::Environment => write!(f, "environment"),
            SourceKind::Default => write!(f, "default"),
        }
    }
}

/// One origin of configuration data.
///
/// Higher `priority` wins on merge. Sources with equal priority are merged in
/// declaration order, so the later declaration wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSource {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub locator: String,
    pub priority: i32,
    #[serde(default)]
    pub cacheable: bool,
    /// Zero means a cached entry never expires until invalidated.
    #[serde(default)]
    pub ttl_millis: u64,
    /// A missing optional file is skipped with a warning instead of failing.
    #[serde(default)]
    pub optional: bool,
}

impl ConfigSource {
    fn new(kind: SourceKind, locator: impl Into<String>, priority: i32) -> Self {
        Self {
            kind,
            locator: locator.into(),
            priority,
            cacheable: false,
            ttl_millis: 0,
            optional: false,
        }
    }

    pub fn file(path: impl AsRef<Path>, priority: i32) -> Self {
        Self::new(
            SourceKind::File,
            path.as_ref().to_string_lossy().into_owned(),
            priority,
        )
    }

    pub fn url(url: impl Into<String>, priority: i32) -> Self {
        Self::new(SourceKind::Url, url, priority)
    }

    pub fn environment(priority: i32) -> Self {
        Self::new(SourceKind::Environment, "env", priority)
    }

    pub fn builtin(priority: i32) -> Self {
        Self::new(SourceKind::Default, "builtin", priority)
    }

    /// Memoize results of this source for `ttl_millis` (builder pattern).
    pub fn cached(mut self, ttl_millis: u64) -> Self {
        self.cacheable = true;
        self.ttl_millis = ttl_millis;
        self
    }

    /// Mark this source as optional (builder pattern).
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Cache key derived from the source kind and locator.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.locator)
    }

    /// Filesystem path for file sources.
    pub fn file_path(&self) -> Option<PathBuf> {
        match self.kind {
            SourceKind::File => Some(PathBuf::from(&self.locator)),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (priority {})", self.key(), self.priority)
    }
}

/// Memoized result of one source load.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub captured_at_millis: u64,
    pub ttl_millis: u64,
    pub source_key: String,
}

impl CacheEntry {
    /// Whether the entry may still be served at `now_millis`.
    pub fn is_fresh(&self, now_millis: u64) -> bool {
        self.ttl_millis == 0 || now_millis.saturating_sub(self.captured_at_millis) < self.ttl_millis
    }
}

/// Deployment tier selecting default overlays and source presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "staging" | "stage" | "preview" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            "test" | "testing" => Ok(Environment::Test),
            _ => Err(format!(
                "Invalid environment '{}'. Valid options: development, staging, production, test",
                s
            )),
        }
    }
}

/// Result of one resolution pass. Superseded, never mutated, by the next pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedConfig {
    pub config: Value,
    /// Sources that contributed to `config`, in merge order
    pub sources: Vec<ConfigSource>,
    pub load_timestamp: DateTime<Utc>,
    pub is_valid: bool,
    pub errors: Vec<ConfigIssue>,
    pub warnings: Vec<String>,
    pub environment: Environment,
    /// Monotonic stamp; bumped by every stored pass or mutation
    pub version: u64,
}

impl LoadedConfig {
    /// Placeholder held before the first `initialize()`.
    pub fn empty(environment: Environment) -> Self {
        Self {
            config: Value::Object(Default::default()),
            sources: Vec::new(),
            load_timestamp: Utc::now(),
            is_valid: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            environment,
            version: 0,
        }
    }
}

/// How a path differs between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Removed => write!(f, "removed"),
        }
    }
}

/// One fine-grained difference between two configuration trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChange {
    pub path: Vec<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub kind: ChangeKind,
}

impl ConfigChange {
    /// Dotted form of the path.
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

/// Lifecycle of a configuration manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerState {
    Uninitialized,
    Loading,
    Valid,
    Invalid,
    Reloading,
    Destroyed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_key_and_builders() {
        let source = ConfigSource::file("config/site.json", 10).cached(5_000).optional();
        assert_eq!(source.key(), "file:config/site.json");
        assert!(source.cacheable);
        assert!(source.optional);
        assert_eq!(source.ttl_millis, 5_000);
        assert_eq!(source.file_path(), Some(PathBuf::from("config/site.json")));
        assert_eq!(ConfigSource::environment(40).file_path(), None);
    }

    #[test]
    fn test_cache_entry_freshness() {
        let entry = CacheEntry {
            value: Value::Null,
            captured_at_millis: 1_000,
            ttl_millis: 500,
            source_key: "file:a.json".to_string(),
        };
        assert!(entry.is_fresh(1_000));
        assert!(entry.is_fresh(1_499));
        assert!(!entry.is_fresh(1_500));

        let forever = CacheEntry { ttl_millis: 0, ..entry };
        assert!(forever.is_fresh(u64::MAX));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Staging".parse::<Environment>().unwrap(), Environment::Staging);
        assert_eq!("TEST".parse::<Environment>().unwrap(), Environment::Test);
        assert!("qa".parse::<Environment>().is_err());
        assert_eq!(Environment::default(), Environment::Development);
    }

    #[test]
    fn test_source_serde_uses_type_field() {
        let json = serde_json::json!({
            "type": "url",
            "locator": "https://example.com/site.json",
            "priority": 25,
            "cacheable": true,
            "ttlMillis": 60000
        });
        let source: ConfigSource = serde_json::from_value(json).unwrap();
        assert_eq!(source.kind, SourceKind::Url);
        assert_eq!(source.ttl_millis, 60_000);
        assert!(!source.optional);
    }
}
