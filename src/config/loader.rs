//! Source loader with per-source caching and error isolation.
//!
//! Fetches raw candidate trees from files, URLs, the environment, or the
//! built-in defaults. Cacheable sources are memoized by source key until their
//! TTL expires or they are invalidated.

use super::defaults::default_config;
use super::env::EnvAdapter;
use super::types::{CacheEntry, ConfigSource, SourceKind};
use crate::error::{ConfigError, ConfigResult};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Millisecond wall clock, injectable so TTL expiry can be tested.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self(AtomicU64::new(start_millis))
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters describing loader activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Underlying reads (file, HTTP, environment, defaults)
    pub fetches: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Outcome of loading one source.
#[derive(Debug)]
pub enum LoadStatus {
    Loaded(Value),
    /// Optional source that was not present
    Skipped(String),
    Failed(ConfigError),
}

#[derive(Debug)]
pub struct SourceLoad {
    pub source: ConfigSource,
    pub status: LoadStatus,
}

/// Loads raw configuration trees from heterogeneous sources.
pub struct SourceLoader {
    env: EnvAdapter,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    fetches: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl std::fmt::Debug for SourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLoader")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SourceLoader {
    pub fn new(env: EnvAdapter) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client ({}); using defaults", e);
                reqwest::Client::new()
            });
        Self {
            env,
            http,
            clock: Arc::new(SystemClock),
            cache: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// Replace the clock (builder pattern).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn env(&self) -> &EnvAdapter {
        &self.env
    }

    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            fetches: self.fetches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Load one source, serving a fresh cache entry when available.
    pub async fn load_from_source(&self, source: &ConfigSource) -> ConfigResult<Value> {
        let key = source.key();

        if source.cacheable {
            let now = self.clock.now_millis();
            let mut cache = self.lock_cache();
            match cache.get(&key) {
                Some(entry) if entry.is_fresh(now) => {
                    self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(source = %key, "Serving configuration source from cache");
                    return Ok(entry.value.clone());
                }
                Some(_) => {
                    debug!(source = %key, "Cached configuration source expired");
                    cache.remove(&key);
                }
                None => {}
            }
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let value = self.fetch(source).await?;

        if source.cacheable {
            let entry = CacheEntry {
                value: value.clone(),
                captured_at_millis: self.clock.now_millis(),
                ttl_millis: source.ttl_millis,
                source_key: key.clone(),
            };
            self.lock_cache().insert(key, entry);
        }

        Ok(value)
    }

    /// Load every source concurrently and return the outcomes in ascending
    /// priority order (declaration order among equal priorities), regardless
    /// of completion order. Failures are isolated per source.
    pub async fn load_all(&self, sources: &[ConfigSource]) -> Vec<SourceLoad> {
        let futures = sources.iter().map(|source| async move {
            let status = match self.load_from_source(source).await {
                Ok(value) => LoadStatus::Loaded(value),
                Err(ConfigError::Io {
                    source: ref err, ..
                })
                    if source.optional && err.kind() == ErrorKind::NotFound =>
                {
                    debug!(source = %source.key(), "Optional configuration source not present");
                    LoadStatus::Skipped(format!("optional source {} not found", source.key()))
                }
                Err(e) => {
                    warn!(source = %source.key(), "Failed to load configuration source: {}", e);
                    LoadStatus::Failed(e)
                }
            };
            SourceLoad {
                source: source.clone(),
                status,
            }
        });

        let mut outcomes = join_all(futures).await;
        outcomes.sort_by_key(|outcome| outcome.source.priority);
        outcomes
    }

    /// Drop the cache entry for `key`. Returns whether one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock_cache().remove(key).is_some()
    }

    /// Drop cache entries of file sources pointing at `path`.
    pub fn invalidate_path(&self, path: &Path) -> usize {
        let target = normalize(path);
        let mut cache = self.lock_cache();
        let before = cache.len();
        cache.retain(|_, entry| {
            match entry.source_key.strip_prefix("file:") {
                Some(locator) => normalize(Path::new(locator)) != target,
                None => true,
            }
        });
        before - cache.len()
    }

    pub fn clear_cache(&self) {
        let mut cache = self.lock_cache();
        if !cache.is_empty() {
            info!(entries = cache.len(), "Clearing configuration source cache");
        }
        cache.clear();
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fetch(&self, source: &ConfigSource) -> ConfigResult<Value> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        match source.kind {
            SourceKind::File => load_file(Path::new(&source.locator)).await,
            SourceKind::Url => self.load_url(&source.locator).await,
            SourceKind::Environment => self.env.config_overlay(),
            SourceKind::Default => Ok(default_config()),
        }
    }

    async fn load_url(&self, url: &str) -> ConfigResult<Value> {
        let http_err = |message: String| ConfigError::Http {
            url: url.to_string(),
            message,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| http_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(http_err(format!("unexpected status {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ConfigError::parse(url, e))?;
        require_object(body, url)
    }
}

/// Structured file formats accepted by file sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("json") => Ok(FileFormat::Json),
            Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn parse(self, content: &str, origin: &Path) -> ConfigResult<Value> {
        let value = match self {
            FileFormat::Json => serde_json::from_str::<Value>(content)
                .map_err(|e| ConfigError::parse(origin.display(), e))?,
            FileFormat::Yaml => serde_yaml::from_str::<Value>(content)
                .map_err(|e| ConfigError::parse(origin.display(), e))?,
        };
        require_object(value, &origin.display().to_string())
    }

    pub fn render(self, value: &Value) -> ConfigResult<String> {
        match self {
            FileFormat::Json => serde_json::to_string_pretty(value)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .map_err(|e| ConfigError::parse("json output", e)),
            FileFormat::Yaml => {
                serde_yaml::to_string(value).map_err(|e| ConfigError::parse("yaml output", e))
            }
        }
    }
}

/// Read and parse a structured configuration file.
pub async fn load_file(path: &Path) -> ConfigResult<Value> {
    let format = FileFormat::from_path(path)?;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    format.parse(&content, path)
}

fn require_object(value: Value, origin: &str) -> ConfigResult<Value> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(ConfigError::parse(
            origin,
            "expected an object at the top level",
        ))
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn loader_with_clock(clock: Arc<ManualClock>) -> SourceLoader {
        SourceLoader::new(EnvAdapter::from_map(Default::default())).with_clock(clock)
    }

    #[test]
    fn test_file_format_detection() {
        assert_eq!(FileFormat::from_path(Path::new("a.json")).unwrap(), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("a.YML")).unwrap(), FileFormat::Yaml);
        assert!(matches!(
            FileFormat::from_path(Path::new("site.config.js")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_load_json_and_yaml_files() {
        let temp = TempDir::new().unwrap();
        let json_path = temp.path().join("site.json");
        let yaml_path = temp.path().join("site.yaml");
        std::fs::write(&json_path, r##"{"theme": {"primaryColor": "#111"}}"##).unwrap();
        std::fs::write(&yaml_path, "theme:\n  primaryColor: \"#222\"\n").unwrap();

        assert_eq!(
            load_file(&json_path).await.unwrap(),
            json!({"theme": {"primaryColor": "#111"}})
        );
        assert_eq!(
            load_file(&yaml_path).await.unwrap(),
            json!({"theme": {"primaryColor": "#222"}})
        );
    }

    #[tokio::test]
    async fn test_non_object_root_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("list.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(load_file(&path).await, Err(ConfigError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_cache_ttl() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("site.json");
        std::fs::write(&path, r#"{"v": 1}"#).unwrap();

        let clock = Arc::new(ManualClock::new(1_000));
        let loader = loader_with_clock(clock.clone());
        let source = ConfigSource::file(&path, 10).cached(5_000);

        assert_eq!(loader.load_from_source(&source).await.unwrap(), json!({"v": 1}));
        std::fs::write(&path, r#"{"v": 2}"#).unwrap();

        clock.advance(4_999);
        assert_eq!(loader.load_from_source(&source).await.unwrap(), json!({"v": 1}));
        assert_eq!(loader.stats().fetches, 1);
        assert_eq!(loader.stats().cache_hits, 1);

        clock.advance(1);
        assert_eq!(loader.load_from_source(&source).await.unwrap(), json!({"v": 2}));
        assert_eq!(loader.stats().fetches, 2);
    }

    #[tokio::test]
    async fn test_uncacheable_source_always_fetches() {
        let loader = loader_with_clock(Arc::new(ManualClock::new(0)));
        let source = ConfigSource::builtin(0);
        loader.load_from_source(&source).await.unwrap();
        loader.load_from_source(&source).await.unwrap();
        assert_eq!(loader.stats().fetches, 2);
        assert_eq!(loader.stats().cache_misses, 0);
    }

    #[tokio::test]
    async fn test_invalidate_path_forces_refetch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("site.json");
        std::fs::write(&path, r#"{"v": 1}"#).unwrap();

        let loader = loader_with_clock(Arc::new(ManualClock::new(0)));
        let source = ConfigSource::file(&path, 10).cached(0);
        loader.load_from_source(&source).await.unwrap();

        std::fs::write(&path, r#"{"v": 2}"#).unwrap();
        assert_eq!(loader.invalidate_path(&path), 1);
        assert_eq!(loader.load_from_source(&source).await.unwrap(), json!({"v": 2}));
        assert!(loader.invalidate(&source.key()));
        assert!(!loader.invalidate(&source.key()));
    }

    #[tokio::test]
    async fn test_load_all_orders_by_priority_and_isolates_failures() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good.json");
        std::fs::write(&good, r#"{"a": 1}"#).unwrap();

        let sources = vec![
            ConfigSource::file(&good, 20),
            ConfigSource::file(temp.path().join("missing.json"), 5),
            ConfigSource::file(temp.path().join("optional.json"), 15).optional(),
            ConfigSource::builtin(0),
        ];
        let loader = loader_with_clock(Arc::new(ManualClock::new(0)));
        let outcomes = loader.load_all(&sources).await;

        let priorities: Vec<i32> = outcomes.iter().map(|o| o.source.priority).collect();
        assert_eq!(priorities, vec![0, 5, 15, 20]);
        assert!(matches!(outcomes[0].status, LoadStatus::Loaded(_)));
        assert!(matches!(outcomes[1].status, LoadStatus::Failed(ConfigError::Io { .. })));
        assert!(matches!(outcomes[2].status, LoadStatus::Skipped(_)));
        assert!(matches!(&outcomes[3].status, LoadStatus::Loaded(v) if v == &json!({"a": 1})));
    }
}
