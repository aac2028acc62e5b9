//! Configuration manager: owns the live configuration and every write to it.
//!
//! A resolution pass loads all sources, merges them in ascending priority
//! order (the tier overlay sits directly above built-in defaults), resolves
//! templates, then validates. All writers (`initialize`, `reload`, `set`,
//! `update_config`, hot reload) go through one async write gate, and each
//! stored [`LoadedConfig`] gets the next `version`. Readers never block.

use super::defaults::{SENSITIVE_PATHS, default_config, tier_overlay};
use super::diff::diff;
use super::env::EnvAdapter;
use super::loader::{Clock, LoadStatus, SourceLoader, SystemClock};
use super::merge::deep_merge_all;
use super::path::ConfigPath;
use super::presets;
use super::schema::Schema;
use super::template::{RuntimeInfo, TemplateContext, resolve_tree, tree_contains_template};
use super::types::{
    ConfigChange, ConfigSource, Environment, LoadedConfig, ManagerState, SourceKind,
};
use super::watcher::{DEFAULT_DEBOUNCE, SourceChangeEvent, SourceWatcher, start_source_watcher};
use crate::error::{ConfigError, ConfigIssue, ConfigResult};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Callback invoked with `(new_config, old_config, changes)`.
pub type ChangeListener = Arc<dyn Fn(&Value, &Value, &[ConfigChange]) + Send + Sync>;

type ListenerList = Mutex<Vec<(u64, ChangeListener)>>;

/// How a manager selects and processes its sources.
#[derive(Clone)]
pub struct ManagerOptions {
    /// Explicit sources; `None` selects the tier preset
    pub sources: Option<Vec<ConfigSource>>,
    /// Tier; `None` reads `PORTFOLIO_ENV`
    pub environment: Option<Environment>,
    /// Preset directory; `None` reads `PORTFOLIO_CONFIG_DIR`
    pub base_dir: Option<PathBuf>,
    pub process_templates: bool,
    pub validate: bool,
    pub custom_vars: Map<String, Value>,
    pub app_version: String,
    pub watch: bool,
    pub debounce: Duration,
    pub env: EnvAdapter,
    pub clock: Arc<dyn Clock>,
    pub schema: Schema,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            sources: None,
            environment: None,
            base_dir: None,
            process_templates: true,
            validate: true,
            custom_vars: Map::new(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            watch: false,
            debounce: DEFAULT_DEBOUNCE,
            env: EnvAdapter::process(),
            clock: Arc::new(SystemClock),
            schema: Schema::site(),
        }
    }
}

impl std::fmt::Debug for ManagerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerOptions")
            .field("sources", &self.sources)
            .field("environment", &self.environment)
            .field("base_dir", &self.base_dir)
            .field("process_templates", &self.process_templates)
            .field("validate", &self.validate)
            .field("watch", &self.watch)
            .finish_non_exhaustive()
    }
}

impl ManagerOptions {
    pub fn with_sources(mut self, sources: Vec<ConfigSource>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_templates(mut self, enabled: bool) -> Self {
        self.process_templates = enabled;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    pub fn with_custom_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_vars.insert(name.into(), value.into());
        self
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    pub fn with_watch(mut self, debounce: Duration) -> Self {
        self.watch = true;
        self.debounce = debounce;
        self
    }

    pub fn with_env(mut self, env: EnvAdapter) -> Self {
        self.env = env;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }
}

/// Per-call options for [`ConfigManager::set`] and [`ConfigManager::update_config`].
#[derive(Debug, Clone, Copy)]
pub struct SetOptions {
    /// Deep-merge object values into an existing object instead of replacing it
    pub merge: bool,
    pub process_templates: bool,
    pub validate: bool,
    pub notify: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            merge: false,
            process_templates: true,
            validate: true,
            notify: true,
        }
    }
}

impl SetOptions {
    pub fn merged() -> Self {
        Self {
            merge: true,
            ..Self::default()
        }
    }

    pub fn silent(mut self) -> Self {
        self.notify = false;
        self
    }

    pub fn unvalidated(mut self) -> Self {
        self.validate = false;
        self
    }
}

/// Removes its listener when [`unsubscribe`](Self::unsubscribe) is called.
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl ListenerHandle {
    /// Returns whether the listener was still registered.
    pub fn unsubscribe(self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let mut list = lock(&listeners);
        let before = list.len();
        list.retain(|(id, _)| *id != self.id);
        list.len() != before
    }
}

/// Sanitised configuration plus load metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedConfig {
    pub config: Value,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub version: u64,
    pub environment: Environment,
    pub is_valid: bool,
    pub load_timestamp: DateTime<Utc>,
    pub exported_at: DateTime<Utc>,
    pub sources: Vec<String>,
    pub errors: Vec<ConfigIssue>,
    pub warnings: Vec<String>,
}

struct WatchState {
    _watcher: SourceWatcher,
    task: tokio::task::JoinHandle<()>,
}

/// Owner of the live configuration. Construct once and share as `Arc<ConfigManager>`.
pub struct ConfigManager {
    environment: Environment,
    sources: Vec<ConfigSource>,
    process_templates: bool,
    validate: bool,
    custom_vars: Map<String, Value>,
    watch: bool,
    debounce: Duration,
    env: EnvAdapter,
    schema: Schema,
    runtime: RuntimeInfo,
    loader: SourceLoader,
    current: ArcSwap<LoadedConfig>,
    state: Mutex<ManagerState>,
    write_gate: tokio::sync::Mutex<()>,
    version: AtomicU64,
    listeners: Arc<ListenerList>,
    next_listener_id: AtomicU64,
    watcher: Mutex<Option<WatchState>>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("environment", &self.environment)
            .field("state", &self.state())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

impl ConfigManager {
    pub fn new(options: ManagerOptions) -> Self {
        let environment = options
            .environment
            .unwrap_or_else(|| options.env.environment());
        let sources = options.sources.unwrap_or_else(|| {
            let dir = options
                .base_dir
                .clone()
                .unwrap_or_else(|| presets::config_dir(&options.env));
            presets::sources_for(environment, &dir, &options.env)
        });

        let mut custom_vars = presets::custom_vars(environment);
        custom_vars.extend(options.custom_vars);

        let loader = SourceLoader::new(options.env.clone()).with_clock(options.clock);

        Self {
            environment,
            sources,
            process_templates: options.process_templates,
            validate: options.validate,
            custom_vars,
            watch: options.watch,
            debounce: options.debounce,
            runtime: RuntimeInfo::new(options.app_version, environment),
            env: options.env,
            schema: options.schema,
            loader,
            current: ArcSwap::from_pointee(LoadedConfig::empty(environment)),
            state: Mutex::new(ManagerState::Uninitialized),
            write_gate: tokio::sync::Mutex::new(()),
            version: AtomicU64::new(0),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
            watcher: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Build, initialize, and start watching when the options ask for it.
    pub async fn start(options: ManagerOptions) -> ConfigResult<Arc<Self>> {
        let manager = Arc::new(Self::new(options));
        manager.initialize().await?;
        if manager.watch {
            manager.start_watching()?;
        }
        Ok(manager)
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn loader(&self) -> &SourceLoader {
        &self.loader
    }

    pub fn state(&self) -> ManagerState {
        *lock(&self.state)
    }

    /// Version of the live configuration; 0 before the first pass.
    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// Snapshot of the live configuration.
    pub fn current(&self) -> Arc<LoadedConfig> {
        self.current.load_full()
    }

    /// Run a resolution pass and store the result.
    ///
    /// Only fails once the manager is destroyed. An invalid or fallback result
    /// is stored and returned with `is_valid == false`.
    pub async fn initialize(&self) -> ConfigResult<LoadedConfig> {
        self.ensure_alive()?;
        let _gate = self.write_gate.lock().await;
        self.ensure_alive()?;

        self.set_state(ManagerState::Loading);
        let loaded = self.resolve().await;
        let stored = self.store(loaded)?;
        info!(
            version = stored.version,
            environment = %self.environment,
            sources = stored.sources.len(),
            valid = stored.is_valid,
            "Configuration initialized"
        );
        Ok(stored)
    }

    /// Re-run the resolution pass, diff against the live tree, and notify.
    ///
    /// When the new pass is invalid and the live configuration is valid, the
    /// live one is kept and the failed pass is returned for inspection.
    pub async fn reload(&self) -> ConfigResult<LoadedConfig> {
        self.ensure_alive()?;
        let _gate = self.write_gate.lock().await;
        self.ensure_alive()?;

        let previous = self.current.load_full();
        self.set_state(ManagerState::Reloading);
        let loaded = self.resolve().await;

        if !loaded.is_valid && previous.is_valid {
            self.ensure_alive()?;
            warn!(
                errors = loaded.errors.len(),
                "Reloaded configuration is invalid; keeping version {}", previous.version
            );
            self.set_state(ManagerState::Valid);
            return Ok(loaded);
        }

        let stored = self.store(loaded)?;
        let changes = diff(&previous.config, &stored.config);
        info!(
            version = stored.version,
            changes = changes.len(),
            valid = stored.is_valid,
            "Configuration reloaded"
        );
        self.notify(&stored.config, &previous.config, &changes);
        Ok(stored)
    }

    /// Value at a dotted path, or `None` when any segment is missing.
    pub fn get(&self, path: &str) -> Option<Value> {
        match ConfigPath::parse(path) {
            Ok(path) => self.get_at(&path),
            Err(e) => {
                debug!("Lookup with malformed path: {}", e);
                None
            }
        }
    }

    pub fn get_at(&self, path: &ConfigPath) -> Option<Value> {
        path.lookup(&self.current.load().config).cloned()
    }

    /// Value at `path`, or `default` when any segment is missing.
    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).unwrap_or(default)
    }

    /// Deserialize the subtree at `path`.
    pub fn get_typed<T: DeserializeOwned>(&self, path: &str) -> ConfigResult<Option<T>> {
        let path = self.path(path)?;
        self.get_at(&path)
            .map(|value| {
                serde_json::from_value(value).map_err(|e| ConfigError::parse(&path, e))
            })
            .transpose()
    }

    /// Parse and check a dotted path against the schema.
    pub fn path(&self, dotted: &str) -> ConfigResult<ConfigPath> {
        self.schema.resolve_path(dotted)
    }

    /// Write `value` at a dotted path. See [`set_at`](Self::set_at).
    pub async fn set(&self, path: &str, value: Value, options: SetOptions) -> ConfigResult<LoadedConfig> {
        let path = self.path(path)?;
        self.set_at(&path, value, options).await
    }

    /// Write `value` at `path`. See [`update_at`](Self::update_at).
    pub async fn set_at(
        &self,
        path: &ConfigPath,
        value: Value,
        options: SetOptions,
    ) -> ConfigResult<LoadedConfig> {
        self.update_at(path, |_| Ok(value), options).await
    }

    /// Read-modify-write of the value at `path` under the write gate.
    ///
    /// `update` sees the live value (or `None`) and returns the value to write.
    /// Templates in the written value are resolved against the updated tree;
    /// the rest of the tree is left as stored. A failed validation leaves the
    /// live configuration untouched and returns [`ConfigError::Validation`].
    pub async fn update_at<F>(
        &self,
        path: &ConfigPath,
        update: F,
        options: SetOptions,
    ) -> ConfigResult<LoadedConfig>
    where
        F: FnOnce(Option<&Value>) -> ConfigResult<Value>,
    {
        self.ensure_alive()?;
        let _gate = self.write_gate.lock().await;
        self.ensure_alive()?;

        let previous = self.current.load_full();
        let value = update(path.lookup(&previous.config))?;

        let mut tree = previous.config.clone();
        let mut warnings = Vec::new();
        if options.process_templates && tree_contains_template(&value) {
            path.insert(&mut tree, value.clone(), options.merge)?;
            let (resolved, report) = self.resolve_templates(&value, &tree);
            tree = previous.config.clone();
            path.insert(&mut tree, resolved, options.merge)?;
            warnings = report;
        } else {
            path.insert(&mut tree, value, options.merge)?;
        }

        let is_valid = if options.validate {
            let outcome = self.schema.validate(&tree);
            if !outcome.success {
                warn!(
                    path = %path,
                    errors = outcome.errors.len(),
                    "Rejected configuration change; keeping version {}", previous.version
                );
                return Err(ConfigError::Validation(outcome.errors));
            }
            tree = outcome.data.unwrap_or(tree);
            true
        } else {
            previous.is_valid
        };

        let stored = self.store(LoadedConfig {
            config: tree,
            sources: previous.sources.clone(),
            load_timestamp: Utc::now(),
            is_valid,
            errors: if is_valid { Vec::new() } else { previous.errors.clone() },
            warnings,
            environment: self.environment,
            version: 0,
        })?;

        let changes = diff(&previous.config, &stored.config);
        debug!(path = %path, version = stored.version, changes = changes.len(), "Configuration updated");
        if options.notify {
            self.notify(&stored.config, &previous.config, &changes);
        }
        Ok(stored)
    }

    /// Apply `partial` at the root, merged when `options.merge` is set.
    pub async fn update_config(&self, partial: Value, options: SetOptions) -> ConfigResult<LoadedConfig> {
        self.set_at(&ConfigPath::root(), partial, options).await
    }

    /// Register a listener for every stored mutation or reload.
    pub fn on_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&Value, &Value, &[ConfigChange]) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(listener)));
        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Copy of the live configuration with sensitive fields removed.
    pub fn export(&self) -> ExportedConfig {
        let current = self.current.load_full();
        let mut config = current.config.clone();
        for dotted in SENSITIVE_PATHS {
            if let Ok(path) = ConfigPath::parse(dotted) {
                path.remove(&mut config);
            }
        }
        ExportedConfig {
            config,
            metadata: ExportMetadata {
                version: current.version,
                environment: current.environment,
                is_valid: current.is_valid,
                load_timestamp: current.load_timestamp,
                exported_at: Utc::now(),
                sources: current.sources.iter().map(ConfigSource::key).collect(),
                errors: current.errors.clone(),
                warnings: current.warnings.clone(),
            },
        }
    }

    /// Watch file sources and reload when they change.
    ///
    /// Changed files have their cache entries invalidated before the reload.
    /// Does nothing when there are no file sources or a watcher is running.
    pub fn start_watching(self: &Arc<Self>) -> ConfigResult<()> {
        self.ensure_alive()?;
        let mut slot = lock(&self.watcher);
        if slot.is_some() {
            return Ok(());
        }

        let files: Vec<PathBuf> = self
            .sources
            .iter()
            .filter_map(ConfigSource::file_path)
            .collect();
        if files.is_empty() {
            info!("No file sources to watch");
            return Ok(());
        }

        let (watcher, mut events) = start_source_watcher(&files, self.debounce)?;
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                match event {
                    SourceChangeEvent::Changed(paths) => {
                        for path in &paths {
                            manager.loader.invalidate_path(path);
                        }
                        info!("Configuration files changed, reloading: {:?}", paths);
                        match manager.reload().await {
                            Ok(_) => {}
                            Err(ConfigError::Destroyed) => break,
                            Err(e) => error!("Hot reload failed: {}", e),
                        }
                    }
                    SourceChangeEvent::Error(message) => {
                        warn!("Configuration watcher error: {}", message);
                    }
                }
            }
            debug!("Hot reload task stopped");
        });

        *slot = Some(WatchState {
            _watcher: watcher,
            task,
        });
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        lock(&self.watcher).is_some()
    }

    /// Stop watching, drop listeners and cache, and refuse further writes.
    ///
    /// A pass still in flight when this is called is discarded instead of stored.
    pub fn destroy(&self) {
        {
            let mut state = lock(&self.state);
            if self.destroyed.swap(true, Ordering::SeqCst) {
                return;
            }
            *state = ManagerState::Destroyed;
            self.current
                .store(Arc::new(LoadedConfig::empty(self.environment)));
        }
        if let Some(watch) = lock(&self.watcher).take() {
            watch.task.abort();
        }
        lock(&self.listeners).clear();
        self.loader.clear_cache();
        info!("Configuration manager destroyed");
    }

    fn ensure_alive(&self) -> ConfigResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(ConfigError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, next: ManagerState) {
        let mut state = lock(&self.state);
        if *state != ManagerState::Destroyed {
            *state = next;
        }
    }

    /// Publish `loaded` as the next version. Destruction is checked under the
    /// state lock so a late pass cannot revive a destroyed manager.
    fn store(&self, mut loaded: LoadedConfig) -> ConfigResult<LoadedConfig> {
        let mut state = lock(&self.state);
        if self.destroyed.load(Ordering::SeqCst) {
            debug!("Discarding configuration pass finished after destroy");
            return Err(ConfigError::Destroyed);
        }
        loaded.version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        *state = if loaded.is_valid {
            ManagerState::Valid
        } else {
            ManagerState::Invalid
        };
        self.current.store(Arc::new(loaded.clone()));
        Ok(loaded)
    }

    /// One pass: load, merge, template, validate. Never fails.
    async fn resolve(&self) -> LoadedConfig {
        let outcomes = self.loader.load_all(&self.sources).await;

        let mut warnings = Vec::new();
        let mut failures = Vec::new();
        let mut layers = Vec::new();
        for outcome in outcomes {
            match outcome.status {
                LoadStatus::Loaded(value) => layers.push((outcome.source, value)),
                LoadStatus::Skipped(reason) => warnings.push(reason),
                LoadStatus::Failed(e) => {
                    let issue = ConfigIssue::new(outcome.source.key(), e.to_string());
                    warnings.push(issue.to_string());
                    failures.push(issue);
                }
            }
        }

        if layers.is_empty() {
            if failures.is_empty() {
                failures.push(ConfigIssue::new("", "no configuration source produced data"));
            }
            error!(
                failures = failures.len(),
                "Every configuration source failed; falling back to built-in defaults"
            );
            return LoadedConfig {
                config: default_config(),
                sources: Vec::new(),
                load_timestamp: Utc::now(),
                is_valid: false,
                errors: failures,
                warnings,
                environment: self.environment,
                version: 0,
            };
        }

        // The tier overlay goes directly above the built-in defaults.
        let overlay_at = layers
            .iter()
            .position(|(source, _)| source.kind != SourceKind::Default)
            .unwrap_or(layers.len());
        let mut sources = Vec::with_capacity(layers.len());
        let mut ordered = vec![Value::Object(Map::new())];
        for (index, (source, value)) in layers.into_iter().enumerate() {
            if index == overlay_at {
                ordered.push(tier_overlay(self.environment));
            }
            ordered.push(value);
            sources.push(source);
        }
        if overlay_at == sources.len() {
            ordered.push(tier_overlay(self.environment));
        }
        let mut merged = deep_merge_all(ordered);

        if self.process_templates {
            let (resolved, template_warnings) = self.resolve_templates(&merged, &merged);
            merged = resolved;
            warnings.extend(template_warnings);
        }

        let (config, is_valid, errors) = if self.validate {
            let outcome = self.schema.validate(&merged);
            if outcome.success {
                (outcome.data.unwrap_or(merged), true, Vec::new())
            } else {
                for issue in &outcome.errors {
                    warn!("Configuration issue: {}", issue);
                }
                (merged, false, outcome.errors)
            }
        } else {
            (merged, true, Vec::new())
        };

        LoadedConfig {
            config,
            sources,
            load_timestamp: Utc::now(),
            is_valid,
            errors,
            warnings,
            environment: self.environment,
            version: 0,
        }
    }

    /// Resolve `value` in the context of `tree`.
    fn resolve_templates(&self, value: &Value, tree: &Value) -> (Value, Vec<String>) {
        let ctx = TemplateContext::for_config(tree, &self.env, &self.runtime, &self.custom_vars);
        let (resolved, report) = resolve_tree(value, &ctx);
        for warning in &report.warnings {
            warn!("{}", warning);
        }
        (resolved, report.warnings)
    }

    fn notify(&self, new: &Value, old: &Value, changes: &[ConfigChange]) {
        let listeners: Vec<ChangeListener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(new, old, changes))).is_err() {
                error!("Configuration change listener panicked");
            }
        }
    }
}

impl Drop for ConfigManager {
    fn drop(&mut self) {
        if let Some(watch) = lock(&self.watcher).take() {
            watch.task.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
