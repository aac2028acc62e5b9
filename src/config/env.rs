//! Environment adapter.
//!
//! Reads named variables through an [`EnvProvider`] with typed coercion and
//! assembles a config-shaped overlay from a fixed mapping table.
//!
//! Variables starting with [`PUBLIC_PREFIX`] are considered safe to expose to
//! the presentation layer; everything else is server/build-time only. This is
//! a naming convention the engine trusts, not an enforced boundary.

use super::merge::merge_into;
use super::path::ConfigPath;
use super::types::Environment;
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Prefix of variables readable by the presentation layer.
pub const PUBLIC_PREFIX: &str = "PORTFOLIO_PUBLIC_";

/// Variable selecting the deployment tier.
pub const ENV_TIER_VAR: &str = "PORTFOLIO_ENV";

/// JSON document merged at the root of the environment overlay.
pub const CONFIG_JSON_VAR: &str = "PORTFOLIO_CONFIG_JSON";

/// Comma-separated names that must be present for the environment source to load.
pub const REQUIRED_VARS_VAR: &str = "PORTFOLIO_REQUIRED_VARS";

/// Source of named variables.
pub trait EnvProvider: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;

    /// All variables as `(name, value)` pairs.
    fn vars(&self) -> Vec<(String, String)>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvProvider for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }
}

/// Fixed in-memory variables.
#[derive(Debug, Clone, Default)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable (builder pattern).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl EnvProvider for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// How a mapped variable is coerced before it lands in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    String,
    Bool,
    Number,
    List,
}

/// Environment variable to configuration path mapping.
pub const ENV_MAPPINGS: &[(&str, &str, VarKind)] = &[
    ("PORTFOLIO_PUBLIC_NAME", "personal.name", VarKind::String),
    ("PORTFOLIO_PUBLIC_TITLE", "personal.title", VarKind::String),
    ("PORTFOLIO_PUBLIC_EMAIL", "personal.email", VarKind::String),
    ("PORTFOLIO_PUBLIC_CONTACT_EMAIL", "contact.email", VarKind::String),
    ("PORTFOLIO_PUBLIC_SITE_URL", "seo.siteUrl", VarKind::String),
    ("PORTFOLIO_PUBLIC_SEO_KEYWORDS", "seo.keywords", VarKind::List),
    ("PORTFOLIO_PUBLIC_THEME_PRIMARY", "theme.primaryColor", VarKind::String),
    ("PORTFOLIO_PUBLIC_GA_ID", "analytics.googleAnalyticsId", VarKind::String),
    ("PORTFOLIO_PUBLIC_ENABLE_BLOG", "features.blog", VarKind::Bool),
    ("PORTFOLIO_PUBLIC_ENABLE_CHATBOT", "features.chatbot", VarKind::Bool),
    ("PORTFOLIO_PUBLIC_ENABLE_ANALYTICS", "features.analytics", VarKind::Bool),
    ("PORTFOLIO_PUBLIC_ENABLE_CONTACT_FORM", "features.contactForm", VarKind::Bool),
    ("PORTFOLIO_DEPLOY_TARGET", "deployment.target", VarKind::String),
    ("CHATBOT_API_ENDPOINT", "chatbot.apiEndpoint", VarKind::String),
    ("CHATBOT_API_KEY", "chatbot.apiKey", VarKind::String),
    ("SMTP_HOST", "contact.smtp.host", VarKind::String),
    ("SMTP_PORT", "contact.smtp.port", VarKind::Number),
    ("SMTP_USER", "contact.smtp.user", VarKind::String),
    ("SMTP_PASSWORD", "contact.smtp.password", VarKind::String),
];

/// Typed reader over an [`EnvProvider`].
#[derive(Clone)]
pub struct EnvAdapter {
    provider: Arc<dyn EnvProvider>,
    required: BTreeSet<String>,
}

impl Default for EnvAdapter {
    fn default() -> Self {
        Self::process()
    }
}

impl std::fmt::Debug for EnvAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvAdapter").finish_non_exhaustive()
    }
}

impl EnvAdapter {
    pub fn new(provider: Arc<dyn EnvProvider>) -> Self {
        Self {
            provider,
            required: BTreeSet::new(),
        }
    }

    /// Mark variables whose absence fails [`config_overlay`](Self::config_overlay).
    pub fn with_required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(names.into_iter().map(Into::into));
        self
    }

    /// Names marked with [`with_required`](Self::with_required) plus those listed
    /// in `PORTFOLIO_REQUIRED_VARS`.
    pub fn required_vars(&self) -> BTreeSet<String> {
        let mut names = self.required.clone();
        names.extend(self.read_array(REQUIRED_VARS_VAR, ','));
        names
    }

    pub fn process() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }

    pub fn from_map(vars: MapEnv) -> Self {
        Self::new(Arc::new(vars))
    }

    /// Read `name`, falling back to `fallback`.
    ///
    /// Fails with [`ConfigError::MissingRequired`] only when `required` is set
    /// and the variable is absent and no fallback was given.
    pub fn read(
        &self,
        name: &str,
        fallback: Option<&str>,
        required: bool,
    ) -> ConfigResult<Option<String>> {
        match self.provider.var(name) {
            Some(value) => Ok(Some(value)),
            None => match fallback {
                Some(fallback) => Ok(Some(fallback.to_string())),
                None if required => Err(ConfigError::MissingRequired(name.to_string())),
                None => Ok(None),
            },
        }
    }

    /// Read a required variable.
    pub fn require(&self, name: &str) -> ConfigResult<String> {
        self.provider
            .var(name)
            .ok_or_else(|| ConfigError::MissingRequired(name.to_string()))
    }

    /// `true/1/yes/on` (case-insensitive) are true; anything else present is false.
    pub fn read_bool(&self, name: &str, fallback: bool) -> bool {
        self.provider
            .var(name)
            .map(|v| parse_bool(&v))
            .unwrap_or(fallback)
    }

    pub fn read_number(&self, name: &str, fallback: f64) -> f64 {
        self.provider
            .var(name)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(fallback)
    }

    /// Split on `separator`, trim, and drop empty items.
    pub fn read_array(&self, name: &str, separator: char) -> Vec<String> {
        self.provider
            .var(name)
            .map(|v| split_list(&v, separator))
            .unwrap_or_default()
    }

    /// Parse a JSON variable; a parse failure logs a warning and yields the fallback.
    pub fn read_json(&self, name: &str, fallback: Value) -> Value {
        let Some(raw) = self.provider.var(name) else {
            return fallback;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(variable = %name, "Failed to parse JSON environment variable: {}", e);
                fallback
            }
        }
    }

    /// Deployment tier from `PORTFOLIO_ENV`, then `APP_ENV`, defaulting to development.
    pub fn environment(&self) -> Environment {
        let raw = self
            .provider
            .var(ENV_TIER_VAR)
            .or_else(|| self.provider.var("APP_ENV"));
        match raw {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{}; falling back to development", e);
                Environment::Development
            }),
            None => Environment::Development,
        }
    }

    /// Public variables with the prefix stripped, for the `env.*` template namespace.
    pub fn public_vars(&self) -> Map<String, Value> {
        let mut vars: Vec<(String, String)> = self
            .provider
            .vars()
            .into_iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(PUBLIC_PREFIX)
                    .filter(|short| !short.is_empty())
                    .map(|short| (short.to_string(), value))
            })
            .collect();
        vars.sort();
        vars.into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect()
    }

    /// Build a config-shaped overlay from the mapping table and `PORTFOLIO_CONFIG_JSON`.
    ///
    /// Fails with [`ConfigError::MissingRequired`] when a required variable is absent.
    pub fn config_overlay(&self) -> ConfigResult<Value> {
        let required = self.required_vars();
        for name in required
            .iter()
            .filter(|name| !ENV_MAPPINGS.iter().any(|(mapped, _, _)| *mapped == name.as_str()))
        {
            self.require(name)?;
        }

        let mut overlay = self.read_json(CONFIG_JSON_VAR, Value::Object(Map::new()));
        if !overlay.is_object() {
            warn!(variable = %CONFIG_JSON_VAR, "Ignoring non-object JSON overlay");
            overlay = Value::Object(Map::new());
        }

        let mut mapped = Value::Object(Map::new());
        for (name, path, kind) in ENV_MAPPINGS {
            let Some(raw) = self.read(name, None, required.contains(*name))? else {
                continue;
            };
            let value = match kind {
                VarKind::String => Value::String(raw),
                VarKind::Bool => Value::Bool(parse_bool(&raw)),
                VarKind::Number => match raw.trim().parse::<f64>() {
                    Ok(n) => number_value(n),
                    Err(_) => {
                        warn!(variable = %name, "Ignoring non-numeric value");
                        continue;
                    }
                },
                VarKind::List => Value::Array(
                    split_list(&raw, ',')
                        .into_iter()
                        .map(Value::String)
                        .collect(),
                ),
            };
            let target = ConfigPath::from_segments(path.split('.'));
            if let Err(e) = target.insert(&mut mapped, value, false) {
                warn!(variable = %name, "Failed to map environment variable: {}", e);
            }
        }

        // Individually mapped variables win over the bulk JSON overlay.
        merge_into(&mut overlay, mapped);
        Ok(overlay)
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
