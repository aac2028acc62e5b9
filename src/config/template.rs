//! Template variable resolution.
//!
//! String leaves may embed `{{ path.to.value | function:arg | function2 }}`
//! expressions. The head is a dotted path into the [`TemplateContext`] or one
//! of the generators `uuid`, `now` and `random:<min>:<max>`; functions apply
//! left to right.
//!
//! An expression that cannot be resolved (missing path, unknown function, bad
//! argument, circular reference) is left in place verbatim and reported. A
//! referenced value that itself holds expressions is expanded before use, so
//! running resolution again over its own output changes nothing.

use super::env::EnvAdapter;
use super::path::ConfigPath;
use super::types::Environment;
use base64::Engine;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase};
use rand::Rng;
use regex_lite::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::LazyLock;
use tracing::debug;

static EXPR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("template pattern is valid"));

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

const MAX_REFERENCE_DEPTH: usize = 16;

/// Build-time facts exposed under `runtime.*`.
#[derive(Debug, Clone)]
pub struct RuntimeInfo {
    pub build_time: DateTime<Utc>,
    pub version: String,
    pub environment: Environment,
}

impl RuntimeInfo {
    pub fn new(version: impl Into<String>, environment: Environment) -> Self {
        Self {
            build_time: Utc::now(),
            version: version.into(),
            environment,
        }
    }

    fn to_value(&self) -> Value {
        json!({
            "buildTime": self.build_time.to_rfc3339(),
            "version": self.version,
            "environment": self.environment.as_str(),
            "year": self.build_time.year(),
        })
    }
}

/// Variables available to template expressions, grouped by namespace.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    root: Map<String, Value>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble the standard namespaces for resolving `config`:
    /// `personal`, `env`, `runtime`, `custom`, and `config` (the whole tree).
    pub fn for_config(
        config: &Value,
        env: &EnvAdapter,
        runtime: &RuntimeInfo,
        custom: &Map<String, Value>,
    ) -> Self {
        let personal = config
            .get("personal")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        Self::new()
            .with_namespace("personal", personal)
            .with_namespace("env", Value::Object(env.public_vars()))
            .with_namespace("runtime", runtime.to_value())
            .with_namespace("custom", Value::Object(custom.clone()))
            .with_namespace("config", config.clone())
    }

    /// Add or replace a namespace (builder pattern).
    pub fn with_namespace(mut self, name: impl Into<String>, value: Value) -> Self {
        self.root.insert(name.into(), value);
        self
    }

    pub fn lookup(&self, dotted: &str) -> Option<&Value> {
        let path = ConfigPath::parse(dotted).ok()?;
        let (first, rest) = path.segments().split_first()?;
        let namespace = self.root.get(first)?;
        ConfigPath::from_segments(rest.iter().cloned()).lookup(namespace)
    }
}

/// What happened during one resolution pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateReport {
    /// Number of expressions replaced
    pub resolved: usize,
    /// Expressions left verbatim
    pub unresolved: Vec<String>,
    pub warnings: Vec<String>,
}

impl TemplateReport {
    fn unresolved(&mut self, expr: &str, reason: String) {
        debug!(expression = %expr, "Template expression left unresolved: {}", reason);
        self.unresolved.push(expr.to_string());
        self.warnings
            .push(format!("unresolved template '{{{{{}}}}}': {}", expr, reason));
    }
}

/// Whether `s` contains at least one template expression.
pub fn contains_template(s: &str) -> bool {
    EXPR_RE.is_match(s)
}

/// Resolve every string leaf of `tree`. Non-string leaves pass through.
pub fn resolve_tree(tree: &Value, ctx: &TemplateContext) -> (Value, TemplateReport) {
    let mut report = TemplateReport::default();
    let resolved = Resolution::new(ctx, &mut report).value(tree);
    (resolved, report)
}

/// Resolve the expressions in one string.
///
/// A string consisting of exactly one function-free expression takes the
/// referenced value as-is, preserving its JSON type.
pub fn resolve_str(input: &str, ctx: &TemplateContext, report: &mut TemplateReport) -> Value {
    Resolution::new(ctx, report).string(input)
}

/// Whether any string leaf of `value` holds an expression.
pub fn tree_contains_template(value: &Value) -> bool {
    match value {
        Value::String(s) => contains_template(s),
        Value::Array(items) => items.iter().any(tree_contains_template),
        Value::Object(map) => map.values().any(tree_contains_template),
        _ => false,
    }
}

/// One resolution walk. `active` holds the context paths whose own
/// expressions are being expanded, innermost last.
struct Resolution<'a> {
    ctx: &'a TemplateContext,
    report: &'a mut TemplateReport,
    active: Vec<String>,
}

impl<'a> Resolution<'a> {
    fn new(ctx: &'a TemplateContext, report: &'a mut TemplateReport) -> Self {
        Self {
            ctx,
            report,
            active: Vec::new(),
        }
    }

    fn value(&mut self, value: &Value) -> Value {
        match value {
            Value::String(s) => self.string(s),
            Value::Array(items) => Value::Array(items.iter().map(|item| self.value(item)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn string(&mut self, input: &str) -> Value {
        if !contains_template(input) {
            return Value::String(input.to_string());
        }

        if let Some(caps) = EXPR_RE.captures(input)
            && let Some(whole) = caps.get(0)
            && whole.start() == 0
            && whole.end() == input.len()
        {
            let expr = caps.get(1).map_or("", |m| m.as_str());
            if !expr.contains('|') {
                return match self.evaluate(expr) {
                    Ok(value) => {
                        self.report.resolved += 1;
                        value
                    }
                    Err(reason) => {
                        self.report.unresolved(expr, reason);
                        Value::String(input.to_string())
                    }
                };
            }
        }

        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in EXPR_RE.captures_iter(input) {
            let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&input[last..whole.start()]);
            match self.evaluate(expr.as_str()) {
                Ok(value) => {
                    self.report.resolved += 1;
                    out.push_str(&to_text(&value));
                }
                Err(reason) => {
                    self.report.unresolved(expr.as_str(), reason);
                    out.push_str(whole.as_str());
                }
            }
            last = whole.end();
        }
        out.push_str(&input[last..]);
        Value::String(out)
    }

    fn evaluate(&mut self, expr: &str) -> Result<Value, String> {
        let mut parts = expr.split('|').map(str::trim);
        let head = parts.next().unwrap_or("");
        if head.is_empty() {
            return Err("empty expression".to_string());
        }

        let mut value = match generate(head)? {
            Some(generated) => Some(generated),
            None => self.lookup(head)?,
        };

        for call in parts {
            let (name, arg) = match call.split_once(':') {
                Some((name, arg)) => (name.trim(), Some(arg)),
                None => (call, None),
            };
            value = apply(name, arg, value)?;
        }

        value.ok_or_else(|| format!("'{}' is not defined", head))
    }

    /// Context value at `head`, with its own expressions expanded first.
    fn lookup(&mut self, head: &str) -> Result<Option<Value>, String> {
        let ctx = self.ctx;
        let Some(found) = ctx.lookup(head) else {
            return Ok(None);
        };
        if !tree_contains_template(found) {
            return Ok(Some(found.clone()));
        }
        if self.active.iter().any(|path| path == head) {
            return Err(format!("circular reference through '{}'", head));
        }
        if self.active.len() >= MAX_REFERENCE_DEPTH {
            return Err(format!("references nested deeper than {}", MAX_REFERENCE_DEPTH));
        }

        let resolved = self.report.resolved;
        let unresolved = self.report.unresolved.len();
        let warnings = self.report.warnings.len();

        self.active.push(head.to_string());
        let expanded = self.value(found);
        self.active.pop();

        // Only leaf expressions are counted; a partial expansion fails the reference.
        self.report.resolved = resolved;
        if self.report.unresolved.len() > unresolved {
            self.report.unresolved.truncate(unresolved);
            self.report.warnings.truncate(warnings);
            return Err(format!(
                "'{}' depends on an expression that cannot be resolved",
                head
            ));
        }
        Ok(Some(expanded))
    }
}

/// Heads (path or generator) of every expression in `tree`.
pub fn collect_variables(tree: &Value) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    collect_into(tree, &mut found);
    found
}

fn collect_into(value: &Value, found: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for caps in EXPR_RE.captures_iter(s) {
                if let Some(expr) = caps.get(1) {
                    let head = expr.as_str().split('|').next().unwrap_or("").trim();
                    if !head.is_empty() {
                        found.insert(head.to_string());
                    }
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_into(item, found)),
        Value::Object(map) => map.values().for_each(|v| collect_into(v, found)),
        _ => {}
    }
}

fn generate(head: &str) -> Result<Option<Value>, String> {
    if head == "uuid" {
        return Ok(Some(Value::String(uuid::Uuid::new_v4().to_string())));
    }
    if head == "now" {
        return Ok(Some(Value::String(Utc::now().to_rfc3339())));
    }
    if let Some(range) = head.strip_prefix("random:") {
        let (min, max) = range
            .split_once(':')
            .and_then(|(a, b)| Some((a.trim().parse::<i64>().ok()?, b.trim().parse::<i64>().ok()?)))
            .ok_or_else(|| format!("random expects <min>:<max>, got '{}'", range))?;
        if min > max {
            return Err(format!("random range {}:{} is empty", min, max));
        }
        return Ok(Some(Value::from(rand::thread_rng().gen_range(min..=max))));
    }
    Ok(None)
}

fn apply(name: &str, arg: Option<&str>, value: Option<Value>) -> Result<Option<Value>, String> {
    if name == "default" {
        let missing = match &value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            _ => false,
        };
        return Ok(if missing {
            Some(Value::String(arg.unwrap_or("").to_string()))
        } else {
            value
        });
    }

    let Some(value) = value else {
        // Keep the missing state so the caller reports the expression; still
        // reject unknown function names eagerly.
        return if is_known_function(name) {
            Ok(None)
        } else {
            Err(format!("unknown function '{}'", name))
        };
    };
    let text = to_text(&value);

    let out = match name {
        "upper" | "uppercase" => text.to_uppercase(),
        "lower" | "lowercase" => text.to_lowercase(),
        "capitalize" => capitalize(&text),
        "camel" | "camelcase" => text.to_lower_camel_case(),
        "kebab" | "kebabcase" => text.to_kebab_case(),
        "snake" | "snakecase" => text.to_snake_case(),
        "slugify" => slugify(&text),
        "trim" => text.trim().to_string(),
        "truncate" => {
            let limit = arg
                .and_then(|a| a.trim().parse::<usize>().ok())
                .ok_or_else(|| "truncate expects a length".to_string())?;
            truncate(&text, limit)
        }
        "date" => format_date(&text, arg.unwrap_or(DEFAULT_DATE_FORMAT))?,
        "year" => parse_date(&text)
            .map(|d| d.year().to_string())
            .ok_or_else(|| format!("'{}' is not a date", text))?,
        "urlencode" => urlencoding::encode(&text).into_owned(),
        "base64" => base64::engine::general_purpose::STANDARD.encode(text.as_bytes()),
        "json" => serde_json::to_string(&value).map_err(|e| e.to_string())?,
        other => return Err(format!("unknown function '{}'", other)),
    };
    Ok(Some(Value::String(out)))
}

fn is_known_function(name: &str) -> bool {
    matches!(
        name,
        "upper"
            | "uppercase"
            | "lower"
            | "lowercase"
            | "capitalize"
            | "camel"
            | "camelcase"
            | "kebab"
            | "kebabcase"
            | "snake"
            | "snakecase"
            | "slugify"
            | "trim"
            | "truncate"
            | "date"
            | "year"
            | "urlencode"
            | "base64"
            | "json"
            | "default"
    )
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{}...", cut.trim_end())
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01-01", text), "%Y-%m-%d"))
        .ok()?;
    date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc())
}

fn format_date(text: &str, format: &str) -> Result<String, String> {
    let date = parse_date(text).ok_or_else(|| format!("'{}' is not a date", text))?;
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid date format '{}'", format));
    }
    let mut out = String::new();
    write!(out, "{}", date.format_with_items(items.into_iter()))
        .map_err(|_| format!("cannot format date with '{}'", format))?;
    Ok(out)
}
