//! Declarative schema for the site configuration tree.
//!
//! Validation walks the declared shape, coerces loosely-typed scalars (numeric
//! strings, boolean words), fills declared defaults, and records every mismatch
//! as a `(dotted.path, message)` issue without short-circuiting. Keys the
//! schema does not declare are carried through untouched.

use super::path::{ConfigPath, type_name};
use crate::error::{ConfigError, ConfigIssue, ConfigResult};
use regex_lite::Regex;
use serde_json::{Map, Number, Value, json};
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

static COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$")
        .expect("color pattern is valid")
});

/// Declared type of a field.
#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    /// `http://` or `https://` URL
    Url,
    Email,
    /// `#rgb`, `#rrggbb` or `#rrggbbaa`
    Color,
    Enum(&'static [&'static str]),
    Array(Box<FieldType>),
    Object(ObjectShape),
    /// Accepted as-is
    Any,
}

impl FieldType {
    pub fn array_of(inner: FieldType) -> Self {
        FieldType::Array(Box::new(inner))
    }

    fn describe(&self) -> &'static str {
        match self {
            FieldType::String => "a string",
            FieldType::Number => "a number",
            FieldType::Integer => "an integer",
            FieldType::Boolean => "a boolean",
            FieldType::Url => "a URL",
            FieldType::Email => "an email address",
            FieldType::Color => "a hex color",
            FieldType::Enum(_) => "one of the allowed values",
            FieldType::Array(_) => "an array",
            FieldType::Object(_) => "an object",
            FieldType::Any => "any value",
        }
    }
}

/// A named field within an object shape.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub default: Option<Value>,
}

impl Field {
    pub fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
            default: None,
        }
    }

    /// Value inserted when the field is absent (builder pattern).
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// The declared fields of an object. Undeclared keys are allowed.
#[derive(Debug, Clone, Default)]
pub struct ObjectShape {
    pub fields: Vec<Field>,
}

impl ObjectShape {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Outcome of validating a candidate tree.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub success: bool,
    /// Coerced tree, present on success
    pub data: Option<Value>,
    pub errors: Vec<ConfigIssue>,
}

impl ValidationOutcome {
    pub fn into_result(self) -> ConfigResult<Value> {
        match self.data {
            Some(data) if self.success => Ok(data),
            _ => Err(ConfigError::Validation(self.errors)),
        }
    }
}

/// Schema for a configuration tree.
#[derive(Debug, Clone)]
pub struct Schema {
    root: ObjectShape,
}

impl Default for Schema {
    fn default() -> Self {
        Self::site()
    }
}

impl Schema {
    pub fn new(root: ObjectShape) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &ObjectShape {
        &self.root
    }

    /// Validate and coerce `candidate`. Never fails; problems are returned in the outcome.
    pub fn validate(&self, candidate: &Value) -> ValidationOutcome {
        let mut errors = Vec::new();
        let data = check_object(candidate, &self.root, "", &mut errors);
        let success = errors.is_empty();
        ValidationOutcome {
            success,
            data: success.then_some(data),
            errors,
        }
    }

    /// Parse a dotted path and check it against the declared shape.
    ///
    /// Paths into undeclared keys are accepted; a path that descends below a
    /// declared scalar, or uses a non-index segment on an array, is rejected.
    pub fn resolve_path(&self, dotted: &str) -> ConfigResult<ConfigPath> {
        let path = ConfigPath::parse(dotted)?;
        let mut current = Some(FieldType::Object(self.root.clone()));
        for segment in path.segments() {
            current = match current {
                None | Some(FieldType::Any) => None,
                Some(FieldType::Object(shape)) => shape.field(segment).map(|f| f.ty.clone()),
                Some(FieldType::Array(inner)) => {
                    if segment.parse::<usize>().is_err() {
                        return Err(ConfigError::invalid_path(
                            dotted,
                            format!("'{}' is not an index into an array", segment),
                        ));
                    }
                    Some(*inner)
                }
                Some(scalar) => {
                    return Err(ConfigError::invalid_path(
                        dotted,
                        format!("'{}' is below {} field", segment, scalar.describe()),
                    ));
                }
            };
        }
        Ok(path)
    }

    /// The portfolio site schema.
    pub fn site() -> Self {
        use FieldType as T;

        let personal = ObjectShape::new(vec![
            Field::required("name", T::String),
            Field::required("title", T::String),
            Field::optional("tagline", T::String),
            Field::required("email", T::Email),
            Field::optional("location", T::String),
            Field::optional("bio", T::String),
            Field::optional("avatar", T::String),
            Field::optional("resumeUrl", T::String),
        ]);

        let social = ObjectShape::new(vec![
            Field::optional("github", T::Url),
            Field::optional("linkedin", T::Url),
            Field::optional("twitter", T::Url),
            Field::optional("website", T::Url),
        ]);

        let seo = ObjectShape::new(vec![
            Field::required("title", T::String),
            Field::required("description", T::String),
            Field::optional("keywords", T::array_of(T::String)).with_default(json!([])),
            Field::required("siteUrl", T::Url),
            Field::optional("ogImage", T::String),
            Field::optional("twitterHandle", T::String),
        ]);

        let theme = ObjectShape::new(vec![
            Field::required("primaryColor", T::Color),
            Field::optional("secondaryColor", T::Color),
            Field::optional("accentColor", T::Color),
            Field::optional("mode", T::Enum(&["light", "dark", "system"])).with_default(json!("system")),
            Field::optional("fontFamily", T::String),
        ]);

        let features = ObjectShape::new(
            ["blog", "chatbot", "contactForm", "analytics", "darkMode", "animations"]
                .into_iter()
                .map(|name| Field::optional(name, T::Boolean).with_default(json!(false)))
                .collect(),
        );

        let project = ObjectShape::new(vec![
            Field::required("id", T::String),
            Field::required("title", T::String),
            Field::optional("description", T::String),
            Field::required("category", T::String),
            Field::optional("technologies", T::array_of(T::String)).with_default(json!([])),
            Field::optional("featured", T::Boolean).with_default(json!(false)),
            Field::optional("image", T::String),
            Field::optional("liveUrl", T::Url),
            Field::optional("githubUrl", T::Url),
            Field::optional("date", T::String),
        ]);

        let portfolio = ObjectShape::new(vec![
            Field::optional("title", T::String),
            Field::optional("projects", T::array_of(T::Object(project))).with_default(json!([])),
        ]);

        let experience = ObjectShape::new(vec![
            Field::required("id", T::String),
            Field::required("company", T::String),
            Field::required("position", T::String),
            Field::required("startDate", T::String),
            Field::optional("endDate", T::String),
            Field::optional("current", T::Boolean).with_default(json!(false)),
            Field::optional("location", T::String),
            Field::optional("description", T::String),
            Field::optional("achievements", T::array_of(T::String)),
            Field::optional("technologies", T::array_of(T::String)),
        ]);

        let education = ObjectShape::new(vec![
            Field::required("id", T::String),
            Field::required("institution", T::String),
            Field::required("degree", T::String),
            Field::optional("field", T::String),
            Field::required("startDate", T::String),
            Field::optional("endDate", T::String),
            Field::optional("current", T::Boolean).with_default(json!(false)),
        ]);

        let skill = ObjectShape::new(vec![
            Field::required("name", T::String),
            Field::required("category", T::String),
            Field::required("level", T::Number),
            Field::optional("icon", T::String),
        ]);

        let blog = ObjectShape::new(vec![
            Field::optional("enabled", T::Boolean).with_default(json!(false)),
            Field::optional("postsPerPage", T::Integer).with_default(json!(6)),
            Field::optional("showReadingTime", T::Boolean),
        ]);

        let smtp = ObjectShape::new(vec![
            Field::optional("host", T::String),
            Field::optional("port", T::Integer),
            Field::optional("user", T::String),
            Field::optional("password", T::String),
        ]);

        let contact = ObjectShape::new(vec![
            Field::required("email", T::Email),
            Field::optional("formEndpoint", T::Url),
            Field::optional("successMessage", T::String),
            Field::optional("smtp", T::Object(smtp)),
        ]);

        let chatbot = ObjectShape::new(vec![
            Field::optional("enabled", T::Boolean).with_default(json!(false)),
            Field::optional("name", T::String),
            Field::optional("greeting", T::String),
            Field::optional("apiEndpoint", T::Url),
            Field::optional("apiKey", T::String),
        ]);

        let analytics = ObjectShape::new(vec![
            Field::optional("provider", T::Enum(&["none", "google", "plausible"]))
                .with_default(json!("none")),
            Field::optional("googleAnalyticsId", T::String),
            Field::optional("gtmId", T::String),
            Field::optional("plausibleDomain", T::String),
        ]);

        let deployment = ObjectShape::new(vec![
            Field::optional(
                "target",
                T::Enum(&["static", "vercel", "netlify", "github-pages", "docker"]),
            )
            .with_default(json!("static")),
            Field::optional("baseUrl", T::Url),
        ]);

        let build = ObjectShape::new(vec![
            Field::optional("optimizeAssets", T::Boolean).with_default(json!(false)),
            Field::optional("generateSitemap", T::Boolean).with_default(json!(false)),
            Field::optional("cache", T::Boolean).with_default(json!(false)),
            Field::optional("outputDir", T::String),
        ]);

        Self::new(ObjectShape::new(vec![
            Field::required("personal", T::Object(personal)),
            Field::optional("social", T::Object(social)).with_default(json!({})),
            Field::required("seo", T::Object(seo)),
            Field::required("theme", T::Object(theme)),
            Field::optional("features", T::Object(features)).with_default(json!({})),
            Field::optional("portfolio", T::Object(portfolio)).with_default(json!({})),
            Field::optional("experience", T::array_of(T::Object(experience)))
                .with_default(json!([])),
            Field::optional("education", T::array_of(T::Object(education)))
                .with_default(json!([])),
            Field::optional("skills", T::array_of(T::Object(skill))).with_default(json!([])),
            Field::optional("blog", T::Object(blog)).with_default(json!({})),
            Field::required("contact", T::Object(contact)),
            Field::optional("chatbot", T::Object(chatbot)).with_default(json!({})),
            Field::optional("analytics", T::Object(analytics)).with_default(json!({})),
            Field::optional("deployment", T::Object(deployment)).with_default(json!({})),
            Field::optional("build", T::Object(build)).with_default(json!({})),
        ]))
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn mismatch(errors: &mut Vec<ConfigIssue>, path: &str, ty: &FieldType, found: &Value) {
    errors.push(ConfigIssue::new(
        path,
        format!("expected {}, found {}", ty.describe(), type_name(found)),
    ));
}

/// `f` as an integer when it is whole and inside the i64 range.
fn whole_i64(f: f64) -> Option<i64> {
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

fn check_object(
    value: &Value,
    shape: &ObjectShape,
    path: &str,
    errors: &mut Vec<ConfigIssue>,
) -> Value {
    let Some(map) = value.as_object() else {
        mismatch(errors, path, &FieldType::Object(shape.clone()), value);
        return value.clone();
    };

    let mut out: Map<String, Value> = map.clone();
    for field in &shape.fields {
        let field_path = join(path, field.name);
        match map.get(field.name).filter(|v| !v.is_null()) {
            Some(present) => {
                let checked = check(present, &field.ty, &field_path, errors);
                out.insert(field.name.to_string(), checked);
            }
            None if field.required => {
                errors.push(ConfigIssue::new(field_path, "is required"));
            }
            None => {
                if let Some(default) = &field.default {
                    // Defaults for object fields still get their own nested defaults.
                    let filled = check(default, &field.ty, &field_path, errors);
                    out.insert(field.name.to_string(), filled);
                }
            }
        }
    }
    Value::Object(out)
}

fn check(value: &Value, ty: &FieldType, path: &str, errors: &mut Vec<ConfigIssue>) -> Value {
    match ty {
        FieldType::Any => value.clone(),
        FieldType::Object(shape) => check_object(value, shape, path, errors),
        FieldType::Array(inner) => match value.as_array() {
            Some(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| check(item, inner, &join(path, &i.to_string()), errors))
                    .collect(),
            ),
            None => {
                mismatch(errors, path, ty, value);
                value.clone()
            }
        },
        FieldType::String => {
            if !value.is_string() {
                mismatch(errors, path, ty, value);
            }
            value.clone()
        }
        FieldType::Number => match value {
            Value::Number(_) => value.clone(),
            Value::String(s) => match parse_number(s) {
                Some(n) => Value::Number(n),
                None => {
                    mismatch(errors, path, ty, value);
                    value.clone()
                }
            },
            _ => {
                mismatch(errors, path, ty, value);
                value.clone()
            }
        },
        FieldType::Integer => {
            let as_int = match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().and_then(whole_i64)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            match as_int {
                Some(i) => Value::from(i),
                None => {
                    mismatch(errors, path, ty, value);
                    value.clone()
                }
            }
        }
        FieldType::Boolean => match value {
            Value::Bool(_) => value.clone(),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Value::Bool(true),
                "false" | "0" | "no" | "off" => Value::Bool(false),
                _ => {
                    mismatch(errors, path, ty, value);
                    value.clone()
                }
            },
            _ => {
                mismatch(errors, path, ty, value);
                value.clone()
            }
        },
        FieldType::Url => {
            match value.as_str() {
                Some(s) if is_url(s) => {}
                Some(s) => errors.push(ConfigIssue::new(path, format!("invalid URL '{}'", s))),
                None => mismatch(errors, path, ty, value),
            }
            value.clone()
        }
        FieldType::Email => {
            match value.as_str() {
                Some(s) if EMAIL_RE.is_match(s) => {}
                Some(s) => {
                    errors.push(ConfigIssue::new(path, format!("invalid email address '{}'", s)))
                }
                None => mismatch(errors, path, ty, value),
            }
            value.clone()
        }
        FieldType::Color => {
            match value.as_str() {
                Some(s) if COLOR_RE.is_match(s) => {}
                Some(s) => errors.push(ConfigIssue::new(path, format!("invalid hex color '{}'", s))),
                None => mismatch(errors, path, ty, value),
            }
            value.clone()
        }
        FieldType::Enum(allowed) => {
            match value.as_str() {
                Some(s) if allowed.contains(&s) => {}
                Some(s) => errors.push(ConfigIssue::new(
                    path,
                    format!("'{}' is not one of: {}", s, allowed.join(", ")),
                )),
                None => mismatch(errors, path, ty, value),
            }
            value.clone()
        }
    }
}

fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

fn is_url(s: &str) -> bool {
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty() && !s.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
