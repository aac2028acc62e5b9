//! Typed key paths into a configuration tree.
//!
//! A `ConfigPath` is parsed once and then used for lookup and mutation.
//! Numeric segments index into arrays.

use super::merge::merge_into;
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConfigPath {
    segments: Vec<String>,
}

impl ConfigPath {
    /// The empty path, addressing the whole tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted path. The empty string is the root; empty segments are rejected.
    pub fn parse(dotted: &str) -> ConfigResult<Self> {
        let dotted = dotted.trim();
        if dotted.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in dotted.split('.') {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(ConfigError::invalid_path(dotted, "empty path segment"));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Look up the value at this path, short-circuiting on the first missing segment.
    pub fn lookup<'a>(&self, tree: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(tree, |node, segment| step(node, segment))
    }

    /// Write `value` at this path, creating intermediate objects as needed.
    ///
    /// With `merge`, an object value is deep-merged into an existing object
    /// at the target instead of replacing it.
    pub fn insert(&self, tree: &mut Value, value: Value, merge: bool) -> ConfigResult<()> {
        let Some((last, parents)) = self.segments.split_last() else {
            if merge && tree.is_object() && value.is_object() {
                merge_into(tree, value);
            } else {
                *tree = value;
            }
            return Ok(());
        };

        let mut node = tree;
        for segment in parents {
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            node = match node {
                Value::Object(map) => map
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Map::new())),
                Value::Array(items) => {
                    let index = self.index_for(segment, items.len())?;
                    &mut items[index]
                }
                other => {
                    return Err(ConfigError::invalid_path(
                        self.to_string(),
                        format!("cannot descend into {} at '{}'", type_name(other), segment),
                    ));
                }
            };
        }

        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        let slot = match node {
            Value::Object(map) => map.entry(last.clone()).or_insert(Value::Null),
            Value::Array(items) => {
                let index = last.parse::<usize>().map_err(|_| {
                    ConfigError::invalid_path(self.to_string(), "array segments must be indices")
                })?;
                if index == items.len() {
                    items.push(Value::Null);
                } else if index > items.len() {
                    return Err(ConfigError::invalid_path(
                        self.to_string(),
                        format!("index {} out of bounds (len {})", index, items.len()),
                    ));
                }
                &mut items[index]
            }
            other => {
                return Err(ConfigError::invalid_path(
                    self.to_string(),
                    format!("cannot set a field on {}", type_name(other)),
                ));
            }
        };

        if merge && slot.is_object() && value.is_object() {
            merge_into(slot, value);
        } else {
            *slot = value;
        }
        Ok(())
    }

    /// Remove and return the value at this path.
    pub fn remove(&self, tree: &mut Value) -> Option<Value> {
        let (last, parents) = self.segments.split_last()?;
        let parent = parents
            .iter()
            .try_fold(tree, |node, segment| step_mut(node, segment))?;
        match parent {
            Value::Object(map) => map.remove(last),
            Value::Array(items) => {
                let index = last.parse::<usize>().ok()?;
                (index < items.len()).then(|| items.remove(index))
            }
            _ => None,
        }
    }

    fn index_for(&self, segment: &str, len: usize) -> ConfigResult<usize> {
        match segment.parse::<usize>() {
            Ok(index) if index < len => Ok(index),
            Ok(index) => Err(ConfigError::invalid_path(
                self.to_string(),
                format!("index {} out of bounds (len {})", index, len),
            )),
            Err(_) => Err(ConfigError::invalid_path(
                self.to_string(),
                "array segments must be indices",
            )),
        }
    }
}

fn step<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

fn step_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for ConfigPath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
