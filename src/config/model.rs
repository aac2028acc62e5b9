//! Typed views of list entries in the configuration tree.
//!
//! Every struct flattens undeclared keys into `extra`, so entries read and
//! written back through these types keep fields the structs do not model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceEntry {
    pub id: String,
    pub company: String,
    pub position: String,
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationEntry {
    pub id: String,
    pub institution: String,
    pub degree: String,
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub current: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub name: String,
    pub category: String,
    /// Proficiency, 0 to 100
    pub level: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entries with a start date and an "ongoing" flag.
pub trait Dated {
    fn start_date(&self) -> &str;
    fn is_current(&self) -> bool;
}

impl Dated for ExperienceEntry {
    fn start_date(&self) -> &str {
        &self.start_date
    }

    fn is_current(&self) -> bool {
        self.current
    }
}

impl Dated for EducationEntry {
    fn start_date(&self) -> &str {
        &self.start_date
    }

    fn is_current(&self) -> bool {
        self.current
    }
}
