//! Structural comparison of two configuration trees.
//!
//! Objects are compared key by key and recursed into. Arrays and scalars are
//! compared by equality as a whole, matching how merging treats them.

use super::types::{ChangeKind, ConfigChange};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Every leaf-level difference between `old` and `new`.
///
/// Within each object, keys of `old` (modified or removed) come first, then
/// keys only present in `new`.
pub fn diff(old: &Value, new: &Value) -> Vec<ConfigChange> {
    let mut changes = Vec::new();
    diff_at(&mut Vec::new(), old, new, &mut changes);
    changes
}

fn diff_at(path: &mut Vec<String>, old: &Value, new: &Value, out: &mut Vec<ConfigChange>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, old_value) in old_map {
                path.push(key.clone());
                match new_map.get(key) {
                    Some(new_value) => diff_at(path, old_value, new_value, out),
                    None => out.push(ConfigChange {
                        path: path.clone(),
                        old_value: Some(old_value.clone()),
                        new_value: None,
                        kind: ChangeKind::Removed,
                    }),
                }
                path.pop();
            }
            for (key, new_value) in new_map {
                if !old_map.contains_key(key) {
                    let mut added = path.clone();
                    added.push(key.clone());
                    out.push(ConfigChange {
                        path: added,
                        old_value: None,
                        new_value: Some(new_value.clone()),
                        kind: ChangeKind::Added,
                    });
                }
            }
        }
        _ if old != new => out.push(ConfigChange {
            path: path.clone(),
            old_value: Some(old.clone()),
            new_value: Some(new.clone()),
            kind: ChangeKind::Modified,
        }),
        _ => {}
    }
}

/// Labelled diff report used by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigDiff {
    pub old_label: String,
    pub new_label: String,
    pub changes: Vec<ConfigChange>,
}

impl ConfigDiff {
    pub fn new(old_label: impl Into<String>, new_label: impl Into<String>, old: &Value, new: &Value) -> Self {
        Self {
            old_label: old_label.into(),
            new_label: new_label.into(),
            changes: diff(old, new),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Counts of (added, modified, removed) changes.
    pub fn summary(&self) -> (usize, usize, usize) {
        self.changes
            .iter()
            .fold((0, 0, 0), |(a, m, r), change| match change.kind {
                ChangeKind::Added => (a + 1, m, r),
                ChangeKind::Modified => (a, m + 1, r),
                ChangeKind::Removed => (a, m, r + 1),
            })
    }
}

impl fmt::Display for ConfigDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No differences found.");
        }

        writeln!(f, "Diff: {} -> {}", self.old_label, self.new_label)?;
        writeln!(f, "{}", "=".repeat(60))?;

        for change in &self.changes {
            let path = display_path(change);
            match change.kind {
                ChangeKind::Added => {
                    writeln!(f, "  + {}: {}", path, brief(change.new_value.as_ref()))?
                }
                ChangeKind::Removed => {
                    writeln!(f, "  - {}: {}", path, brief(change.old_value.as_ref()))?
                }
                ChangeKind::Modified => writeln!(
                    f,
                    "  ~ {}: {} -> {}",
                    path,
                    brief(change.old_value.as_ref()),
                    brief(change.new_value.as_ref())
                )?,
            }
        }

        let (added, modified, removed) = self.summary();
        writeln!(f, "{}", "-".repeat(60))?;
        writeln!(
            f,
            "{} added, {} modified, {} removed",
            added, modified, removed
        )
    }
}

fn display_path(change: &ConfigChange) -> String {
    if change.path.is_empty() {
        "(root)".to_string()
    } else {
        change.dotted_path()
    }
}

fn brief(value: Option<&Value>) -> String {
    const MAX: usize = 60;
    let Some(value) = value else {
        return "(none)".to_string();
    };
    let rendered = value.to_string();
    if rendered.chars().count() > MAX {
        let cut: String = rendered.chars().take(MAX).collect();
        format!("{}...", cut)
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_trees_have_no_changes() {
        let tree = json!({"a": {"b": [1, 2]}, "c": "x"});
        assert!(diff(&tree, &tree).is_empty());
    }

    #[test]
    fn test_added_modified_removed() {
        let old = json!({"theme": {"primaryColor": "#111", "mode": "dark"}, "blog": {"enabled": true}});
        let new = json!({"theme": {"primaryColor": "#222", "accentColor": "#333"}, "blog": {"enabled": true}});
        let changes = diff(&old, &new);

        assert_eq!(changes.len(), 3);
        let at = |path: &str| changes.iter().find(|c| c.dotted_path() == path).unwrap();

        assert_eq!(at("theme.primaryColor").kind, ChangeKind::Modified);
        assert_eq!(at("theme.mode").kind, ChangeKind::Removed);
        assert_eq!(at("theme.mode").new_value, None);
        assert_eq!(at("theme.accentColor").kind, ChangeKind::Added);
        assert_eq!(at("theme.accentColor").new_value, Some(json!("#333")));

        // Additions follow the keys that existed before.
        assert_eq!(changes[2].kind, ChangeKind::Added);
    }

    #[test]
    fn test_arrays_compared_whole() {
        let old = json!({"skills": [{"name": "Rust"}]});
        let new = json!({"skills": [{"name": "Rust"}, {"name": "Go"}]});
        let changes = diff(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, vec!["skills".to_string()]);
        assert_eq!(changes[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn test_type_change_is_modification() {
        let changes = diff(&json!({"a": {"b": 1}}), &json!({"a": 5}));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].dotted_path(), "a");
        assert_eq!(changes[0].old_value, Some(json!({"b": 1})));
    }

    #[test]
    fn test_report_display() {
        let report = ConfigDiff::new("old.json", "new.json", &json!({"a": 1}), &json!({"a": 2, "b": true}));
        assert_eq!(report.summary(), (1, 1, 0));
        let text = report.to_string();
        assert!(text.contains("Diff: old.json -> new.json"));
        assert!(text.contains("~ a: 1 -> 2"));
        assert!(text.contains("+ b: true"));

        let empty = ConfigDiff::new("a", "b", &json!({}), &json!({}));
        assert_eq!(empty.to_string(), "No differences found.\n");
    }
}
