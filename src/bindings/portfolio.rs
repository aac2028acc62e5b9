//! Portfolio projects.

use super::{insert_entry, read_list, remove_entry, update_entry};
use crate::config::model::Project;
use crate::config::{ConfigManager, LoadedConfig};
use crate::error::ConfigResult;
use serde_json::Value;
use std::collections::BTreeMap;

const PROJECTS: &str = "portfolio.projects";

/// Category used for projects without one.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// All projects in declaration order.
pub fn projects(manager: &ConfigManager) -> Vec<Project> {
    read_list(manager, PROJECTS)
}

pub fn featured_projects(manager: &ConfigManager) -> Vec<Project> {
    projects(manager).into_iter().filter(|p| p.featured).collect()
}

pub fn project(manager: &ConfigManager, id: &str) -> Option<Project> {
    projects(manager).into_iter().find(|p| p.id == id)
}

/// Projects grouped by category, declaration order kept within each group.
pub fn projects_by_category(manager: &ConfigManager) -> BTreeMap<String, Vec<Project>> {
    let mut groups: BTreeMap<String, Vec<Project>> = BTreeMap::new();
    for project in projects(manager) {
        let category = project
            .category
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        groups.entry(category).or_default().push(project);
    }
    groups
}

/// Sorted, distinct category names.
pub fn categories(manager: &ConfigManager) -> Vec<String> {
    projects_by_category(manager).into_keys().collect()
}

pub async fn add_project(manager: &ConfigManager, project: &Project) -> ConfigResult<LoadedConfig> {
    insert_entry(manager, PROJECTS, "id", project).await
}

/// Deep-merge `patch` into the project with `id`.
pub async fn update_project(
    manager: &ConfigManager,
    id: &str,
    patch: Value,
) -> ConfigResult<LoadedConfig> {
    update_entry(manager, PROJECTS, "id", "project", id, patch).await
}

pub async fn remove_project(manager: &ConfigManager, id: &str) -> ConfigResult<LoadedConfig> {
    remove_entry(manager, PROJECTS, "id", "project", id).await
}
