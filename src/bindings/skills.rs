//! Skills grouped by category and ranked by proficiency.

use super::{insert_entry, read_list, remove_entry, update_entry};
use crate::config::model::Skill;
use crate::config::{ConfigManager, LoadedConfig};
use crate::error::ConfigResult;
use serde_json::Value;
use std::collections::BTreeMap;

const SKILLS: &str = "skills";

pub fn skills(manager: &ConfigManager) -> Vec<Skill> {
    read_list(manager, SKILLS)
}

/// Highest level first; equal levels keep declaration order.
fn rank(skills: &mut [Skill]) {
    skills.sort_by(|a, b| b.level.total_cmp(&a.level));
}

/// Skills grouped by category, each group ranked by level.
pub fn skills_by_category(manager: &ConfigManager) -> BTreeMap<String, Vec<Skill>> {
    let mut groups: BTreeMap<String, Vec<Skill>> = BTreeMap::new();
    for skill in skills(manager) {
        groups.entry(skill.category.clone()).or_default().push(skill);
    }
    for group in groups.values_mut() {
        rank(group);
    }
    groups
}

/// The `n` highest-level skills across all categories.
pub fn top_skills(manager: &ConfigManager, n: usize) -> Vec<Skill> {
    let mut all = skills(manager);
    rank(&mut all);
    all.truncate(n);
    all
}

pub async fn add_skill(manager: &ConfigManager, skill: &Skill) -> ConfigResult<LoadedConfig> {
    insert_entry(manager, SKILLS, "name", skill).await
}

pub async fn update_skill(
    manager: &ConfigManager,
    name: &str,
    patch: Value,
) -> ConfigResult<LoadedConfig> {
    update_entry(manager, SKILLS, "name", "skill", name, patch).await
}

pub async fn remove_skill(manager: &ConfigManager, name: &str) -> ConfigResult<LoadedConfig> {
    remove_entry(manager, SKILLS, "name", "skill", name).await
}
