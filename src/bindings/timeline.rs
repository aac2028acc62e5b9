//! Experience and education timelines.
//!
//! Ordering: entries marked `current` first, then by start date, newest first.
//! Start dates are `YYYY-MM-DD`, `YYYY-MM` or `YYYY`; entries whose date does
//! not parse sort after all dated entries. Ties keep declaration order.

use super::{insert_entry, read_list, remove_entry, update_entry};
use crate::config::model::{Dated, EducationEntry, ExperienceEntry};
use crate::config::{ConfigManager, LoadedConfig};
use crate::error::ConfigResult;
use chrono::NaiveDate;
use serde_json::Value;
use std::cmp::{Ordering, Reverse};

const EXPERIENCE: &str = "experience";
const EDUCATION: &str = "education";

/// Parse a partial ISO date. Missing month or day default to the first.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01-01", raw), "%Y-%m-%d"))
        .ok()
}

/// Sort `entries` in timeline order.
pub fn sort_timeline<T: Dated>(entries: &mut [T]) {
    entries.sort_by(|a, b| {
        b.is_current()
            .cmp(&a.is_current())
            .then_with(|| compare_start(a, b))
    });
}

fn compare_start<T: Dated>(a: &T, b: &T) -> Ordering {
    // Newest first, undated last.
    let key = |entry: &T| parse_date(entry.start_date()).map(Reverse);
    match (key(a), key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn experience(manager: &ConfigManager) -> Vec<ExperienceEntry> {
    let mut entries: Vec<ExperienceEntry> = read_list(manager, EXPERIENCE);
    sort_timeline(&mut entries);
    entries
}

pub fn education(manager: &ConfigManager) -> Vec<EducationEntry> {
    let mut entries: Vec<EducationEntry> = read_list(manager, EDUCATION);
    sort_timeline(&mut entries);
    entries
}

/// The entry marked current with the latest start date, if any.
pub fn current_position(manager: &ConfigManager) -> Option<ExperienceEntry> {
    experience(manager).into_iter().find(|e| e.current)
}

pub async fn add_experience(
    manager: &ConfigManager,
    entry: &ExperienceEntry,
) -> ConfigResult<LoadedConfig> {
    insert_entry(manager, EXPERIENCE, "id", entry).await
}

pub async fn update_experience(
    manager: &ConfigManager,
    id: &str,
    patch: Value,
) -> ConfigResult<LoadedConfig> {
    update_entry(manager, EXPERIENCE, "id", "experience", id, patch).await
}

pub async fn remove_experience(manager: &ConfigManager, id: &str) -> ConfigResult<LoadedConfig> {
    remove_entry(manager, EXPERIENCE, "id", "experience", id).await
}

pub async fn add_education(
    manager: &ConfigManager,
    entry: &EducationEntry,
) -> ConfigResult<LoadedConfig> {
    insert_entry(manager, EDUCATION, "id", entry).await
}

pub async fn update_education(
    manager: &ConfigManager,
    id: &str,
    patch: Value,
) -> ConfigResult<LoadedConfig> {
    update_entry(manager, EDUCATION, "id", "education", id, patch).await
}

pub async fn remove_education(manager: &ConfigManager, id: &str) -> ConfigResult<LoadedConfig> {
    remove_entry(manager, EDUCATION, "id", "education", id).await
}
