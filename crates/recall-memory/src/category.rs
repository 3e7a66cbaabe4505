use std::sync::LazyLock;

use anyhow::Result;
use chrono::NaiveDateTime;
use recall_core::error::AppError;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::entry::Entry;
use crate::format::Record;

/// Well-known categories, in display order.
pub(crate) const KNOWN_CATEGORIES: &[(&str, &str)] = &[
    ("user", "User profile, personal context, communication style"),
    ("projects", "Active projects, status, key decisions, architecture"),
    ("preferences", "Technical preferences, tools, languages, coding style"),
    ("decisions", "Important decisions made and their reasoning"),
];

const MAX_CATEGORY_LEN: usize = 64;

static CATEGORY_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").ok());

/// Category names double as file names: ASCII alphanumeric plus `-`/`_`,
/// starting alphanumeric, at most 64 characters.
pub fn validate_category_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AppError::validation("category name must not be empty").into());
    }
    if name.len() > MAX_CATEGORY_LEN {
        return Err(AppError::validation(format!(
            "category name '{name}' exceeds {MAX_CATEGORY_LEN} characters"
        ))
        .into());
    }
    if !CATEGORY_NAME.as_ref().is_some_and(|re| re.is_match(name)) {
        return Err(AppError::validation(format!(
            "category name '{name}' may only contain letters, digits, '-' and '_'"
        ))
        .into());
    }
    Ok(())
}

pub fn category_description(name: &str) -> String {
    KNOWN_CATEGORIES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, description)| (*description).to_string())
        .unwrap_or_else(|| format!("Notes recorded under '{name}'"))
}

/// `finance-notes` -> `Finance-Notes`.
pub(crate) fn category_title(name: &str) -> String {
    let mut title = String::with_capacity(name.len());
    let mut start_of_word = true;
    for c in name.chars() {
        if start_of_word {
            title.extend(c.to_uppercase());
        } else {
            title.push(c);
        }
        start_of_word = !c.is_ascii_alphanumeric();
    }
    title
}

/// Per-category counts for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryInfo {
    pub name: String,
    pub description: String,
    pub active: usize,
    pub superseded: usize,
    pub archived: usize,
    pub total: usize,
    pub last_updated: Option<NaiveDateTime>,
}

/// Materialized view of one category log: entries in insertion order with
/// supersession and archival state folded in.
#[derive(Debug, Clone, Default)]
pub(crate) struct CategoryLog {
    pub name: String,
    pub entries: Vec<Entry>,
}

impl CategoryLog {
    pub fn from_records(name: &str, records: Vec<Record>) -> Self {
        let mut entries: Vec<Entry> = Vec::new();

        for record in records {
            match record {
                Record::Entry(raw) => {
                    if let Some(old_id) = raw.supersedes {
                        match entries.iter_mut().find(|e| e.id == old_id) {
                            Some(old) if old.superseded_by.is_none() => {
                                old.superseded_by = Some(raw.id);
                            }
                            Some(_) => {}
                            None => warn!(
                                category = name,
                                target = %old_id,
                                "supersede link points at an unknown entry"
                            ),
                        }
                    }
                    entries.push(Entry {
                        id: raw.id,
                        category: name.to_string(),
                        position: entries.len() + 1,
                        timestamp: raw.timestamp,
                        context: raw.context,
                        body: raw.body,
                        supersedes: raw.supersedes,
                        superseded_by: None,
                        archived: false,
                    });
                }
                Record::Archive { target, .. } => {
                    match entries.iter_mut().find(|e| e.id == target) {
                        Some(entry) => entry.archived = true,
                        None => warn!(
                            category = name,
                            target = %target,
                            "archive marker points at an unknown entry"
                        ),
                    }
                }
            }
        }

        Self {
            name: name.to_string(),
            entries,
        }
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.entries.iter().map(|e| e.timestamp).max()
    }

    pub fn info(&self) -> CategoryInfo {
        let superseded = self
            .entries
            .iter()
            .filter(|e| e.superseded_by.is_some())
            .count();
        let archived = self.entries.iter().filter(|e| e.archived).count();
        CategoryInfo {
            name: self.name.clone(),
            description: category_description(&self.name),
            active: self.entries.iter().filter(|e| e.is_active()).count(),
            superseded,
            archived,
            total: self.entries.len(),
            last_updated: self.last_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::RawEntry;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn raw(body: &str, supersedes: Option<Ulid>) -> RawEntry {
        RawEntry {
            id: Ulid::new(),
            timestamp: NaiveDate::from_ymd_opt(2026, 1, 2)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            context: None,
            body: body.into(),
            supersedes,
        }
    }

    #[test]
    fn valid_category_names() {
        for name in ["projects", "user", "finance-notes", "a_b", "2026"] {
            assert!(validate_category_name(name).is_ok(), "{name} should pass");
        }
    }

    #[test]
    fn malformed_category_names() {
        let too_long = "x".repeat(65);
        for name in ["", "-lead", "has space", "../etc", "tab\t", "über", too_long.as_str()] {
            let err = validate_category_name(name).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<AppError>(), Some(AppError::Validation(_))),
                "{name:?} should be a validation error"
            );
        }
    }

    #[test]
    fn descriptions_and_titles() {
        assert_eq!(
            category_description("decisions"),
            "Important decisions made and their reasoning"
        );
        assert!(category_description("genome").contains("genome"));
        assert_eq!(category_title("projects"), "Projects");
        assert_eq!(category_title("finance-notes"), "Finance-Notes");
    }

    #[test]
    fn fold_applies_supersession_and_archive() {
        let first = raw("v1", None);
        let second = raw("v2", Some(first.id));
        let third = raw("other", None);
        let first_id = first.id;
        let second_id = second.id;
        let third_id = third.id;

        let log = CategoryLog::from_records(
            "projects",
            vec![
                Record::Entry(first),
                Record::Entry(second),
                Record::Entry(third),
                Record::Archive {
                    timestamp: NaiveDate::from_ymd_opt(2026, 1, 3)
                        .unwrap()
                        .and_hms_opt(0, 0, 0)
                        .unwrap(),
                    target: third_id,
                },
            ],
        );

        assert_eq!(log.entries.len(), 3);
        assert_eq!(log.entries[0].superseded_by, Some(second_id));
        assert_eq!(log.entries[0].position, 1);
        assert!(log.entries[1].is_active());
        assert!(log.entries[2].archived);
        assert_eq!(log.entries[2].position, 3);

        let info = log.info();
        assert_eq!(info.total, 3);
        assert_eq!(info.active, 1);
        assert_eq!(info.superseded, 1);
        assert_eq!(info.archived, 1);
        assert_ne!(first_id, second_id);
    }
}
