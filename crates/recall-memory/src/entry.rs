use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Timelike};
use recall_core::error::AppError;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minute-precision timestamp layout used in category logs.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One timestamped note inside a category.
///
/// `timestamp`, `body`, `context` and `supersedes` come from the log and never
/// change. `superseded_by` and `archived` are derived from later records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Ulid,
    pub category: String,
    /// 1-based insertion position within the category.
    pub position: usize,
    pub timestamp: NaiveDateTime,
    pub context: Option<String>,
    pub body: String,
    pub supersedes: Option<Ulid>,
    pub superseded_by: Option<Ulid>,
    pub archived: bool,
}

impl Entry {
    /// Visible to default queries: neither superseded nor archived.
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none() && !self.archived
    }

    pub fn matches_text(&self, needle_lower: &str) -> bool {
        self.body.to_lowercase().contains(needle_lower)
            || self
                .context
                .as_deref()
                .is_some_and(|context| context.to_lowercase().contains(needle_lower))
    }

    pub fn short_id(&self) -> String {
        self.id.to_string().chars().take(8).collect()
    }
}

/// How callers point at an existing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRef {
    /// 1-based position within the category: `3` or `#3`.
    Position(usize),
    /// Full ULID or an unambiguous prefix of one (case-insensitive). An
    /// all-digit prefix must start with `0`, otherwise it reads as a position.
    IdPrefix(String),
}

impl EntryRef {
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Self::Position(position) => entry.position == *position,
            Self::IdPrefix(prefix) => entry.id.to_string().starts_with(prefix.as_str()),
        }
    }
}

impl From<Ulid> for EntryRef {
    fn from(id: Ulid) -> Self {
        Self::IdPrefix(id.to_string())
    }
}

impl FromStr for EntryRef {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(AppError::validation("entry reference must not be empty"));
        }

        if let Some(position) = value.strip_prefix('#') {
            return parse_position(position.trim()).map(Self::Position);
        }
        // Positions never start with 0; ULIDs written today always do.
        if value.chars().all(|c| c.is_ascii_digit()) && !value.starts_with('0') {
            return parse_position(value).map(Self::Position);
        }

        let upper = value.to_ascii_uppercase();
        let is_crockford = upper.chars().all(|c| {
            c.is_ascii_digit() || (c.is_ascii_uppercase() && !matches!(c, 'I' | 'L' | 'O' | 'U'))
        });
        if !is_crockford || upper.len() > 26 {
            return Err(AppError::validation(format!(
                "'{value}' is neither a position nor an entry id"
            )));
        }
        Ok(Self::IdPrefix(upper))
    }
}

fn parse_position(raw: &str) -> Result<usize, AppError> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation(format!(
            "'#{raw}' is not an entry position"
        )));
    }
    let position: usize = raw
        .parse()
        .map_err(|_| AppError::validation(format!("entry position '{raw}' is too large")))?;
    if position == 0 {
        return Err(AppError::validation("entry positions start at 1"));
    }
    Ok(position)
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position(position) => write!(f, "#{position}"),
            Self::IdPrefix(prefix) => f.write_str(prefix),
        }
    }
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
}

/// Drop seconds and sub-seconds: log timestamps are minute precision.
pub(crate) fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|value| value.with_nanosecond(0))
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn entry(body: &str, context: Option<&str>) -> Entry {
        Entry {
            id: Ulid::new(),
            category: "projects".into(),
            position: 1,
            timestamp: ts(9, 30),
            context: context.map(str::to_string),
            body: body.into(),
            supersedes: None,
            superseded_by: None,
            archived: false,
        }
    }

    #[test]
    fn parse_position_reference() {
        assert_eq!("3".parse::<EntryRef>().unwrap(), EntryRef::Position(3));
        assert_eq!("#12".parse::<EntryRef>().unwrap(), EntryRef::Position(12));
        assert!("#0".parse::<EntryRef>().is_err());
        assert!("#".parse::<EntryRef>().is_err());
        assert!("#01J".parse::<EntryRef>().is_err());
    }

    #[test]
    fn leading_zero_digits_are_an_id_prefix() {
        assert_eq!(
            "0123".parse::<EntryRef>().unwrap(),
            EntryRef::IdPrefix("0123".into())
        );
        assert_eq!("0".parse::<EntryRef>().unwrap(), EntryRef::IdPrefix("0".into()));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for reference in [EntryRef::Position(7), EntryRef::IdPrefix("01J9ZQ".into())] {
            assert_eq!(reference.to_string().parse::<EntryRef>().unwrap(), reference);
        }
    }

    #[test]
    fn parse_id_prefix_is_uppercased() {
        let parsed: EntryRef = "01j9zq".parse().unwrap();
        assert_eq!(parsed, EntryRef::IdPrefix("01J9ZQ".into()));
    }

    #[test]
    fn parse_rejects_garbage_reference() {
        let err = "not-an-id".parse::<EntryRef>().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!("".parse::<EntryRef>().is_err());
    }

    #[test]
    fn text_match_covers_body_and_context() {
        let e = entry("Phase 2 DONE", Some("Finance"));
        assert!(e.matches_text("phase 2"));
        assert!(e.matches_text("finance"));
        assert!(!e.matches_text("genome"));
    }

    #[test]
    fn inactive_when_superseded_or_archived() {
        let mut e = entry("x", None);
        assert!(e.is_active());
        e.archived = true;
        assert!(!e.is_active());
        e.archived = false;
        e.superseded_by = Some(Ulid::new());
        assert!(!e.is_active());
    }

    #[test]
    fn reference_matches_position_and_prefix() {
        let e = entry("x", None);
        assert!(EntryRef::Position(1).matches(&e));
        assert!(EntryRef::from(e.id).matches(&e));
        assert!(!EntryRef::Position(2).matches(&e));
    }

    #[test]
    fn timestamp_round_trip_and_truncation() {
        let with_seconds = ts(9, 30).with_second(42).unwrap();
        let truncated = truncate_to_minute(with_seconds);
        assert_eq!(format_timestamp(truncated), "2026-03-14 09:30");
        assert_eq!(parse_timestamp("2026-03-14 09:30"), Some(ts(9, 30)));
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
