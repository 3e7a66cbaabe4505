use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

use crate::entry::Entry;

/// Filter for [`MemoryStore::query`](crate::MemoryStore::query).
///
/// The default query returns every active entry in every category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryQuery {
    pub category: Option<String>,
    /// Inclusive lower bound on entry timestamps.
    pub since: Option<NaiveDateTime>,
    /// Case-insensitive substring matched against body and context.
    pub text: Option<String>,
    pub include_superseded: bool,
    pub include_archived: bool,
}

impl MemoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn since(mut self, since: NaiveDateTime) -> Self {
        self.since = Some(since);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn include_superseded(mut self, include: bool) -> Self {
        self.include_superseded = include;
        self
    }

    pub fn include_archived(mut self, include: bool) -> Self {
        self.include_archived = include;
        self
    }

    fn admits(&self, entry: &Entry, needle_lower: Option<&str>) -> bool {
        if entry.superseded_by.is_some() && !self.include_superseded {
            return false;
        }
        if entry.archived && !self.include_archived {
            return false;
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        needle_lower.is_none_or(|needle| entry.matches_text(needle))
    }
}

/// Point-in-time result of a query.
///
/// Holds the entries read when the query ran and applies the filters while
/// iterating. Entries appended later are not visible here; call
/// [`iter`](Self::iter) as often as needed, each pass starts from the top.
#[derive(Debug, Clone, Default)]
pub struct QueryResults {
    snapshot: Vec<Entry>,
    query: MemoryQuery,
    needle: Option<String>,
}

impl QueryResults {
    pub(crate) fn new(snapshot: Vec<Entry>, query: &MemoryQuery) -> Self {
        let needle = query
            .text
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .map(str::to_lowercase);
        Self {
            snapshot,
            query: query.clone(),
            needle,
        }
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.snapshot.iter(),
            results: self,
        }
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn into_vec(self) -> Vec<Entry> {
        let Self {
            snapshot,
            query,
            needle,
        } = self;
        snapshot
            .into_iter()
            .filter(|entry| query.admits(entry, needle.as_deref()))
            .collect()
    }

    fn admits(&self, entry: &Entry) -> bool {
        self.query.admits(entry, self.needle.as_deref())
    }
}

/// Borrowing iterator over the entries a [`QueryResults`] admits.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    inner: std::slice::Iter<'a, Entry>,
    results: &'a QueryResults,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        let results = self.results;
        self.inner.find(|entry| results.admits(entry))
    }
}

impl Serialize for QueryResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'a> IntoIterator for &'a QueryResults {
    type Item = &'a Entry;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for QueryResults {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn entry(position: usize, body: &str) -> Entry {
        Entry {
            id: Ulid::new(),
            category: "projects".into(),
            position,
            timestamp: NaiveDate::from_ymd_opt(2026, 10, 16)
                .unwrap()
                .and_hms_opt(9, position as u32, 0)
                .unwrap(),
            context: Some("Finance".into()),
            body: body.into(),
            supersedes: None,
            superseded_by: None,
            archived: false,
        }
    }

    #[test]
    fn filters_apply_on_every_pass() {
        let mut archived = entry(2, "Phase 1 archived");
        archived.archived = true;
        let snapshot = vec![entry(1, "Phase 1 planning"), archived, entry(3, "Genome")];

        let results = QueryResults::new(snapshot, &MemoryQuery::new().text("  phase "));
        let first: Vec<usize> = results.iter().map(|e| e.position).collect();
        let second: Vec<usize> = (&results).into_iter().map(|e| e.position).collect();
        assert_eq!(first, [1]);
        assert_eq!(first, second);
        assert_eq!(results.count(), 1);

        let everything = QueryResults::new(
            results.clone().snapshot,
            &MemoryQuery::new().text("phase").include_archived(true),
        );
        assert_eq!(everything.into_vec().len(), 2);
    }

    #[test]
    fn serializes_as_array_of_admitted_entries() {
        let mut superseded = entry(1, "Phase 1");
        superseded.superseded_by = Some(Ulid::new());
        let kept = entry(2, "Phase 2 DONE");
        let results = QueryResults::new(vec![superseded, kept.clone()], &MemoryQuery::new());

        let json = serde_json::to_value(&results).unwrap();
        let items = json.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], kept.id.to_string());
        assert_eq!(items[0]["category"], "projects");
        assert_eq!(items[0]["context"], "Finance");
        assert_eq!(items[0]["timestamp"], "2026-10-16T09:02:00");
        assert_eq!(items[0]["archived"], false);
    }

    #[test]
    fn empty_results_serialize_as_empty_array() {
        let results = QueryResults::new(Vec::new(), &MemoryQuery::new());
        assert!(results.is_empty());
        assert_eq!(serde_json::to_string(&results).unwrap(), "[]");
    }
}
