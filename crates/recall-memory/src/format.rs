//! Markdown codec for category logs.
//!
//! ```text
//! # Projects
//!
//! > Active projects, status, key decisions, architecture
//!
//! ---
//!
//! ### 2026-10-16 09:30 {id=01J... supersedes=01J...}
//! *Context: Finance*
//! - first body line
//!   continuation lines are indented by two spaces
//!
//! ### 2026-10-16 09:41 {archive=01J...}
//! ```
//!
//! Records without a `{...}` attribute block are accepted; their id is derived
//! from the timestamp and content so references to them stay stable.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::warn;
use ulid::Ulid;

use crate::category::{category_description, category_title};
use crate::entry::{format_timestamp, parse_timestamp};

static HEADER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^###\s+(\d{4}-\d{2}-\d{2} \d{2}:\d{2})(?:\s+\{([^}]*)\})?\s*$").ok()
});

const CONTEXT_PREFIX: &str = "*Context: ";
const BULLET: &str = "- ";
const CONTINUATION: &str = "  ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawEntry {
    pub id: Ulid,
    pub timestamp: NaiveDateTime,
    pub context: Option<String>,
    pub body: String,
    pub supersedes: Option<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Record {
    Entry(RawEntry),
    Archive {
        timestamp: NaiveDateTime,
        target: Ulid,
    },
}

/// Header block written when a category file is created.
pub(crate) fn render_file_header(category: &str) -> String {
    format!(
        "# {}\n\n> {}\n\n---\n",
        category_title(category),
        category_description(category)
    )
}

pub(crate) fn render_entry(entry: &RawEntry) -> String {
    let mut attrs = format!("id={}", entry.id);
    if let Some(old) = entry.supersedes {
        attrs.push_str(&format!(" supersedes={old}"));
    }

    let mut out = format!("\n### {} {{{attrs}}}\n", format_timestamp(entry.timestamp));
    if let Some(context) = entry.context.as_deref() {
        out.push_str(&format!("{CONTEXT_PREFIX}{context}*\n"));
    }
    for (idx, line) in entry.body.lines().enumerate() {
        if idx == 0 {
            out.push_str(BULLET);
        } else {
            out.push_str(CONTINUATION);
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

pub(crate) fn render_archive(timestamp: NaiveDateTime, target: Ulid) -> String {
    format!("\n### {} {{archive={target}}}\n", format_timestamp(timestamp))
}

#[derive(Debug)]
struct PendingRecord {
    line_number: usize,
    timestamp: NaiveDateTime,
    attrs: HashMap<String, String>,
    context: Option<String>,
    body: Vec<String>,
}

/// Parse a category log. Malformed records are skipped with a warning so a
/// hand-edited file never makes the whole category unreadable.
pub(crate) fn parse_log(source: &str, text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut pending: Option<PendingRecord> = None;
    // Derived ids already handed out, with how often each was seen.
    let mut derived: HashMap<Ulid, usize> = HashMap::new();
    // True while skipping lines that belong to an unparsable header.
    let mut skipping = false;

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);

        if line.starts_with("### ") {
            if let Some(done) = pending.take() {
                push_record(source, done, &mut records, &mut derived);
            }
            match parse_header(line) {
                Some((timestamp, attrs)) => {
                    skipping = false;
                    pending = Some(PendingRecord {
                        line_number: idx + 1,
                        timestamp,
                        attrs,
                        context: None,
                        body: Vec::new(),
                    });
                }
                None => {
                    skipping = true;
                    warn!(
                        path = source,
                        line_number = idx + 1,
                        "skipping memory record with unparsable header"
                    );
                }
            }
            continue;
        }

        if skipping {
            continue;
        }
        let Some(record) = pending.as_mut() else {
            // File preamble (title, description, separator).
            continue;
        };

        if record.body.is_empty() {
            if line.trim().is_empty() {
                continue;
            }
            if record.context.is_none() {
                if let Some(context) = line
                    .strip_prefix(CONTEXT_PREFIX)
                    .and_then(|rest| rest.strip_suffix('*'))
                {
                    record.context = Some(context.trim().to_string()).filter(|c| !c.is_empty());
                    continue;
                }
            }
            record
                .body
                .push(line.strip_prefix(BULLET).unwrap_or(line).to_string());
        } else {
            record
                .body
                .push(line.strip_prefix(CONTINUATION).unwrap_or(line).to_string());
        }
    }

    if let Some(done) = pending.take() {
        push_record(source, done, &mut records, &mut derived);
    }
    records
}

fn parse_header(line: &str) -> Option<(NaiveDateTime, HashMap<String, String>)> {
    let captures = HEADER.as_ref()?.captures(line)?;
    let timestamp = parse_timestamp(captures.get(1)?.as_str())?;
    let attrs = captures
        .get(2)
        .map(|block| {
            block
                .as_str()
                .split_whitespace()
                .filter_map(|pair| pair.split_once('='))
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect()
        })
        .unwrap_or_default();
    Some((timestamp, attrs))
}

fn push_record(
    source: &str,
    pending: PendingRecord,
    records: &mut Vec<Record>,
    derived: &mut HashMap<Ulid, usize>,
) {
    let PendingRecord {
        line_number,
        timestamp,
        attrs,
        context,
        mut body,
    } = pending;

    if let Some(target) = attrs.get("archive") {
        match target.parse::<Ulid>() {
            Ok(target) => records.push(Record::Archive { timestamp, target }),
            Err(error) => warn!(
                path = source,
                line_number,
                %error,
                "skipping archive marker with invalid target id"
            ),
        }
        return;
    }

    while body.last().is_some_and(|line| line.trim().is_empty()) {
        body.pop();
    }
    if body.is_empty() {
        warn!(path = source, line_number, "skipping memory record without body");
        return;
    }
    let body = body.join("\n");

    let id = match attrs.get("id").map(|raw| raw.parse::<Ulid>()) {
        Some(Ok(id)) => id,
        Some(Err(error)) => {
            warn!(path = source, line_number, %error, "skipping memory record with invalid id");
            return;
        }
        None => {
            let first = derive_id(timestamp, context.as_deref(), &body, 0);
            let seen = derived.entry(first).or_insert(0);
            let id = if *seen == 0 {
                first
            } else {
                derive_id(timestamp, context.as_deref(), &body, *seen)
            };
            *seen += 1;
            id
        }
    };
    let supersedes = attrs.get("supersedes").and_then(|raw| raw.parse::<Ulid>().ok());

    records.push(Record::Entry(RawEntry {
        id,
        timestamp,
        context,
        body,
        supersedes,
    }));
}

/// Stable id for records written without one (hand edits, older files).
///
/// `occurrence` counts earlier records in the same log with identical
/// timestamp, context and body; the first keeps the plain content hash.
pub(crate) fn derive_id(
    timestamp: NaiveDateTime,
    context: Option<&str>,
    body: &str,
    occurrence: usize,
) -> Ulid {
    let mut hasher = Sha256::new();
    hasher.update(format_timestamp(timestamp).as_bytes());
    hasher.update([0u8]);
    hasher.update(context.unwrap_or_default().as_bytes());
    hasher.update([0u8]);
    hasher.update(body.as_bytes());
    if occurrence > 0 {
        hasher.update([0u8]);
        hasher.update(occurrence.to_string().as_bytes());
    }
    let digest = hasher.finalize();

    let mut random = [0u8; 16];
    random.copy_from_slice(&digest[..16]);
    let millis = u64::try_from(timestamp.and_utc().timestamp_millis()).unwrap_or(0);
    Ulid::from_parts(millis, u128::from_be_bytes(random))
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
