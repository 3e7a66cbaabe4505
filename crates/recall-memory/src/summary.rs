use std::fmt::Write as _;

use anyhow::Result;
use chrono::NaiveDateTime;

use crate::category::category_title;
use crate::entry::format_timestamp;
use crate::query::MemoryQuery;
use crate::store::MemoryStore;

const EMPTY_SUMMARY: &str = "No memories stored yet.";

impl MemoryStore {
    /// Compact markdown digest of every active entry, grouped by category,
    /// meant to be pasted into an assistant session as standing context.
    pub fn context_summary(&self, now: NaiveDateTime) -> Result<String> {
        let mut sections = Vec::new();
        for info in self.categories()? {
            if info.active == 0 {
                continue;
            }
            let entries = self.query(&MemoryQuery::new().category(info.name.as_str()))?;
            sections.push((info.name, entries));
        }

        if sections.is_empty() {
            return Ok(EMPTY_SUMMARY.to_string());
        }

        let mut out = String::from("# Memory Context\n\n");
        let _ = writeln!(out, "*Last loaded: {}*", format_timestamp(now));
        for (name, entries) in &sections {
            let _ = write!(out, "\n## {}\n", category_title(name));
            for entry in entries {
                let mut lines = entry.body.lines();
                let first = lines.next().unwrap_or_default();
                match entry.context.as_deref() {
                    Some(context) => {
                        let _ = writeln!(out, "- [{context}] {first}");
                    }
                    None => {
                        let _ = writeln!(out, "- {first}");
                    }
                }
                for line in lines {
                    let _ = writeln!(out, "  {line}");
                }
            }
        }
        Ok(out)
    }
}
