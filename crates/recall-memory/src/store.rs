use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use recall_core::error::AppError;
use tracing::{debug, info};
use ulid::Ulid;

use crate::category::{CategoryInfo, CategoryLog, KNOWN_CATEGORIES, validate_category_name};
use crate::entry::{Entry, EntryRef, truncate_to_minute};
use crate::format::{self, RawEntry};
use crate::ideas::IdeaBook;
use crate::query::{MemoryQuery, QueryResults};

const LOG_EXTENSION: &str = "md";
pub(crate) const LOCKS_DIR: &str = ".locks";

pub(crate) type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Append-only store of categorized notes.
///
/// Each category is one markdown log at `{base_dir}/{category}.md`. Writers
/// of a category serialize on `{base_dir}/.locks/{category}.lock`; readers
/// take no lock and parse whatever complete records are on disk.
#[derive(Clone)]
pub struct MemoryStore {
    base_dir: PathBuf,
    clock: Clock,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("base_dir", &self.base_dir)
            .finish()
    }
}

impl MemoryStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the wall clock; used by tests and by callers replaying notes.
    pub fn with_clock(
        mut self,
        clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static,
    ) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Idea tracker stored in the same directory, sharing this store's clock.
    pub fn ideas(&self) -> IdeaBook {
        IdeaBook::new(self.base_dir.clone()).with_shared_clock(Arc::clone(&self.clock))
    }

    pub fn category_path(&self, category: &str) -> PathBuf {
        self.base_dir.join(format!("{category}.{LOG_EXTENSION}"))
    }

    /// Append a new entry stamped with the current minute.
    pub fn append(&self, category: &str, body: &str, context: Option<&str>) -> Result<Entry> {
        let body = normalize_body(body)?;
        let context = normalize_context(context)?;

        let entry = self.write_locked(category, |log, now| {
            let raw = RawEntry {
                id: Ulid::new(),
                timestamp: next_timestamp(log, now),
                context,
                body,
                supersedes: None,
            };
            let text = format::render_entry(&raw);
            Ok((text, materialize(log, raw)))
        })?;

        info!(category, id = %entry.id, "appended memory entry");
        Ok(entry)
    }

    /// Append a replacement for `old` and link it; `old` stays on disk and
    /// remains reachable with `include_superseded`.
    pub fn supersede(
        &self,
        category: &str,
        old: &EntryRef,
        new_body: &str,
        context: Option<&str>,
    ) -> Result<Entry> {
        let body = normalize_body(new_body)?;
        let context = normalize_context(context)?;

        let entry = self.write_locked(category, |log, now| {
            let target = resolve(log, category, old)?;
            if let Some(newer) = target.superseded_by {
                return Err(AppError::validation(format!(
                    "entry {} in '{category}' is already superseded by {newer}",
                    target.id
                ))
                .into());
            }
            let raw = RawEntry {
                id: Ulid::new(),
                timestamp: next_timestamp(log, now),
                context,
                body,
                supersedes: Some(target.id),
            };
            let text = format::render_entry(&raw);
            Ok((text, materialize(log, raw)))
        })?;

        info!(category, id = %entry.id, supersedes = ?entry.supersedes, "superseded memory entry");
        Ok(entry)
    }

    /// Soft-delete an entry. Archiving twice is a no-op.
    pub fn archive(&self, category: &str, entry_ref: &EntryRef) -> Result<Entry> {
        let entry = self.write_locked(category, |log, now| {
            let mut target = resolve(log, category, entry_ref)?.clone();
            if target.archived {
                debug!(category, id = %target.id, "entry already archived");
                return Ok((String::new(), target));
            }
            let text = format::render_archive(next_timestamp(log, now), target.id);
            target.archived = true;
            Ok((text, target))
        })?;

        info!(category, id = %entry.id, "archived memory entry");
        Ok(entry)
    }

    /// Snapshot every entry matching `query`, ordered by timestamp.
    ///
    /// A missing category or an empty store yields empty results.
    pub fn query(&self, query: &MemoryQuery) -> Result<QueryResults> {
        let categories = match query.category.as_deref() {
            Some(category) => {
                validate_category_name(category)?;
                vec![category.to_string()]
            }
            None => self.category_names()?,
        };

        let mut entries = Vec::new();
        for category in &categories {
            entries.extend(self.load_category(category)?.entries);
        }
        entries.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.position.cmp(&b.position))
        });

        Ok(QueryResults::new(entries, query))
    }

    /// All entries of one category in insertion order, including superseded
    /// and archived ones.
    pub fn entries(&self, category: &str) -> Result<Vec<Entry>> {
        validate_category_name(category)?;
        Ok(self.load_category(category)?.entries)
    }

    /// Look up one entry by reference.
    pub fn get(&self, category: &str, entry_ref: &EntryRef) -> Result<Entry> {
        validate_category_name(category)?;
        let log = self.load_category(category)?;
        resolve(&log, category, entry_ref).cloned()
    }

    /// Known categories (always listed) followed by any other category that
    /// has a log on disk, alphabetically.
    pub fn categories(&self) -> Result<Vec<CategoryInfo>> {
        let mut names: Vec<String> = KNOWN_CATEGORIES
            .iter()
            .map(|(name, _)| (*name).to_string())
            .collect();
        for name in self.category_names()? {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        names
            .iter()
            .map(|name| Ok(self.load_category(name)?.info()))
            .collect()
    }

    /// Names of categories with a log on disk, sorted.
    pub fn category_names(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let dir = fs::read_dir(&self.base_dir)
            .with_context(|| format!("failed to list memory dir: {}", self.base_dir.display()))?;
        for item in dir {
            let path = item
                .with_context(|| format!("failed to list memory dir: {}", self.base_dir.display()))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if validate_category_name(stem).is_ok() {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub(crate) fn load_category(&self, category: &str) -> Result<CategoryLog> {
        let path = self.category_path(category);
        if !path.exists() {
            return Ok(CategoryLog {
                name: category.to_string(),
                entries: Vec::new(),
            });
        }

        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read memory log: {}", path.display()))?;
        let source = path.display().to_string();
        Ok(CategoryLog::from_records(
            category,
            format::parse_log(&source, &text),
        ))
    }

    pub(crate) fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    /// Run `build` against the current category state while holding the
    /// category's write lock, then durably append the text it returns.
    fn write_locked<T>(
        &self,
        category: &str,
        build: impl FnOnce(&CategoryLog, NaiveDateTime) -> Result<(String, T)>,
    ) -> Result<T> {
        validate_category_name(category)?;
        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("failed to create memory dir: {}", self.base_dir.display())
        })?;

        let _lock = recall_lock::acquire_blocking(&self.base_dir.join(LOCKS_DIR), category)?;
        let log = self.load_category(category)?;
        let (text, value) = build(&log, self.now())?;
        if text.is_empty() {
            return Ok(value);
        }

        let path = self.category_path(category);
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .with_context(|| format!("failed to open memory log: {}", path.display()))?;

        let is_new = file
            .metadata()
            .with_context(|| format!("failed to stat memory log: {}", path.display()))?
            .len()
            == 0;
        let payload = if is_new {
            format!("{}{text}", format::render_file_header(category))
        } else {
            text
        };

        // One write per record keeps lock-free readers from seeing a torn entry.
        file.write_all(payload.as_bytes())
            .with_context(|| format!("failed to append to memory log: {}", path.display()))?;
        file.sync_data()
            .with_context(|| format!("failed to sync memory log: {}", path.display()))?;

        Ok(value)
    }
}

/// Entries within a category never go backwards in time, even if the
/// clock does or the file was edited by hand.
fn next_timestamp(log: &CategoryLog, now: NaiveDateTime) -> NaiveDateTime {
    let now = truncate_to_minute(now);
    log.last_timestamp().map_or(now, |last| last.max(now))
}

fn materialize(log: &CategoryLog, raw: RawEntry) -> Entry {
    Entry {
        id: raw.id,
        category: log.name.clone(),
        position: log.entries.len() + 1,
        timestamp: raw.timestamp,
        context: raw.context,
        body: raw.body,
        supersedes: raw.supersedes,
        superseded_by: None,
        archived: false,
    }
}

fn resolve<'a>(log: &'a CategoryLog, category: &str, entry_ref: &EntryRef) -> Result<&'a Entry> {
    let matches: Vec<&Entry> = log.entries.iter().filter(|e| entry_ref.matches(e)).collect();
    match matches.as_slice() {
        [] => Err(AppError::EntryNotFound {
            category: category.to_string(),
            reference: entry_ref.to_string(),
        }
        .into()),
        [entry] => Ok(*entry),
        many => {
            let choices = many
                .iter()
                .map(|entry| entry.short_id())
                .collect::<Vec<_>>()
                .join(", ");
            Err(AppError::validation(format!(
                "ambiguous reference '{entry_ref}' in '{category}'; matches: {choices}"
            ))
            .into())
        }
    }
}

fn normalize_body(body: &str) -> Result<String> {
    let unified = body.replace("\r\n", "\n");
    let trimmed = unified.trim_end().trim_start_matches('\n');
    if trimmed.trim().is_empty() {
        return Err(AppError::validation("memory body must not be empty").into());
    }
    Ok(trimmed.to_string())
}

fn normalize_context(context: Option<&str>) -> Result<Option<String>> {
    let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    if context.contains('\n') || context.contains('\r') {
        return Err(AppError::validation("context must be a single line").into());
    }
    Ok(Some(context.to_string()))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
