//! Idea tracker kept next to the category logs.
//!
//! `{memory_dir}/ideas.toml` is the index (title, summary, priority, status,
//! linked project folder). Each idea also gets a hand-editable detail page
//! at `{memory_dir}/ideas/{id}.md`, created as a stub and never overwritten.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use recall_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::{Clock, LOCKS_DIR};

const INDEX_FILE: &str = "ideas.toml";
const DETAIL_DIR: &str = "ideas";
/// Category names cannot start with a dot, so this never shares a lock
/// with a category log.
const INDEX_LOCK: &str = ".ideas";

/// Highest priority value; 0 means unset.
pub const MAX_PRIORITY: u8 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaStatus {
    #[default]
    Parked,
    Active,
    Done,
}

impl fmt::Display for IdeaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parked => "parked",
            Self::Active => "active",
            Self::Done => "done",
        })
    }
}

impl FromStr for IdeaStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "parked" => Ok(Self::Parked),
            "active" => Ok(Self::Active),
            "done" => Ok(Self::Done),
            other => Err(AppError::validation(format!(
                "idea status '{other}' must be parked, active or done"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    /// Slug of the title; unique within the tracker.
    pub id: String,
    pub title: String,
    pub summary: String,
    /// 1 = high, 2 = medium, 3 = low, 0 = unset.
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub status: IdeaStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_folder: Option<PathBuf>,
    pub created: NaiveDate,
    /// Detail page, relative to the memory directory.
    pub detail_file: PathBuf,
}

impl Idea {
    /// Short label for listings: `P1`..`P3`, or `---` when unset.
    pub fn priority_label(&self) -> &'static str {
        match self.priority {
            1 => "P1",
            2 => "P2",
            3 => "P3",
            _ => "---",
        }
    }

    pub fn priority_name(&self) -> &'static str {
        match self.priority {
            1 => "HIGH",
            2 => "MEDIUM",
            3 => "LOW",
            _ => "Unset",
        }
    }

    /// Listing order: P1, P2, P3, then unset.
    fn rank(&self) -> u8 {
        if self.priority == 0 {
            u8::MAX
        } else {
            self.priority
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IdeaIndex {
    #[serde(default)]
    ideas: Vec<Idea>,
}

/// Handle on the idea tracker of one memory directory.
#[derive(Clone)]
pub struct IdeaBook {
    base_dir: PathBuf,
    clock: Clock,
}

impl fmt::Debug for IdeaBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdeaBook")
            .field("base_dir", &self.base_dir)
            .finish()
    }
}

impl IdeaBook {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    pub(crate) fn with_shared_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn index_path(&self) -> PathBuf {
        self.base_dir.join(INDEX_FILE)
    }

    /// All ideas, highest priority first; ties keep insertion order.
    pub fn list(&self) -> Result<Vec<Idea>> {
        let mut ideas = self.load()?.ideas;
        ideas.sort_by_key(Idea::rank);
        Ok(ideas)
    }

    pub fn get(&self, id: &str) -> Result<Idea> {
        self.load()?
            .ideas
            .into_iter()
            .find(|idea| idea.id == id)
            .ok_or_else(|| AppError::IdeaNotFound(id.to_string()).into())
    }

    /// Contents of the idea's detail page, if it still exists.
    pub fn detail(&self, idea: &Idea) -> Result<Option<String>> {
        let path = self.base_dir.join(&idea.detail_file);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("failed to read idea detail: {}", path.display()))
    }

    /// Track a new idea, parked with no priority, and create its detail stub.
    pub fn add(&self, title: &str, summary: &str) -> Result<Idea> {
        let title = title.trim();
        let summary = summary.trim();
        if title.is_empty() {
            return Err(AppError::validation("idea title must not be empty").into());
        }
        if summary.is_empty() {
            return Err(AppError::validation("idea summary must not be empty").into());
        }
        let id = slugify(title);
        if id.is_empty() {
            return Err(AppError::validation(format!(
                "idea title '{title}' needs at least one letter or digit"
            ))
            .into());
        }

        let idea = self.write_locked(|index, now| {
            if index.ideas.iter().any(|idea| idea.id == id) {
                return Err(AppError::validation(format!("idea '{id}' already exists")).into());
            }
            let idea = Idea {
                detail_file: Path::new(DETAIL_DIR).join(format!("{id}.md")),
                id,
                title: title.to_string(),
                summary: summary.to_string(),
                priority: 0,
                status: IdeaStatus::Parked,
                project_folder: None,
                created: now.date(),
            };
            index.ideas.push(idea.clone());
            Ok(idea)
        })?;

        self.write_detail_stub(&idea)?;
        info!(idea = %idea.id, "idea added");
        Ok(idea)
    }

    pub fn set_priority(&self, id: &str, priority: u8) -> Result<Idea> {
        if priority > MAX_PRIORITY {
            return Err(AppError::validation(format!(
                "idea priority {priority} must be 0 (unset) to {MAX_PRIORITY}"
            ))
            .into());
        }
        self.update(id, |idea| idea.priority = priority)
    }

    pub fn set_status(&self, id: &str, status: IdeaStatus) -> Result<Idea> {
        self.update(id, |idea| idea.status = status)
    }

    /// Associate a project folder with the idea. The folder is recorded as
    /// given; it does not have to exist yet.
    pub fn link(&self, id: &str, folder: &Path) -> Result<Idea> {
        if folder.as_os_str().is_empty() {
            return Err(AppError::validation("project folder must not be empty").into());
        }
        self.update(id, |idea| idea.project_folder = Some(folder.to_path_buf()))
    }

    fn update(&self, id: &str, change: impl FnOnce(&mut Idea)) -> Result<Idea> {
        self.write_locked(|index, _| {
            let idea = index
                .ideas
                .iter_mut()
                .find(|idea| idea.id == id)
                .ok_or_else(|| AppError::IdeaNotFound(id.to_string()))?;
            change(idea);
            Ok(idea.clone())
        })
    }

    fn load(&self) -> Result<IdeaIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(IdeaIndex::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read idea index: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse idea index: {}", path.display()))
    }

    /// Load, change and rewrite the index under its lock.
    fn write_locked<T>(
        &self,
        change: impl FnOnce(&mut IdeaIndex, NaiveDateTime) -> Result<T>,
    ) -> Result<T> {
        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("failed to create memory dir: {}", self.base_dir.display())
        })?;
        let _lock = recall_lock::acquire_blocking(&self.base_dir.join(LOCKS_DIR), INDEX_LOCK)?;

        let mut index = self.load()?;
        let value = change(&mut index, (self.clock)())?;
        self.save(&index)?;
        Ok(value)
    }

    fn save(&self, index: &IdeaIndex) -> Result<()> {
        let path = self.index_path();
        let content = toml::to_string_pretty(index).context("failed to serialize idea index")?;
        let tmp = path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("failed to write {}", tmp.display()))?;
            file.sync_all()
                .with_context(|| format!("failed to sync {}", tmp.display()))?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace idea index: {}", path.display()))?;
        debug!(path = %path.display(), ideas = index.ideas.len(), "saved idea index");
        Ok(())
    }

    fn write_detail_stub(&self, idea: &Idea) -> Result<()> {
        let path = self.base_dir.join(&idea.detail_file);
        if path.exists() {
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create idea dir: {}", dir.display()))?;
        }
        let stub = format!(
            "# {title}\n\n> {summary}\n\n## Overview\n\n(Add detailed description here)\n\n\
             ---\n\n## Implementation Notes\n\n\
             (Add technical details, architecture, dependencies here)\n\n\
             ---\n\n## Notes\n\n- Created: {created}\n- Status: Parked\n",
            title = idea.title,
            summary = idea.summary,
            created = idea.created.format("%Y-%m-%d"),
        );
        fs::write(&path, stub)
            .with_context(|| format!("failed to write idea detail: {}", path.display()))
    }
}

/// `"Genome Pipeline: v2!"` -> `genome-pipeline-v2`.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-') && !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
#[path = "ideas_tests.rs"]
mod tests;
