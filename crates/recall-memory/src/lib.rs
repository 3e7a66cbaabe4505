//! Memory Store: categorized, timestamped notes kept as append-only
//! markdown logs, one file per category, plus a small idea tracker.

mod category;
mod entry;
mod format;
mod ideas;
mod install;
mod query;
mod store;
mod summary;

pub use category::{CategoryInfo, category_description, validate_category_name};
pub use entry::{Entry, EntryRef, TIMESTAMP_FORMAT, format_timestamp, parse_timestamp};
pub use ideas::{Idea, IdeaBook, IdeaStatus, MAX_PRIORITY};
pub use install::{InstallOutcome, install_memory_block};
pub use query::{MemoryQuery, QueryResults};
pub use store::MemoryStore;
