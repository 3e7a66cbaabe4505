use std::path::PathBuf;

use clap::{Parser, Subcommand};
use recall_core::types::OutputFormat;
use recall_memory::IdeaStatus;

#[derive(Parser)]
#[command(name = "recall", version)]
#[command(about = "Recall: persistent memory notes and an idempotent task scheduler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Memory directory (overrides [memory] dir in config.toml)
    #[arg(long, global = true)]
    pub memory_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Append a memory to a category
    Add {
        category: String,

        /// Memory text; multiple words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        body: Vec<String>,

        /// Short label such as a project name
        #[arg(long)]
        context: Option<String>,
    },

    /// Show memories, optionally limited to one category
    Show {
        category: Option<String>,

        /// Include superseded and archived memories
        #[arg(long)]
        all: bool,
    },

    /// Case-insensitive search over memory text and context
    Search {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        #[arg(long)]
        category: Option<String>,

        /// Only memories on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Include superseded and archived memories
        #[arg(long)]
        all: bool,
    },

    /// Replace a memory with a newer version, keeping the old one in history
    Supersede {
        category: String,

        /// Position (`3` or `#3`) or id prefix of the memory to replace; all-digit
        /// id prefixes start with 0
        reference: String,

        #[arg(required = true, num_args = 1..)]
        body: Vec<String>,

        #[arg(long)]
        context: Option<String>,
    },

    /// Hide a memory from default listings
    Archive {
        category: String,

        /// Position (`3` or `#3`) or id prefix; all-digit id prefixes start with 0
        reference: String,
    },

    /// List categories with memory counts
    Categories,

    /// Print a compact context summary of all active memories
    Summary,

    /// Add memory-loading instructions to a project's CLAUDE.md
    Install { project_dir: PathBuf },

    /// Track ideas with a priority, a status and a detail page
    Idea {
        #[command(subcommand)]
        cmd: IdeaCommands,
    },

    /// Scheduled tasks
    Tasks {
        /// Tasks file (overrides [scheduler] tasks_file)
        #[arg(long)]
        tasks: Option<PathBuf>,

        /// Scheduler state directory (overrides [scheduler] state_dir)
        #[arg(long)]
        state_dir: Option<PathBuf>,

        #[command(subcommand)]
        cmd: TaskCommands,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum IdeaCommands {
    /// Track a new idea (parked, no priority)
    Add {
        title: String,

        /// One-line summary; multiple words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        summary: Vec<String>,
    },
    /// List ideas, highest priority first
    List,
    /// Set priority: 0=unset, 1=high, 2=medium, 3=low
    Priority {
        id: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=3))]
        priority: u8,
    },
    /// Associate a project folder with an idea
    Link { id: String, folder: PathBuf },
    /// Set status: parked, active or done
    Status { id: String, status: IdeaStatus },
    /// Show an idea and its detail page
    Show { id: String },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// List configured tasks in dependency order
    List,
    /// Validate the tasks file
    Check,
    /// Show tasks that are due now
    Due,
    /// Show persisted run records
    Status,
    /// Run one scheduler cycle
    Run,
    /// Run the named tasks now, regardless of schedule
    Trigger {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
}
