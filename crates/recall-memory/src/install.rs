use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

const INSTRUCTIONS_FILE: &str = "CLAUDE.md";
const BLOCK_HEADING: &str = "## Persistent Memory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallOutcome {
    /// The instructions file did not exist and was created.
    Created,
    /// The block was appended to an existing instructions file.
    Appended,
    AlreadyInstalled,
}

fn memory_block(memory_dir: &Path) -> String {
    format!(
        "\n{BLOCK_HEADING}\n\n\
         This project keeps persistent context across sessions with `recall`.\n\
         At the start of each session, load it:\n\n\
         **Memory location:** `{dir}`\n\n\
         **Quick load:** run `recall summary` for a compact context summary.\n\n\
         **To update memories:** run `recall add <category> <memory>`; \
         replace outdated notes with `recall supersede <category> <ref> <memory>`.\n",
        dir = memory_dir.display()
    )
}

/// Add the memory-loading block to `<project_dir>/CLAUDE.md`.
///
/// Idempotent: a file that already carries the block is left untouched.
pub fn install_memory_block(project_dir: &Path, memory_dir: &Path) -> Result<InstallOutcome> {
    if !project_dir.is_dir() {
        anyhow::bail!("project directory not found: {}", project_dir.display());
    }

    let path = project_dir.join(INSTRUCTIONS_FILE);
    let block = memory_block(memory_dir);

    if !path.exists() {
        fs::write(&path, format!("# Project Rules\n{block}"))
            .with_context(|| format!("failed to create {}", path.display()))?;
        info!(path = %path.display(), "created instructions file with memory block");
        return Ok(InstallOutcome::Created);
    }

    let existing = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if existing.contains(BLOCK_HEADING) {
        return Ok(InstallOutcome::AlreadyInstalled);
    }

    let mut file = OpenOptions::new()
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let separator = if existing.ends_with('\n') { "" } else { "\n" };
    write!(file, "{separator}\n---\n{block}")
        .with_context(|| format!("failed to append to {}", path.display()))?;
    info!(path = %path.display(), "appended memory block");
    Ok(InstallOutcome::Appended)
}
