use std::path::Path;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use recall_core::error::AppError;
use recall_core::types::OutputFormat;
use recall_memory::{
    Entry, EntryRef, InstallOutcome, MemoryQuery, MemoryStore, format_timestamp,
    install_memory_block,
};

pub(crate) fn handle_add(
    store: &MemoryStore,
    category: &str,
    body: &[String],
    context: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let entry = store.append(category, &body.join(" "), context)?;
    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "Added to [{}] #{} ({}): {}",
            entry.category,
            entry.position,
            entry.short_id(),
            first_line(&entry.body)
        );
    }
    Ok(())
}

pub(crate) fn handle_show(
    store: &MemoryStore,
    category: Option<&str>,
    all: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut query = MemoryQuery::new()
        .include_superseded(all)
        .include_archived(all);
    if let Some(category) = category {
        query = query.category(category);
    }
    let results = store.query(&query)?;

    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        match category {
            Some(category) => println!("No memories in category '{category}'."),
            None => println!("No memories stored yet."),
        }
        return Ok(());
    }
    for entry in &results {
        print_entry(entry, category.is_none());
    }
    Ok(())
}

pub(crate) fn handle_search(
    store: &MemoryStore,
    text: &[String],
    category: Option<&str>,
    since: Option<&str>,
    all: bool,
    format: OutputFormat,
) -> Result<()> {
    let needle = text.join(" ");
    let mut query = MemoryQuery::new()
        .text(needle.as_str())
        .include_superseded(all)
        .include_archived(all);
    if let Some(category) = category {
        query = query.category(category);
    }
    if let Some(since) = since {
        query = query.since(parse_since(since)?);
    }
    let results = store.query(&query)?;

    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No matches found for '{needle}'.");
        return Ok(());
    }
    println!("Found {} match(es) for '{needle}':", results.count());
    for entry in &results {
        print_entry(entry, true);
    }
    Ok(())
}

pub(crate) fn handle_supersede(
    store: &MemoryStore,
    category: &str,
    reference: &str,
    body: &[String],
    context: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let old: EntryRef = reference.parse()?;
    let entry = store.supersede(category, &old, &body.join(" "), context)?;
    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "Superseded {old} in [{}] with #{} ({}): {}",
            entry.category,
            entry.position,
            entry.short_id(),
            first_line(&entry.body)
        );
    }
    Ok(())
}

pub(crate) fn handle_archive(
    store: &MemoryStore,
    category: &str,
    reference: &str,
    format: OutputFormat,
) -> Result<()> {
    let entry_ref: EntryRef = reference.parse()?;
    let entry = store.archive(category, &entry_ref)?;
    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "Archived [{}] #{} ({}): {}",
            entry.category,
            entry.position,
            entry.short_id(),
            first_line(&entry.body)
        );
    }
    Ok(())
}

pub(crate) fn handle_categories(store: &MemoryStore, format: OutputFormat) -> Result<()> {
    let categories = store.categories()?;
    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&categories)?);
        return Ok(());
    }

    println!("Memory Categories:");
    println!("{}", "=".repeat(50));
    for info in &categories {
        println!(
            "  {:15} {:3} memories - {}",
            info.name, info.active, info.description
        );
    }
    Ok(())
}

pub(crate) fn handle_summary(store: &MemoryStore) -> Result<()> {
    println!("{}", store.context_summary(Local::now().naive_local())?);
    Ok(())
}

pub(crate) fn handle_install(
    project_dir: &Path,
    memory_dir: &Path,
    format: OutputFormat,
) -> Result<()> {
    let outcome = install_memory_block(project_dir, memory_dir)?;
    let path = project_dir.join("CLAUDE.md");
    if format.is_json() {
        println!(
            "{}",
            serde_json::json!({ "outcome": outcome, "path": path })
        );
        return Ok(());
    }
    match outcome {
        InstallOutcome::Created => {
            println!("Created CLAUDE.md with memory integration at: {}", path.display());
        }
        InstallOutcome::Appended => println!("Memory integration added to: {}", path.display()),
        InstallOutcome::AlreadyInstalled => {
            println!("Memory integration already installed in {}", path.display());
        }
    }
    Ok(())
}

fn parse_since(raw: &str) -> Result<chrono::NaiveDateTime> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("--since '{raw}' is not YYYY-MM-DD")))?;
    Ok(date.and_time(chrono::NaiveTime::MIN))
}

fn first_line(body: &str) -> &str {
    body.lines().next().unwrap_or_default()
}

fn print_entry(entry: &Entry, with_category: bool) {
    let mut line = String::new();
    if with_category {
        line.push_str(&format!("[{}] ", entry.category));
    }
    line.push_str(&format!(
        "#{} {} ({})",
        entry.position,
        format_timestamp(entry.timestamp),
        entry.short_id()
    ));
    if let Some(context) = &entry.context {
        line.push_str(&format!(" *{context}*"));
    }
    if let Some(newer) = entry.superseded_by {
        let newer: String = newer.to_string().chars().take(8).collect();
        line.push_str(&format!(" [superseded by {newer}]"));
    }
    if entry.archived {
        line.push_str(" [archived]");
    }
    println!("{line}");
    for body_line in entry.body.lines() {
        println!("    {body_line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_accepts_dates_only() {
        let parsed = parse_since("2026-10-16").unwrap();
        assert_eq!(parsed.to_string(), "2026-10-16 00:00:00");

        let err = parse_since("yesterday").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::Validation(_))
        ));
    }

    #[test]
    fn first_line_of_multiline_body() {
        assert_eq!(first_line("one\ntwo"), "one");
        assert_eq!(first_line(""), "");
    }
}
