use std::path::Path;

use anyhow::Result;
use recall_core::types::OutputFormat;
use recall_memory::{Idea, IdeaBook, IdeaStatus};

pub(crate) fn handle_idea_add(
    ideas: &IdeaBook,
    title: &str,
    summary: &[String],
    format: OutputFormat,
) -> Result<()> {
    let idea = ideas.add(title, &summary.join(" "))?;
    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&idea)?);
    } else {
        println!("Idea added: {}", idea.id);
        println!("  Title: {}", idea.title);
        println!("  Detail file: {}", idea.detail_file.display());
    }
    Ok(())
}

pub(crate) fn handle_idea_list(ideas: &IdeaBook, format: OutputFormat) -> Result<()> {
    let list = ideas.list()?;
    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    if list.is_empty() {
        println!("No ideas tracked yet. Add one with: recall idea add <title> <summary>");
        return Ok(());
    }

    println!("{:4} {:25} {:8} Title", "Pri", "ID", "Status");
    println!("{}", "-".repeat(70));
    for idea in &list {
        let folder = idea
            .project_folder
            .as_ref()
            .map(|folder| format!(" [{}]", folder.display()))
            .unwrap_or_default();
        println!(
            "{:4} {:25} {:8} {}{folder}",
            idea.priority_label(),
            idea.id,
            idea.status.to_string(),
            idea.title
        );
    }
    Ok(())
}

pub(crate) fn handle_idea_priority(
    ideas: &IdeaBook,
    id: &str,
    priority: u8,
    format: OutputFormat,
) -> Result<()> {
    let idea = ideas.set_priority(id, priority)?;
    print_change(&idea, format, || {
        format!("Priority set: {} -> {}", idea.id, idea.priority_name())
    })
}

pub(crate) fn handle_idea_link(
    ideas: &IdeaBook,
    id: &str,
    folder: &Path,
    format: OutputFormat,
) -> Result<()> {
    let idea = ideas.link(id, folder)?;
    print_change(&idea, format, || {
        format!("Linked: {} -> {}", idea.id, folder.display())
    })
}

pub(crate) fn handle_idea_status(
    ideas: &IdeaBook,
    id: &str,
    status: IdeaStatus,
    format: OutputFormat,
) -> Result<()> {
    let idea = ideas.set_status(id, status)?;
    print_change(&idea, format, || format!("Status set: {} -> {}", idea.id, idea.status))
}

pub(crate) fn handle_idea_show(ideas: &IdeaBook, id: &str, format: OutputFormat) -> Result<()> {
    let idea = ideas.get(id)?;
    let detail = ideas.detail(&idea)?;
    if format.is_json() {
        println!(
            "{}",
            serde_json::json!({ "idea": idea, "detail": detail })
        );
        return Ok(());
    }

    println!("Title:    {}", idea.title);
    println!("ID:       {}", idea.id);
    println!("Priority: {}", idea.priority_name());
    println!("Status:   {}", idea.status);
    println!("Created:  {}", idea.created.format("%Y-%m-%d"));
    match &idea.project_folder {
        Some(folder) => println!("Folder:   {}", folder.display()),
        None => println!("Folder:   Not linked"),
    }
    println!("Detail:   {}", idea.detail_file.display());
    if let Some(detail) = detail {
        println!();
        println!("{detail}");
    }
    Ok(())
}

fn print_change(idea: &Idea, format: OutputFormat, text: impl FnOnce() -> String) -> Result<()> {
    if format.is_json() {
        println!("{}", serde_json::to_string_pretty(idea)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}
