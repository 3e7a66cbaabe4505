use anyhow::Result;
use clap::Parser;

mod cli;
mod config_cmd;
mod error_hints;
mod idea_cmd;
mod memory_cmd;
mod task_cmd;

use cli::{Cli, Commands, ConfigCommands, IdeaCommands};
use recall_config::GlobalConfig;
use recall_memory::MemoryStore;
use task_cmd::TaskPaths;

#[tokio::main]
async fn main() {
    // Initialize tracing (output to stderr, initialize only once)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(hint) = error_hints::suggest_fix(&err) {
                eprintln!("{hint}");
            }
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = GlobalConfig::load()?;
    let format = cli.format;
    let memory_dir = cli.memory_dir.unwrap_or_else(|| config.memory_dir());
    tracing::debug!(memory_dir = %memory_dir.display(), "resolved memory directory");

    match cli.command {
        Commands::Add {
            category,
            body,
            context,
        } => {
            let store = MemoryStore::new(memory_dir);
            memory_cmd::handle_add(&store, &category, &body, context.as_deref(), format)?;
        }
        Commands::Show { category, all } => {
            let store = MemoryStore::new(memory_dir);
            memory_cmd::handle_show(&store, category.as_deref(), all, format)?;
        }
        Commands::Search {
            text,
            category,
            since,
            all,
        } => {
            let store = MemoryStore::new(memory_dir);
            memory_cmd::handle_search(
                &store,
                &text,
                category.as_deref(),
                since.as_deref(),
                all,
                format,
            )?;
        }
        Commands::Supersede {
            category,
            reference,
            body,
            context,
        } => {
            let store = MemoryStore::new(memory_dir);
            memory_cmd::handle_supersede(
                &store,
                &category,
                &reference,
                &body,
                context.as_deref(),
                format,
            )?;
        }
        Commands::Archive {
            category,
            reference,
        } => {
            let store = MemoryStore::new(memory_dir);
            memory_cmd::handle_archive(&store, &category, &reference, format)?;
        }
        Commands::Categories => {
            memory_cmd::handle_categories(&MemoryStore::new(memory_dir), format)?;
        }
        Commands::Summary => {
            memory_cmd::handle_summary(&MemoryStore::new(memory_dir))?;
        }
        Commands::Install { project_dir } => {
            memory_cmd::handle_install(&project_dir, &memory_dir, format)?;
        }
        Commands::Idea { cmd } => {
            let ideas = MemoryStore::new(memory_dir).ideas();
            match cmd {
                IdeaCommands::Add { title, summary } => {
                    idea_cmd::handle_idea_add(&ideas, &title, &summary, format)?;
                }
                IdeaCommands::List => idea_cmd::handle_idea_list(&ideas, format)?,
                IdeaCommands::Priority { id, priority } => {
                    idea_cmd::handle_idea_priority(&ideas, &id, priority, format)?;
                }
                IdeaCommands::Link { id, folder } => {
                    idea_cmd::handle_idea_link(&ideas, &id, &folder, format)?;
                }
                IdeaCommands::Status { id, status } => {
                    idea_cmd::handle_idea_status(&ideas, &id, status, format)?;
                }
                IdeaCommands::Show { id } => idea_cmd::handle_idea_show(&ideas, &id, format)?,
            }
        }
        Commands::Tasks {
            tasks,
            state_dir,
            cmd,
        } => {
            let paths = TaskPaths::resolve(&config, tasks, state_dir);
            return task_cmd::handle_tasks_command(cmd, &config, &paths, format).await;
        }
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => config_cmd::handle_config_show(&config, format)?,
            ConfigCommands::Path => config_cmd::handle_config_path(format)?,
        },
    }
    Ok(0)
}
