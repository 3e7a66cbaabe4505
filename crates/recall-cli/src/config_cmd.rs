use anyhow::Result;
use recall_config::{GlobalConfig, paths};
use recall_core::types::OutputFormat;

pub(crate) fn handle_config_show(config: &GlobalConfig, format: OutputFormat) -> Result<()> {
    let effective = config.resolved();
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }
        OutputFormat::Text => {
            print!("{}", effective.to_toml()?);
        }
    }
    Ok(())
}

pub(crate) fn handle_config_path(format: OutputFormat) -> Result<()> {
    let path = paths::config_file();
    match format {
        OutputFormat::Json => {
            let exists = path.as_ref().is_some_and(|p| p.exists());
            println!("{}", serde_json::json!({ "path": path, "exists": exists }));
        }
        OutputFormat::Text => match path {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("No config directory available (is HOME set?)"),
        },
    }
    Ok(())
}
