use anyhow::Result;
use colored::Colorize;
use ponder_core::ConfigManager;

pub fn execute(manager: &ConfigManager) -> Result<()> {
    let path = manager.config_path();
    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    };

    println!("{} {}", "# Config:".dimmed(), source.dimmed());
    print!("{}", manager.to_toml()?);
    Ok(())
}
