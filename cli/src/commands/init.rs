use anyhow::Result;
use colored::Colorize;
use ponder_core::ConfigManager;
use std::path::{Path, PathBuf};
use tracing::info;

pub fn execute(dir: Option<&Path>, force: bool) -> Result<()> {
    let base_dir = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    info!("Base directory: {:?}", base_dir);

    let path = ConfigManager::init(&base_dir, force)?;

    println!("{}", "Configuration initialized".green().bold());
    println!("  {}", path.display().to_string().cyan());
    println!("\nNext steps:");
    println!("  1. Tune [engine] and [harvest] in the file above");
    println!(
        "  2. Run: {}",
        "ponder ask \"What is 15 + 27?\"".yellow()
    );

    Ok(())
}
