use super::helpers::cache;
use crate::cli::CacheCommands;
use crate::config::Config;
use crate::error::Result;

pub fn execute(config: &Config, command: &CacheCommands) -> Result<()> {
    let cache = cache(config);
    match command {
        CacheCommands::List => {
            let entries = cache.entries()?;
            if entries.is_empty() {
                println!("No cached identities in {}", cache.root().display());
                return Ok(());
            }
            println!("Cached identities in {}:", cache.root().display());
            for entry in entries {
                if let Some(name) = entry.file_name() {
                    println!("  {}", name.to_string_lossy());
                }
            }
        }
        CacheCommands::Clean => {
            let removed = cache.clean()?;
            println!("✓ Removed {} cached checkout(s)", removed);
        }
    }
    Ok(())
}
