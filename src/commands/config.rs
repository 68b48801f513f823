use crate::cli::ConfigCommands;
use crate::config::{Config, CONFIG_FILE};
use crate::error::Result;
use crate::logging::filter_directive;
use crate::utils::path::home_dir;
use std::path::{Path, PathBuf};

pub fn execute(config: &Config, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate => validate(),
        ConfigCommands::Show => show(config),
    }
}

fn validate() -> Result<()> {
    let project_root = PathBuf::from(".");
    let project_config = project_root.join(CONFIG_FILE);
    let global_config = home_dir()
        .map(|h| h.join(CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from("~").join(CONFIG_FILE));

    println!("Validating configuration files...\n");
    report_file("Global config", &global_config);
    report_file("Project config", &project_config);

    println!("\nLoading and validating configuration...");
    match Config::load(&project_root) {
        Ok(_) => {
            println!("✓ Configuration is valid!");
            Ok(())
        }
        Err(e) => {
            println!("✗ Configuration is invalid!");
            println!("  Error: {}", e);
            Err(e)
        }
    }
}

fn report_file(label: &str, path: &Path) {
    if path.exists() {
        println!("  {}: {}", label, path.display());
    } else {
        println!("  {}: {} - not found (optional)", label, path.display());
    }
}

fn show(config: &Config) -> Result<()> {
    println!("Effective Configuration:");
    println!("(CLI > Environment > Project config > Global config > Defaults)\n");

    println!("Paths:");
    println!("  manifest: {}", config.manifest_path().display());
    println!(
        "  secrets template: {}",
        config.secrets_template_path().display()
    );
    println!("  secrets file: {}", config.secrets_file_path().display());

    println!("\nCache:");
    println!("  dir: {}", config.cache_dir().display());

    println!("\nFetch:");
    println!("  timeout: {}s", config.fetch.timeout_secs);
    println!("  retries: {}", config.fetch.retries);

    println!("\nLogging:");
    println!("  filter: {}", filter_directive(config));
    println!("  format: {:?}", config.logging.format);

    Ok(())
}
