#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;

use agent_fleet::cli::{Cli, Commands};
use agent_fleet::commands;
use agent_fleet::commands::sync::SyncArgs;
use agent_fleet::config::Config;
use agent_fleet::logging;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only commands that need it load config and start logging
    let load = || -> Result<Config> {
        let config = Config::load(&std::env::current_dir()?)?.with_cli_overrides(&cli);
        logging::init(&config)?;
        Ok(config)
    };

    match &cli.command {
        Commands::Version => commands::version::execute()?,
        Commands::Resolve {
            reference,
            version_ref,
        } => commands::resolve::execute(&load()?, reference, version_ref.as_deref())?,
        Commands::Validate => commands::validate::execute(&load()?)?,
        Commands::Add {
            reference,
            version_ref,
            name,
        } => commands::add::execute(
            &load()?,
            reference,
            version_ref.as_deref(),
            name.as_deref(),
        )?,
        Commands::Sync {
            vars,
            adopt_new,
            allow_incomplete,
            dry_run,
        } => commands::sync::execute(
            &load()?,
            SyncArgs {
                vars,
                adopt_new: *adopt_new,
                allow_incomplete: *allow_incomplete,
                dry_run: *dry_run,
            },
        )?,
        Commands::Secrets => commands::secrets::execute(&load()?)?,
        Commands::Cache { command } => commands::cache::execute(&load()?, command)?,
        Commands::Config { command } => commands::config::execute(&load()?, command)?,
    }

    Ok(())
}
