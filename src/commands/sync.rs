use super::helpers::fetcher;
use crate::config::Config;
use crate::error::Result;
use crate::manifest::WriteOutcome;
use crate::reconcile::{self, SyncOptions, SyncReport};
use crate::registry::Registries;
use crate::reconcile::secrets::SecretValues;
use crate::utils::env::parse_assignments;

pub struct SyncArgs<'a> {
    pub vars: &'a [String],
    pub adopt_new: bool,
    pub allow_incomplete: bool,
    pub dry_run: bool,
}

pub fn execute(config: &Config, args: SyncArgs<'_>) -> Result<()> {
    let options = SyncOptions {
        vars: parse_assignments(args.vars)?,
        adopt_new: args.adopt_new,
        allow_incomplete: args.allow_incomplete,
        dry_run: args.dry_run,
    };

    let registries = Registries::load()?;
    let values = SecretValues::gather(&config.secrets_file_path())?;
    let manifest_path = config.manifest_path();

    let report = reconcile::sync(
        &manifest_path,
        &config.secrets_template_path(),
        &fetcher(config, &config.manifest_dir()),
        &registries,
        &values,
        &options,
    )?;

    print_report(&report);

    match report.outcome {
        Some(WriteOutcome::Written) => println!("\n✓ Updated {}", manifest_path.display()),
        Some(WriteOutcome::Unchanged) => println!("\n✓ {} is up to date", manifest_path.display()),
        None => println!("\nDry run: nothing written"),
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    if !report.matched.is_empty() {
        println!("Matched:");
        for (agent, identity, tier) in &report.matched {
            println!("  {} -> {} (by {})", agent, identity, tier);
        }
    }

    if !report.unmatched_agents.is_empty() {
        println!("\nAgents without an identity (left unchanged):");
        for agent in &report.unmatched_agents {
            println!("  {}", agent);
        }
    }

    if !report.unmatched_discovered.is_empty() {
        println!("\nNew identities:");
        for path in &report.unmatched_discovered {
            println!("  {}", path);
        }
        println!("  Re-run with --adopt-new to add agents for them");
    }

    if !report.adopted.is_empty() {
        println!("\nAdded agents:");
        for agent in &report.adopted {
            println!("  {}", agent);
        }
    }

    if !report.template_vars.newly_required.is_empty() {
        println!(
            "\nNewly required template variables: {}",
            report.template_vars.newly_required.join(", ")
        );
    }
    if !report.template_vars.unresolved.is_empty() {
        println!(
            "\nUnresolved template variables: {}",
            report.template_vars.unresolved.join(", ")
        );
    }

    for warning in &report.secrets.warnings {
        println!("\n⚠ {}", warning);
    }

    if !report.secrets.missing.is_empty() {
        println!("\nMissing secrets:");
        for missing in &report.secrets.missing {
            println!("  {}", missing);
        }
    }
}
