use super::helpers::fetcher;
use crate::config::Config;
use crate::error::Result;
use crate::manifest::load_manifest;
use crate::reconcile::secrets::{SecretRequirement, SecretValues};
use crate::reconcile::{discover_identities, plan, SyncOptions};
use crate::registry::Registries;

pub fn execute(config: &Config) -> Result<()> {
    let manifest = load_manifest(&config.manifest_path())?;
    let discovered = discover_identities(&manifest, &fetcher(config, &config.manifest_dir()))?;
    let registries = Registries::load()?;
    let values = SecretValues::gather(&config.secrets_file_path())?;

    let report = plan(
        &manifest,
        &discovered,
        &registries,
        &values,
        &SyncOptions::default(),
    );
    let resolution = &report.secrets;

    let status = |req: &SecretRequirement| {
        let missing = resolution
            .missing
            .iter()
            .any(|m| m.env_var == req.env_var && m.agent == req.agent);
        if missing {
            "✗ missing"
        } else {
            "✓ set"
        }
    };

    println!("Secrets for stack '{}':", manifest.stack_name);

    let global: Vec<_> = resolution
        .requirements
        .iter()
        .filter(|r| r.agent.is_none())
        .collect();
    if !global.is_empty() {
        println!("\nGlobal:");
        for req in global {
            println!("  {:<32} {:<24} {}", req.env_var, req.key, status(req));
        }
    }

    for agent in &report.manifest.agents {
        let reqs: Vec<_> = resolution
            .requirements
            .iter()
            .filter(|r| r.agent.as_deref() == Some(agent.name.as_str()))
            .collect();
        if reqs.is_empty() {
            continue;
        }
        println!("\n{} ({}):", agent.name, agent.role);
        for req in reqs {
            println!("  {:<32} {:<24} {}", req.env_var, req.key, status(req));
        }
    }

    for warning in &resolution.warnings {
        println!("\n⚠ {}", warning);
    }

    if resolution.missing.is_empty() {
        println!("\n✓ All secrets are set");
    } else {
        println!(
            "\n{} secret(s) missing; add them to {} or export them",
            resolution.missing.len(),
            config.secrets_file_path().display()
        );
    }
    Ok(())
}
