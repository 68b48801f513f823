use super::helpers::fetcher;
use crate::config::Config;
use crate::error::{FleetError, Result};
use crate::identity::{DiscoveredIdentity, IdentitySource};
use crate::manifest::writer::{new_agent, persist, WriteOutcome};
use crate::manifest::load_manifest;
use crate::schema::is_slug;
use tracing::info;

pub fn execute(
    config: &Config,
    reference: &str,
    version_ref: Option<&str>,
    name: Option<&str>,
) -> Result<()> {
    let manifest_path = config.manifest_path();
    let mut manifest = load_manifest(&manifest_path)?;

    if manifest.identities.is_some() {
        return Err(FleetError::InvalidConfig(
            "this manifest discovers agents from an [identities] root; \
             add the identity there and run 'agent-fleet sync --adopt-new'"
                .to_string(),
        ));
    }

    let source = IdentitySource::parse(reference, version_ref)?;
    if let Some(existing) = manifest
        .agents
        .iter()
        .find(|a| a.source_label() == source.label())
    {
        return Err(FleetError::InvalidConfig(format!(
            "agent '{}' already runs identity {}",
            existing.name,
            source.label()
        )));
    }

    // Local references are relative to the manifest, as they are stored there
    let (identity, dir) = fetcher(config, &config.manifest_dir()).resolve_identity(&source)?;
    let discovered = DiscoveredIdentity {
        rel_path: source.reference(),
        version_ref: source.version_ref.clone(),
        manifest: identity,
        dir,
    };

    let mut agent = new_agent(&manifest, &discovered);
    if let Some(name) = name {
        if !is_slug(name) {
            return Err(FleetError::InvalidConfig(format!(
                "agent name '{}' must be lowercase letters, digits and dashes",
                name
            )));
        }
        if manifest.agent(name).is_some() {
            return Err(FleetError::InvalidConfig(format!(
                "agent '{}' already exists",
                name
            )));
        }
        agent.name = name.to_string();
    }

    info!(agent = %agent.name, identity = %source, "adding agent");
    let agent_name = agent.name.clone();
    manifest.agents.push(agent);

    match persist(&manifest, &manifest_path, &config.secrets_template_path())? {
        WriteOutcome::Written => println!(
            "✓ Added agent '{}' ({}) to {}",
            agent_name,
            discovered.manifest.role,
            manifest_path.display()
        ),
        WriteOutcome::Unchanged => println!("Manifest already up to date"),
    }
    println!("\nRun 'agent-fleet sync' to fill in its secrets and template variables.");
    Ok(())
}
