//! Reconciliation of a persisted manifest against freshly fetched identities.
//!
//! The pipeline runs in three phases:
//! 1. fetch every identity the manifest refers to (the only phase doing I/O
//!    besides the final write, and the only concurrent one)
//! 2. match, merge and resolve secrets and template variables in memory
//! 3. persist the manifest and secrets template together
//!
//! Any fetch failure aborts the run before phase 3, so a failed run never
//! leaves a half-updated manifest behind.

pub mod matcher;
pub mod secrets;
pub mod template_vars;

use crate::error::Result;
use crate::identity::{DiscoveredIdentity, IdentityFetcher, IdentityManifest};
use crate::manifest::writer::{self, WriteOutcome};
use crate::manifest::{load_manifest, DeploymentManifest};
use crate::registry::Registries;
use matcher::reconcile;
use secrets::{resolve_secrets, SecretValues, SecretsResolution};
use std::collections::BTreeMap;
use std::path::Path;
use template_vars::{resolve_template_vars, TemplateVarResolution};
use tracing::{info, warn};

pub use matcher::{MatchResult, MatchTier, MatchedPair};

/// Agent name -> the identity that agent runs
pub type Bindings<'a> = BTreeMap<String, &'a IdentityManifest>;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Explicit template variable values (`--var NAME=VALUE`)
    pub vars: BTreeMap<String, String>,
    /// Append agents for identities no existing agent matched
    pub adopt_new: bool,
    /// Write even when secrets or template variables are unresolved
    pub allow_incomplete: bool,
    pub dry_run: bool,
}

/// Everything one reconciliation run decided
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// (agent, identity path, tier)
    pub matched: Vec<(String, String, MatchTier)>,
    pub unmatched_agents: Vec<String>,
    pub unmatched_discovered: Vec<String>,
    pub adopted: Vec<String>,
    pub secrets: SecretsResolution,
    pub template_vars: TemplateVarResolution,
    /// The merged manifest
    pub manifest: DeploymentManifest,
    /// `None` when nothing was written (dry run)
    pub outcome: Option<WriteOutcome>,
}

/// Fetch every identity the manifest refers to.
///
/// With an `[identities]` root the root is resolved once and scanned;
/// otherwise each agent's own source is fetched, concurrently.
pub fn discover_identities(
    manifest: &DeploymentManifest,
    fetcher: &IdentityFetcher,
) -> Result<Vec<DiscoveredIdentity>> {
    if let Some(root) = &manifest.identities {
        return fetcher.discover(&root.to_source()?);
    }
    let sources = manifest
        .agents
        .iter()
        .map(|a| a.to_source())
        .collect::<Result<Vec<_>>>()?;
    fetcher.fetch_all(&sources)
}

/// Match, merge and resolve in memory. Touches no files.
pub fn plan(
    prior: &DeploymentManifest,
    discovered: &[DiscoveredIdentity],
    registries: &Registries,
    values: &SecretValues,
    options: &SyncOptions,
) -> SyncReport {
    let result = reconcile(&prior.agents, discovered);
    for agent in &result.unmatched_agents {
        warn!(agent = %agent.name, source = %agent.identity_source, "no identity matched agent; keeping it as is");
    }

    let mut manifest = prior.clone();
    let adopted = writer::apply_matches(&mut manifest, &result, options.adopt_new);

    let mut bindings = Bindings::new();
    for pair in &result.matched {
        bindings.insert(pair.agent.name.clone(), &pair.identity.manifest);
    }
    for (name, identity) in adopted.iter().zip(&result.unmatched_discovered) {
        bindings.insert(name.clone(), &identity.manifest);
    }

    let secrets = resolve_secrets(&manifest, &bindings, registries, values);
    let template_vars = resolve_template_vars(&manifest, &bindings, &options.vars);
    writer::apply_resolutions(&mut manifest, &bindings, registries, &secrets, &template_vars);

    let unmatched_discovered = if options.adopt_new {
        Vec::new()
    } else {
        result
            .unmatched_discovered_paths()
            .into_iter()
            .map(str::to_string)
            .collect()
    };

    SyncReport {
        matched: result
            .matched
            .iter()
            .map(|p| (p.agent.name.clone(), p.identity.rel_path.clone(), p.tier))
            .collect(),
        unmatched_agents: result.unmatched_agents.iter().map(|a| a.name.clone()).collect(),
        unmatched_discovered,
        adopted,
        secrets,
        template_vars,
        manifest,
        outcome: None,
    }
}

/// Run the full pipeline against the manifest at `manifest_path`.
pub fn sync(
    manifest_path: &Path,
    template_path: &Path,
    fetcher: &IdentityFetcher,
    registries: &Registries,
    values: &SecretValues,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let prior = load_manifest(manifest_path)?;
    let discovered = discover_identities(&prior, fetcher)?;
    let mut report = plan(&prior, &discovered, registries, values, options);

    info!(
        matched = report.matched.len(),
        unmatched_agents = report.unmatched_agents.len(),
        unmatched_identities = report.unmatched_discovered.len(),
        adopted = report.adopted.len(),
        "reconciled manifest"
    );

    if !options.allow_incomplete {
        report.secrets.ensure_complete()?;
        report.template_vars.ensure_complete()?;
    }
    if !options.dry_run {
        report.outcome = Some(writer::persist(&report.manifest, manifest_path, template_path)?);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityCache;
    use crate::manifest::parse_manifest;
    use std::fs;
    use std::time::Duration;

    fn write_identity(dir: &Path, body: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("identity.toml"), body).unwrap();
    }

    fn fetcher(base: &Path) -> IdentityFetcher {
        IdentityFetcher::new(
            IdentityCache::new(base.join(".cache"), Duration::from_secs(5)),
            base,
        )
    }

    const FLEET: &str = r#"
stack_name = "acme"
provider = "hetzner"
region = "fsn1"
instance_type = "cx32"

[identities]
source = "./ids"

[[agents]]
name = "agent-juno"
display_name = "Juno"
role = "eng"
identity_source = "./old-eng"
volume_size = 20
"#;

    #[test]
    fn test_plan_moves_source_and_reports_new_identities() {
        let tmp = tempfile::tempdir().unwrap();
        write_identity(
            &tmp.path().join("ids/new-eng"),
            "name = \"juno\"\ndisplay_name = \"Juno\"\nrole = \"eng\"\ntemplate_vars = [\"TEAM\"]",
        );
        write_identity(
            &tmp.path().join("ids/pm"),
            "name = \"pam\"\ndisplay_name = \"Pam\"\nrole = \"pm\"",
        );

        let prior = parse_manifest(FLEET, "fleet.toml").unwrap();
        let discovered = discover_identities(&prior, &fetcher(tmp.path())).unwrap();
        let options = SyncOptions {
            vars: BTreeMap::from([("TEAM".to_string(), "core".to_string())]),
            ..Default::default()
        };
        let report = plan(
            &prior,
            &discovered,
            &Registries::empty(),
            &SecretValues::default(),
            &options,
        );

        assert_eq!(
            report.matched,
            vec![("agent-juno".to_string(), "./new-eng".to_string(), MatchTier::Name)]
        );
        assert_eq!(report.unmatched_discovered, vec!["./pm"]);
        assert_eq!(report.manifest.agents[0].identity_source, "./new-eng");
        assert_eq!(report.manifest.template_vars["TEAM"], "core");
    }

    #[test]
    fn test_fetch_failure_aborts_before_write() {
        let tmp = tempfile::tempdir().unwrap();
        write_identity(&tmp.path().join("ids/eng"), "name = \"Not A Slug\"");
        let manifest_path = tmp.path().join("fleet.toml");
        fs::write(&manifest_path, FLEET).unwrap();

        let err = sync(
            &manifest_path,
            &tmp.path().join("fleet.secrets.template"),
            &fetcher(tmp.path()),
            &Registries::empty(),
            &SecretValues::default(),
            &SyncOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, crate::error::FleetError::ManifestInvalid { .. }));
        assert_eq!(fs::read_to_string(&manifest_path).unwrap(), FLEET);
        assert!(!tmp.path().join("fleet.secrets.template").exists());
    }

    #[test]
    fn test_missing_secrets_block_write_unless_allowed() {
        let tmp = tempfile::tempdir().unwrap();
        write_identity(
            &tmp.path().join("ids/old-eng"),
            "name = \"juno\"\ndisplay_name = \"Juno\"\nrole = \"eng\"\nrequired_secrets = [\"sentry_dsn\"]",
        );
        let manifest_path = tmp.path().join("fleet.toml");
        let template_path = tmp.path().join("fleet.secrets.template");
        fs::write(&manifest_path, FLEET).unwrap();

        let run = |options: &SyncOptions| {
            sync(
                &manifest_path,
                &template_path,
                &fetcher(tmp.path()),
                &Registries::empty(),
                &SecretValues::default(),
                options,
            )
        };

        let err = run(&SyncOptions::default()).unwrap_err();
        assert!(err.to_string().contains("ENG_SENTRY_DSN"));
        assert_eq!(fs::read_to_string(&manifest_path).unwrap(), FLEET);

        let report = run(&SyncOptions {
            allow_incomplete: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(report.outcome, Some(WriteOutcome::Written));
        assert!(fs::read_to_string(&template_path)
            .unwrap()
            .contains("ENG_SENTRY_DSN="));
    }
}
