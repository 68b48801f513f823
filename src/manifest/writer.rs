//! Merging reconciliation results into the manifest and persisting it.
//!
//! Merges are key by key: a value already in the manifest always wins over
//! a freshly computed one, which only fills gaps. The manifest and its
//! secrets template are written together through temp files and renames.

use super::definition::{AgentDefinition, DeploymentManifest, AGENT_NAME_PREFIX};
use crate::error::{FleetError, Result};
use crate::identity::{DiscoveredIdentity, IdentityManifest};
use crate::reconcile::matcher::MatchResult;
use crate::reconcile::secrets::SecretsResolution;
use crate::reconcile::template_vars::TemplateVarResolution;
use crate::reconcile::Bindings;
use crate::registry::Registries;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Env var set from the identity's `model` when the agent has none
pub const MODEL_ENV_VAR: &str = "AGENT_MODEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Both rendered documents equal what is already on disk
    Unchanged,
}

/// Point matched agents at their discovered identity and, with
/// `adopt_new`, append an agent for every unmatched identity.
///
/// Returns the names of adopted agents.
pub fn apply_matches(
    manifest: &mut DeploymentManifest,
    result: &MatchResult<'_>,
    adopt_new: bool,
) -> Vec<String> {
    for pair in &result.matched {
        let Some(agent) = manifest.agents.iter_mut().find(|a| a.name == pair.agent.name) else {
            continue;
        };
        if agent.identity_source != pair.identity.rel_path {
            info!(
                agent = %agent.name,
                from = %agent.identity_source,
                to = %pair.identity.rel_path,
                tier = %pair.tier,
                "identity source moved"
            );
        }
        agent.identity_source = pair.identity.rel_path.clone();
        agent.identity_version = pair.identity.version_ref.clone();
        agent.role = pair.identity.manifest.role.clone();
    }

    let mut adopted = Vec::new();
    if adopt_new {
        for identity in &result.unmatched_discovered {
            let agent = new_agent(manifest, identity);
            info!(agent = %agent.name, identity = %identity.rel_path, "adopted new identity");
            adopted.push(agent.name.clone());
            manifest.agents.push(agent);
        }
    }
    adopted
}

/// An agent definition for a freshly added identity, named
/// `agent-<identity name>` with a numeric suffix when that name is taken
pub fn new_agent(manifest: &DeploymentManifest, identity: &DiscoveredIdentity) -> AgentDefinition {
    let base = format!("{}{}", AGENT_NAME_PREFIX, identity.manifest.name);
    let mut name = base.clone();
    let mut n = 2;
    while manifest.agent(&name).is_some() {
        name = format!("{}-{}", base, n);
        n += 1;
    }

    let mut agent = AgentDefinition::new(&name, &identity.manifest.role, &identity.rel_path);
    agent.display_name = identity.manifest.display_name.clone();
    agent.identity_version = identity.version_ref.clone();
    agent.volume_size = identity.manifest.volume_size;
    agent
}

/// Fold resolved secrets, plugin defaults, model and template variables
/// into the manifest without replacing anything already there.
///
/// Secret keys the resolution no longer produces are removed, so the
/// manifest and its template track only what is still required.
pub fn apply_resolutions(
    manifest: &mut DeploymentManifest,
    bindings: &Bindings<'_>,
    registries: &Registries,
    secrets: &SecretsResolution,
    vars: &TemplateVarResolution,
) {
    manifest.secrets.retain(|key, env| {
        let keep = secrets.global.contains_key(key);
        if !keep {
            info!(key = %key, env = %env, "global secret no longer required");
        }
        keep
    });
    for (key, env) in &secrets.global {
        manifest
            .secrets
            .entry(key.clone())
            .or_insert_with(|| env.clone());
    }
    for (name, value) in &vars.values {
        manifest.template_vars.insert(name.clone(), value.clone());
    }

    for agent in &mut manifest.agents {
        if let Some(keys) = secrets.per_agent.get(&agent.name) {
            let name = &agent.name;
            agent.secrets.retain(|key, env| {
                let keep = keys.contains_key(key);
                if !keep {
                    info!(agent = %name, key = %key, env = %env, "agent secret no longer required");
                }
                keep
            });
            for (key, env) in keys {
                agent.secrets.entry(key.clone()).or_insert_with(|| env.clone());
            }
        }
        if let Some(identity) = bindings.get(&agent.name) {
            merge_plugins(agent, identity, registries);
            if let Some(model) = &identity.model {
                agent
                    .env_vars
                    .entry(MODEL_ENV_VAR.to_string())
                    .or_insert_with(|| model.clone());
            }
        }
    }
}

/// Per key: prior value > identity plugin default > registry default
fn merge_plugins(agent: &mut AgentDefinition, identity: &IdentityManifest, registries: &Registries) {
    for plugin in &identity.plugins {
        let config = agent.plugins.entry(plugin.clone()).or_default();
        if let Some(defaults) = identity.plugin_defaults.get(plugin) {
            for (key, value) in defaults {
                config.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        if let Some(entry) = registries.plugins.get(plugin) {
            for (key, value) in &entry.defaults {
                config.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
}

/// Render the secrets template: every expected env var name, without values
pub fn render_secrets_template(manifest: &DeploymentManifest) -> String {
    let mut out = format!(
        "# Secrets for stack '{}'. Fill in values, keep out of version control.\n",
        manifest.stack_name
    );

    out.push_str("\n# global\n");
    let global: BTreeSet<&str> = manifest.secrets.values().map(String::as_str).collect();
    for env in global {
        out.push_str(env);
        out.push_str("=\n");
    }

    for agent in manifest.agents.iter().filter(|a| !a.secrets.is_empty()) {
        out.push_str(&format!("\n# agent: {} ({})\n", agent.name, agent.role));
        let names: BTreeSet<&str> = agent.secrets.values().map(String::as_str).collect();
        for env in names {
            out.push_str(env);
            out.push_str("=\n");
        }
    }
    out
}

/// Env var names the manifest references but the template does not list
pub fn verify_consistency(manifest: &DeploymentManifest, template: &str) -> Vec<String> {
    let listed: BTreeSet<&str> = template
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| line.split_once('=').map(|(name, _)| name.trim()))
        .collect();

    let referenced: BTreeSet<&str> = manifest
        .secrets
        .values()
        .chain(manifest.agents.iter().flat_map(|a| a.secrets.values()))
        .map(String::as_str)
        .collect();

    referenced
        .into_iter()
        .filter(|name| !listed.contains(name))
        .map(str::to_string)
        .collect()
}

/// Write the manifest and its secrets template together.
///
/// Nothing is written when both rendered documents already match the files
/// on disk. If the manifest cannot be moved into place after the template
/// was, the previous template is put back.
pub fn persist(
    manifest: &DeploymentManifest,
    manifest_path: &Path,
    template_path: &Path,
) -> Result<WriteOutcome> {
    let manifest_text = manifest.to_toml_string()?;
    let template_text = render_secrets_template(manifest);

    let missing = verify_consistency(manifest, &template_text);
    if !missing.is_empty() {
        return Err(FleetError::Commit {
            path: template_path.to_path_buf(),
            message: format!("template is missing {}", missing.join(", ")),
        });
    }

    let previous_manifest = read_existing(manifest_path)?;
    let previous_template = read_existing(template_path)?;
    if previous_manifest.as_deref() == Some(manifest_text.as_str())
        && previous_template.as_deref() == Some(template_text.as_str())
    {
        debug!(path = %manifest_path.display(), "manifest unchanged, skipping write");
        return Ok(WriteOutcome::Unchanged);
    }

    let manifest_tmp = stage(manifest_path, &manifest_text)?;
    let template_tmp = match stage(template_path, &template_text) {
        Ok(tmp) => tmp,
        Err(e) => {
            let _ = fs::remove_file(&manifest_tmp);
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&template_tmp, template_path) {
        let _ = fs::remove_file(&manifest_tmp);
        let _ = fs::remove_file(&template_tmp);
        return Err(commit_error(template_path, e));
    }

    if let Err(e) = fs::rename(&manifest_tmp, manifest_path) {
        let _ = fs::remove_file(&manifest_tmp);
        restore(template_path, previous_template.as_deref());
        return Err(commit_error(manifest_path, e));
    }

    info!(
        manifest = %manifest_path.display(),
        template = %template_path.display(),
        agents = manifest.agents.len(),
        "wrote deployment manifest"
    );
    Ok(WriteOutcome::Written)
}

fn read_existing(path: &Path) -> Result<Option<String>> {
    if path.exists() && !path.is_file() {
        return Ok(None);
    }
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FleetError::Io(e)),
    }
}

/// Write `contents` to a temp sibling of `path`
fn stage(path: &Path, contents: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| commit_error(path, e))?;
    }
    let tmp = temp_sibling(path);
    fs::write(&tmp, contents).map_err(|e| commit_error(&tmp, e))?;
    Ok(tmp)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

fn restore(path: &Path, previous: Option<&str>) {
    let result = match previous {
        Some(text) => stage(path, text).and_then(|tmp| {
            fs::rename(&tmp, path).map_err(|e| commit_error(path, e))
        }),
        None => fs::remove_file(path).map_err(FleetError::Io),
    };
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to restore previous file");
    }
}

fn commit_error(path: &Path, err: std::io::Error) -> FleetError {
    FleetError::Commit {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
