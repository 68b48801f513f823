//! Derivation of the secrets a fleet needs and lookup of their values.
//!
//! Requirements come from three places: fleet-wide credentials in the global
//! registry, registry entries for every plugin and dependency an agent
//! enables, and the identity's own `required_secrets`. A key already covered
//! by a registry entry is never requested a second time through
//! `required_secrets`.

use super::Bindings;
use crate::error::{FleetError, Result};
use crate::manifest::{AgentDefinition, DeploymentManifest};
use crate::registry::{Registries, Registry, SecretScope, SecretSpec};
use crate::utils::env::{load_env_file, screaming_snake};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// One secret the deployment needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRequirement {
    pub key: String,
    pub scope: SecretScope,
    /// Owning agent for agent-scoped keys
    pub agent: Option<String>,
    pub env_var: String,
    /// Format check from the registry, if any
    pub validator: Option<SecretSpec>,
}

/// A required secret with no value anywhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSecret {
    pub agent: Option<String>,
    pub key: String,
    pub env_var: String,
}

impl fmt::Display for MissingSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.agent {
            Some(agent) => write!(f, "{}: {} (set {})", agent, self.key, self.env_var),
            None => write!(f, "global: {} (set {})", self.key, self.env_var),
        }
    }
}

/// Secret values keyed by environment variable name
#[derive(Debug, Clone, Default)]
pub struct SecretValues {
    values: BTreeMap<String, String>,
}

impl SecretValues {
    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Cached values from `secrets_file`, overridden by the process
    /// environment
    pub fn gather(secrets_file: &Path) -> Result<Self> {
        let mut values = load_env_file(secrets_file)?;
        for (name, value) in std::env::vars() {
            if !value.is_empty() {
                values.insert(name, value);
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, env_var: &str) -> Option<&str> {
        self.values.get(env_var).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecretsResolution {
    /// Global key -> env var name
    pub global: BTreeMap<String, String>,
    /// Agent name -> key -> env var name
    pub per_agent: BTreeMap<String, BTreeMap<String, String>>,
    pub requirements: Vec<SecretRequirement>,
    /// Every required key without a value, once each
    pub missing: Vec<MissingSecret>,
    /// Format warnings and skipped registry lookups
    pub warnings: Vec<String>,
}

impl SecretsResolution {
    /// Fail with every missing key at once
    pub fn ensure_complete(&self) -> Result<()> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(FleetError::MissingSecrets(self.missing.clone()))
        }
    }

    /// Every expected env var name, sorted
    pub fn env_var_names(&self) -> BTreeSet<&str> {
        self.global
            .values()
            .chain(self.per_agent.values().flat_map(|m| m.values()))
            .map(String::as_str)
            .collect()
    }
}

/// Derive every secret requirement for the manifest and check its value.
///
/// Requirements come only from the registries and the bound identities;
/// names already recorded in the manifest are reused for the keys that are
/// still required. `bindings` maps agent names to the identity each agent
/// runs. Agents without a binding keep the secrets already recorded for
/// them, and while any agent is unbound the recorded global keys are kept
/// too, except credentials of another provider.
pub fn resolve_secrets(
    manifest: &DeploymentManifest,
    bindings: &Bindings<'_>,
    registries: &Registries,
    values: &SecretValues,
) -> SecretsResolution {
    let provider = manifest.provider.as_str();
    let mut plan = Plan::new(manifest);

    for spec in registries.global_secrets(provider) {
        plan.add_global(spec);
    }

    for agent in &manifest.agents {
        plan.per_agent.entry(agent.name.clone()).or_default();
        let Some(identity) = bindings.get(&agent.name) else {
            for key in agent.secrets.keys() {
                plan.add_agent(agent, &SecretSpec::plain(key.clone(), SecretScope::Agent));
            }
            continue;
        };

        let mut covered = BTreeSet::new();
        for plugin in identity.plugins.iter().filter(|p| agent.plugin_enabled(p)) {
            plan.add_entry(agent, &registries.plugins, plugin, &mut covered);
        }
        for dep in &identity.deps {
            plan.add_entry(agent, &registries.deps, dep, &mut covered);
        }
        for key in &identity.required_secrets {
            if covered.contains(key) {
                debug!(agent = %agent.name, key = %key, "required secret already covered by a registry entry");
                continue;
            }
            match registries.global_spec(key) {
                Some(spec) => plan.add_global(spec),
                None => plan.add_agent(agent, &SecretSpec::plain(key.clone(), SecretScope::Agent)),
            }
        }
    }

    if manifest.agents.iter().any(|a| !bindings.contains_key(&a.name)) {
        for key in manifest.secrets.keys() {
            match registries.global_spec(key) {
                Some(spec) if !spec.applies_to(provider) => {
                    debug!(key = %key, provider, "dropping credential of another provider");
                }
                Some(spec) => plan.add_global(spec),
                None => plan.add_global(&SecretSpec::plain(key.clone(), SecretScope::Global)),
            }
        }
    }

    plan.disambiguate();
    plan.check(values)
}

struct Plan<'m> {
    manifest: &'m DeploymentManifest,
    global: BTreeMap<String, String>,
    per_agent: BTreeMap<String, BTreeMap<String, String>>,
    requirements: Vec<SecretRequirement>,
    warnings: Vec<String>,
    /// (agent, key) -> env name suffix, for names computed in this run
    computed: BTreeMap<(String, String), String>,
}

impl<'m> Plan<'m> {
    fn new(manifest: &'m DeploymentManifest) -> Self {
        Self {
            manifest,
            global: BTreeMap::new(),
            per_agent: BTreeMap::new(),
            requirements: Vec::new(),
            warnings: Vec::new(),
            computed: BTreeMap::new(),
        }
    }

    fn add_entry(
        &mut self,
        agent: &AgentDefinition,
        registry: &Registry,
        id: &str,
        covered: &mut BTreeSet<String>,
    ) {
        let Some(entry) = registry.get(id) else {
            let message = format!(
                "{}: unknown {} '{}' has no registry entry; its secrets are not tracked",
                agent.name,
                registry.kind(),
                id
            );
            warn!("{}", message);
            self.warnings.push(message);
            return;
        };
        for spec in &entry.secrets {
            covered.insert(spec.key.clone());
            match spec.scope {
                SecretScope::Global => self.add_global(spec),
                SecretScope::Agent => self.add_agent(agent, spec),
            }
        }
    }

    fn add_global(&mut self, spec: &SecretSpec) {
        if self.global.contains_key(&spec.key) {
            return;
        }
        let env_var = self
            .manifest
            .secrets
            .get(&spec.key)
            .cloned()
            .or_else(|| spec.env.clone())
            .unwrap_or_else(|| screaming_snake(&spec.key));
        self.global.insert(spec.key.clone(), env_var.clone());
        self.requirements.push(SecretRequirement {
            key: spec.key.clone(),
            scope: SecretScope::Global,
            agent: None,
            env_var,
            validator: spec.has_validator().then(|| spec.clone()),
        });
    }

    fn add_agent(&mut self, agent: &AgentDefinition, spec: &SecretSpec) {
        let keys = self.per_agent.entry(agent.name.clone()).or_default();
        if keys.contains_key(&spec.key) {
            return;
        }
        let env_var = match agent.secrets.get(&spec.key) {
            Some(prior) => prior.clone(),
            None => {
                let suffix = spec.env.clone().unwrap_or_else(|| screaming_snake(&spec.key));
                let name = format!("{}_{}", env_prefix(self.manifest, agent), suffix);
                self.computed
                    .insert((agent.name.clone(), spec.key.clone()), suffix);
                name
            }
        };
        keys.insert(spec.key.clone(), env_var.clone());
        self.requirements.push(SecretRequirement {
            key: spec.key.clone(),
            scope: SecretScope::Agent,
            agent: Some(agent.name.clone()),
            env_var,
            validator: spec.has_validator().then(|| spec.clone()),
        });
    }

    /// Re-prefix computed agent names that clash with any other env name
    /// (`eng` + `x_token` and `eng-x` + `token`) with the agent's own name.
    /// Recorded names are never changed.
    fn disambiguate(&mut self) {
        let mut uses: BTreeMap<String, usize> = BTreeMap::new();
        for env in self
            .global
            .values()
            .chain(self.per_agent.values().flat_map(|keys| keys.values()))
        {
            *uses.entry(env.clone()).or_default() += 1;
        }

        for ((agent, key), suffix) in &self.computed {
            let Some(current) = self.per_agent.get_mut(agent).and_then(|keys| keys.get_mut(key))
            else {
                continue;
            };
            if uses.get(current.as_str()).copied().unwrap_or(0) < 2 {
                continue;
            }
            let renamed = format!("{}_{}", screaming_snake(agent), suffix);
            if renamed == *current || uses.contains_key(&renamed) {
                warn!(agent = %agent, key = %key, env = %current, "env var name is shared with another secret");
                continue;
            }

            warn!(agent = %agent, key = %key, from = %current, to = %renamed, "env var name collides, prefixing with the agent name");
            *current = renamed.clone();
            if let Some(req) = self
                .requirements
                .iter_mut()
                .find(|r| r.agent.as_deref() == Some(agent.as_str()) && r.key == *key)
            {
                req.env_var = renamed.clone();
            }
            uses.insert(renamed, 1);
        }
    }

    fn check(self, values: &SecretValues) -> SecretsResolution {
        let mut missing = Vec::new();
        let mut warnings = self.warnings;

        for req in &self.requirements {
            match values.get(&req.env_var) {
                None => missing.push(MissingSecret {
                    agent: req.agent.clone(),
                    key: req.key.clone(),
                    env_var: req.env_var.clone(),
                }),
                Some(value) => {
                    if let Some(problem) = req.validator.as_ref().and_then(|v| v.check(value)) {
                        let owner = req.agent.as_deref().unwrap_or("global");
                        let message = format!("{}: {} ({}) {}", owner, req.key, req.env_var, problem);
                        warn!("{}", message);
                        warnings.push(message);
                    }
                }
            }
        }

        SecretsResolution {
            global: self.global,
            per_agent: self.per_agent,
            requirements: self.requirements,
            missing,
            warnings,
        }
    }
}

/// Uppercased role, or the agent's own name when several agents share
/// the role
fn env_prefix(manifest: &DeploymentManifest, agent: &AgentDefinition) -> String {
    if manifest.role_count(&agent.role) > 1 {
        screaming_snake(&agent.name)
    } else {
        screaming_snake(&agent.role)
    }
}
