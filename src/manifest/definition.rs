//! Typed deployment manifest (`fleet.toml`).
//!
//! Values of these types only come out of the loader, which has already
//! checked every field; the writer serializes them back with deterministic
//! key order so an unchanged manifest round-trips byte for byte.

use crate::error::Result;
use crate::identity::definition::DEFAULT_VOLUME_SIZE;
use crate::identity::source::IdentitySource;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Prefix convention for agent names: `agent-<identity name>`
pub const AGENT_NAME_PREFIX: &str = "agent-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Hetzner,
    Digitalocean,
    Gcp,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Aws,
        Provider::Hetzner,
        Provider::Digitalocean,
        Provider::Gcp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Hetzner => "hetzner",
            Provider::Digitalocean => "digitalocean",
            Provider::Gcp => "gcp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The person the fleet works for
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OwnerProfile {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timezone: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub working_hours: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

/// A repository or directory holding several identities
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRoot {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl IdentityRoot {
    pub fn to_source(&self) -> Result<IdentitySource> {
        IdentitySource::parse(&self.source, self.version.as_deref())
    }
}

/// One agent of the fleet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDefinition {
    pub name: String,
    pub display_name: String,
    pub role: String,
    pub identity_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_version: Option<String>,
    pub volume_size: u32,
    /// Secret key -> environment variable name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, String>,
    /// Plugin id -> configuration
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub plugins: BTreeMap<String, BTreeMap<String, toml::Value>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env_vars: BTreeMap<String, String>,
}

impl AgentDefinition {
    /// A bare agent with default volume size and no customizations
    pub fn new(name: &str, role: &str, identity_source: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            role: role.to_string(),
            identity_source: identity_source.to_string(),
            identity_version: None,
            volume_size: DEFAULT_VOLUME_SIZE,
            secrets: BTreeMap::new(),
            plugins: BTreeMap::new(),
            env_vars: BTreeMap::new(),
        }
    }

    /// Identity-derived short name: the agent name without `agent-`
    pub fn short_name(&self) -> &str {
        self.name
            .strip_prefix(AGENT_NAME_PREFIX)
            .unwrap_or(&self.name)
    }

    /// Source reference plus version pin, in the same shape as
    /// `IdentitySource::label`
    pub fn source_label(&self) -> String {
        match &self.identity_version {
            Some(v) => format!("{} @ {}", self.identity_source, v),
            None => self.identity_source.clone(),
        }
    }

    pub fn to_source(&self) -> Result<IdentitySource> {
        IdentitySource::parse(&self.identity_source, self.identity_version.as_deref())
    }

    /// Whether a plugin is switched on for this agent. A plugin stays on
    /// unless its configuration says `enabled = false`.
    pub fn plugin_enabled(&self, plugin: &str) -> bool {
        !matches!(
            self.plugins.get(plugin).and_then(|cfg| cfg.get("enabled")),
            Some(toml::Value::Boolean(false))
        )
    }
}

/// The persisted description of a whole fleet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentManifest {
    pub stack_name: String,
    pub provider: Provider,
    pub region: String,
    pub instance_type: String,
    pub owner: OwnerProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identities: Option<IdentityRoot>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub template_vars: BTreeMap<String, String>,
    /// Global secret key -> environment variable name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentDefinition>,
}

impl DeploymentManifest {
    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Number of agents with `role`
    pub fn role_count(&self, role: &str) -> usize {
        self.agents.iter().filter(|a| a.role == role).count()
    }
}
