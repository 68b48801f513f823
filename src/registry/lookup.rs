use super::definition::{RegistryEntry, SecretSpec};
use crate::error::{FleetError, Result};
use crate::schema::is_secret_key;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Plugin,
    Dependency,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryKind::Plugin => f.write_str("plugin"),
            RegistryKind::Dependency => f.write_str("dependency"),
        }
    }
}

// To add an entry: add ONE line here and create the TOML file
const PLUGIN_FILES: &[(&str, &str)] = &[
    ("slack", include_str!("../../registry/plugins/slack.toml")),
    ("discord", include_str!("../../registry/plugins/discord.toml")),
    ("telegram", include_str!("../../registry/plugins/telegram.toml")),
    ("linear", include_str!("../../registry/plugins/linear.toml")),
];

const DEP_FILES: &[(&str, &str)] = &[
    ("gh", include_str!("../../registry/deps/gh.toml")),
    (
        "brave-search",
        include_str!("../../registry/deps/brave-search.toml"),
    ),
    ("tailscale", include_str!("../../registry/deps/tailscale.toml")),
];

const GLOBAL_FILE: &str = include_str!("../../registry/global.toml");

/// Immutable lookup table from plugin/dependency id to its entry
#[derive(Debug, Clone)]
pub struct Registry {
    kind: RegistryKind,
    entries: BTreeMap<String, Arc<RegistryEntry>>,
}

impl Registry {
    /// Load the embedded plugin registry
    pub fn plugins() -> Result<Self> {
        Self::from_embedded(RegistryKind::Plugin, PLUGIN_FILES)
    }

    /// Load the embedded dependency registry
    pub fn deps() -> Result<Self> {
        Self::from_embedded(RegistryKind::Dependency, DEP_FILES)
    }

    fn from_embedded(kind: RegistryKind, files: &[(&str, &str)]) -> Result<Self> {
        let mut entries = Vec::with_capacity(files.len());
        for (id, content) in files {
            let entry: RegistryEntry = toml::from_str(content).map_err(|e| {
                FleetError::InvalidConfig(format!("Failed to parse {} '{}': {}", kind, id, e))
            })?;
            if entry.entry.id != *id {
                return Err(FleetError::InvalidConfig(format!(
                    "{} file '{}' declares id '{}'",
                    kind, id, entry.entry.id
                )));
            }
            entries.push(entry);
        }
        Self::from_entries(kind, entries)
    }

    /// Build a registry from in-memory entries
    pub fn from_entries(kind: RegistryKind, entries: Vec<RegistryEntry>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            validate_entry(kind, &entry)?;
            let id = entry.entry.id.clone();
            if map.insert(id.clone(), Arc::new(entry)).is_some() {
                return Err(FleetError::InvalidConfig(format!(
                    "Duplicate {} id '{}'",
                    kind, id
                )));
            }
        }
        Ok(Self { kind, entries: map })
    }

    /// An empty registry
    pub fn empty(kind: RegistryKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> RegistryKind {
        self.kind
    }

    pub fn get(&self, id: &str) -> Option<Arc<RegistryEntry>> {
        self.entries.get(id).cloned()
    }

    /// List all entry ids, sorted
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Verify that an entry is complete and usable
fn validate_entry(kind: RegistryKind, entry: &RegistryEntry) -> Result<()> {
    if entry.entry.id.is_empty() {
        return Err(FleetError::InvalidConfig(format!("{} id cannot be empty", kind)));
    }

    let mut seen = HashSet::new();
    for secret in &entry.secrets {
        if !is_secret_key(&secret.key) {
            return Err(FleetError::InvalidConfig(format!(
                "{} '{}' declares invalid secret key '{}'",
                kind, entry.entry.id, secret.key
            )));
        }
        if !seen.insert(secret.key.as_str()) {
            return Err(FleetError::InvalidConfig(format!(
                "{} '{}' declares secret '{}' twice",
                kind, entry.entry.id, secret.key
            )));
        }
    }
    Ok(())
}

/// All static lookup tables the reconciliation engine consults
#[derive(Debug, Clone)]
pub struct Registries {
    pub plugins: Registry,
    pub deps: Registry,
    /// Fleet-wide credentials
    pub global: Vec<SecretSpec>,
}

impl Registries {
    /// Load the registries embedded in the binary
    pub fn load() -> Result<Self> {
        let global: RegistryEntry = toml::from_str(GLOBAL_FILE).map_err(|e| {
            FleetError::InvalidConfig(format!("Failed to parse global credentials: {}", e))
        })?;
        Ok(Self {
            plugins: Registry::plugins()?,
            deps: Registry::deps()?,
            global: global.secrets,
        })
    }

    /// Registries with no entries at all
    pub fn empty() -> Self {
        Self {
            plugins: Registry::empty(RegistryKind::Plugin),
            deps: Registry::empty(RegistryKind::Dependency),
            global: Vec::new(),
        }
    }

    /// Fleet-wide credentials required for a provider
    pub fn global_secrets(&self, provider: &str) -> impl Iterator<Item = &SecretSpec> + '_ {
        let provider = provider.to_string();
        self.global
            .iter()
            .filter(move |spec| spec.applies_to(&provider))
    }

    /// The fleet-wide spec for `key`, if the key is a global credential
    pub fn global_spec(&self, key: &str) -> Option<&SecretSpec> {
        self.global.iter().find(|spec| spec.key == key)
    }
}
