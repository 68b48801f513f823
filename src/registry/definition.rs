//! Data structures for parsing registry TOML files.
//!
//! These types define the schema for plugin and dependency entries as well
//! as the fleet-wide credential table.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// A plugin or dependency entry loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryEntry {
    /// Entry metadata (id, name, description)
    pub entry: EntryMeta,

    /// Secret keys the entry needs once enabled
    #[serde(default)]
    pub secrets: Vec<SecretSpec>,

    /// Default configuration values, merged below any user edits
    #[serde(default)]
    pub defaults: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryMeta {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Whether a credential is shared fleet-wide or owned by one agent
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecretScope {
    Global,
    #[default]
    Agent,
}

impl fmt::Display for SecretScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretScope::Global => f.write_str("global"),
            SecretScope::Agent => f.write_str("agent"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SecretSpec {
    pub key: String,

    #[serde(default)]
    pub scope: SecretScope,

    /// Environment variable name (or per-agent suffix) overriding the one
    /// derived from the key
    #[serde(default)]
    pub env: Option<String>,

    /// Required value prefix
    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default)]
    pub min_length: Option<usize>,

    /// Only required for these providers (global credentials); empty means all
    #[serde(default)]
    pub providers: Vec<String>,
}

impl SecretSpec {
    /// A spec with no validator and no env override
    pub fn plain(key: impl Into<String>, scope: SecretScope) -> Self {
        Self {
            key: key.into(),
            scope,
            env: None,
            prefix: None,
            min_length: None,
            providers: Vec::new(),
        }
    }

    pub fn has_validator(&self) -> bool {
        self.prefix.is_some() || self.min_length.is_some()
    }

    /// Check a value's format. Returns a warning message when it looks wrong.
    pub fn check(&self, value: &str) -> Option<String> {
        if let Some(prefix) = &self.prefix {
            if !value.starts_with(prefix.as_str()) {
                return Some(format!("expected a value starting with '{}'", prefix));
            }
        }
        if let Some(min) = self.min_length {
            if value.len() < min {
                return Some(format!(
                    "expected at least {} characters, got {}",
                    min,
                    value.len()
                ));
            }
        }
        None
    }

    pub fn applies_to(&self, provider: &str) -> bool {
        self.providers.is_empty() || self.providers.iter().any(|p| p == provider)
    }
}
