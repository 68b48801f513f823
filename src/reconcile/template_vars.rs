//! Template variable resolution.
//!
//! Each variable declared by a bound identity is resolved, in order of
//! precedence, from an explicit `--var` assignment, the value already stored
//! in the manifest, or the owner profile. Anything left has to be supplied by
//! the caller.

use super::Bindings;
use crate::error::{FleetError, Result};
use crate::manifest::{DeploymentManifest, OwnerProfile};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Variables filled 1:1 from the owner profile
const OWNER_FIELDS: &[(&str, fn(&OwnerProfile) -> &str)] = &[
    ("OWNER_NAME", |o| o.name.as_str()),
    ("OWNER_TIMEZONE", |o| o.timezone.as_str()),
    ("OWNER_WORKING_HOURS", |o| o.working_hours.as_str()),
    ("OWNER_NOTES", |o| o.notes.as_str()),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVarResolution {
    /// Complete variable map to persist, including prior values for
    /// variables no identity declares any more
    pub values: BTreeMap<String, String>,
    pub supplied: Vec<String>,
    pub preserved: Vec<String>,
    pub auto_filled: Vec<String>,
    pub unresolved: Vec<String>,
    /// Declared names the manifest did not know before this run
    pub newly_required: Vec<String>,
}

impl TemplateVarResolution {
    pub fn ensure_complete(&self) -> Result<()> {
        if self.unresolved.is_empty() {
            Ok(())
        } else {
            Err(FleetError::UnresolvedTemplateVars(self.unresolved.clone()))
        }
    }
}

/// Owner-profile value for a variable, when the variable is one of the
/// auto-filled names and the field is set
pub fn owner_value<'o>(owner: &'o OwnerProfile, name: &str) -> Option<&'o str> {
    OWNER_FIELDS
        .iter()
        .find(|(var, _)| *var == name)
        .map(|(_, field)| field(owner))
        .filter(|v| !v.is_empty())
}

pub fn resolve_template_vars(
    manifest: &DeploymentManifest,
    bindings: &Bindings<'_>,
    supplied: &BTreeMap<String, String>,
) -> TemplateVarResolution {
    let declared: BTreeSet<&str> = bindings
        .values()
        .flat_map(|identity| identity.template_vars.iter().map(String::as_str))
        .collect();

    let mut res = TemplateVarResolution {
        values: manifest.template_vars.clone(),
        ..Default::default()
    };

    for (name, value) in supplied {
        res.values.insert(name.clone(), value.clone());
        res.supplied.push(name.clone());
    }

    for name in declared {
        if !manifest.template_vars.contains_key(name) {
            res.newly_required.push(name.to_string());
        }
        if supplied.contains_key(name) {
            continue;
        }
        if manifest.template_vars.contains_key(name) {
            res.preserved.push(name.to_string());
        } else if let Some(value) = owner_value(&manifest.owner, name) {
            res.values.insert(name.to_string(), value.to_string());
            res.auto_filled.push(name.to_string());
        } else {
            res.unresolved.push(name.to_string());
        }
    }

    if !res.newly_required.is_empty() {
        info!(vars = %res.newly_required.join(", "), "new template variables");
    }
    res
}
