//! Identity manifest (`identity.toml`) schema.
//!
//! ```toml
//! name = "juno"
//! display_name = "Juno"
//! role = "eng"
//! emoji = "🛠"
//! description = "Backend engineer"
//! volume_size = 30
//! skills = ["rust", "code-review"]
//! template_vars = ["OWNER_NAME", "TEAM_CHANNEL"]
//! model = "claude-sonnet"
//! deps = ["gh"]
//! plugins = ["slack"]
//! required_secrets = ["sentry_dsn"]
//!
//! [plugin_defaults.slack]
//! channel = "#eng"
//! ```

use crate::error::{FleetError, Result};
use crate::schema::{is_secret_key, is_slug, is_var_name, FieldIssue, Fields};
use std::collections::BTreeMap;
use std::path::Path;

/// File name of the identity manifest inside an identity directory
pub const IDENTITY_FILE: &str = "identity.toml";

pub const DEFAULT_VOLUME_SIZE: u32 = 20;
pub const MAX_VOLUME_SIZE: u32 = 16384;

const KNOWN_FIELDS: &[&str] = &[
    "name",
    "display_name",
    "role",
    "emoji",
    "description",
    "volume_size",
    "skills",
    "template_vars",
    "model",
    "deps",
    "plugins",
    "plugin_defaults",
    "required_secrets",
];

/// A validated identity manifest. Read-only to the reconciliation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityManifest {
    pub name: String,
    pub display_name: String,
    pub role: String,
    pub emoji: String,
    pub description: String,
    pub volume_size: u32,
    pub skills: Vec<String>,
    pub template_vars: Vec<String>,
    pub model: Option<String>,
    pub deps: Vec<String>,
    pub plugins: Vec<String>,
    pub plugin_defaults: BTreeMap<String, BTreeMap<String, toml::Value>>,
    pub required_secrets: Vec<String>,
}

impl IdentityManifest {
    /// Read and validate `identity.toml` from an identity directory
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(IDENTITY_FILE);
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FleetError::NotFound {
                    origin: dir.display().to_string(),
                    what: IDENTITY_FILE.to_string(),
                    hint: format!(
                        "Every identity directory needs an {} at its root",
                        IDENTITY_FILE
                    ),
                }
            } else {
                FleetError::Io(e)
            }
        })?;
        Self::parse(&contents, &path.display().to_string())
    }

    /// Parse and validate manifest text; `document` names it in diagnostics
    pub fn parse(contents: &str, document: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(contents).map_err(|e| FleetError::ManifestInvalid {
            document: document.to_string(),
            issues: vec![FieldIssue::new("(document)", e.message().to_string())],
        })?;

        let mut issues = Vec::new();
        let manifest = Self::from_table(&table, &mut issues);
        if issues.is_empty() {
            if let Some(manifest) = manifest {
                return Ok(manifest);
            }
        }
        Err(FleetError::ManifestInvalid {
            document: document.to_string(),
            issues,
        })
    }

    fn from_table(table: &toml::Table, issues: &mut Vec<FieldIssue>) -> Option<Self> {
        let fields = Fields::new(table, "");
        fields.reject_unknown(KNOWN_FIELDS, issues);

        let name = fields.required_str("name", issues);
        if let Some(n) = &name {
            if !is_slug(n) {
                issues.push(FieldIssue::new(
                    "name",
                    format!("'{}' must be a lowercase slug ([a-z0-9-])", n),
                ));
            }
        }
        let display_name = fields.required_str("display_name", issues);
        let role = fields.required_str("role", issues);
        if let Some(r) = &role {
            if !is_slug(r) {
                issues.push(FieldIssue::new(
                    "role",
                    format!("'{}' must be a lowercase slug ([a-z0-9-])", r),
                ));
            }
        }
        let emoji = fields.optional_str("emoji", issues).unwrap_or_default();
        let description = fields.optional_str("description", issues).unwrap_or_default();
        let volume_size = fields
            .optional_u32("volume_size", 1, MAX_VOLUME_SIZE, issues)
            .unwrap_or(DEFAULT_VOLUME_SIZE);
        let skills = fields.str_list("skills", issues);

        let template_vars = fields.str_list("template_vars", issues);
        for (i, var) in template_vars.iter().enumerate() {
            if !is_var_name(var) {
                issues.push(FieldIssue::new(
                    format!("template_vars[{}]", i),
                    format!("'{}' must be UPPER_SNAKE_CASE", var),
                ));
            }
        }

        let model = fields.optional_str("model", issues);
        let deps = fields.str_list("deps", issues);
        let plugins = fields.str_list("plugins", issues);

        let plugin_defaults = fields.nested_value_map("plugin_defaults", issues);
        for plugin in plugin_defaults.keys() {
            if !plugins.contains(plugin) {
                issues.push(FieldIssue::new(
                    format!("plugin_defaults.{}", plugin),
                    format!("'{}' is not listed in plugins", plugin),
                ));
            }
        }

        let required_secrets = fields.str_list("required_secrets", issues);
        for (i, key) in required_secrets.iter().enumerate() {
            if !is_secret_key(key) {
                issues.push(FieldIssue::new(
                    format!("required_secrets[{}]", i),
                    format!("'{}' may only contain letters, digits, '_' and '-'", key),
                ));
            }
        }

        Some(Self {
            name: name?,
            display_name: display_name?,
            role: role?,
            emoji,
            description,
            volume_size,
            skills,
            template_vars,
            model,
            deps,
            plugins,
            plugin_defaults,
            required_secrets,
        })
    }
}
