//! Loading and validation of the persisted deployment manifest.
//!
//! The document is parsed to an untyped TOML table and then checked field by
//! field. Every violated constraint is collected so that one run reports the
//! complete diagnostic; a typed [`DeploymentManifest`] is only produced when
//! the list is empty.

use super::definition::{
    AgentDefinition, DeploymentManifest, IdentityRoot, OwnerProfile, Provider,
};
use crate::error::{FleetError, Result};
use crate::identity::definition::MAX_VOLUME_SIZE;
use crate::identity::source::IdentitySource;
use crate::schema::{is_secret_key, is_slug, is_var_name, FieldIssue, Fields};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::debug;

const TOP_LEVEL: &[&str] = &[
    "stack_name",
    "provider",
    "region",
    "instance_type",
    "owner",
    "identities",
    "template_vars",
    "secrets",
    "agents",
];
const OWNER_FIELDS: &[&str] = &["name", "timezone", "working_hours", "notes"];
const IDENTITY_ROOT_FIELDS: &[&str] = &["source", "version"];
const AGENT_FIELDS: &[&str] = &[
    "name",
    "display_name",
    "role",
    "identity_source",
    "identity_version",
    "volume_size",
    "secrets",
    "plugins",
    "env_vars",
];

/// Read and validate a manifest file
pub fn load_manifest(path: &Path) -> Result<DeploymentManifest> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FleetError::NotFound {
                origin: path.display().to_string(),
                what: "deployment manifest".to_string(),
                hint: "Create it first or point --manifest at an existing file".to_string(),
            }
        } else {
            FleetError::Io(e)
        }
    })?;
    debug!(path = %path.display(), "loading deployment manifest");
    parse_manifest(&contents, &path.display().to_string())
}

/// Parse and validate manifest text; `document` names it in diagnostics
pub fn parse_manifest(contents: &str, document: &str) -> Result<DeploymentManifest> {
    let table: toml::Table = toml::from_str(contents).map_err(|e| FleetError::ManifestInvalid {
        document: document.to_string(),
        issues: vec![FieldIssue::new("(document)", e.message().to_string())],
    })?;

    let mut issues = Vec::new();
    let manifest = validate(&table, &mut issues);
    match manifest {
        Some(manifest) if issues.is_empty() => Ok(manifest),
        _ => Err(FleetError::ManifestInvalid {
            document: document.to_string(),
            issues,
        }),
    }
}

fn validate(table: &toml::Table, issues: &mut Vec<FieldIssue>) -> Option<DeploymentManifest> {
    let fields = Fields::new(table, "");
    fields.reject_unknown(TOP_LEVEL, issues);

    let stack_name = fields.required_str("stack_name", issues);
    if let Some(name) = &stack_name {
        if !is_slug(name) {
            issues.push(FieldIssue::new(
                "stack_name",
                format!("'{}' must be a lowercase slug ([a-z0-9-])", name),
            ));
        }
    }

    let provider = fields.required_str("provider", issues).and_then(|p| {
        let parsed = Provider::parse(&p);
        if parsed.is_none() {
            let known: Vec<&str> = Provider::ALL.iter().map(|p| p.as_str()).collect();
            issues.push(FieldIssue::new(
                "provider",
                format!("'{}' is not one of: {}", p, known.join(", ")),
            ));
        }
        parsed
    });
    let region = fields.required_str("region", issues);
    let instance_type = fields.required_str("instance_type", issues);

    let owner = match fields.table("owner", issues) {
        Some(t) => {
            let owner = Fields::new(t, "owner");
            owner.reject_unknown(OWNER_FIELDS, issues);
            OwnerProfile {
                name: owner.optional_str("name", issues).unwrap_or_default(),
                timezone: owner.optional_str("timezone", issues).unwrap_or_default(),
                working_hours: owner.optional_str("working_hours", issues).unwrap_or_default(),
                notes: owner.optional_str("notes", issues).unwrap_or_default(),
            }
        }
        None => OwnerProfile::default(),
    };

    let identities = fields
        .table("identities", issues)
        .and_then(|t| validate_identity_root(t, issues));

    let template_vars = fields.string_map("template_vars", issues);
    for name in template_vars.keys() {
        if !is_var_name(name) {
            issues.push(FieldIssue::new(
                format!("template_vars.{}", name),
                "variable names must be UPPER_SNAKE_CASE",
            ));
        }
    }

    let secrets = fields.string_map("secrets", issues);
    check_secret_map(&secrets, "secrets", issues);

    let root_mode = identities.is_some();
    let mut names = HashSet::new();
    let mut agents = Vec::new();
    for (i, agent_table) in fields.array_of_tables("agents", issues).into_iter().enumerate() {
        let path = format!("agents[{}]", i);
        if let Some(name) = agent_table.get("name").and_then(toml::Value::as_str) {
            if !names.insert(name.to_string()) {
                issues.push(FieldIssue::new(
                    format!("{}.name", path),
                    format!("duplicate agent name '{}'", name),
                ));
            }
        }
        if let Some(agent) = validate_agent(agent_table, &path, root_mode, issues) {
            agents.push(agent);
        }
    }

    Some(DeploymentManifest {
        stack_name: stack_name?,
        provider: provider?,
        region: region?,
        instance_type: instance_type?,
        owner,
        identities,
        template_vars,
        secrets,
        agents,
    })
}

fn validate_identity_root(table: &toml::Table, issues: &mut Vec<FieldIssue>) -> Option<IdentityRoot> {
    let fields = Fields::new(table, "identities");
    fields.reject_unknown(IDENTITY_ROOT_FIELDS, issues);

    let source = fields.required_str("source", issues)?;
    let version = fields.optional_str("version", issues);
    if let Err(e) = IdentitySource::parse(&source, version.as_deref()) {
        issues.push(FieldIssue::new("identities.source", source_reason(e)));
        return None;
    }
    Some(IdentityRoot { source, version })
}

fn validate_agent(
    table: &toml::Table,
    path: &str,
    root_mode: bool,
    issues: &mut Vec<FieldIssue>,
) -> Option<AgentDefinition> {
    let fields = Fields::new(table, path);
    fields.reject_unknown(AGENT_FIELDS, issues);

    let name = fields.required_str("name", issues);
    if let Some(n) = &name {
        if !is_slug(n) {
            issues.push(FieldIssue::new(
                fields.path_of("name"),
                format!("'{}' must be a lowercase slug ([a-z0-9-])", n),
            ));
        }
    }
    let display_name = fields.required_str("display_name", issues);
    let role = fields.required_str("role", issues);
    if let Some(r) = &role {
        if !is_slug(r) {
            issues.push(FieldIssue::new(
                fields.path_of("role"),
                format!("'{}' must be a lowercase slug ([a-z0-9-])", r),
            ));
        }
    }
    let identity_source = fields.required_str("identity_source", issues);
    let identity_version = fields.optional_str("identity_version", issues);

    if let Some(source) = &identity_source {
        match IdentitySource::parse(source, identity_version.as_deref()) {
            Ok(parsed) if root_mode && parsed.is_remote() => issues.push(FieldIssue::new(
                fields.path_of("identity_source"),
                "must be a path relative to [identities] source when an identity root is set",
            )),
            Ok(_) => {}
            Err(e) => issues.push(FieldIssue::new(
                fields.path_of("identity_source"),
                source_reason(e),
            )),
        }
    }

    let volume_size = fields.required_u32("volume_size", 1, MAX_VOLUME_SIZE, issues);

    let secrets = fields.string_map("secrets", issues);
    check_secret_map(&secrets, &fields.path_of("secrets"), issues);

    let plugins = fields.nested_value_map("plugins", issues);

    let env_vars = fields.string_map("env_vars", issues);
    for key in env_vars.keys() {
        if !is_var_name(key) {
            issues.push(FieldIssue::new(
                format!("{}.{}", fields.path_of("env_vars"), key),
                "environment variable names must be UPPER_SNAKE_CASE",
            ));
        }
    }

    Some(AgentDefinition {
        name: name?,
        display_name: display_name?,
        role: role?,
        identity_source: identity_source?,
        identity_version,
        volume_size: volume_size?,
        secrets,
        plugins,
        env_vars,
    })
}

/// Secret maps go from key to environment variable name
fn check_secret_map(map: &BTreeMap<String, String>, path: &str, issues: &mut Vec<FieldIssue>) {
    for (key, env) in map {
        if !is_secret_key(key) {
            issues.push(FieldIssue::new(
                format!("{}.{}", path, key),
                "secret keys may only contain letters, digits, '_' and '-'",
            ));
        }
        if !is_var_name(env) {
            issues.push(FieldIssue::new(
                format!("{}.{}", path, key),
                format!("'{}' is not a valid environment variable name", env),
            ));
        }
    }
}

fn source_reason(err: FleetError) -> String {
    match err {
        FleetError::InvalidSource { reason, .. } => reason,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
stack_name = "acme-agents"
provider = "hetzner"
region = "fsn1"
instance_type = "cx32"

[owner]
name = "Ada"
timezone = "Europe/Berlin"

[template_vars]
OWNER_NAME = "Ada"

[secrets]
tailscale_auth_key = "TAILSCALE_AUTH_KEY"

[[agents]]
name = "agent-juno"
display_name = "Juno"
role = "eng"
identity_source = "./eng"
volume_size = 30

[agents.secrets]
github_token = "ENG_GH_TOKEN"

[agents.plugins.slack]
channel = "eng"

[agents.env_vars]
AGENT_MODEL = "claude-sonnet"
"#;

    #[test]
    fn test_parse_valid_manifest() {
        let manifest = parse_manifest(VALID, "fleet.toml").unwrap();
        assert_eq!(manifest.stack_name, "acme-agents");
        assert_eq!(manifest.provider, Provider::Hetzner);
        assert_eq!(manifest.owner.timezone, "Europe/Berlin");
        assert_eq!(manifest.agents.len(), 1);

        let juno = &manifest.agents[0];
        assert_eq!(juno.short_name(), "juno");
        assert_eq!(juno.secrets["github_token"], "ENG_GH_TOKEN");
        assert_eq!(
            juno.plugins["slack"]["channel"],
            toml::Value::String("eng".to_string())
        );
    }

    #[test]
    fn test_serialized_manifest_reloads_identically() {
        let manifest = parse_manifest(VALID, "fleet.toml").unwrap();
        let rendered = manifest.to_toml_string().unwrap();
        let reloaded = parse_manifest(&rendered, "fleet.toml").unwrap();
        assert_eq!(reloaded, manifest);
        assert_eq!(reloaded.to_toml_string().unwrap(), rendered);
    }

    #[test]
    fn test_reports_all_violations_at_once() {
        let err = parse_manifest(
            r#"
stack_name = "Acme Agents"
provider = "azure"
instance_type = 3
colour = "blue"

[template_vars]
lower = "x"

[[agents]]
name = "agent-a"
display_name = "A"
role = "pm"
identity_source = "git@github.com:acme/ids.git"
volume_size = 0

[[agents]]
name = "agent-a"
display_name = "A2"
role = "pm"
identity_source = "./pm"
volume_size = 10
[agents.secrets]
token = "lowercase"
"#,
            "fleet.toml",
        )
        .unwrap_err();

        let FleetError::ManifestInvalid { issues, .. } = err else {
            panic!("expected ManifestInvalid");
        };
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        for expected in [
            "colour",
            "stack_name",
            "provider",
            "region",
            "instance_type",
            "template_vars.lower",
            "agents[0].identity_source",
            "agents[0].volume_size",
            "agents[1].name",
            "agents[1].secrets.token",
        ] {
            assert!(fields.contains(&expected), "missing issue for {}: {:?}", expected, fields);
        }
    }

    #[test]
    fn test_root_mode_requires_relative_agent_sources() {
        let err = parse_manifest(
            r#"
stack_name = "acme"
provider = "aws"
region = "eu-west-1"
instance_type = "t3.large"

[identities]
source = "https://github.com/acme/identities.git"
version = "v2"

[[agents]]
name = "agent-pm"
display_name = "PM"
role = "pm"
identity_source = "https://github.com/acme/identities.git#pm"
volume_size = 20
"#,
            "fleet.toml",
        )
        .unwrap_err();
        assert!(err.to_string().contains("agents[0].identity_source"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest(&dir.path().join("fleet.toml")).unwrap_err();
        assert!(matches!(err, FleetError::NotFound { .. }));
    }
}
