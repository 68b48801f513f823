use crate::reconcile::secrets::MissingSecret;
use crate::schema::FieldIssue;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Invalid identity source '{reference}': {reason}\nUse a filesystem path (./identities/pm) or a remote URL (https://host/org/repo.git#subfolder)")]
    InvalidSource { reference: String, reason: String },

    #[error("Network error while fetching {origin}: {message}\nCheck connectivity and credentials for the remote, then retry")]
    Network { origin: String, message: String },

    #[error("{what} not found in {origin}\n{hint}")]
    NotFound {
        origin: String,
        what: String,
        hint: String,
    },

    #[error("Invalid {document}: {} problem(s)\n{}\nFix the listed fields and re-run", .issues.len(), render_issues(.issues))]
    ManifestInvalid {
        document: String,
        issues: Vec<FieldIssue>,
    },

    #[error("Missing {} secret value(s):\n{}\nAdd them to the secrets file or export them in the environment", .0.len(), render_missing(.0))]
    MissingSecrets(Vec<MissingSecret>),

    #[error("Unresolved template variable(s): {}\nSupply them with --var NAME=VALUE", .0.join(", "))]
    UnresolvedTemplateVars(Vec<String>),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Failed to write {path}: {message}\nThe previous files were left in place; fix the cause and re-run")]
    Commit { path: PathBuf, message: String },

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FleetError {
    /// Whether the caller may retry the failed operation as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, FleetError::Network { .. })
    }
}

fn render_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {}", issue))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_missing(missing: &[MissingSecret]) -> String {
    missing
        .iter()
        .map(|m| format!("  - {}", m))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, FleetError>;
