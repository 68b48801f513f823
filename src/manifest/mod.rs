//! The persisted deployment manifest: typed model, validating loader and
//! atomic writer.

pub mod definition;
pub mod loader;
pub mod writer;

pub use definition::{
    AgentDefinition, DeploymentManifest, IdentityRoot, OwnerProfile, Provider, AGENT_NAME_PREFIX,
};
pub use loader::{load_manifest, parse_manifest};
pub use writer::WriteOutcome;
