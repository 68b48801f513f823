//! Static plugin and dependency registries.
//!
//! Each registry maps a plugin/dependency id to the secret keys it needs and
//! the default configuration values it contributes. Entries are TOML files
//! embedded at compile time and never mutated at runtime.
//!
//! # Example
//!
//! ```toml
//! [entry]
//! id = "slack"
//! name = "Slack"
//! description = "Socket-mode Slack app"
//!
//! [[secrets]]
//! key = "slack_bot_token"
//! prefix = "xoxb-"
//!
//! [defaults]
//! channel = "general"
//! ```

pub mod definition;
pub mod lookup;

pub use definition::{RegistryEntry, SecretScope, SecretSpec};
pub use lookup::{Registries, Registry, RegistryKind};
