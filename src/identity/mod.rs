//! Identity resolution: reference parsing, remote caching and manifest loading.
//!
//! An identity is an externally-authored bundle (`identity.toml` plus
//! workspace files) describing one agent's persona, role and capability
//! declarations. It is referenced either by a filesystem path or by a
//! version-controlled remote:
//!
//! ```text
//! ./identities/pm
//! https://github.com/acme/identities.git#agents/eng   (+ optional version pin)
//! ```

pub mod cache;
pub mod definition;
pub mod fetcher;
pub mod source;

pub use cache::IdentityCache;
pub use definition::IdentityManifest;
pub use fetcher::{DiscoveredIdentity, IdentityFetcher};
pub use source::{IdentitySource, SourceKind};
