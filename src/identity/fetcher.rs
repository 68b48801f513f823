//! Resolution of identity sources to validated manifests on local disk.

use super::cache::IdentityCache;
use super::definition::{IdentityManifest, IDENTITY_FILE};
use super::source::IdentitySource;
use crate::error::{FleetError, Result};
use crate::utils::path::resolve_against;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Maximum directory depth scanned below an identity root
const DISCOVERY_DEPTH: usize = 4;

/// One identity found while resolving a source or scanning an identity root
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredIdentity {
    /// Path the identity was found at: the source reference for direct
    /// fetches, `./<dir>` relative to the root for scans
    pub rel_path: String,
    /// Version pin the identity was fetched at (direct fetches only)
    pub version_ref: Option<String>,
    pub manifest: IdentityManifest,
    /// Local directory holding the identity's files
    pub dir: PathBuf,
}

impl DiscoveredIdentity {
    /// `rel_path` plus version pin, comparable with
    /// `AgentDefinition::source_label`
    pub fn label(&self) -> String {
        match &self.version_ref {
            Some(v) => format!("{} @ {}", self.rel_path, v),
            None => self.rel_path.clone(),
        }
    }
}

pub struct IdentityFetcher {
    cache: IdentityCache,
    base_dir: PathBuf,
    retries: u32,
    backoff: Duration,
}

impl IdentityFetcher {
    /// `base_dir` anchors relative local paths (usually the manifest's directory)
    pub fn new(cache: IdentityCache, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            base_dir: base_dir.into(),
            retries: 0,
            backoff: Duration::from_secs(2),
        }
    }

    /// Retry network failures up to `retries` extra times with linear backoff
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Resolve one source to its manifest and local directory
    pub fn resolve_identity(&self, source: &IdentitySource) -> Result<(IdentityManifest, PathBuf)> {
        if source.is_remote() {
            return self.retrying(source, || {
                self.cache.with_checkout(source, |dir| {
                    Ok((IdentityManifest::load(dir)?, dir.to_path_buf()))
                })
            });
        }

        let dir = self.local_dir(source)?;
        Ok((IdentityManifest::load(&dir)?, dir))
    }

    /// Resolve several sources concurrently.
    ///
    /// Results come back in input order. If any source fails, the first
    /// failure in input order is returned and nothing else is reported.
    pub fn fetch_all(&self, sources: &[IdentitySource]) -> Result<Vec<DiscoveredIdentity>> {
        let mut unique: Vec<&IdentitySource> = Vec::with_capacity(sources.len());
        for source in sources {
            if !unique.contains(&source) {
                unique.push(source);
            }
        }

        let results: Vec<Result<DiscoveredIdentity>> = std::thread::scope(|scope| {
            let handles: Vec<_> = unique
                .iter()
                .map(|source| {
                    scope.spawn(move || -> Result<DiscoveredIdentity> {
                        let (manifest, dir) = self.resolve_identity(source)?;
                        Ok(DiscoveredIdentity {
                            rel_path: source.reference(),
                            version_ref: source.version_ref.clone(),
                            manifest,
                            dir,
                        })
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(FleetError::Git("identity fetch thread panicked".to_string()))
                    })
                })
                .collect()
        });

        let discovered = results.into_iter().collect::<Result<Vec<_>>>()?;
        info!(count = discovered.len(), "resolved identities");
        Ok(discovered)
    }

    /// Resolve an identity root and scan it for every `identity.toml`
    pub fn discover(&self, root: &IdentitySource) -> Result<Vec<DiscoveredIdentity>> {
        let discovered = if root.is_remote() {
            self.retrying(root, || self.cache.with_checkout(root, scan_identities))?
        } else {
            scan_identities(&self.local_dir(root)?)?
        };
        info!(root = %root.label(), count = discovered.len(), "discovered identities");
        Ok(discovered)
    }

    fn local_dir(&self, source: &IdentitySource) -> Result<PathBuf> {
        let dir = resolve_against(&self.base_dir, Path::new(&source.location));
        if !dir.is_dir() {
            return Err(FleetError::NotFound {
                origin: source.location.clone(),
                what: format!("directory {}", dir.display()),
                hint: "Check the path; relative paths are resolved from the manifest's directory"
                    .to_string(),
            });
        }
        Ok(dir)
    }

    fn retrying<T>(&self, source: &IdentitySource, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        source = %source.label(),
                        attempt,
                        error = %e,
                        "fetch failed, retrying"
                    );
                    std::thread::sleep(self.backoff * attempt);
                }
                other => return other,
            }
        }
    }
}

/// Find every identity below `root`, sorted by path
pub fn scan_identities(root: &Path) -> Result<Vec<DiscoveredIdentity>> {
    let mut discovered = Vec::new();

    let walker = WalkDir::new(root)
        .max_depth(DISCOVERY_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| FleetError::Io(e.into()))?;
        if !entry.file_type().is_file() || entry.file_name() != IDENTITY_FILE {
            continue;
        }
        let Some(dir) = entry.path().parent() else {
            continue;
        };
        let manifest = IdentityManifest::load(dir)?;
        discovered.push(DiscoveredIdentity {
            rel_path: relative_label(root, dir),
            version_ref: None,
            manifest,
            dir: dir.to_path_buf(),
        });
    }

    Ok(discovered)
}

/// `./a/b` for a directory below `root`, `.` for the root itself
fn relative_label(root: &Path, dir: &Path) -> String {
    let rel = dir.strip_prefix(root).unwrap_or(dir);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        format!("./{}", parts.join("/"))
    }
}
