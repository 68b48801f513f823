//! On-disk cache of remote identity checkouts.
//!
//! Each `(location, subfolder)` pair owns one git checkout under the cache
//! root. Work on a key is serialized through a per-key mutex so concurrent
//! resolutions of the same source never interleave git operations in the
//! same directory, while distinct keys proceed in parallel.

use super::source::IdentitySource;
use crate::error::{FleetError, Result};
use crate::utils::git::{self, GitOutcome};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Normalized identity of a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    location: String,
    subfolder: String,
}

impl CacheKey {
    /// Cache key of a remote source; local sources are never cached
    pub fn for_source(source: &IdentitySource) -> Option<Self> {
        if !source.is_remote() {
            return None;
        }
        let subfolder = source
            .subfolder
            .as_deref()
            .unwrap_or("")
            .trim_matches('/')
            .to_string();
        Some(Self {
            location: normalize_location(&source.location),
            subfolder,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn subfolder(&self) -> Option<&str> {
        if self.subfolder.is_empty() {
            None
        } else {
            Some(&self.subfolder)
        }
    }

    /// Directory name: `{repo}[_{subfolder}]_{12-char-md5}`
    pub fn dir_name(&self) -> String {
        let repo = self
            .location
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("identity");
        let mut name = sanitize_name(repo);
        if !self.subfolder.is_empty() {
            name.push('_');
            name.push_str(&sanitize_name(&self.subfolder));
        }

        let digest = md5::compute(format!("{}#{}", self.location, self.subfolder).as_bytes());
        let hash = format!("{:x}", digest);
        format!("{}_{}", name, &hash[..12])
    }
}

/// Lowercase scheme and host, drop trailing slashes and a `.git` suffix
fn normalize_location(location: &str) -> String {
    let trimmed = location.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
            format!(
                "{}://{}/{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase(),
                path
            )
        }
        None => trimmed.to_string(),
    }
}

/// Sanitize: lowercase, alphanumeric + dash, collapse dashes
fn sanitize_name(name: &str) -> String {
    let mut result = String::new();
    let mut last_was_dash = false;

    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            result.push('-');
            last_was_dash = true;
        }
    }

    result.trim_matches('-').to_string()
}

/// What a slot has already checked out during this run
#[derive(Debug, Clone)]
struct Checkout {
    version_ref: Option<String>,
    dir: PathBuf,
}

#[derive(Debug, Default)]
struct Slot {
    checkout: Option<Checkout>,
}

/// Cache of remote checkouts, shared by all fetches of one run
pub struct IdentityCache {
    root: PathBuf,
    timeout: Duration,
    slots: Mutex<HashMap<CacheKey, Arc<Mutex<Slot>>>>,
}

impl IdentityCache {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot(&self, key: &CacheKey) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock();
        slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
            .clone()
    }

    /// Materialize a remote source and run `f` on its identity directory
    /// while the key's lock is held.
    ///
    /// The same key at the same version pin is fetched at most once per
    /// cache instance; asking for a different pin updates the checkout in
    /// place.
    pub fn with_checkout<T>(
        &self,
        source: &IdentitySource,
        f: impl FnOnce(&Path) -> Result<T>,
    ) -> Result<T> {
        let key = CacheKey::for_source(source).ok_or_else(|| {
            FleetError::InvalidConfig(format!(
                "'{}' is a local source and is not cached",
                source
            ))
        })?;

        let slot = self.slot(&key);
        let mut slot = slot.lock();

        if let Some(checkout) = &slot.checkout {
            if checkout.version_ref == source.version_ref {
                debug!(source = %source.label(), "identity cache hit");
                return f(&checkout.dir);
            }
            info!(
                source = %source,
                from = ?checkout.version_ref,
                to = ?source.version_ref,
                "version pin changed, updating cached checkout"
            );
        }

        let dir = self.materialize(&key, source)?;
        slot.checkout = Some(Checkout {
            version_ref: source.version_ref.clone(),
            dir: dir.clone(),
        });
        f(&dir)
    }

    fn materialize(&self, key: &CacheKey, source: &IdentitySource) -> Result<PathBuf> {
        git::ensure_git_installed()?;
        fs::create_dir_all(&self.root)?;

        let repo = self.root.join(key.dir_name());
        let origin = source.location.as_str();

        if repo.join(".git").is_dir() {
            let pinned_locally = source
                .version_ref
                .as_deref()
                .filter(|v| git::is_commit_sha(v))
                .map(|sha| self.has_commit(&repo, sha, origin))
                .transpose()?
                .unwrap_or(false);

            if pinned_locally {
                debug!(source = %source.label(), "pinned commit already cached, skipping fetch");
            } else {
                info!(source = %source.label(), "fetching identity");
                self.expect_success(
                    &["fetch", "--quiet", "--tags", "--force", "--prune", "origin"],
                    Some(&repo),
                    origin,
                    "repository",
                )?;
            }
        } else {
            self.clone_into(&repo, origin)?;
        }

        let target = match &source.version_ref {
            Some(version) => self.resolve_ref(&repo, version, origin)?,
            None => {
                let branch = git::default_branch(&repo, self.timeout, origin)?;
                self.resolve_ref(&repo, &branch, origin)?
            }
        };

        self.expect_success(
            &["checkout", "--quiet", "--force", "--detach", &target],
            Some(&repo),
            origin,
            "revision",
        )?;

        let dir = match key.subfolder() {
            Some(sub) => repo.join(sub),
            None => repo,
        };
        if !dir.is_dir() {
            return Err(FleetError::NotFound {
                origin: source.label(),
                what: format!("subfolder '{}'", key.subfolder().unwrap_or_default()),
                hint: "Check the #subfolder part of the reference against the repository layout"
                    .to_string(),
            });
        }
        Ok(dir)
    }

    fn clone_into(&self, repo: &Path, origin: &str) -> Result<()> {
        let partial = repo.with_extension("partial");
        if partial.exists() {
            fs::remove_dir_all(&partial)?;
        }
        if repo.exists() {
            // A directory without .git is a leftover from an interrupted run
            fs::remove_dir_all(repo)?;
        }

        info!(origin, "cloning identity repository");
        let partial_str = partial.to_string_lossy().to_string();
        let result = self.expect_success(
            &["clone", "--quiet", "--no-checkout", origin, &partial_str],
            None,
            origin,
            "repository",
        );
        if let Err(e) = result {
            let _ = fs::remove_dir_all(&partial);
            return Err(e);
        }

        fs::rename(&partial, repo)?;
        Ok(())
    }

    /// Resolve a branch, tag or commit to a commit id
    fn resolve_ref(&self, repo: &Path, version: &str, origin: &str) -> Result<String> {
        let candidates = [
            format!("refs/remotes/origin/{}^{{commit}}", version),
            format!("refs/tags/{}^{{commit}}", version),
            format!("{}^{{commit}}", version),
        ];
        for candidate in &candidates {
            if let GitOutcome::Success(sha) = git::run_git(
                &["rev-parse", "--verify", "--quiet", candidate],
                Some(repo),
                self.timeout,
                origin,
            )? {
                return Ok(sha);
            }
        }
        Err(FleetError::NotFound {
            origin: origin.to_string(),
            what: format!("ref '{}'", version),
            hint: "Check that the tag, branch or commit exists on the remote".to_string(),
        })
    }

    fn has_commit(&self, repo: &Path, sha: &str, origin: &str) -> Result<bool> {
        let object = format!("{}^{{commit}}", sha);
        Ok(matches!(
            git::run_git(&["cat-file", "-e", &object], Some(repo), self.timeout, origin)?,
            GitOutcome::Success(_)
        ))
    }

    fn expect_success(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        origin: &str,
        what: &str,
    ) -> Result<()> {
        match git::run_git(args, cwd, self.timeout, origin)? {
            GitOutcome::Success(_) => Ok(()),
            GitOutcome::Failed(stderr) if git::is_not_found(&stderr) => Err(FleetError::NotFound {
                origin: origin.to_string(),
                what: what.to_string(),
                hint: format!("git reported: {}", stderr),
            }),
            GitOutcome::Failed(stderr) => Err(FleetError::Network {
                origin: origin.to_string(),
                message: stderr,
            }),
        }
    }

    /// Cache entry directories currently on disk
    pub fn entries(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                entries.push(path);
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Remove every cache entry; returns how many were removed
    pub fn clean(&self) -> Result<usize> {
        let entries = self.entries()?;
        for entry in &entries {
            fs::remove_dir_all(entry)?;
        }
        self.slots.lock().clear();
        Ok(entries.len())
    }
}
