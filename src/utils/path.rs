use std::path::{Path, PathBuf};

/// Get the home directory
pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// Expand a leading `~` or `~/` to the current user's home directory.
///
/// # Examples
///
/// ```
/// use agent_fleet::utils::path::expand_tilde;
///
/// let path = expand_tilde("/absolute/path").unwrap();
/// assert_eq!(path, std::path::PathBuf::from("/absolute/path"));
/// ```
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_str()?;

    match path_str.strip_prefix('~') {
        None => Some(path.to_path_buf()),
        Some("") => home_dir(),
        Some(rest) if rest.starts_with('/') => {
            Some(home_dir()?.join(rest.trim_start_matches('/')))
        }
        // ~username is not supported; treat it as a literal path
        Some(_) => Some(path.to_path_buf()),
    }
}

/// Default identity cache root: `$XDG_CACHE_HOME/agent-fleet/identities`,
/// falling back to `~/.cache/agent-fleet/identities`
pub fn default_cache_dir() -> PathBuf {
    let base = std::env::var("XDG_CACHE_HOME")
        .ok()
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(|| std::env::temp_dir());
    base.join("agent-fleet").join("identities")
}

/// Resolve `path` against `base` unless it is already absolute
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
