use crate::config::Config;
use crate::identity::{IdentityCache, IdentityFetcher};
use std::path::Path;
use std::time::Duration;

/// Pause between fetch retries, multiplied by the attempt number
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// A fetcher using the configured cache, timeout and retries. Relative local
/// sources resolve against `base_dir`.
pub fn fetcher(config: &Config, base_dir: &Path) -> IdentityFetcher {
    IdentityFetcher::new(cache(config), base_dir).with_retries(config.fetch.retries, RETRY_BACKOFF)
}

pub fn cache(config: &Config) -> IdentityCache {
    IdentityCache::new(config.cache_dir(), config.fetch_timeout())
}

/// Comma-separated list, or `-` when empty
pub fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_or_dash() {
        assert_eq!(list_or_dash(&[]), "-");
        assert_eq!(
            list_or_dash(&["rust".to_string(), "review".to_string()]),
            "rust, review"
        );
    }

    #[test]
    fn test_cache_uses_configured_dir() {
        let mut config = Config::default();
        config.cache.dir = "/tmp/fleet-test-cache".to_string();
        assert_eq!(cache(&config).root(), Path::new("/tmp/fleet-test-cache"));
    }
}
