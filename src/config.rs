use crate::cli::Cli;
use crate::error::{FleetError, Result};
use crate::utils::path::{default_cache_dir, expand_tilde, home_dir, resolve_against};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of both the global (`~/`) and the project config
pub const CONFIG_FILE: &str = ".agent-fleet.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Debug logging requested with -v (not stored in config file)
    #[serde(skip)]
    pub verbose: bool,

    /// Filter given with --log-level (not stored in config file)
    #[serde(skip)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Relative paths are resolved from the manifest's directory
    #[serde(default = "default_secrets_template")]
    pub secrets_template: String,

    /// Dotenv file with cached secret values
    #[serde(default = "default_secrets_file")]
    pub secrets_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            secrets_template: default_secrets_template(),
            secrets_file: default_secrets_file(),
        }
    }
}

fn default_manifest() -> String {
    "fleet.toml".to_string()
}

fn default_secrets_template() -> String {
    "fleet.secrets.template".to_string()
}

fn default_secrets_file() -> String {
    ".env.fleet".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheConfig {
    /// Empty means the XDG cache directory
    #[serde(default)]
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after a network failure
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive such as `info` or `agent_fleet=debug`
    #[serde(default)]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    /// Load configuration with precedence:
    /// 1. CLI flags (applied later via with_cli_overrides)
    /// 2. Environment variables
    /// 3. Project config (.agent-fleet.toml in the working directory)
    /// 4. Global config (~/.agent-fleet.toml)
    /// 5. Built-in defaults
    ///
    /// Files are layered key by key: a key the project file sets wins over
    /// the global file even when its value equals the built-in default.
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut merged = toml::Table::new();

        if let Some(home) = home_dir() {
            let global_config = home.join(CONFIG_FILE);
            if global_config.exists() {
                merge_tables(&mut merged, read_layer(&global_config)?);
            }
        }

        let project_config = project_root.join(CONFIG_FILE);
        if project_config.exists() {
            merge_tables(&mut merged, read_layer(&project_config)?);
        }

        let config: Config = toml::Value::Table(merged).try_into()?;
        config.merge_env()
    }

    fn validate(&self) -> Result<()> {
        if self.fetch.timeout_secs == 0 {
            return Err(FleetError::InvalidConfig(
                "fetch.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides
    fn merge_env(mut self) -> Result<Self> {
        if let Some(dir) = env_var("AGENT_FLEET_CACHE_DIR") {
            self.cache.dir = dir;
        }
        if let Some(manifest) = env_var("AGENT_FLEET_MANIFEST") {
            self.paths.manifest = manifest;
        }
        if let Some(timeout) = env_var("AGENT_FLEET_FETCH_TIMEOUT") {
            self.fetch.timeout_secs = parse_env("AGENT_FLEET_FETCH_TIMEOUT", &timeout)?;
        }
        if let Some(retries) = env_var("AGENT_FLEET_FETCH_RETRIES") {
            self.fetch.retries = parse_env("AGENT_FLEET_FETCH_RETRIES", &retries)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Apply CLI overrides (highest precedence)
    pub fn with_cli_overrides(mut self, cli: &Cli) -> Self {
        self.verbose = cli.verbose;
        if let Some(manifest) = &cli.manifest {
            self.paths.manifest = manifest.to_string_lossy().to_string();
        }
        self.log_level = cli.log_level.clone();
        self
    }

    /// Manifest location, with `~` expanded
    pub fn manifest_path(&self) -> PathBuf {
        expand(&self.paths.manifest)
    }

    /// Directory relative file settings are anchored to
    pub fn manifest_dir(&self) -> PathBuf {
        match self.manifest_path().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn secrets_template_path(&self) -> PathBuf {
        resolve_against(&self.manifest_dir(), &expand(&self.paths.secrets_template))
    }

    pub fn secrets_file_path(&self) -> PathBuf {
        resolve_against(&self.manifest_dir(), &expand(&self.paths.secrets_file))
    }

    pub fn cache_dir(&self) -> PathBuf {
        if self.cache.dir.is_empty() {
            default_cache_dir()
        } else {
            expand(&self.cache.dir)
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }
}

/// Parse one config file, rejecting it on its own before it is layered
fn read_layer(path: &Path) -> Result<toml::Table> {
    let contents = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&contents)?;
    let config: Config = toml::Value::Table(table.clone()).try_into()?;
    config.validate()?;
    Ok(table)
}

/// Overlay `overlay` onto `base`, recursing into sections
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(section) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, section);
                } else {
                    base.insert(key, toml::Value::Table(section));
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

fn expand(path: &str) -> PathBuf {
    expand_tilde(path).unwrap_or_else(|| PathBuf::from(path))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        FleetError::InvalidConfig(format!("{}='{}' is not a valid number", name, value))
    })
}
