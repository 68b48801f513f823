//! Structured logging setup.
//!
//! Library code only emits `tracing` events; the binary installs one
//! subscriber writing to stderr so stdout stays parseable.

use crate::config::{Config, LogFormat};
use crate::error::{FleetError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable holding a filter directive
pub const LOG_ENV: &str = "AGENT_FLEET_LOG";

const DEFAULT_LEVEL: &str = "warn";

/// Filter directive with precedence: --log-level, -v, AGENT_FLEET_LOG,
/// config file, default
pub fn filter_directive(config: &Config) -> String {
    if let Some(level) = config.log_level.as_deref().filter(|l| !l.is_empty()) {
        return level.to_string();
    }
    if config.verbose {
        return "debug".to_string();
    }
    if let Ok(level) = std::env::var(LOG_ENV) {
        if !level.trim().is_empty() {
            return level;
        }
    }
    if !config.logging.level.is_empty() {
        return config.logging.level.clone();
    }
    DEFAULT_LEVEL.to_string()
}

/// Install the global subscriber. Safe to call more than once; later calls
/// keep the first subscriber.
pub fn init(config: &Config) -> Result<()> {
    let directive = filter_directive(config);
    let filter = EnvFilter::try_new(&directive).map_err(|e| {
        FleetError::InvalidConfig(format!("Invalid log filter '{}': {}", directive, e))
    })?;

    let base = Registry::default().with(filter);
    let result = match config.logging.format {
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => base
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    // Already initialised (tests, embedding callers)
    let _ = result;
    Ok(())
}
